use std::collections::HashSet;
use std::str::FromStr;

use super::model::{AssignOutcome, NewAssignment, NewPoint, NewShipment, OpenShipment};
use crate::capacity::{Capacity, Load};
use crate::model::{
    ApplicationShadow, Assignment, LogisticPoint, RoutePoint, ShadowStatus, Shipment,
    ShipmentStatus,
};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let in_memory = normalized.starts_with("sqlite::memory");
    let mut options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {}", normalized))?
        .create_if_missing(true)
        .foreign_keys(true);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }
    // Every connection to `sqlite::memory:` is its own database, so keep exactly one alive.
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new()
    };
    let pool = pool_options.connect_with(options).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query_part {
        Some(q) => format!("sqlite://{}?{}", expanded_path, q),
        None => format!("sqlite://{}", expanded_path),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn insert_point(pool: &Pool, point: &NewPoint) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO logistic_points (title, address, lat, lon, created_at) VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&point.title)
    .bind(point.address.as_deref())
    .bind(point.lat)
    .bind(point.lon)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .context("failed to insert logistic point")?;
    Ok(rec.get("id"))
}

pub async fn list_points(pool: &Pool) -> Result<Vec<LogisticPoint>> {
    let rows = sqlx::query(
        "SELECT id, title, address, lat, lon, created_at FROM logistic_points ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(point_from_row).collect()
}

pub async fn get_point(pool: &Pool, id: i64) -> Result<Option<LogisticPoint>> {
    let row = sqlx::query(
        "SELECT id, title, address, lat, lon, created_at FROM logistic_points WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(point_from_row).transpose()
}

fn point_from_row(row: &SqliteRow) -> Result<LogisticPoint> {
    Ok(LogisticPoint {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        address: row
            .try_get::<Option<String>, _>("address")?
            .filter(|s| !s.trim().is_empty()),
        lat: row.try_get("lat")?,
        lon: row.try_get("lon")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert the shipment and both route points in one transaction.
#[instrument(skip_all)]
pub async fn create_shipment(pool: &Pool, new: &NewShipment) -> Result<Shipment> {
    let mut tx = pool.begin().await?;
    let created_at = Utc::now();
    let id: i64 = sqlx::query(
        "INSERT INTO shipments (max_weight_kg, max_volume_m3, departure_at, status, created_at) VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(new.capacity.max_weight_kg)
    .bind(new.capacity.max_volume_m3)
    .bind(new.departure_at)
    .bind(ShipmentStatus::Planned.as_str())
    .bind(created_at)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert shipment")?
    .get("id");

    for (ordinal, stop) in [(1_i64, new.pickup), (2_i64, new.dropoff)] {
        sqlx::query(
            "INSERT INTO route_points (shipment_id, point_id, ordinal, planned_arrive_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(stop.point_id)
        .bind(ordinal)
        .bind(stop.planned_arrive_at)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert route point {} of shipment {}", ordinal, id))?;
    }
    tx.commit().await?;

    Ok(Shipment {
        id,
        max_weight_kg: new.capacity.max_weight_kg,
        max_volume_m3: new.capacity.max_volume_m3,
        departure_at: new.departure_at,
        status: ShipmentStatus::Planned,
        created_at,
    })
}

pub async fn list_shipments(pool: &Pool) -> Result<Vec<Shipment>> {
    let rows = sqlx::query(
        "SELECT id, max_weight_kg, max_volume_m3, departure_at, status, created_at FROM shipments ORDER BY id DESC",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(shipment_from_row).collect()
}

pub async fn get_shipment(pool: &Pool, id: i64) -> Result<Option<Shipment>> {
    let row = sqlx::query(
        "SELECT id, max_weight_kg, max_volume_m3, departure_at, status, created_at FROM shipments WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(shipment_from_row).transpose()
}

pub async fn route_points(pool: &Pool, shipment_id: i64) -> Result<Vec<RoutePoint>> {
    let rows = sqlx::query(
        "SELECT id, shipment_id, point_id, ordinal, planned_arrive_at FROM route_points WHERE shipment_id = ? ORDER BY ordinal",
    )
    .bind(shipment_id)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| -> Result<RoutePoint> {
            Ok(RoutePoint {
                id: row.try_get("id")?,
                shipment_id: row.try_get("shipment_id")?,
                point_id: row.try_get("point_id")?,
                ordinal: row.try_get("ordinal")?,
                planned_arrive_at: row.try_get("planned_arrive_at")?,
            })
        })
        .collect()
}

/// PLANNED shipments together with their pickup and dropoff points, oldest first.
#[instrument(skip_all)]
pub async fn open_shipments(pool: &Pool) -> Result<Vec<OpenShipment>> {
    let rows = sqlx::query(
        "SELECT s.id, s.max_weight_kg, s.max_volume_m3, s.departure_at, \
                p1.point_id AS pickup_point_id, p2.point_id AS dropoff_point_id \
         FROM shipments s \
         JOIN route_points p1 ON p1.shipment_id = s.id AND p1.ordinal = 1 \
         JOIN route_points p2 ON p2.shipment_id = s.id AND p2.ordinal = 2 \
         WHERE s.status = ? \
         ORDER BY s.id",
    )
    .bind(ShipmentStatus::Planned.as_str())
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| -> Result<OpenShipment> {
            Ok(OpenShipment {
                id: row.try_get("id")?,
                capacity: Capacity {
                    max_weight_kg: row.try_get("max_weight_kg")?,
                    max_volume_m3: row.try_get("max_volume_m3")?,
                },
                departure_at: row.try_get("departure_at")?,
                pickup_point_id: row.try_get("pickup_point_id")?,
                dropoff_point_id: row.try_get("dropoff_point_id")?,
            })
        })
        .collect()
}

/// Compare-and-set on the shipment status. Returns false when the shipment is
/// not currently in `from` (or does not exist); nothing is written then.
#[instrument(skip_all, fields(shipment_id = id))]
pub async fn transition_shipment(
    pool: &Pool,
    id: i64,
    from: ShipmentStatus,
    to: ShipmentStatus,
) -> Result<bool> {
    let res = sqlx::query("UPDATE shipments SET status = ? WHERE id = ? AND status = ?")
        .bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .execute(pool)
        .await?;
    Ok(res.rows_affected() == 1)
}

fn shipment_from_row(row: &SqliteRow) -> Result<Shipment> {
    let id: i64 = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let status = ShipmentStatus::parse_status(&status)
        .ok_or_else(|| anyhow!("shipment {} has unknown status {}", id, status))?;
    Ok(Shipment {
        id,
        max_weight_kg: row.try_get("max_weight_kg")?,
        max_volume_m3: row.try_get("max_volume_m3")?,
        departure_at: row.try_get("departure_at")?,
        status,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn current_load(pool: &Pool, shipment_id: i64) -> Result<Load> {
    let (weight_kg, volume_m3): (f64, f64) = sqlx::query_as(
        "SELECT COALESCE(SUM(weight_kg), 0.0), COALESCE(SUM(volume_m3), 0.0) FROM assignments WHERE shipment_id = ?",
    )
    .bind(shipment_id)
    .fetch_one(pool)
    .await?;
    Ok(Load {
        weight_kg,
        volume_m3,
    })
}

/// Insert an assignment, re-checking shipment status, uniqueness and capacity
/// inside the same transaction as the write.
#[instrument(skip_all, fields(shipment_id = new.shipment_id, application_id = new.application_external_id))]
pub async fn add_assignment(pool: &Pool, new: &NewAssignment) -> Result<AssignOutcome> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query("SELECT status, max_weight_kg, max_volume_m3 FROM shipments WHERE id = ?")
        .bind(new.shipment_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(row) = row else {
        return Ok(AssignOutcome::ShipmentMissing);
    };
    let status: String = row.try_get("status")?;
    if ShipmentStatus::parse_status(&status) != Some(ShipmentStatus::Planned) {
        return Ok(AssignOutcome::ShipmentNotPlanned);
    }
    let capacity = Capacity {
        max_weight_kg: row.try_get("max_weight_kg")?,
        max_volume_m3: row.try_get("max_volume_m3")?,
    };

    let taken: Option<i64> =
        sqlx::query_scalar("SELECT id FROM assignments WHERE application_external_id = ?")
            .bind(new.application_external_id)
            .fetch_optional(&mut *tx)
            .await?;
    if taken.is_some() {
        return Ok(AssignOutcome::AlreadyAssigned);
    }

    let load = load_tx(&mut tx, new.shipment_id).await?;
    if !capacity.fits(load, new.weight_kg, new.volume_m3) {
        return Ok(AssignOutcome::OverCapacity);
    }

    let created_at = Utc::now();
    let id: i64 = sqlx::query(
        "INSERT INTO assignments (shipment_id, application_external_id, weight_kg, volume_m3, pickup_point_id, dropoff_point_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(new.shipment_id)
    .bind(new.application_external_id)
    .bind(new.weight_kg)
    .bind(new.volume_m3)
    .bind(new.pickup_point_id)
    .bind(new.dropoff_point_id)
    .bind(created_at)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert assignment")?
    .get("id");
    tx.commit().await?;

    Ok(AssignOutcome::Inserted(Assignment {
        id,
        shipment_id: new.shipment_id,
        application_external_id: new.application_external_id,
        weight_kg: new.weight_kg,
        volume_m3: new.volume_m3,
        pickup_point_id: new.pickup_point_id,
        dropoff_point_id: new.dropoff_point_id,
        created_at,
    }))
}

async fn load_tx(tx: &mut Transaction<'_, Sqlite>, shipment_id: i64) -> Result<Load> {
    let (weight_kg, volume_m3): (f64, f64) = sqlx::query_as(
        "SELECT COALESCE(SUM(weight_kg), 0.0), COALESCE(SUM(volume_m3), 0.0) FROM assignments WHERE shipment_id = ?",
    )
    .bind(shipment_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(Load {
        weight_kg,
        volume_m3,
    })
}

/// Assignments, newest first; all of them or those of one shipment.
pub async fn list_assignments(pool: &Pool, shipment_id: Option<i64>) -> Result<Vec<Assignment>> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT id, shipment_id, application_external_id, weight_kg, volume_m3, pickup_point_id, dropoff_point_id, created_at FROM assignments",
    );
    if let Some(shipment_id) = shipment_id {
        qb.push(" WHERE shipment_id = ").push_bind(shipment_id);
    }
    qb.push(" ORDER BY id DESC");
    let rows = qb.build().fetch_all(pool).await?;
    rows.iter()
        .map(|row| -> Result<Assignment> {
            Ok(Assignment {
                id: row.try_get("id")?,
                shipment_id: row.try_get("shipment_id")?,
                application_external_id: row.try_get("application_external_id")?,
                weight_kg: row.try_get("weight_kg")?,
                volume_m3: row.try_get("volume_m3")?,
                pickup_point_id: row.try_get("pickup_point_id")?,
                dropoff_point_id: row.try_get("dropoff_point_id")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

/// The subset of `application_ids` that is already bound to some shipment.
pub async fn assigned_among(pool: &Pool, application_ids: &[i64]) -> Result<HashSet<i64>> {
    if application_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT application_external_id FROM assignments WHERE application_external_id IN (",
    );
    let mut ids = qb.separated(", ");
    for id in application_ids {
        ids.push_bind(*id);
    }
    ids.push_unseparated(")");
    let found: Vec<i64> = qb.build_query_scalar::<i64>().fetch_all(pool).await?;
    Ok(found.into_iter().collect())
}

#[instrument(skip_all, fields(application_id = external_id))]
pub async fn find_or_create_shadow(pool: &Pool, external_id: i64) -> Result<ApplicationShadow> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO application_shadows (external_application_id, status, created_at, updated_at) VALUES (?, ?, ?, ?) \
         ON CONFLICT (external_application_id) DO NOTHING",
    )
    .bind(external_id)
    .bind(ShadowStatus::New.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    let row = sqlx::query(
        "SELECT id, external_application_id, status, created_at, updated_at FROM application_shadows WHERE external_application_id = ?",
    )
    .bind(external_id)
    .fetch_one(pool)
    .await?;
    shadow_from_row(&row)
}

pub async fn get_shadow(pool: &Pool, id: i64) -> Result<Option<ApplicationShadow>> {
    let row = sqlx::query(
        "SELECT id, external_application_id, status, created_at, updated_at FROM application_shadows WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(shadow_from_row).transpose()
}

pub async fn list_shadows(
    pool: &Pool,
    status: Option<ShadowStatus>,
) -> Result<Vec<ApplicationShadow>> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT id, external_application_id, status, created_at, updated_at FROM application_shadows",
    );
    if let Some(status) = status {
        qb.push(" WHERE status = ").push_bind(status.as_str());
    }
    qb.push(" ORDER BY id DESC LIMIT 100");
    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(shadow_from_row).collect()
}

/// Compare-and-set on the shadow status.
#[instrument(skip_all, fields(shadow_id = id))]
pub async fn set_shadow_status(
    pool: &Pool,
    id: i64,
    from: ShadowStatus,
    to: ShadowStatus,
) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE application_shadows SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(to.as_str())
    .bind(Utc::now())
    .bind(id)
    .bind(from.as_str())
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

fn shadow_from_row(row: &SqliteRow) -> Result<ApplicationShadow> {
    let id: i64 = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let status = ShadowStatus::parse_status(&status)
        .ok_or_else(|| anyhow!("application shadow {} has unknown status {}", id, status))?;
    Ok(ApplicationShadow {
        id,
        external_application_id: row.try_get("external_application_id")?,
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::model::RouteStop;
    use chrono::{Duration, TimeZone};

    async fn setup_pool() -> Pool {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    async fn two_points(pool: &Pool) -> (i64, i64) {
        let a = insert_point(
            pool,
            &NewPoint {
                title: "Depot A".into(),
                address: None,
                lat: Some(55.75),
                lon: Some(37.61),
            },
        )
        .await
        .unwrap();
        let b = insert_point(
            pool,
            &NewPoint {
                title: "Depot B".into(),
                address: Some("Quay 4".into()),
                lat: None,
                lon: None,
            },
        )
        .await
        .unwrap();
        (a, b)
    }

    async fn shipment(pool: &Pool, max_w: f64, max_v: f64) -> Shipment {
        let (a, b) = two_points(pool).await;
        let dep = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
        create_shipment(
            pool,
            &NewShipment {
                capacity: Capacity {
                    max_weight_kg: max_w,
                    max_volume_m3: max_v,
                },
                departure_at: dep,
                pickup: RouteStop {
                    point_id: a,
                    planned_arrive_at: dep,
                },
                dropoff: RouteStop {
                    point_id: b,
                    planned_arrive_at: dep + Duration::hours(2),
                },
            },
        )
        .await
        .unwrap()
    }

    fn assignment(shipment_id: i64, app: i64, w: f64, v: f64) -> NewAssignment {
        NewAssignment {
            shipment_id,
            application_external_id: app,
            weight_kg: w,
            volume_m3: v,
            pickup_point_id: None,
            dropoff_point_id: None,
        }
    }

    #[tokio::test]
    async fn shipment_is_created_with_two_ordered_route_points() {
        let pool = setup_pool().await;
        let sh = shipment(&pool, 1000.0, 10.0).await;
        assert_eq!(sh.status, ShipmentStatus::Planned);

        let route = route_points(&pool, sh.id).await.unwrap();
        assert_eq!(route.len(), 2);
        assert_eq!(route[0].ordinal, 1);
        assert_eq!(route[1].ordinal, 2);
        assert_eq!(route[0].planned_arrive_at, sh.departure_at);
        assert_ne!(route[0].point_id, route[1].point_id);

        let open = open_shipments(&pool).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].pickup_point_id, route[0].point_id);
        assert_eq!(open[0].dropoff_point_id, route[1].point_id);
    }

    #[tokio::test]
    async fn failed_route_insert_leaves_no_shipment_behind() {
        let pool = setup_pool().await;
        let (a, _) = two_points(&pool).await;
        let dep = Utc::now();
        let res = create_shipment(
            &pool,
            &NewShipment {
                capacity: Capacity {
                    max_weight_kg: 10.0,
                    max_volume_m3: 1.0,
                },
                departure_at: dep,
                pickup: RouteStop {
                    point_id: a,
                    planned_arrive_at: dep,
                },
                // no such point: foreign key violation on the second insert
                dropoff: RouteStop {
                    point_id: 9999,
                    planned_arrive_at: dep,
                },
            },
        )
        .await;
        assert!(res.is_err());
        assert!(list_shipments(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transitions_are_compare_and_set() {
        let pool = setup_pool().await;
        let sh = shipment(&pool, 1000.0, 10.0).await;

        assert!(!transition_shipment(&pool, sh.id, ShipmentStatus::Departed, ShipmentStatus::Delivered)
            .await
            .unwrap());
        assert!(transition_shipment(&pool, sh.id, ShipmentStatus::Planned, ShipmentStatus::Departed)
            .await
            .unwrap());
        assert!(!transition_shipment(&pool, sh.id, ShipmentStatus::Planned, ShipmentStatus::Departed)
            .await
            .unwrap());
        let got = get_shipment(&pool, sh.id).await.unwrap().unwrap();
        assert_eq!(got.status, ShipmentStatus::Departed);
        assert!(open_shipments(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_assignment_enforces_capacity_and_uniqueness() {
        let pool = setup_pool().await;
        let sh = shipment(&pool, 1000.0, 10.0).await;

        let first = add_assignment(&pool, &assignment(sh.id, 1, 500.0, 4.0)).await.unwrap();
        assert!(matches!(first, AssignOutcome::Inserted(_)));

        let over = add_assignment(&pool, &assignment(sh.id, 2, 600.0, 5.0)).await.unwrap();
        assert_eq!(over, AssignOutcome::OverCapacity);

        let dup = add_assignment(&pool, &assignment(sh.id, 1, 1.0, 1.0)).await.unwrap();
        assert_eq!(dup, AssignOutcome::AlreadyAssigned);

        let load = current_load(&pool, sh.id).await.unwrap();
        assert_eq!(load, Load { weight_kg: 500.0, volume_m3: 4.0 });

        let missing = add_assignment(&pool, &assignment(4242, 3, 1.0, 1.0)).await.unwrap();
        assert_eq!(missing, AssignOutcome::ShipmentMissing);

        transition_shipment(&pool, sh.id, ShipmentStatus::Planned, ShipmentStatus::Departed)
            .await
            .unwrap();
        let late = add_assignment(&pool, &assignment(sh.id, 4, 1.0, 1.0)).await.unwrap();
        assert_eq!(late, AssignOutcome::ShipmentNotPlanned);

        let listed = list_assignments(&pool, Some(sh.id)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].application_external_id, 1);

        let taken = assigned_among(&pool, &[1, 2, 3]).await.unwrap();
        assert_eq!(taken, HashSet::from([1]));
        assert!(assigned_among(&pool, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn shadows_are_created_once_and_updated_conditionally() {
        let pool = setup_pool().await;
        let s1 = find_or_create_shadow(&pool, 77).await.unwrap();
        let s2 = find_or_create_shadow(&pool, 77).await.unwrap();
        assert_eq!(s1.id, s2.id);
        assert_eq!(s1.status, ShadowStatus::New);

        assert!(set_shadow_status(&pool, s1.id, ShadowStatus::New, ShadowStatus::InTransit)
            .await
            .unwrap());
        assert!(!set_shadow_status(&pool, s1.id, ShadowStatus::New, ShadowStatus::InProgress)
            .await
            .unwrap());

        let in_transit = list_shadows(&pool, Some(ShadowStatus::InTransit)).await.unwrap();
        assert_eq!(in_transit.len(), 1);
        assert!(list_shadows(&pool, Some(ShadowStatus::New)).await.unwrap().is_empty());
        assert_eq!(
            get_shadow(&pool, s1.id).await.unwrap().unwrap().status,
            ShadowStatus::InTransit
        );
    }

    #[test]
    fn prepare_sqlite_url_keeps_memory_and_adds_slashes() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
        let td = tempfile::tempdir().unwrap();
        let file = td.path().join("nested/db.sqlite");
        let url = prepare_sqlite_url(&format!("sqlite:{}?mode=rwc", file.display()));
        assert_eq!(url, format!("sqlite://{}?mode=rwc", file.display()));
        assert!(file.parent().unwrap().exists());
    }
}
