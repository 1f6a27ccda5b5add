//! Operator-facing operations behind the HTTP surface.
//!
//! Everything that mutates a shipment's assignments or status goes through the
//! shared [`ShipmentLocks`], the same ones the planner takes. Application shadow
//! changes go through [`StatusSynchronizer`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::capacity::Capacity;
use crate::db::{self, AssignOutcome, NewAssignment, NewPoint, NewShipment, Pool, RouteStop};
use crate::error::{ServiceError, ServiceResult};
use crate::eta;
use crate::locks::ShipmentLocks;
use crate::model::{
    ApplicationShadow, Assignment, LogisticPoint, RoutePoint, ShadowStatus, Shipment,
    ShipmentStatus,
};
use crate::office::{ApplicationSource, ApplicationStatusEntry};
use crate::sync::StatusSynchronizer;

#[derive(Debug, Clone, Deserialize)]
pub struct PointDraft {
    pub title: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RouteEntry {
    pub point_id: i64,
    pub ordinal: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentDraft {
    pub max_weight_kg: f64,
    pub max_volume_m3: f64,
    pub departure_at: DateTime<Utc>,
    #[serde(default)]
    pub route: Vec<RouteEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ManualAssignment {
    pub application_id: i64,
    pub weight_kg: f64,
    pub volume_m3: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ShipmentDetail {
    #[serde(flatten)]
    pub shipment: Shipment,
    pub route: Vec<RoutePoint>,
}

#[derive(Clone)]
pub struct LogisticService {
    pool: Pool,
    office: Arc<dyn ApplicationSource>,
    locks: ShipmentLocks,
    sync: StatusSynchronizer,
}

impl LogisticService {
    pub fn new(pool: Pool, office: Arc<dyn ApplicationSource>, locks: ShipmentLocks) -> Self {
        let sync = StatusSynchronizer::new(pool.clone(), office.clone());
        Self {
            pool,
            office,
            locks,
            sync,
        }
    }

    #[instrument(skip_all)]
    pub async fn create_point(&self, draft: PointDraft) -> ServiceResult<LogisticPoint> {
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return Err(ServiceError::validation("title must be non-empty"));
        }
        match (draft.lat, draft.lon) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                    return Err(ServiceError::validation("coordinates out of range"));
                }
            }
            (None, None) => {}
            _ => {
                return Err(ServiceError::validation(
                    "lat and lon must be given together",
                ))
            }
        }
        let address = draft
            .address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        let id = db::insert_point(
            &self.pool,
            &NewPoint {
                title,
                address,
                lat: draft.lat,
                lon: draft.lon,
            },
        )
        .await?;
        let point = db::get_point(&self.pool, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("point {} not found", id)))?;
        info!(point_id = id, "logistic point created");
        Ok(point)
    }

    pub async fn list_points(&self) -> ServiceResult<Vec<LogisticPoint>> {
        Ok(db::list_points(&self.pool).await?)
    }

    /// Validate the route, estimate arrival at the dropoff and store the
    /// shipment with both route points atomically.
    #[instrument(skip_all)]
    pub async fn create_shipment(&self, draft: ShipmentDraft) -> ServiceResult<ShipmentDetail> {
        if !(draft.max_weight_kg.is_finite() && draft.max_weight_kg > 0.0) {
            return Err(ServiceError::validation("max_weight_kg must be positive"));
        }
        if !(draft.max_volume_m3.is_finite() && draft.max_volume_m3 > 0.0) {
            return Err(ServiceError::validation("max_volume_m3 must be positive"));
        }
        let (pickup_id, dropoff_id) = validate_route(&draft.route)?;

        let pickup = db::get_point(&self.pool, pickup_id).await?.ok_or_else(|| {
            ServiceError::validation(format!("route point {} does not exist", pickup_id))
        })?;
        let dropoff = db::get_point(&self.pool, dropoff_id).await?.ok_or_else(|| {
            ServiceError::validation(format!("route point {} does not exist", dropoff_id))
        })?;

        let arrival = eta::estimate_arrival(
            draft.departure_at,
            pickup.coordinates(),
            dropoff.coordinates(),
        );
        let shipment = db::create_shipment(
            &self.pool,
            &NewShipment {
                capacity: Capacity {
                    max_weight_kg: draft.max_weight_kg,
                    max_volume_m3: draft.max_volume_m3,
                },
                departure_at: draft.departure_at,
                pickup: RouteStop {
                    point_id: pickup.id,
                    planned_arrive_at: draft.departure_at,
                },
                dropoff: RouteStop {
                    point_id: dropoff.id,
                    planned_arrive_at: arrival,
                },
            },
        )
        .await?;
        let route = db::route_points(&self.pool, shipment.id).await?;
        info!(
            shipment_id = shipment.id,
            pickup_point_id = pickup.id,
            dropoff_point_id = dropoff.id,
            planned_arrival = %arrival,
            "shipment created"
        );
        Ok(ShipmentDetail { shipment, route })
    }

    pub async fn list_shipments(&self) -> ServiceResult<Vec<Shipment>> {
        Ok(db::list_shipments(&self.pool).await?)
    }

    pub async fn get_shipment(&self, id: i64) -> ServiceResult<ShipmentDetail> {
        let shipment = self.require_shipment(id).await?;
        let route = db::route_points(&self.pool, id).await?;
        Ok(ShipmentDetail { shipment, route })
    }

    /// PLANNED -> DEPARTED, then best-effort notification for every assigned
    /// application. Notification failures are logged and never returned.
    #[instrument(skip(self), fields(shipment_id = id))]
    pub async fn depart(&self, id: i64) -> ServiceResult<Shipment> {
        let (shipment, assignments) = {
            let _guard = self.locks.lock(id).await;
            let shipment = self.advance(id, ShipmentStatus::Departed).await?;
            let assignments = db::list_assignments(&self.pool, Some(id)).await?;
            (shipment, assignments)
        };
        info!(assignments = assignments.len(), "shipment departed");

        let application_ids: Vec<i64> = assignments
            .iter()
            .map(|a| a.application_external_id)
            .collect();
        self.sync.depart(id, &application_ids).await;
        Ok(shipment)
    }

    /// DEPARTED -> DELIVERED.
    #[instrument(skip(self), fields(shipment_id = id))]
    pub async fn deliver(&self, id: i64) -> ServiceResult<Shipment> {
        let _guard = self.locks.lock(id).await;
        let shipment = self.advance(id, ShipmentStatus::Delivered).await?;
        info!("shipment delivered");
        Ok(shipment)
    }

    async fn advance(&self, id: i64, to: ShipmentStatus) -> ServiceResult<Shipment> {
        let current = self.require_shipment(id).await?;
        if current.status.next() != Some(to) {
            return Err(ServiceError::conflict(format!(
                "shipment {} is {}, cannot move to {}",
                id,
                current.status.as_str(),
                to.as_str()
            )));
        }
        if !db::transition_shipment(&self.pool, id, current.status, to).await? {
            return Err(ServiceError::conflict(format!(
                "shipment {} changed status concurrently",
                id
            )));
        }
        Ok(Shipment {
            status: to,
            ..current
        })
    }

    async fn require_shipment(&self, id: i64) -> ServiceResult<Shipment> {
        db::get_shipment(&self.pool, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("shipment {} not found", id)))
    }

    /// Bind one application to a PLANNED shipment by hand, under the same
    /// per-shipment lock the planner uses.
    #[instrument(skip(self, request))]
    pub async fn assign_manual(
        &self,
        shipment_id: i64,
        request: ManualAssignment,
    ) -> ServiceResult<Assignment> {
        let valid = |v: f64| v.is_finite() && v >= 0.0;
        if !valid(request.weight_kg) || !valid(request.volume_m3) {
            return Err(ServiceError::validation(
                "weight_kg and volume_m3 must be non-negative",
            ));
        }

        let _guard = self.locks.lock(shipment_id).await;
        let route = db::route_points(&self.pool, shipment_id).await?;
        let stop = |ordinal: i64| route.iter().find(|r| r.ordinal == ordinal).map(|r| r.point_id);

        let outcome = db::add_assignment(
            &self.pool,
            &NewAssignment {
                shipment_id,
                application_external_id: request.application_id,
                weight_kg: request.weight_kg,
                volume_m3: request.volume_m3,
                pickup_point_id: stop(1),
                dropoff_point_id: stop(2),
            },
        )
        .await?;
        match outcome {
            AssignOutcome::Inserted(assignment) => {
                info!(
                    application_id = request.application_id,
                    "application assigned manually"
                );
                Ok(assignment)
            }
            AssignOutcome::ShipmentMissing => Err(ServiceError::not_found(format!(
                "shipment {} not found",
                shipment_id
            ))),
            AssignOutcome::ShipmentNotPlanned => Err(ServiceError::conflict(format!(
                "shipment {} is no longer PLANNED",
                shipment_id
            ))),
            AssignOutcome::AlreadyAssigned => Err(ServiceError::conflict(format!(
                "application {} is already assigned",
                request.application_id
            ))),
            AssignOutcome::OverCapacity => Err(ServiceError::conflict(format!(
                "application {} exceeds the remaining capacity of shipment {}",
                request.application_id, shipment_id
            ))),
        }
    }

    pub async fn list_assignments(&self, shipment_id: Option<i64>) -> ServiceResult<Vec<Assignment>> {
        if let Some(id) = shipment_id {
            self.require_shipment(id).await?;
        }
        Ok(db::list_assignments(&self.pool, shipment_id).await?)
    }

    pub async fn list_shadows(
        &self,
        status: Option<ShadowStatus>,
    ) -> ServiceResult<Vec<ApplicationShadow>> {
        Ok(db::list_shadows(&self.pool, status).await?)
    }

    pub async fn get_shadow(&self, id: i64) -> ServiceResult<ApplicationShadow> {
        db::get_shadow(&self.pool, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("application {} not found", id)))
    }

    /// Register an application the logistic side should track.
    pub async fn track_application(&self, external_id: i64) -> ServiceResult<ApplicationShadow> {
        Ok(db::find_or_create_shadow(&self.pool, external_id).await?)
    }

    /// Operator status change on a shadow, mirrored to the office best-effort.
    pub async fn update_shadow_status(
        &self,
        id: i64,
        status: ShadowStatus,
    ) -> ServiceResult<ApplicationShadow> {
        self.sync.transition(id, status).await
    }

    /// Authoritative statuses straight from the office. Unlike notifications,
    /// a failed lookup is returned to the caller.
    pub async fn application_statuses(
        &self,
        ids: &[i64],
    ) -> ServiceResult<Vec<ApplicationStatusEntry>> {
        let mut seen = HashSet::new();
        let ids: Vec<i64> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        self.office
            .statuses(&ids)
            .await
            .map_err(ServiceError::Upstream)
    }
}

/// Exactly two entries, ordinals exactly {1, 2}, two distinct points.
/// Returns `(pickup, dropoff)` point ids.
pub fn validate_route(route: &[RouteEntry]) -> ServiceResult<(i64, i64)> {
    if route.len() != 2 {
        return Err(ServiceError::validation(format!(
            "route must have exactly two points, got {}",
            route.len()
        )));
    }
    if let Some(bad) = route.iter().find(|r| r.ordinal != 1 && r.ordinal != 2) {
        return Err(ServiceError::validation(format!(
            "route ordinal must be 1 or 2, got {}",
            bad.ordinal
        )));
    }
    if route[0].ordinal == route[1].ordinal {
        return Err(ServiceError::validation("route ordinals must be distinct"));
    }
    if route[0].point_id == route[1].point_id {
        return Err(ServiceError::validation(
            "pickup and dropoff must be different points",
        ));
    }
    let (pickup, dropoff) = if route[0].ordinal == 1 {
        (route[0], route[1])
    } else {
        (route[1], route[0])
    };
    Ok((pickup.point_id, dropoff.point_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(point_id: i64, ordinal: i64) -> RouteEntry {
        RouteEntry { point_id, ordinal }
    }

    #[test]
    fn route_accepts_either_order() {
        assert_eq!(validate_route(&[entry(5, 1), entry(7, 2)]).unwrap(), (5, 7));
        assert_eq!(validate_route(&[entry(7, 2), entry(5, 1)]).unwrap(), (5, 7));
    }

    #[test]
    fn route_shape_is_enforced() {
        let bad: Vec<Vec<RouteEntry>> = vec![
            vec![],
            vec![entry(1, 1)],
            vec![entry(1, 1), entry(2, 2), entry(3, 2)],
            vec![entry(1, 1), entry(2, 1)],
            vec![entry(1, 1), entry(2, 3)],
            vec![entry(4, 1), entry(4, 2)],
        ];
        for route in bad {
            assert!(
                matches!(validate_route(&route), Err(ServiceError::Validation(_))),
                "accepted {:?}",
                route
            );
        }
    }
}
