#![allow(dead_code)]

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use logistic_planner::db::{self, Pool};
use logistic_planner::model::ShadowStatus;
use logistic_planner::office::{ApplicationSource, ApplicationStatusEntry, CandidateApplication};

pub async fn setup_pool() -> Pool {
    let pool = db::init_pool("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

pub fn app(id: i64, weight: f64, volume: f64) -> CandidateApplication {
    CandidateApplication {
        id,
        total_weight: weight,
        total_volume: volume,
        pickup_point_id: None,
        dropoff_point_id: None,
        created_at: None,
    }
}

/// In-process office: serves canned applications per route and records calls.
#[derive(Clone, Default)]
pub struct RecordingOffice {
    offers: Arc<Mutex<HashMap<(i64, i64), Vec<CandidateApplication>>>>,
    failing_routes: Arc<Mutex<HashSet<(i64, i64)>>>,
    fail_notifications: Arc<Mutex<bool>>,
    trip_on_query: Arc<Mutex<Option<watch::Sender<bool>>>>,
    queries: Arc<Mutex<Vec<(i64, i64, DateTime<Utc>)>>>,
    in_transit: Arc<Mutex<Vec<i64>>>,
    status_updates: Arc<Mutex<Vec<(i64, ShadowStatus)>>>,
    slow_statuses: Arc<Mutex<Vec<(ShadowStatus, Duration)>>>,
    events: Arc<Mutex<Vec<(i64, &'static str)>>>,
}

impl RecordingOffice {
    pub async fn offer(&self, pickup: i64, dropoff: i64, apps: Vec<CandidateApplication>) {
        self.offers.lock().await.insert((pickup, dropoff), apps);
    }

    pub async fn fail_route(&self, pickup: i64, dropoff: i64) {
        self.failing_routes.lock().await.insert((pickup, dropoff));
    }

    pub async fn fail_notifications(&self) {
        *self.fail_notifications.lock().await = true;
    }

    /// Flip `tx` to true on the next candidates query.
    pub async fn trip_shutdown_on_query(&self, tx: watch::Sender<bool>) {
        *self.trip_on_query.lock().await = Some(tx);
    }

    pub async fn queries(&self) -> Vec<(i64, i64, DateTime<Utc>)> {
        self.queries.lock().await.clone()
    }

    pub async fn in_transit(&self) -> Vec<i64> {
        self.in_transit.lock().await.clone()
    }

    pub async fn status_updates(&self) -> Vec<(i64, ShadowStatus)> {
        self.status_updates.lock().await.clone()
    }

    /// Hold every update to `status` for `delay` before it is received.
    pub async fn slow_status(&self, status: ShadowStatus, delay: Duration) {
        self.slow_statuses.lock().await.push((status, delay));
    }

    /// Notifications in arrival order: the status name, or `MARK_IN_TRANSIT`.
    pub async fn events(&self) -> Vec<(i64, &'static str)> {
        self.events.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl ApplicationSource for RecordingOffice {
    async fn unassigned_applications(
        &self,
        pickup_point_id: i64,
        dropoff_point_id: i64,
        before: DateTime<Utc>,
    ) -> Result<Vec<CandidateApplication>> {
        self.queries
            .lock()
            .await
            .push((pickup_point_id, dropoff_point_id, before));
        if let Some(tx) = self.trip_on_query.lock().await.take() {
            let _ = tx.send(true);
        }
        let route = (pickup_point_id, dropoff_point_id);
        if self.failing_routes.lock().await.contains(&route) {
            return Err(anyhow!("office unavailable"));
        }
        Ok(self
            .offers
            .lock()
            .await
            .get(&route)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_in_transit(&self, application_id: i64) -> Result<()> {
        self.in_transit.lock().await.push(application_id);
        self.events
            .lock()
            .await
            .push((application_id, "MARK_IN_TRANSIT"));
        if *self.fail_notifications.lock().await {
            return Err(anyhow!("office unavailable"));
        }
        Ok(())
    }

    async fn update_status(&self, application_id: i64, status: ShadowStatus) -> Result<()> {
        let delay = self
            .slow_statuses
            .lock()
            .await
            .iter()
            .find(|(s, _)| *s == status)
            .map(|(_, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.events
            .lock()
            .await
            .push((application_id, status.as_str()));
        self.status_updates
            .lock()
            .await
            .push((application_id, status));
        if *self.fail_notifications.lock().await {
            return Err(anyhow!("office unavailable"));
        }
        Ok(())
    }

    async fn statuses(&self, application_ids: &[i64]) -> Result<Vec<ApplicationStatusEntry>> {
        if *self.fail_notifications.lock().await {
            return Err(anyhow!("office unavailable"));
        }
        Ok(application_ids
            .iter()
            .map(|id| ApplicationStatusEntry {
                id: *id,
                status: "NEW".to_string(),
            })
            .collect())
    }
}
