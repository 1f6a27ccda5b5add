//! Background planner: packs pending office applications onto PLANNED shipments.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::capacity::{self, Candidate};
use crate::db::{self, AssignOutcome, NewAssignment, OpenShipment, Pool};
use crate::locks::ShipmentLocks;
use crate::office::{ApplicationSource, CandidateApplication};

/// Per-tick counters, mostly for logs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub shipments_seen: usize,
    pub shipments_failed: usize,
    pub assigned: usize,
    pub rejected: usize,
    /// Set when shutdown was observed before every shipment was processed.
    pub interrupted: bool,
}

#[derive(Clone)]
pub struct Planner {
    pool: Pool,
    office: Arc<dyn ApplicationSource>,
    locks: ShipmentLocks,
    interval: Option<Duration>,
}

impl Planner {
    pub fn new(
        pool: Pool,
        office: Arc<dyn ApplicationSource>,
        locks: ShipmentLocks,
        interval: Option<Duration>,
    ) -> Self {
        Self {
            pool,
            office,
            locks,
            interval,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Run ticks until `shutdown` flips to true. Returns at once when disabled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Some(period) = self.interval else {
            info!("planner disabled");
            return;
        };
        info!(interval_secs = period.as_secs(), "planner started");

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }
            let report = self.tick(&shutdown).await;
            if report.assigned > 0 || report.shipments_failed > 0 {
                info!(
                    shipments = report.shipments_seen,
                    failed = report.shipments_failed,
                    assigned = report.assigned,
                    rejected = report.rejected,
                    "planner tick finished"
                );
            } else {
                debug!(shipments = report.shipments_seen, "planner tick finished");
            }
        }
        info!("planner stopped");
    }

    /// One pass over every PLANNED shipment. Errors are contained per shipment.
    #[instrument(skip_all)]
    pub async fn tick(&self, shutdown: &watch::Receiver<bool>) -> TickReport {
        let mut report = TickReport::default();
        let shipments = match db::open_shipments(&self.pool).await {
            Ok(shipments) => shipments,
            Err(err) => {
                warn!(error = %format!("{:#}", err), "planner could not list open shipments");
                return report;
            }
        };

        for shipment in shipments {
            if *shutdown.borrow() {
                report.interrupted = true;
                break;
            }
            report.shipments_seen += 1;
            match self.plan_shipment(&shipment).await {
                Ok((assigned, rejected)) => {
                    report.assigned += assigned;
                    report.rejected += rejected;
                }
                Err(err) => {
                    report.shipments_failed += 1;
                    warn!(
                        shipment_id = shipment.id,
                        error = %format!("{:#}", err),
                        "planner skipped shipment this tick"
                    );
                }
            }
        }
        report
    }

    #[instrument(skip_all, fields(shipment_id = shipment.id))]
    async fn plan_shipment(&self, shipment: &OpenShipment) -> Result<(usize, usize)> {
        let offered = self
            .office
            .unassigned_applications(
                shipment.pickup_point_id,
                shipment.dropoff_point_id,
                shipment.departure_at,
            )
            .await?;
        if offered.is_empty() {
            return Ok((0, 0));
        }

        let _guard = self.locks.lock(shipment.id).await;

        let ids: Vec<i64> = offered.iter().map(|a| a.id).collect();
        let taken = db::assigned_among(&self.pool, &ids).await?;
        let fresh: Vec<&CandidateApplication> =
            offered.iter().filter(|a| !taken.contains(&a.id)).collect();
        let candidates: Vec<Candidate> = fresh.iter().map(|a| Candidate::from(*a)).collect();

        // The running load only counts assignments that were stored.
        let mut load = db::current_load(&self.pool, shipment.id).await?;
        let mut assigned = 0;
        let mut rejected = 0;
        for candidate in &candidates {
            let step = capacity::pack(shipment.capacity, load, std::slice::from_ref(candidate));
            if step.accepted.is_empty() {
                rejected += 1;
                continue;
            }
            let outcome = db::add_assignment(
                &self.pool,
                &NewAssignment {
                    shipment_id: shipment.id,
                    application_external_id: candidate.application_id,
                    weight_kg: candidate.weight_kg,
                    volume_m3: candidate.volume_m3,
                    pickup_point_id: Some(shipment.pickup_point_id),
                    dropoff_point_id: Some(shipment.dropoff_point_id),
                },
            )
            .await?;
            match outcome {
                AssignOutcome::Inserted(_) => {
                    assigned += 1;
                    load = step.load;
                }
                // Shipment left PLANNED meanwhile; nothing more can be added.
                AssignOutcome::ShipmentNotPlanned | AssignOutcome::ShipmentMissing => break,
                other => {
                    debug!(
                        application_id = candidate.application_id,
                        ?other,
                        "assignment not stored"
                    );
                }
            }
        }
        Ok((assigned, rejected))
    }
}
