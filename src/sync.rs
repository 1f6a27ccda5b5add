//! Best-effort propagation of application status to the office service.
//!
//! Each notification is a single request. Failures are logged and dropped:
//! no retry, no outbox. Divergence between the two services after a failed
//! call is possible and has to be reconciled by an operator from the logs.
//!
//! The local shadow write and the office request for one application happen
//! under that application's guard, so the office sees its transitions in the
//! order they were committed here.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, instrument, warn};

use crate::db::{self, Pool};
use crate::error::{ServiceError, ServiceResult};
use crate::locks::ApplicationLocks;
use crate::model::{ApplicationShadow, ShadowStatus};
use crate::office::ApplicationSource;

/// Upper bound on in-flight notifications for a single departure.
const DEPARTURE_FANOUT: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct StatusSynchronizer {
    pool: Pool,
    office: Arc<dyn ApplicationSource>,
    locks: ApplicationLocks,
}

impl StatusSynchronizer {
    pub fn new(pool: Pool, office: Arc<dyn ApplicationSource>) -> Self {
        Self {
            pool,
            office,
            locks: ApplicationLocks::new(),
        }
    }

    /// Move every listed application to IN_TRANSIT locally and tell the office.
    ///
    /// Different applications may be handled concurrently; each gets exactly
    /// one office request.
    #[instrument(skip_all, fields(shipment_id = shipment_id, count = application_ids.len()))]
    pub async fn depart(&self, shipment_id: i64, application_ids: &[i64]) -> SyncReport {
        let results: Vec<bool> = stream::iter(application_ids.iter().copied())
            .map(|application_id| self.depart_one(shipment_id, application_id))
            .buffer_unordered(DEPARTURE_FANOUT)
            .collect()
            .await;

        let delivered = results.iter().filter(|ok| **ok).count();
        let report = SyncReport {
            delivered,
            failed: results.len() - delivered,
        };
        info!(
            shipment_id,
            delivered = report.delivered,
            failed = report.failed,
            "departure sync finished"
        );
        report
    }

    async fn depart_one(&self, shipment_id: i64, application_id: i64) -> bool {
        let _guard = self.locks.lock(application_id).await;
        if let Err(err) = self.shadow_in_transit(application_id).await {
            warn!(
                shipment_id,
                application_id,
                error = %format!("{:#}", err),
                "failed to move application shadow to IN_TRANSIT"
            );
        }
        match self.office.mark_in_transit(application_id).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    shipment_id,
                    application_id,
                    error = %format!("{:#}", err),
                    "status sync failed: office not told application is in transit"
                );
                false
            }
        }
    }

    async fn shadow_in_transit(&self, application_id: i64) -> anyhow::Result<()> {
        let shadow = db::find_or_create_shadow(&self.pool, application_id).await?;
        if shadow.status.can_transition_to(ShadowStatus::InTransit) {
            db::set_shadow_status(
                &self.pool,
                shadow.id,
                shadow.status,
                ShadowStatus::InTransit,
            )
            .await?;
        }
        Ok(())
    }

    /// Operator status change on a shadow, then mirrored to the office.
    /// Only the local transition can fail; the mirror is best-effort.
    #[instrument(skip(self), fields(status = to.as_str()))]
    pub async fn transition(
        &self,
        shadow_id: i64,
        to: ShadowStatus,
    ) -> ServiceResult<ApplicationShadow> {
        let external_id = self.require_shadow(shadow_id).await?.external_application_id;
        let _guard = self.locks.lock(external_id).await;

        let shadow = self.require_shadow(shadow_id).await?;
        if !shadow.status.can_transition_to(to) {
            return Err(ServiceError::conflict(format!(
                "application {} cannot move from {} to {}",
                external_id,
                shadow.status.as_str(),
                to.as_str()
            )));
        }
        if !db::set_shadow_status(&self.pool, shadow_id, shadow.status, to).await? {
            return Err(ServiceError::conflict(format!(
                "application {} changed status concurrently",
                external_id
            )));
        }
        mirror_status(self.office.as_ref(), external_id, to).await;
        self.require_shadow(shadow_id).await
    }

    async fn require_shadow(&self, id: i64) -> ServiceResult<ApplicationShadow> {
        db::get_shadow(&self.pool, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("application {} not found", id)))
    }
}

/// Mirror a shadow status change to the office. Returns whether it got through.
#[instrument(skip_all, fields(application_id = application_id, status = status.as_str()))]
pub async fn mirror_status(
    office: &dyn ApplicationSource,
    application_id: i64,
    status: ShadowStatus,
) -> bool {
    match office.update_status(application_id, status).await {
        Ok(()) => true,
        Err(err) => {
            warn!(
                application_id,
                status = status.as_str(),
                error = %format!("{:#}", err),
                "status sync failed: office status not updated"
            );
            false
        }
    }
}
