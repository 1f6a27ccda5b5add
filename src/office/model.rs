use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capacity::Candidate;

/// One unassigned application as returned by the office, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateApplication {
    pub id: i64,
    pub total_weight: f64,
    pub total_volume: f64,
    #[serde(default)]
    pub pickup_point_id: Option<i64>,
    #[serde(default)]
    pub dropoff_point_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&CandidateApplication> for Candidate {
    fn from(app: &CandidateApplication) -> Self {
        Candidate {
            application_id: app.id,
            weight_kg: app.total_weight,
            volume_m3: app.total_volume,
        }
    }
}

/// Authoritative status as reported by the office, in the office's vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationStatusEntry {
    pub id: i64,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusUpdateBody<'a> {
    pub status: &'a str,
}
