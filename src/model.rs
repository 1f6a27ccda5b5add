use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Planned,
    Departed,
    Delivered,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Planned => "PLANNED",
            ShipmentStatus::Departed => "DEPARTED",
            ShipmentStatus::Delivered => "DELIVERED",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "PLANNED" => Some(ShipmentStatus::Planned),
            "DEPARTED" => Some(ShipmentStatus::Departed),
            "DELIVERED" => Some(ShipmentStatus::Delivered),
            _ => None,
        }
    }

    /// The only legal successor of this status, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            ShipmentStatus::Planned => Some(ShipmentStatus::Departed),
            ShipmentStatus::Departed => Some(ShipmentStatus::Delivered),
            ShipmentStatus::Delivered => None,
        }
    }
}

/// Logistic-side shadow of an office application's lifecycle. Never authoritative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShadowStatus {
    New,
    InProgress,
    InTransit,
    Delivered,
    Cancelled,
}

impl ShadowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShadowStatus::New => "NEW",
            ShadowStatus::InProgress => "IN_PROGRESS",
            ShadowStatus::InTransit => "IN_TRANSIT",
            ShadowStatus::Delivered => "DELIVERED",
            ShadowStatus::Cancelled => "CANCELLED",
        }
    }

    /// Accepts the office's aliases (`IN_WORK`, `SHIPPED`) as well.
    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(ShadowStatus::New),
            "IN_PROGRESS" | "IN_WORK" => Some(ShadowStatus::InProgress),
            "IN_TRANSIT" | "SHIPPED" => Some(ShadowStatus::InTransit),
            "DELIVERED" => Some(ShadowStatus::Delivered),
            "CANCELLED" => Some(ShadowStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ShadowStatus::Delivered | ShadowStatus::Cancelled)
    }

    fn rank(&self) -> u8 {
        match self {
            ShadowStatus::New => 0,
            ShadowStatus::InProgress => 1,
            ShadowStatus::InTransit => 2,
            ShadowStatus::Delivered => 3,
            ShadowStatus::Cancelled => 4,
        }
    }

    /// Forward-only along NEW -> IN_PROGRESS -> IN_TRANSIT -> DELIVERED;
    /// CANCELLED from any non-terminal status.
    pub fn can_transition_to(&self, to: ShadowStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            ShadowStatus::Cancelled => true,
            _ => to.rank() > self.rank(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticPoint {
    pub id: i64,
    pub title: String,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl LogisticPoint {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Coordinates { lat, lon }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shipment {
    pub id: i64,
    pub max_weight_kg: f64,
    pub max_volume_m3: f64,
    pub departure_at: DateTime<Utc>,
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutePoint {
    pub id: i64,
    pub shipment_id: i64,
    pub point_id: i64,
    pub ordinal: i64,
    pub planned_arrive_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub id: i64,
    pub shipment_id: i64,
    pub application_external_id: i64,
    pub weight_kg: f64,
    pub volume_m3: f64,
    pub pickup_point_id: Option<i64>,
    pub dropoff_point_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationShadow {
    pub id: i64,
    pub external_application_id: i64,
    pub status: ShadowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipment_status_is_one_directional() {
        assert_eq!(ShipmentStatus::Planned.next(), Some(ShipmentStatus::Departed));
        assert_eq!(ShipmentStatus::Departed.next(), Some(ShipmentStatus::Delivered));
        assert_eq!(ShipmentStatus::Delivered.next(), None);
    }

    #[test]
    fn shadow_status_moves_forward_only() {
        assert!(ShadowStatus::New.can_transition_to(ShadowStatus::InProgress));
        assert!(ShadowStatus::New.can_transition_to(ShadowStatus::InTransit));
        assert!(ShadowStatus::InTransit.can_transition_to(ShadowStatus::Delivered));
        assert!(!ShadowStatus::InTransit.can_transition_to(ShadowStatus::New));
        assert!(!ShadowStatus::InProgress.can_transition_to(ShadowStatus::InProgress));
        assert!(ShadowStatus::InProgress.can_transition_to(ShadowStatus::Cancelled));
        assert!(!ShadowStatus::Delivered.can_transition_to(ShadowStatus::Cancelled));
        assert!(!ShadowStatus::Cancelled.can_transition_to(ShadowStatus::Delivered));
    }

    #[test]
    fn shadow_status_accepts_office_aliases() {
        assert_eq!(ShadowStatus::parse_status("IN_WORK"), Some(ShadowStatus::InProgress));
        assert_eq!(ShadowStatus::parse_status("SHIPPED"), Some(ShadowStatus::InTransit));
        assert_eq!(ShadowStatus::parse_status("bogus"), None);
    }
}
