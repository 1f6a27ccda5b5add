//! Repository inputs and view models.
//!
//! Keep these structs focused on the data written or returned by queries.
//! Business rules live in `service` and `planner`.

use chrono::{DateTime, Utc};

use crate::capacity::Capacity;
use crate::model::Assignment;

#[derive(Debug, Clone)]
pub struct NewPoint {
    pub title: String,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// One stop of a shipment being created.
#[derive(Debug, Clone, Copy)]
pub struct RouteStop {
    pub point_id: i64,
    pub planned_arrive_at: DateTime<Utc>,
}

/// A validated shipment: `pickup` is ordinal 1, `dropoff` ordinal 2.
#[derive(Debug, Clone, Copy)]
pub struct NewShipment {
    pub capacity: Capacity,
    pub departure_at: DateTime<Utc>,
    pub pickup: RouteStop,
    pub dropoff: RouteStop,
}

/// PLANNED shipment slice the planner works from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenShipment {
    pub id: i64,
    pub capacity: Capacity,
    pub departure_at: DateTime<Utc>,
    pub pickup_point_id: i64,
    pub dropoff_point_id: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct NewAssignment {
    pub shipment_id: i64,
    pub application_external_id: i64,
    pub weight_kg: f64,
    pub volume_m3: f64,
    pub pickup_point_id: Option<i64>,
    pub dropoff_point_id: Option<i64>,
}

/// Result of the capacity-checked insert.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignOutcome {
    Inserted(Assignment),
    OverCapacity,
    AlreadyAssigned,
    ShipmentNotPlanned,
    ShipmentMissing,
}
