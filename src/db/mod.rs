//! Database module: entity models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: input records and view models used by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! Callers import from `logistic_planner::db`; the repository API and the
//! view models are re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{AssignOutcome, NewAssignment, NewPoint, NewShipment, OpenShipment, RouteStop};
