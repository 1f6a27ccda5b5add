pub mod api;
pub mod capacity;
pub mod config;
pub mod db;
pub mod error;
pub mod eta;
pub mod locks;
pub mod model;
pub mod office;
pub mod planner;
pub mod service;
pub mod sync;
