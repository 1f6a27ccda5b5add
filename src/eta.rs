//! Planned arrival at the dropoff point.

use chrono::{DateTime, Duration, Utc};

use crate::model::Coordinates;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const AVERAGE_SPEED_KMH: f64 = 60.0;
pub const FALLBACK_TRAVEL_HOURS: i64 = 2;

/// Great-circle distance on a spherical earth.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Departure plus driving time at a constant 60 km/h, or plus two hours when
/// either point has no coordinates.
pub fn estimate_arrival(
    departure: DateTime<Utc>,
    from: Option<Coordinates>,
    to: Option<Coordinates>,
) -> DateTime<Utc> {
    match (from, to) {
        (Some(a), Some(b)) => {
            let hours = haversine_km(a, b) / AVERAGE_SPEED_KMH;
            let millis = (hours * 3_600_000.0).round() as i64;
            departure + Duration::milliseconds(millis)
        }
        _ => departure + Duration::hours(FALLBACK_TRAVEL_HOURS),
    }
}
