use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported horizontal accuracy in meters, when the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.accuracy = Some(meters);
        self
    }

    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        distance_meters(self, other)
    }

    /// Point displaced by the given meters north and east of `self`.
    /// Small-offset approximation; good to well under a meter for a few km.
    pub fn offset_meters(&self, north_m: f64, east_m: f64) -> Coordinate {
        let dlat = (north_m / EARTH_RADIUS_METERS).to_degrees();
        let dlon = (east_m / (EARTH_RADIUS_METERS * self.latitude.to_radians().cos())).to_degrees();
        Coordinate {
            latitude: self.latitude + dlat,
            longitude: self.longitude + dlon,
            accuracy: self.accuracy,
        }
    }
}

/// Great-circle distance in meters. NaN in either input yields NaN.
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}
