//! Geographic coordinates and distance helpers
//!
//! Offsets are converted between metres and degrees with the usual small-distance
//! approximation: a fixed number of metres per degree of latitude, and the same
//! scaled by `cos(latitude)` for longitude. The scale is floored at
//! [`MIN_LONGITUDE_SCALE`] so that offsets near the poles stay bounded, and shifted
//! coordinates are brought back into the valid degree ranges.
//!
//! ```rust
//! use heatscape_core::geo::GeoCoordinate;
//!
//! let manila = GeoCoordinate::new(120.9842, 14.5995);
//! let nearby = manila.offset_by_meters(500.0, 0.0);
//! assert!((manila.distance_meters(&nearby) - 500.0).abs() < 1.0);
//! ```

use crate::FloatValue;
use serde::{Deserialize, Serialize};

/// Metres spanned by one degree of latitude
pub const METERS_PER_DEGREE_LATITUDE: FloatValue = 111_320.0;

/// Mean Earth radius in metres, consistent with [`METERS_PER_DEGREE_LATITUDE`]
pub const EARTH_RADIUS_METERS: FloatValue =
    METERS_PER_DEGREE_LATITUDE * 180.0 / std::f64::consts::PI;

/// Smallest `cos(latitude)` used for longitude conversions, reached at 89°
pub const MIN_LONGITUDE_SCALE: FloatValue = 0.017_452_406_437_283_5;

/// A point on the map in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub lon: FloatValue,
    pub lat: FloatValue,
}

impl GeoCoordinate {
    pub fn new(lon: FloatValue, lat: FloatValue) -> Self {
        Self { lon, lat }
    }

    /// Whether both components are finite and within the valid degree ranges
    pub fn is_valid(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }

    /// Degrees of longitude spanned by `meters` at this latitude
    pub fn meters_to_lon_degrees(&self, meters: FloatValue) -> FloatValue {
        let scale = self.lat.to_radians().cos().max(MIN_LONGITUDE_SCALE);
        meters / (METERS_PER_DEGREE_LATITUDE * scale)
    }

    /// Shift this coordinate by metric offsets towards the east and north
    ///
    /// Latitude is clamped to the poles and longitude wrapped into `[-180, 180)`.
    pub fn offset_by_meters(&self, east: FloatValue, north: FloatValue) -> Self {
        Self {
            lon: wrap_longitude(self.lon + self.meters_to_lon_degrees(east)),
            lat: (self.lat + meters_to_lat_degrees(north)).clamp(-90.0, 90.0),
        }
    }

    /// Great-circle distance to `other` using the haversine formula
    pub fn distance_meters(&self, other: &GeoCoordinate) -> FloatValue {
        let phi_1 = self.lat.to_radians();
        let phi_2 = other.lat.to_radians();
        let d_phi = (other.lat - self.lat).to_radians();
        let d_lambda = (other.lon - self.lon).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi_1.cos() * phi_2.cos() * (d_lambda / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }
}

/// Degrees of latitude spanned by `meters`
pub fn meters_to_lat_degrees(meters: FloatValue) -> FloatValue {
    meters / METERS_PER_DEGREE_LATITUDE
}

/// Wrap a longitude into `[-180, 180)`
pub fn wrap_longitude(lon: FloatValue) -> FloatValue {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_one_degree_latitude() {
        let origin = GeoCoordinate::new(0.0, 0.0);
        let north = origin.offset_by_meters(0.0, METERS_PER_DEGREE_LATITUDE);
        assert_relative_eq!(north.lat, 1.0);
        assert_relative_eq!(
            origin.distance_meters(&north),
            METERS_PER_DEGREE_LATITUDE,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_longitude_correction() {
        let high = GeoCoordinate::new(10.0, 60.0);
        // cos(60°) = 0.5 so a metre spans twice the longitude it does at the equator
        assert_relative_eq!(
            high.meters_to_lon_degrees(1000.0),
            2.0 * GeoCoordinate::new(10.0, 0.0).meters_to_lon_degrees(1000.0),
            epsilon = 1e-12
        );
        let east = high.offset_by_meters(1000.0, 0.0);
        assert_relative_eq!(high.distance_meters(&east), 1000.0, epsilon = 0.01);
    }

    #[test]
    fn test_offsets_near_poles_and_dateline() {
        let pole = GeoCoordinate::new(-62.3, 89.95);
        assert_relative_eq!(
            pole.meters_to_lon_degrees(1000.0),
            1000.0 / (METERS_PER_DEGREE_LATITUDE * MIN_LONGITUDE_SCALE)
        );
        let past_pole = pole.offset_by_meters(20_000.0, 20_000.0);
        assert!(past_pole.is_valid(), "{:?}", past_pole);
        assert_eq!(past_pole.lat, 90.0);

        let south = GeoCoordinate::new(10.0, -89.99).offset_by_meters(0.0, -5_000.0);
        assert_eq!(south.lat, -90.0);

        let dateline = GeoCoordinate::new(179.99, 0.0);
        let across = dateline.offset_by_meters(20_000.0, 0.0);
        assert!(across.is_valid(), "{:?}", across);
        assert!(across.lon < 0.0);
        assert_relative_eq!(dateline.distance_meters(&across), 20_000.0, epsilon = 0.01);
    }

    #[test]
    fn test_wrap_longitude() {
        assert_relative_eq!(wrap_longitude(190.0), -170.0);
        assert_relative_eq!(wrap_longitude(-190.0), 170.0);
        assert_relative_eq!(wrap_longitude(45.0), 45.0);
        assert_relative_eq!(wrap_longitude(180.0), -180.0);
    }

    #[test]
    fn test_validity() {
        assert!(GeoCoordinate::new(120.98, 14.6).is_valid());
        assert!(!GeoCoordinate::new(181.0, 0.0).is_valid());
        assert!(!GeoCoordinate::new(0.0, f64::NAN).is_valid());
    }
}
