//! Spherical-earth geometry.

/// Mean earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl GeoPoint {
    /// Create a point.
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Whether both coordinates are finite and in range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Calculate the distance between two points using the haversine formula.
/// Returns the distance in meters.
pub fn haversine_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1_rad = a.lat.to_radians();
    let lat2_rad = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());

    EARTH_RADIUS_M * c
}

/// Point at `fraction` (0..=1) of the way along the great circle from `a` to `b`.
pub fn intermediate_point(a: GeoPoint, b: GeoPoint, fraction: f64) -> GeoPoint {
    let delta = haversine_distance(a, b) / EARTH_RADIUS_M;
    let sin_delta = delta.sin();
    if sin_delta.abs() < 1e-15 {
        return a;
    }

    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());

    let wa = ((1.0 - fraction) * delta).sin() / sin_delta;
    let wb = (fraction * delta).sin() / sin_delta;

    let x = wa * lat1.cos() * lon1.cos() + wb * lat2.cos() * lon2.cos();
    let y = wa * lat1.cos() * lon1.sin() + wb * lat2.cos() * lon2.sin();
    let z = wa * lat1.sin() + wb * lat2.sin();

    GeoPoint {
        lat: z.atan2((x * x + y * y).sqrt()).to_degrees(),
        lon: y.atan2(x).to_degrees(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude on the 6371 km sphere.
        let d = haversine_distance(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
        assert_abs_diff_eq!(d, 111_194.93, epsilon = 0.01);
    }

    #[test]
    fn test_haversine_symmetric_and_zero() {
        let seattle = GeoPoint::new(47.6062, -122.3321);
        let tacoma = GeoPoint::new(47.2529, -122.4443);
        assert_eq!(haversine_distance(seattle, seattle), 0.0);
        assert_abs_diff_eq!(
            haversine_distance(seattle, tacoma),
            haversine_distance(tacoma, seattle),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_intermediate_point_endpoints_and_midpoint() {
        let a = GeoPoint::new(10.0, 20.0);
        let b = GeoPoint::new(11.0, 22.0);

        let start = intermediate_point(a, b, 0.0);
        let end = intermediate_point(a, b, 1.0);
        assert_abs_diff_eq!(start.lat, a.lat, epsilon = 1e-9);
        assert_abs_diff_eq!(start.lon, a.lon, epsilon = 1e-9);
        assert_abs_diff_eq!(end.lat, b.lat, epsilon = 1e-9);
        assert_abs_diff_eq!(end.lon, b.lon, epsilon = 1e-9);

        let mid = intermediate_point(a, b, 0.5);
        let total = haversine_distance(a, b);
        assert_abs_diff_eq!(haversine_distance(a, mid), total / 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(haversine_distance(mid, b), total / 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_intermediate_point_coincident() {
        let a = GeoPoint::new(45.0, -120.0);
        assert_eq!(intermediate_point(a, a, 0.3), a);
    }

    #[test]
    fn test_validity() {
        assert!(GeoPoint::new(90.0, -180.0).is_valid());
        assert!(!GeoPoint::new(90.1, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::NAN).is_valid());
    }
}
