//! Great-circle distance helpers.

/// Mean Earth radius used by [`haversine_km`].
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres between two WGS84 points.
///
/// # Example
///
/// ```
/// use region_data::haversine_km;
///
/// let jakarta_to_bandung = haversine_km(-6.2088, 106.8456, -6.9175, 107.6191);
/// assert!((115.0..125.0).contains(&jakarta_to_bandung));
/// ```
#[must_use]
#[expect(
    clippy::float_arithmetic,
    reason = "haversine distance is inherently floating point"
)]
pub fn haversine_km(lat_a: f64, lng_a: f64, lat_b: f64, lng_b: f64) -> f64 {
    let d_lat = (lat_b - lat_a).to_radians();
    let d_lng = (lng_b - lng_a).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.to_radians().cos() * lat_b.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn identical_points_are_zero_apart() {
        assert!(haversine_km(-6.2, 106.8, -6.2, 106.8).abs() < f64::EPSILON);
    }

    #[rstest]
    fn distance_is_symmetric() {
        let forward = haversine_km(-6.2088, 106.8456, -7.2575, 112.7521);
        let backward = haversine_km(-7.2575, 112.7521, -6.2088, 106.8456);
        assert!((forward - backward).abs() < 1e-9);
    }

    #[rstest]
    #[case(0.0, 0.0, 0.0, 1.0, 111.19)]
    #[case(0.0, 0.0, 1.0, 0.0, 111.19)]
    fn one_degree_on_the_equator(
        #[case] lat_a: f64,
        #[case] lng_a: f64,
        #[case] lat_b: f64,
        #[case] lng_b: f64,
        #[case] expected: f64,
    ) {
        assert!((haversine_km(lat_a, lng_a, lat_b, lng_b) - expected).abs() < 0.01);
    }
}
