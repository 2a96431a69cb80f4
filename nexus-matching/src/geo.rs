//! Great-circle distance and distance decay

use nexus_core::Location;

/// Mean Earth radius in meters (spherical approximation)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Distance (km) at which the decay score falls to 1/e
pub const DECAY_SCALE_KM: f64 = 10.0;

/// Haversine distance between two locations, in meters
pub fn distance_meters(a: &Location, b: &Location) -> f64 {
    haversine_meters(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Haversine distance between two coordinate pairs (degrees), in meters
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // rounding can push `a` just past 1.0 for antipodal pairs
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Proximity preference: `exp(-km / 10)`
///
/// 1.0 at 0 km, ~0.37 at 10 km, ~0.14 at 20 km. There is no hard cutoff;
/// the effective radius comes from the acceptance threshold.
pub fn decay_score(distance_m: f64) -> f64 {
    let distance_km = distance_m / 1000.0;
    (-distance_km / DECAY_SCALE_KM).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lat: f64, lon: f64) -> Location {
        Location::new(lat, lon)
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = loc(40.7128, -74.0060);
        assert_eq!(distance_meters(&p, &p), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let pairs = [
            (loc(40.7128, -74.0060), loc(34.0522, -118.2437)),
            (loc(51.5074, -0.1278), loc(48.8566, 2.3522)),
            (loc(-33.8688, 151.2093), loc(35.6762, 139.6503)),
            (loc(0.0, 179.9), loc(0.0, -179.9)),
        ];
        for (a, b) in &pairs {
            let ab = distance_meters(a, b);
            let ba = distance_meters(b, a);
            assert!((ab - ba).abs() < 1e-6, "{} vs {}", ab, ba);
        }
    }

    #[test]
    fn test_known_distance() {
        // London -> Paris is roughly 343.5 km on a sphere
        let d = distance_meters(&loc(51.5074, -0.1278), &loc(48.8566, 2.3522));
        assert!((d / 1000.0 - 343.5).abs() < 2.0, "got {} km", d / 1000.0);
    }

    #[test]
    fn test_antimeridian_is_short() {
        let d = distance_meters(&loc(0.0, 179.9), &loc(0.0, -179.9));
        assert!(d < 25_000.0, "got {} m", d);
    }

    #[test]
    fn test_antipodal_distance_is_finite() {
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_M;
        let pairs = [
            (loc(14.7, 0.0), loc(-14.7, 180.0)),
            (loc(0.0, 0.0), loc(0.0, 180.0)),
            (loc(90.0, 0.0), loc(-90.0, 0.0)),
            (loc(52.52, 13.405), loc(-52.52, -166.595)),
        ];
        for (a, b) in &pairs {
            let d = distance_meters(a, b);
            assert!(d.is_finite(), "{:?} -> {:?} gave {}", a, b, d);
            assert!((d - half_circumference).abs() < 1.0, "got {} m", d);
            assert!((d - distance_meters(b, a)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_triangle_inequality() {
        let a = loc(52.52, 13.405);
        let b = loc(50.1109, 8.6821);
        let c = loc(48.1351, 11.582);
        let ab = distance_meters(&a, &b);
        let bc = distance_meters(&b, &c);
        let ac = distance_meters(&a, &c);
        assert!(ac <= ab + bc + 1e-6);
    }

    #[test]
    fn test_decay_reference_points() {
        assert_eq!(decay_score(0.0), 1.0);
        assert!((decay_score(10_000.0) - 0.3679).abs() < 1e-4);
        assert!((decay_score(20_000.0) - 0.1353).abs() < 1e-4);
        assert!((decay_score(2_000.0) - 0.8187).abs() < 1e-4);
    }

    #[test]
    fn test_decay_strictly_decreasing() {
        let mut previous = decay_score(0.0);
        for step in 1..200 {
            let current = decay_score(step as f64 * 250.0);
            assert!(current < previous);
            previous = current;
        }
    }
}
