const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two WGS84 points, in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn distance_between(from: (f64, f64), to: (f64, f64)) -> f64 {
    haversine_km(from.0, from.1, to.0, to.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_for_identical_points() {
        assert_eq!(haversine_km(1.3, 103.8, 1.3, 103.8), 0.0);
    }

    #[test]
    fn one_tenth_degree_of_latitude() {
        let distance = haversine_km(0.0, 0.0, 0.1, 0.0);
        assert!((distance - 11.119).abs() < 0.01, "got {distance}");
    }

    #[test]
    fn symmetric() {
        let a = (1.2931, 103.8520);
        let b = (1.3521, 103.9448);
        assert!((distance_between(a, b) - distance_between(b, a)).abs() < 1e-9);
    }
}
