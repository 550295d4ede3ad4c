//! Distance computations between geographic coordinates.

use tracing::warn;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);

const VINCENTY_MAX_ITERATIONS: usize = 200;
const VINCENTY_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Great circle on a sphere, fast.
    Haversine,
    /// Ellipsoidal distance on WGS-84.
    Geodesic,
}

impl DistanceMetric {
    pub fn distance(self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        match self {
            DistanceMetric::Haversine => haversine_distance(lat1, lon1, lat2, lon2),
            DistanceMetric::Geodesic => geodesic_distance(lat1, lon1, lat2, lon2),
        }
    }
}

/// Great circle distance in metres.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Ellipsoidal distance in metres, Vincenty's inverse formula.
///
/// Falls back to the haversine distance for nearly antipodal points where the
/// iteration does not converge.
pub fn geodesic_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    if lat1 == lat2 && lon1 == lon2 {
        return 0.0;
    }

    let l = (lon2 - lon1).to_radians();
    let u1 = ((1.0 - WGS84_F) * lat1.to_radians().tan()).atan();
    let u2 = ((1.0 - WGS84_F) * lat2.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    for _ in 0..VINCENTY_MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            return 0.0;
        }
        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // Equatorial line: cos_sq_alpha is zero.
        let cos_2sigma_m = if cos_sq_alpha == 0.0 {
            0.0
        } else {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        };
        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));
        let previous = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))));

        if (lambda - previous).abs() < VINCENTY_TOLERANCE {
            let u_sq = cos_sq_alpha * (WGS84_A.powi(2) - WGS84_B.powi(2)) / WGS84_B.powi(2);
            let big_a =
                1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
            let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
            let delta_sigma = big_b
                * sin_sigma
                * (cos_2sigma_m
                    + big_b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))
                            - big_b / 6.0
                                * cos_2sigma_m
                                * (-3.0 + 4.0 * sin_sigma.powi(2))
                                * (-3.0 + 4.0 * cos_2sigma_m.powi(2))));
            return WGS84_B * big_a * (sigma - delta_sigma);
        }
    }

    warn!(
        lat1,
        lon1, lat2, lon2, "Vincenty iteration did not converge, using haversine distance"
    );
    haversine_distance(lat1, lon1, lat2, lon2)
}

/// Indexes of the coordinates lying within `radius` metres of the centre.
pub fn within_radius<I>(
    coordinates: I,
    centre: (f64, f64),
    radius: f64,
    metric: DistanceMetric,
) -> Vec<usize>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (centre_lat, centre_lon) = centre;
    coordinates
        .into_iter()
        .enumerate()
        .filter(|(_, (lat, lon))| metric.distance(centre_lat, centre_lon, *lat, *lon) <= radius)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_one_degree_of_latitude() {
        let d = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.93).abs() < 1.0, "got {d}");
    }

    #[test]
    fn geodesic_matches_reference_distance() {
        // Flinders Peak to Buninyong, the classic Vincenty test pair.
        let d = geodesic_distance(
            -37.951_033_416_666_67,
            144.424_867_888_888_9,
            -37.652_821_138_888_89,
            143.926_495_527_777_8,
        );
        assert!((d - 54_972.271).abs() < 0.01, "got {d}");
    }

    #[test]
    fn geodesic_of_identical_points_is_zero() {
        assert_eq!(geodesic_distance(45.0, 9.0, 45.0, 9.0), 0.0);
    }

    #[test]
    fn geodesic_one_degree_of_latitude_at_equator() {
        let d = geodesic_distance(0.0, 0.0, 1.0, 0.0);
        assert!((d - 110_574.4).abs() < 1.0, "got {d}");
    }

    #[test]
    fn geodesic_of_nearly_antipodal_points_falls_back_to_haversine() {
        // Vincenty does not converge for this pair.
        let d = geodesic_distance(0.0, 0.0, 0.5, 179.5);
        let great_circle = haversine_distance(0.0, 0.0, 0.5, 179.5);
        assert!(d.is_finite());
        assert!((d - great_circle).abs() / great_circle < 1e-3, "got {d}");
        assert!((d - 19_936_288.0).abs() < 20_000.0, "got {d}");
    }

    #[test]
    fn within_radius_is_inclusive() {
        let points = vec![(0.0, 0.0), (0.001, 0.0), (0.01, 0.0)];
        let edge = haversine_distance(0.0, 0.0, 0.001, 0.0);
        let inside = within_radius(points, (0.0, 0.0), edge, DistanceMetric::Haversine);
        assert_eq!(inside, vec![0, 1]);
    }
}
