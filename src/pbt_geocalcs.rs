// Geodesic calculations for the Perth Bus Times client
//
// Distances use a spherical law-of-cosines angle scaled by a latitude-dependent
// radius derived from an oblate spheroid (equatorial 6378 km, polar 6357 km).
// Latitudes and longitudes are in degrees, N/E positive, S/W negative.

use crate::pbt_models::Location;
use std::f64::consts::PI;

pub struct GeoCalcs;

impl GeoCalcs {
    /// Equatorial radius in kilometres
    pub const EQUATORIAL_RADIUS_KM: f64 = 6378.0;
    /// Polar radius in kilometres
    pub const POLAR_RADIUS_KM: f64 = 6357.0;

    /// Below this cos(latitude) the origin is treated as a pole.
    const POLE_EPSILON: f64 = 0.000001;

    pub const COMPASS_LABELS: [&'static str; 16] = [
        "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE",
        "S", "SSW", "SW", "WSW", "W", "WNW", "NW", "NNW",
    ];

    /// Label returned when a bearing cannot be bucketed (NaN, negative, ...)
    pub const UNKNOWN_COMPASS: &'static str = "-";

    /// Squared eccentricity of the spheroid, e² = 1 - (pr/er)².
    ///
    /// Computed as the square of the eccentricity so the value matches the
    /// reference constants bit for bit.
    pub fn eccentricity_squared() -> f64 {
        let e = (1.0
            - (Self::POLAR_RADIUS_KM * Self::POLAR_RADIUS_KM)
                / (Self::EQUATORIAL_RADIUS_KM * Self::EQUATORIAL_RADIUS_KM))
            .sqrt();
        e * e
    }

    /// Convert a location to (lat, lng) in radians
    pub fn to_radians(loc: &Location) -> (f64, f64) {
        (PI * loc.lat / 180.0, PI * loc.lng / 180.0)
    }

    /// Angle subtended at the centre of a sphere between two locations, in radians.
    pub fn great_circle_angle(loc1: &Location, loc2: &Location) -> f64 {
        // cos² + sin² does not always round to exactly 1
        if loc1 == loc2 {
            return 0.0;
        }

        let (lat1, lng1) = Self::to_radians(loc1);
        let (lat2, lng2) = Self::to_radians(loc2);

        let t = lat1.cos() * lat2.cos() * (lng2 - lng1).cos() + lat1.sin() * lat2.sin();

        // Rounding can push t just outside acos's domain for identical or antipodal points
        t.clamp(-1.0, 1.0).acos()
    }

    /// Surface distance between two locations on the Earth, in kilometres.
    ///
    /// The effective radius is corrected for the spheroid at the mean latitude
    /// of the two points.
    pub fn surface_distance(loc1: &Location, loc2: &Location) -> f64 {
        let (lat1, _) = Self::to_radians(loc1);
        let (lat2, _) = Self::to_radians(loc2);
        let e2 = Self::eccentricity_squared();

        let s = ((lat1 + lat2) / 2.0).sin();
        let radius = Self::EQUATORIAL_RADIUS_KM * (1.0 - e2).sqrt() / (1.0 - e2 * s * s);

        Self::great_circle_angle(loc1, loc2) * radius
    }

    /// Initial bearing from `loc1` towards `loc2`, degrees clockwise from north in [0, 360).
    pub fn initial_bearing(loc1: &Location, loc2: &Location) -> f64 {
        let (lat1, lng1) = Self::to_radians(loc1);
        let (lat2, lng2) = Self::to_radians(loc2);

        let c = if lat1.cos() < Self::POLE_EPSILON {
            if lat1 > 0.0 {
                PI // every direction from the north pole is south
            } else {
                0.0
            }
        } else {
            let d = Self::great_circle_angle(loc1, loc2);
            let ratio = (lat2.sin() - lat1.sin() * d.cos()) / (d.sin() * lat1.cos());

            // 0/0 when both points coincide; report due north
            let ratio = if ratio.is_nan() { 1.0 } else { ratio.clamp(-1.0, 1.0) };

            let c = ratio.acos();
            if (lng2 - lng1).sin() < 0.0 {
                PI * 2.0 - c
            } else {
                c
            }
        };

        (c * 180.0 / PI).rem_euclid(360.0)
    }

    /// 16-point compass label for a bearing in degrees, e.g. 315.0 -> "NW".
    pub fn compass_label(bearing: f64) -> &'static str {
        let mut c = bearing + 11.25;
        if c >= 360.0 {
            c -= 360.0;
        }

        let bucket = (c / 22.5).floor();
        if bucket >= 0.0 && bucket < Self::COMPASS_LABELS.len() as f64 {
            Self::COMPASS_LABELS[bucket as usize]
        } else {
            Self::UNKNOWN_COMPASS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{HaversineDistance, Point};

    const PERTH_CBD: Location = Location { lat: -31.9505, lng: 115.8605 };

    fn loc(lat: f64, lng: f64) -> Location {
        Location { lat, lng }
    }

    #[test]
    fn test_spheroid_constants() {
        assert_relative_eq!(GeoCalcs::eccentricity_squared(), 0.006574295401024277, epsilon = 1e-15);
        // er * sqrt(1 - e²) collapses back to the polar radius
        let polar = GeoCalcs::EQUATORIAL_RADIUS_KM * (1.0 - GeoCalcs::eccentricity_squared()).sqrt();
        assert_relative_eq!(polar, GeoCalcs::POLAR_RADIUS_KM, epsilon = 1e-9);
    }

    #[test]
    fn test_identical_points() {
        assert_eq!(GeoCalcs::surface_distance(&PERTH_CBD, &PERTH_CBD), 0.0);
        let bearing = GeoCalcs::initial_bearing(&PERTH_CBD, &PERTH_CBD);
        assert!(!bearing.is_nan());
        assert!((0.0..360.0).contains(&bearing));
    }

    #[test]
    fn test_distance_symmetry() {
        let pairs = [
            (PERTH_CBD, loc(-32.0569, 115.7439)),
            (loc(51.5, 0.0), loc(48.85, 2.35)),
            (loc(0.0, 179.9), loc(0.0, -179.9)),
            (loc(89.9, 10.0), loc(-89.9, -170.0)),
        ];
        for (a, b) in pairs {
            assert_eq!(GeoCalcs::surface_distance(&a, &b), GeoCalcs::surface_distance(&b, &a));
        }
    }

    #[test]
    fn test_one_degree_at_equator() {
        // Equatorial radius correction reduces to the polar radius: 6357 * pi / 180
        let d = GeoCalcs::surface_distance(&loc(0.0, 0.0), &loc(0.0, 1.0));
        assert_relative_eq!(d, 110.95058054926845, epsilon = 1e-4);
    }

    #[test]
    fn test_close_to_haversine() {
        let fremantle = loc(-32.0569, 115.7439);
        let ours = GeoCalcs::surface_distance(&PERTH_CBD, &fremantle) * 1000.0;
        let haversine = Point::new(PERTH_CBD.lng, PERTH_CBD.lat)
            .haversine_distance(&Point::new(fremantle.lng, fremantle.lat));
        assert!((ours - haversine).abs() / haversine < 0.01);
        assert_relative_eq!(ours, 16_145.5, epsilon = 2.0);
    }

    #[test]
    fn test_cardinal_bearings() {
        let origin = loc(0.0, 0.0);
        assert_relative_eq!(GeoCalcs::initial_bearing(&origin, &loc(1.0, 0.0)), 0.0, epsilon = 1e-4);
        assert_relative_eq!(GeoCalcs::initial_bearing(&origin, &loc(0.0, 1.0)), 90.0, epsilon = 1e-4);
        assert_relative_eq!(GeoCalcs::initial_bearing(&origin, &loc(-1.0, 0.0)), 180.0, epsilon = 1e-4);
        assert_relative_eq!(GeoCalcs::initial_bearing(&origin, &loc(0.0, -1.0)), 270.0, epsilon = 1e-4);
    }

    #[test]
    fn test_pole_bearings() {
        assert_eq!(GeoCalcs::initial_bearing(&loc(90.0, 0.0), &loc(10.0, 20.0)), 180.0);
        assert_eq!(GeoCalcs::initial_bearing(&loc(-90.0, 0.0), &loc(10.0, 20.0)), 0.0);
    }

    #[test]
    fn test_compass_wrap() {
        assert_eq!(GeoCalcs::compass_label(348.75), "N");
        assert_eq!(GeoCalcs::compass_label(11.24), "N");
        assert_eq!(GeoCalcs::compass_label(0.1), "N");
        assert_eq!(GeoCalcs::compass_label(359.9), "N");
        assert_eq!(GeoCalcs::compass_label(348.74), "NNW");
        assert_eq!(GeoCalcs::compass_label(11.25), "NNE");
    }

    #[test]
    fn test_compass_points() {
        for (i, label) in GeoCalcs::COMPASS_LABELS.iter().enumerate() {
            assert_eq!(GeoCalcs::compass_label(i as f64 * 22.5), *label);
        }
    }

    #[test]
    fn test_compass_covers_full_circle() {
        let mut bearing = 0.0;
        while bearing < 360.0 {
            let label = GeoCalcs::compass_label(bearing);
            assert!(GeoCalcs::COMPASS_LABELS.contains(&label), "{} -> {}", bearing, label);
            bearing += 0.37;
        }
    }

    #[test]
    fn test_compass_fallback() {
        assert_eq!(GeoCalcs::compass_label(f64::NAN), "-");
        assert_eq!(GeoCalcs::compass_label(-30.0), "-");
        assert_eq!(GeoCalcs::compass_label(720.0), "-");
    }

    #[test]
    fn test_worked_examples() {
        let east = loc(-31.9505, 115.8658);
        let metres = (GeoCalcs::surface_distance(&PERTH_CBD, &east) * 1000.0).floor();
        assert_eq!(metres, 499.0);
        assert_eq!(GeoCalcs::compass_label(GeoCalcs::initial_bearing(&PERTH_CBD, &east)), "E");

        let north_west = loc(-31.9358, 115.8432);
        let metres = (GeoCalcs::surface_distance(&PERTH_CBD, &north_west) * 1000.0).floor();
        assert_eq!(metres, 2309.0);
        assert_eq!(GeoCalcs::compass_label(GeoCalcs::initial_bearing(&PERTH_CBD, &north_west)), "NW");
    }
}
