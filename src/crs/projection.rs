//! Pure-Rust map projections (Snyder 1987, USGS Prof. Paper 1395).
//!
//! Every projection converts to and from geographic longitude/latitude in
//! degrees; a [`Transformer`] chains an inverse and a forward step.

use super::{Crs, Datum, Projection};
use crate::error::ProjectionError;
use geo::Coord;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

// ── Ellipsoids ───────────────────────────────────────────────────────────

/// Reference ellipsoid given by semi-major axis (m) and flattening.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    pub a: f64,
    pub f: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        a: 6_378_137.0,
        f: 1.0 / 298.257_223_563,
    };

    pub const GRS80: Ellipsoid = Ellipsoid {
        a: 6_378_137.0,
        f: 1.0 / 298.257_222_101,
    };

    /// Build from a WKT `SPHEROID[name, a, inverse_flattening]` pair.
    /// An inverse flattening of zero denotes a sphere.
    pub fn from_inverse_flattening(a: f64, inv_f: f64) -> Self {
        let f = if inv_f == 0.0 { 0.0 } else { 1.0 / inv_f };
        Self { a, f }
    }

    /// First eccentricity squared.
    pub fn e2(&self) -> f64 {
        2.0 * self.f - self.f * self.f
    }

    pub fn e(&self) -> f64 {
        self.e2().sqrt()
    }
}

// ── Albers equal-area conic (Snyder §14) ────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Albers {
    a: f64,
    e: f64,
    e2: f64,
    n: f64,
    c: f64,
    rho0: f64,
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
}

impl Albers {
    fn new(
        ellipsoid: Ellipsoid,
        lat_1: f64,
        lat_2: f64,
        lat_0: f64,
        lon_0: f64,
        false_easting: f64,
        false_northing: f64,
    ) -> Result<Self, ProjectionError> {
        let e2 = ellipsoid.e2();
        let e = ellipsoid.e();
        let (phi1, phi2, phi0) = (lat_1.to_radians(), lat_2.to_radians(), lat_0.to_radians());

        let m1 = m_factor(phi1, e2);
        let m2 = m_factor(phi2, e2);
        let q0 = q_factor(phi0.sin(), e, e2);
        let q1 = q_factor(phi1.sin(), e, e2);
        let q2 = q_factor(phi2.sin(), e, e2);

        let n = if (phi1 - phi2).abs() > 1e-10 {
            (m1 * m1 - m2 * m2) / (q2 - q1)
        } else {
            phi1.sin()
        };
        if n.abs() < 1e-10 {
            return Err(ProjectionError::Unsupported(format!(
                "Albers with standard parallels {lat_1} and {lat_2} is degenerate"
            )));
        }

        let c = m1 * m1 + n * q1;
        let rho0 = ellipsoid.a * (c - n * q0).sqrt() / n;

        Ok(Self {
            a: ellipsoid.a,
            e,
            e2,
            n,
            c,
            rho0,
            lon0: lon_0.to_radians(),
            false_easting,
            false_northing,
        })
    }

    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let q = q_factor(lat.to_radians().sin(), self.e, self.e2);
        let rho = self.a * (self.c - self.n * q).sqrt() / self.n;
        let theta = self.n * normalize_lon(lon.to_radians() - self.lon0);

        (
            self.false_easting + rho * theta.sin(),
            self.false_northing + self.rho0 - rho * theta.cos(),
        )
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let mut x = x - self.false_easting;
        let mut y = y - self.false_northing;
        let mut rho0 = self.rho0;
        if self.n < 0.0 {
            x = -x;
            y = -y;
            rho0 = -rho0;
        }

        let rho = (x * x + (rho0 - y) * (rho0 - y)).sqrt() * self.n.signum();
        let theta = x.atan2(rho0 - y);
        let q = (self.c - (rho * self.n / self.a).powi(2)) / self.n;

        let lat = self.latitude_from_q(q);
        let lon = self.lon0 + theta / self.n;
        (normalize_lon(lon).to_degrees(), lat.to_degrees())
    }

    /// Iterative inverse of `q_factor` (Snyder eq. 3-16).
    fn latitude_from_q(&self, q: f64) -> f64 {
        let pole = 1.0 - (1.0 - self.e2) / (2.0 * self.e) * ((1.0 - self.e) / (1.0 + self.e)).ln();
        if (q.abs() - pole.abs()).abs() < 1e-12 {
            return FRAC_PI_2.copysign(q);
        }

        let mut phi = (q / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..25 {
            let sin_phi = phi.sin();
            let one_minus = 1.0 - self.e2 * sin_phi * sin_phi;
            let delta = one_minus * one_minus / (2.0 * phi.cos())
                * (q / (1.0 - self.e2) - sin_phi / one_minus
                    + 1.0 / (2.0 * self.e)
                        * ((1.0 - self.e * sin_phi) / (1.0 + self.e * sin_phi)).ln());
            phi += delta;
            if delta.abs() < 1e-14 {
                break;
            }
        }
        phi
    }
}

/// Snyder eq. 14-15.
fn m_factor(phi: f64, e2: f64) -> f64 {
    let sin_phi = phi.sin();
    phi.cos() / (1.0 - e2 * sin_phi * sin_phi).sqrt()
}

/// Snyder eq. 3-12. Falls back to the spherical form when `e` is zero.
fn q_factor(sin_phi: f64, e: f64, e2: f64) -> f64 {
    if e < 1e-12 {
        return 2.0 * sin_phi;
    }
    (1.0 - e2)
        * (sin_phi / (1.0 - e2 * sin_phi * sin_phi)
            - 1.0 / (2.0 * e) * ((1.0 - e * sin_phi) / (1.0 + e * sin_phi)).ln())
}

// ── Transverse Mercator (Snyder §8) ─────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct TransverseMercator {
    a: f64,
    e2: f64,
    ep2: f64,
    k0: f64,
    lon0: f64,
    m0: f64,
    false_easting: f64,
    false_northing: f64,
}

impl TransverseMercator {
    fn new(
        ellipsoid: Ellipsoid,
        lat_0: f64,
        lon_0: f64,
        scale: f64,
        false_easting: f64,
        false_northing: f64,
    ) -> Self {
        let e2 = ellipsoid.e2();
        Self {
            a: ellipsoid.a,
            e2,
            ep2: e2 / (1.0 - e2),
            k0: scale,
            lon0: lon_0.to_radians(),
            m0: meridional_arc(ellipsoid.a, e2, lat_0.to_radians()),
            false_easting,
            false_northing,
        }
    }

    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let lat = lat.to_radians();
        let (sin_lat, cos_lat, tan_lat) = (lat.sin(), lat.cos(), lat.tan());

        let n = self.a / (1.0 - self.e2 * sin_lat * sin_lat).sqrt();
        let t = tan_lat * tan_lat;
        let c = self.ep2 * cos_lat * cos_lat;
        let a1 = cos_lat * normalize_lon(lon.to_radians() - self.lon0);
        let m = meridional_arc(self.a, self.e2, lat);

        let a2 = a1 * a1;
        let a4 = a2 * a2;
        let a6 = a4 * a2;

        let easting = self.false_easting
            + self.k0
                * n
                * (a1
                    + (1.0 - t + c) * a2 * a1 / 6.0
                    + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * self.ep2) * a4 * a1 / 120.0);

        let northing = self.false_northing
            + self.k0
                * (m - self.m0
                    + n * tan_lat
                        * (a2 / 2.0
                            + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                            + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * self.ep2) * a6
                                / 720.0));

        (easting, northing)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let e2 = self.e2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;

        let m = self.m0 + (y - self.false_northing) / self.k0;
        let mu = m / (self.a * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
        let root = (1.0 - e2).sqrt();
        let e1 = (1.0 - root) / (1.0 + root);

        // Footpoint latitude (Snyder eq. 3-26)
        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin1, cos1, tan1) = (phi1.sin(), phi1.cos(), phi1.tan());
        let c1 = self.ep2 * cos1 * cos1;
        let t1 = tan1 * tan1;
        let n1 = self.a / (1.0 - e2 * sin1 * sin1).sqrt();
        let r1 = self.a * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
        let d = (x - self.false_easting) / (n1 * self.k0);
        let d2 = d * d;

        let lat = phi1
            - (n1 * tan1 / r1)
                * (d2 / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * self.ep2) * d2 * d2
                        / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                        - 252.0 * self.ep2
                        - 3.0 * c1 * c1)
                        * d2.powi(3)
                        / 720.0);

        let lon = self.lon0
            + (d - (1.0 + 2.0 * t1 + c1) * d2 * d / 6.0
                + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * self.ep2 + 24.0 * t1 * t1)
                    * d2
                    * d2
                    * d
                    / 120.0)
                / cos1;

        (normalize_lon(lon).to_degrees(), lat.to_degrees())
    }
}

/// Meridional arc from equator to latitude `lat` (radians).
/// Snyder eq. 3-21.
fn meridional_arc(a: f64, e2: f64, lat: f64) -> f64 {
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    a * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

// ── Spherical (web) Mercator ────────────────────────────────────────────

const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude where the square web Mercator world ends.
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// NaN outside ±`WEB_MERCATOR_MAX_LAT`, so the transformer rejects it.
fn web_mercator_forward(lon: f64, lat: f64) -> (f64, f64) {
    if lat.abs() > WEB_MERCATOR_MAX_LAT {
        return (f64::NAN, f64::NAN);
    }
    let x = WEB_MERCATOR_RADIUS * lon.to_radians();
    let y = WEB_MERCATOR_RADIUS * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

fn web_mercator_inverse(x: f64, y: f64) -> (f64, f64) {
    let lon = x / WEB_MERCATOR_RADIUS;
    let lat = 2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - FRAC_PI_2;
    (lon.to_degrees(), lat.to_degrees())
}

/// Wrap a longitude difference into [-π, π].
fn normalize_lon(lon: f64) -> f64 {
    if (-std::f64::consts::PI..=std::f64::consts::PI).contains(&lon) {
        return lon;
    }
    let tau = std::f64::consts::TAU;
    lon - tau * ((lon + std::f64::consts::PI) / tau).floor()
}

// ── Operations and the transformer ──────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Operation {
    Geographic,
    Albers(Albers),
    TransverseMercator(TransverseMercator),
    WebMercator,
}

impl Operation {
    fn for_projection(projection: &Projection) -> Result<Self, ProjectionError> {
        Ok(match projection {
            Projection::Geographic { .. } => Operation::Geographic,
            Projection::AlbersEqualArea {
                datum,
                lat_1,
                lat_2,
                lat_0,
                lon_0,
                false_easting,
                false_northing,
            } => Operation::Albers(Albers::new(
                datum.ellipsoid(),
                *lat_1,
                *lat_2,
                *lat_0,
                *lon_0,
                *false_easting,
                *false_northing,
            )?),
            Projection::TransverseMercator {
                datum,
                lat_0,
                lon_0,
                scale,
                false_easting,
                false_northing,
            } => Operation::TransverseMercator(TransverseMercator::new(
                datum.ellipsoid(),
                *lat_0,
                *lon_0,
                *scale,
                *false_easting,
                *false_northing,
            )),
            Projection::WebMercator => Operation::WebMercator,
        })
    }

    /// Projected (x, y) to geographic (lon, lat) degrees.
    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Operation::Geographic => (x, y),
            Operation::Albers(p) => p.inverse(x, y),
            Operation::TransverseMercator(p) => p.inverse(x, y),
            Operation::WebMercator => web_mercator_inverse(x, y),
        }
    }

    /// Geographic (lon, lat) degrees to projected (x, y).
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Operation::Geographic => (lon, lat),
            Operation::Albers(p) => p.forward(lon, lat),
            Operation::TransverseMercator(p) => p.forward(lon, lat),
            Operation::WebMercator => web_mercator_forward(lon, lat),
        }
    }
}

/// Converts coordinates from one CRS into another.
#[derive(Debug, Clone, Copy)]
pub struct Transformer {
    source: Operation,
    target: Operation,
    identity: bool,
}

impl Transformer {
    pub fn new(source: &Crs, target: &Crs) -> Result<Self, ProjectionError> {
        let (from, to) = (source.projection().datum(), target.projection().datum());
        if !from.is_compatible(&to) {
            return Err(ProjectionError::DatumShift(from.to_string(), to.to_string()));
        }

        Ok(Self {
            source: Operation::for_projection(source.projection())?,
            target: Operation::for_projection(target.projection())?,
            identity: source.is_equivalent(target),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    pub fn transform(&self, coord: Coord<f64>) -> Result<Coord<f64>, ProjectionError> {
        if self.identity {
            return Ok(coord);
        }

        let (lon, lat) = self.source.inverse(coord.x, coord.y);
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ProjectionError::NonFinite {
                x: coord.x,
                y: coord.y,
            });
        }
        let (x, y) = self.target.forward(lon, lat);

        if x.is_finite() && y.is_finite() {
            Ok(Coord { x, y })
        } else {
            Err(ProjectionError::NonFinite {
                x: coord.x,
                y: coord.y,
            })
        }
    }
}

impl Datum {
    pub fn ellipsoid(&self) -> Ellipsoid {
        match self {
            Datum::Wgs84 => Ellipsoid::WGS84,
            Datum::Nad83 => Ellipsoid::GRS80,
            Datum::Other { ellipsoid, .. } => *ellipsoid,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn california_albers() -> Albers {
        Albers::new(Ellipsoid::GRS80, 34.0, 40.5, 0.0, -120.0, 0.0, -4_000_000.0).unwrap()
    }

    #[test]
    fn albers_origin_maps_to_false_northing() {
        let (x, y) = california_albers().forward(-120.0, 0.0);
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y, -4_000_000.0, epsilon = 1e-6);
    }

    #[test]
    fn albers_central_meridian_has_zero_easting() {
        let p = california_albers();
        let (x, y_south) = p.forward(-120.0, 34.0);
        let (_, y_north) = p.forward(-120.0, 40.0);
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-6);
        assert!(y_north > y_south);
        // ~6 degrees of latitude is roughly 666 km
        assert!((y_north - y_south - 666_000.0).abs() < 5_000.0);
    }

    #[test]
    fn albers_round_trip() {
        let p = california_albers();
        for &(lon, lat) in &[(-122.42, 37.77), (-118.24, 34.05), (-124.2, 41.75), (-114.6, 32.7)] {
            let (x, y) = p.forward(lon, lat);
            let (lon2, lat2) = p.inverse(x, y);
            assert_abs_diff_eq!(lon, lon2, epsilon = 1e-9);
            assert_abs_diff_eq!(lat, lat2, epsilon = 1e-9);
        }
    }

    // Reference values from pyproj (PROJ 9.x):
    //   Transformer.from_crs(4326, 32630, always_xy=True).transform(-3.7037, 40.4168)
    //   → (440298.94, 4474257.31)
    #[test]
    fn madrid_to_utm30n() {
        let tm = TransverseMercator::new(Ellipsoid::WGS84, 0.0, -3.0, 0.9996, 500_000.0, 0.0);
        let (e, n) = tm.forward(-3.7037, 40.4168);
        assert_abs_diff_eq!(e, 440_298.94, epsilon = 1.0);
        assert_abs_diff_eq!(n, 4_474_257.31, epsilon = 1.0);
    }

    #[test]
    fn transverse_mercator_round_trip() {
        let tm = TransverseMercator::new(Ellipsoid::GRS80, 0.0, -123.0, 0.9996, 500_000.0, 0.0);
        let (x, y) = tm.forward(-122.42, 37.77);
        let (lon, lat) = tm.inverse(x, y);
        assert_abs_diff_eq!(lon, -122.42, epsilon = 1e-6);
        assert_abs_diff_eq!(lat, 37.77, epsilon = 1e-6);
    }

    #[test]
    fn web_mercator_anchor_values() {
        let (x, y) = web_mercator_forward(180.0, 0.0);
        assert_abs_diff_eq!(x, 20_037_508.342_789_244, epsilon = 1e-6);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-6);

        let (x, y) = web_mercator_forward(-120.5, 38.25);
        let (lon, lat) = web_mercator_inverse(x, y);
        assert_abs_diff_eq!(lon, -120.5, epsilon = 1e-9);
        assert_abs_diff_eq!(lat, 38.25, epsilon = 1e-9);
    }

    #[test]
    fn transformer_between_geographic_and_albers() {
        let nad83 = Crs::from_epsg(4269).unwrap();
        let albers = Crs::from_epsg(3310).unwrap();
        let to_albers = Transformer::new(&nad83, &albers).unwrap();
        let back = Transformer::new(&albers, &nad83).unwrap();

        let projected = to_albers.transform(Coord { x: -121.49, y: 38.58 }).unwrap();
        assert!(projected.x < 0.0, "Sacramento lies west of -120");
        let geographic = back.transform(projected).unwrap();
        assert_abs_diff_eq!(geographic.x, -121.49, epsilon = 1e-9);
        assert_abs_diff_eq!(geographic.y, 38.58, epsilon = 1e-9);
    }

    #[test]
    fn transformer_rejects_pole_in_web_mercator() {
        let wgs84 = Crs::from_epsg(4326).unwrap();
        let mercator = Crs::from_epsg(3857).unwrap();
        let t = Transformer::new(&wgs84, &mercator).unwrap();
        assert!(matches!(
            t.transform(Coord { x: 0.0, y: 90.0 }),
            Err(ProjectionError::NonFinite { .. })
        ));
    }

    #[test]
    fn web_mercator_clips_beyond_square_world() {
        let wgs84 = Crs::from_epsg(4326).unwrap();
        let mercator = Crs::from_epsg(3857).unwrap();
        let t = Transformer::new(&wgs84, &mercator).unwrap();

        let edge = t.transform(Coord { x: 180.0, y: 85.0 }).unwrap();
        assert!(edge.y < 20_037_508.342_789_244);
        for lat in [85.06, -85.06, -90.0] {
            assert!(matches!(
                t.transform(Coord { x: 10.0, y: lat }),
                Err(ProjectionError::NonFinite { .. })
            ));
        }
    }

    #[test]
    fn transformer_rejects_incompatible_datum() {
        let nad27 = Crs::custom(
            "NAD27",
            Projection::Geographic {
                datum: Datum::Other {
                    name: "North_American_Datum_1927".into(),
                    ellipsoid: Ellipsoid::from_inverse_flattening(6_378_206.4, 294.978_698_2),
                },
            },
        );
        let nad83 = Crs::from_epsg(4269).unwrap();
        assert!(matches!(
            Transformer::new(&nad27, &nad83),
            Err(ProjectionError::DatumShift(..))
        ));
    }

    #[test]
    fn normalize_lon_wraps() {
        let pi = std::f64::consts::PI;
        assert_abs_diff_eq!(normalize_lon(2.5 * pi), 0.5 * pi, epsilon = 1e-12);
        assert_abs_diff_eq!(normalize_lon(0.5), 0.5, epsilon = 1e-12);
    }
}
