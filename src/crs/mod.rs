//! Coordinate Reference System handling

mod projection;
mod wkt;

pub use projection::{Ellipsoid, Transformer};

use crate::error::ProjectionError;
use std::fmt;

/// Geodetic datum. WGS 84 and NAD83 are treated as coincident.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Wgs84,
    Nad83,
    Other { name: String, ellipsoid: Ellipsoid },
}

impl Datum {
    pub fn is_compatible(&self, other: &Datum) -> bool {
        match (self, other) {
            (Datum::Wgs84 | Datum::Nad83, Datum::Wgs84 | Datum::Nad83) => true,
            (a, b) => a == b,
        }
    }

    fn from_wkt_name(name: &str, ellipsoid: Option<Ellipsoid>) -> Self {
        let key = name.to_ascii_lowercase().replace([' ', '-'], "_");
        if key.contains("north_american_1983")
            || key.contains("north_american_datum_1983")
            || key.contains("nad83")
        {
            Datum::Nad83
        } else if key.contains("wgs_1984")
            || key.contains("wgs84")
            || key.contains("wgs_84")
            || key.contains("world_geodetic_system_1984")
        {
            Datum::Wgs84
        } else {
            Datum::Other {
                name: name.to_string(),
                ellipsoid: ellipsoid.unwrap_or(Ellipsoid::WGS84),
            }
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Wgs84 => write!(f, "WGS 84"),
            Datum::Nad83 => write!(f, "NAD83"),
            Datum::Other { name, .. } => write!(f, "{name}"),
        }
    }
}

/// Projection definition. Angles in degrees, offsets in metres.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Geographic {
        datum: Datum,
    },
    AlbersEqualArea {
        datum: Datum,
        lat_1: f64,
        lat_2: f64,
        lat_0: f64,
        lon_0: f64,
        false_easting: f64,
        false_northing: f64,
    },
    TransverseMercator {
        datum: Datum,
        lat_0: f64,
        lon_0: f64,
        scale: f64,
        false_easting: f64,
        false_northing: f64,
    },
    WebMercator,
}

impl Projection {
    pub fn datum(&self) -> Datum {
        match self {
            Projection::Geographic { datum }
            | Projection::AlbersEqualArea { datum, .. }
            | Projection::TransverseMercator { datum, .. } => datum.clone(),
            Projection::WebMercator => Datum::Wgs84,
        }
    }

    /// Parameter-wise comparison: 1e-9 on angles and scale, 1e-3 on offsets.
    pub fn approx_eq(&self, other: &Projection) -> bool {
        let angle = |a: f64, b: f64| (a - b).abs() < 1e-9;
        let offset = |a: f64, b: f64| (a - b).abs() < 1e-3;

        match (self, other) {
            (Projection::Geographic { datum: a }, Projection::Geographic { datum: b }) => a == b,
            (
                Projection::AlbersEqualArea {
                    datum: d1,
                    lat_1: a1,
                    lat_2: b1,
                    lat_0: c1,
                    lon_0: l1,
                    false_easting: e1,
                    false_northing: n1,
                },
                Projection::AlbersEqualArea {
                    datum: d2,
                    lat_1: a2,
                    lat_2: b2,
                    lat_0: c2,
                    lon_0: l2,
                    false_easting: e2,
                    false_northing: n2,
                },
            ) => {
                d1 == d2
                    && angle(*a1, *a2)
                    && angle(*b1, *b2)
                    && angle(*c1, *c2)
                    && angle(*l1, *l2)
                    && offset(*e1, *e2)
                    && offset(*n1, *n2)
            }
            (
                Projection::TransverseMercator {
                    datum: d1,
                    lat_0: a1,
                    lon_0: l1,
                    scale: k1,
                    false_easting: e1,
                    false_northing: n1,
                },
                Projection::TransverseMercator {
                    datum: d2,
                    lat_0: a2,
                    lon_0: l2,
                    scale: k2,
                    false_easting: e2,
                    false_northing: n2,
                },
            ) => {
                d1 == d2
                    && angle(*a1, *a2)
                    && angle(*l1, *l2)
                    && angle(*k1, *k2)
                    && offset(*e1, *e2)
                    && offset(*n1, *n2)
            }
            (Projection::WebMercator, Projection::WebMercator) => true,
            _ => false,
        }
    }
}

/// EPSG codes that are matched when identifying a parsed definition.
const IDENTIFIABLE: &[u32] = &[4326, 4269, 3857, 3310, 5070];

fn known_definition(code: u32) -> Option<(String, Projection)> {
    let utm = |datum: Datum, zone: u32, south: bool| Projection::TransverseMercator {
        datum,
        lat_0: 0.0,
        lon_0: f64::from(zone) * 6.0 - 183.0,
        scale: 0.9996,
        false_easting: 500_000.0,
        false_northing: if south { 10_000_000.0 } else { 0.0 },
    };

    let definition = match code {
        4326 => ("WGS 84".to_string(), Projection::Geographic { datum: Datum::Wgs84 }),
        4269 => ("NAD83".to_string(), Projection::Geographic { datum: Datum::Nad83 }),
        3857 => ("WGS 84 / Pseudo-Mercator".to_string(), Projection::WebMercator),
        3310 => (
            "NAD83 / California Albers".to_string(),
            Projection::AlbersEqualArea {
                datum: Datum::Nad83,
                lat_1: 34.0,
                lat_2: 40.5,
                lat_0: 0.0,
                lon_0: -120.0,
                false_easting: 0.0,
                false_northing: -4_000_000.0,
            },
        ),
        5070 => (
            "NAD83 / Conus Albers".to_string(),
            Projection::AlbersEqualArea {
                datum: Datum::Nad83,
                lat_1: 29.5,
                lat_2: 45.5,
                lat_0: 23.0,
                lon_0: -96.0,
                false_easting: 0.0,
                false_northing: 0.0,
            },
        ),
        32601..=32660 => {
            let zone = code - 32600;
            (format!("WGS 84 / UTM zone {zone}N"), utm(Datum::Wgs84, zone, false))
        }
        32701..=32760 => {
            let zone = code - 32700;
            (format!("WGS 84 / UTM zone {zone}S"), utm(Datum::Wgs84, zone, true))
        }
        26901..=26923 => {
            let zone = code - 26900;
            (format!("NAD83 / UTM zone {zone}N"), utm(Datum::Nad83, zone, false))
        }
        _ => return None,
    };
    Some(definition)
}

/// EPSG code of a UTM definition, if the parameters describe one.
fn identify_utm(projection: &Projection) -> Option<u32> {
    let Projection::TransverseMercator {
        datum,
        lat_0,
        lon_0,
        scale,
        false_easting,
        false_northing,
    } = projection
    else {
        return None;
    };

    if lat_0.abs() > 1e-9 || (scale - 0.9996).abs() > 1e-9 || (false_easting - 500_000.0).abs() > 1e-3 {
        return None;
    }
    let zone = (lon_0 + 183.0) / 6.0;
    if (zone - zone.round()).abs() > 1e-9 || !(1.0..=60.0).contains(&zone.round()) {
        return None;
    }
    let zone = zone.round() as u32;
    let south = (false_northing - 10_000_000.0).abs() < 1e-3;
    if !south && false_northing.abs() > 1e-3 {
        return None;
    }

    match (datum, south) {
        (Datum::Wgs84, false) => Some(32600 + zone),
        (Datum::Wgs84, true) => Some(32700 + zone),
        (Datum::Nad83, false) if zone <= 23 => Some(26900 + zone),
        _ => None,
    }
}

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq)]
pub struct Crs {
    epsg: Option<u32>,
    name: String,
    projection: Projection,
}

impl Crs {
    /// Create a CRS from a supported EPSG code
    pub fn from_epsg(code: u32) -> Result<Self, ProjectionError> {
        let (name, projection) = known_definition(code)
            .ok_or_else(|| ProjectionError::Unsupported(format!("EPSG:{code}")))?;
        Ok(Self {
            epsg: Some(code),
            name,
            projection,
        })
    }

    /// Build a CRS from an explicit definition, identifying its EPSG code when
    /// the parameters match a known one.
    pub fn custom(name: impl Into<String>, projection: Projection) -> Self {
        let epsg = IDENTIFIABLE
            .iter()
            .copied()
            .find(|&code| {
                known_definition(code).is_some_and(|(_, known)| known.approx_eq(&projection))
            })
            .or_else(|| identify_utm(&projection));

        Self {
            epsg,
            name: name.into(),
            projection,
        }
    }

    /// Accepts `EPSG:nnnn`, OGC URNs, or WKT1 text.
    pub fn from_user_input(input: &str) -> Result<Self, ProjectionError> {
        let trimmed = input.trim();
        let upper = trimmed.to_ascii_uppercase();

        if upper == "URN:OGC:DEF:CRS:OGC:1.3:CRS84" || upper == "CRS84" {
            return Self::from_epsg(4326);
        }
        if let Some(code) = upper
            .strip_prefix("EPSG:")
            .or_else(|| upper.strip_prefix("URN:OGC:DEF:CRS:EPSG::"))
            .or_else(|| upper.strip_prefix("URN:OGC:DEF:CRS:EPSG:"))
        {
            // URNs may carry a version segment: EPSG:6.6:4326
            let code = code.rsplit(':').next().unwrap_or(code);
            return code
                .trim()
                .parse::<u32>()
                .map_err(|_| ProjectionError::Unsupported(trimmed.to_string()))
                .and_then(Self::from_epsg);
        }
        if trimmed.contains('[') {
            return Self::from_wkt(trimmed);
        }

        Err(ProjectionError::Unsupported(trimmed.to_string()))
    }

    /// Parse a WKT1 definition (OGC or ESRI flavour, as found in `.prj` files).
    pub fn from_wkt(text: &str) -> Result<Self, ProjectionError> {
        let root = wkt::parse(text).map_err(|e| ProjectionError::Unsupported(format!("WKT: {e}")))?;
        let name = root.name().unwrap_or("unnamed").to_string();

        if let Some(code) = epsg_authority(&root) {
            if let Ok(crs) = Self::from_epsg(code) {
                return Ok(crs);
            }
        }

        let projection = match root.keyword.to_ascii_uppercase().as_str() {
            "GEOGCS" => Projection::Geographic {
                datum: wkt_datum(&root),
            },
            "PROJCS" => wkt_projection(&root)?,
            other => return Err(ProjectionError::Unsupported(format!("WKT root {other}"))),
        };

        Ok(Self::custom(name, projection))
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self {
            epsg: Some(4326),
            name: "WGS 84".to_string(),
            projection: Projection::Geographic { datum: Datum::Wgs84 },
        }
    }

    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self.projection, Projection::Geographic { .. })
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &Crs) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        self.projection.approx_eq(&other.projection)
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        match self.epsg {
            Some(code) => format!("EPSG:{code}"),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

fn epsg_authority(node: &wkt::WktNode) -> Option<u32> {
    let authority = node.child("AUTHORITY")?;
    let mut parts = authority.args.iter();
    match (parts.next(), parts.next()) {
        (Some(wkt::WktValue::Text(org)), Some(code)) if org.eq_ignore_ascii_case("EPSG") => match code {
            wkt::WktValue::Text(s) => s.trim().parse().ok(),
            wkt::WktValue::Number(n) => Some(*n as u32),
            wkt::WktValue::Node(_) => None,
        },
        _ => None,
    }
}

fn wkt_datum(geogcs: &wkt::WktNode) -> Datum {
    let Some(datum) = geogcs.child("DATUM") else {
        return Datum::Other {
            name: geogcs.name().unwrap_or("unknown").to_string(),
            ellipsoid: Ellipsoid::WGS84,
        };
    };
    let ellipsoid = datum.child("SPHEROID").and_then(|s| match s.numbers().as_slice() {
        [a, inv_f, ..] => Some(Ellipsoid::from_inverse_flattening(*a, *inv_f)),
        _ => None,
    });
    Datum::from_wkt_name(datum.name().unwrap_or("unknown"), ellipsoid)
}

fn wkt_projection(projcs: &wkt::WktNode) -> Result<Projection, ProjectionError> {
    let datum = projcs
        .child("GEOGCS")
        .map(wkt_datum)
        .ok_or_else(|| ProjectionError::Unsupported("PROJCS without GEOGCS".to_string()))?;

    let unit = projcs
        .children("UNIT")
        .last()
        .and_then(|u| u.numbers().first().copied())
        .unwrap_or(1.0);
    if (unit - 1.0).abs() > 1e-9 {
        return Err(ProjectionError::Unsupported(format!(
            "linear unit of {unit} m (only metres are supported)"
        )));
    }

    let method = projcs
        .child("PROJECTION")
        .and_then(|p| p.name())
        .ok_or_else(|| ProjectionError::Unsupported("PROJCS without PROJECTION".to_string()))?
        .to_ascii_lowercase();

    let param = |names: &[&str], default: f64| -> f64 {
        projcs
            .children("PARAMETER")
            .find(|p| {
                p.name()
                    .is_some_and(|n| names.iter().any(|candidate| n.eq_ignore_ascii_case(candidate)))
            })
            .and_then(|p| p.numbers().first().copied())
            .unwrap_or(default)
    };
    let false_easting = param(&["false_easting"], 0.0);
    let false_northing = param(&["false_northing"], 0.0);

    match method.as_str() {
        "albers" | "albers_conic_equal_area" | "albers_equal_area" => Ok(Projection::AlbersEqualArea {
            datum,
            lat_1: param(&["standard_parallel_1"], 0.0),
            lat_2: param(&["standard_parallel_2"], 0.0),
            lat_0: param(&["latitude_of_center", "latitude_of_origin"], 0.0),
            lon_0: param(&["longitude_of_center", "central_meridian"], 0.0),
            false_easting,
            false_northing,
        }),
        "transverse_mercator" => Ok(Projection::TransverseMercator {
            datum,
            lat_0: param(&["latitude_of_origin"], 0.0),
            lon_0: param(&["central_meridian", "longitude_of_center"], 0.0),
            scale: param(&["scale_factor"], 1.0),
            false_easting,
            false_northing,
        }),
        "mercator_auxiliary_sphere" | "popular_visualisation_pseudo_mercator" => Ok(Projection::WebMercator),
        other => Err(ProjectionError::Unsupported(format!("projection method {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEALE_ALBERS_PRJ: &str = r#"PROJCS["NAD_1983_California_Teale_Albers",GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Albers"],PARAMETER["False_Easting",0.0],PARAMETER["False_Northing",-4000000.0],PARAMETER["Central_Meridian",-120.0],PARAMETER["Standard_Parallel_1",34.0],PARAMETER["Standard_Parallel_2",40.5],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;

    const TIGER_PRJ: &str = r#"GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137,298.257222101]],PRIMEM["Greenwich",0],UNIT["Degree",0.017453292519943295]]"#;

    #[test]
    fn test_crs_epsg() {
        let crs = Crs::from_epsg(3310).unwrap();
        assert_eq!(crs.epsg(), Some(3310));
        assert_eq!(crs.identifier(), "EPSG:3310");
        assert!(!crs.is_geographic());
    }

    #[test]
    fn test_unknown_epsg_is_unsupported() {
        assert!(matches!(Crs::from_epsg(2229), Err(ProjectionError::Unsupported(_))));
    }

    #[test]
    fn esri_teale_albers_identifies_as_3310() {
        let crs = Crs::from_wkt(TEALE_ALBERS_PRJ).unwrap();
        assert_eq!(crs.epsg(), Some(3310));
        assert_eq!(crs.name(), "NAD_1983_California_Teale_Albers");
        assert!(crs.is_equivalent(&Crs::from_epsg(3310).unwrap()));
    }

    #[test]
    fn tiger_prj_identifies_as_4269() {
        let crs = Crs::from_wkt(TIGER_PRJ).unwrap();
        assert_eq!(crs.epsg(), Some(4269));
        assert!(crs.is_geographic());
        assert!(!crs.is_equivalent(&Crs::wgs84()));
    }

    #[test]
    fn authority_wins_over_parameters() {
        let wkt = r#"PROJCS["NAD83 / California Albers",GEOGCS["NAD83",DATUM["North_American_Datum_1983",SPHEROID["GRS 1980",6378137,298.257222101,AUTHORITY["EPSG","7019"]],AUTHORITY["EPSG","6269"]],AUTHORITY["EPSG","4269"]],PROJECTION["Albers_Conic_Equal_Area"],UNIT["metre",1],AUTHORITY["EPSG","3310"]]"#;
        let crs = Crs::from_wkt(wkt).unwrap();
        assert_eq!(crs.epsg(), Some(3310));
        assert_eq!(crs.name(), "NAD83 / California Albers");
    }

    #[test]
    fn utm_parameters_are_identified() {
        let wkt = r#"PROJCS["WGS_1984_UTM_Zone_10N",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",-123.0],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;
        assert_eq!(Crs::from_wkt(wkt).unwrap().epsg(), Some(32610));
    }

    #[test]
    fn feet_based_projections_are_rejected() {
        let wkt = r#"PROJCS["NAD_1983_StatePlane_California_V_FIPS_0405_Feet",GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Lambert_Conformal_Conic"],UNIT["Foot_US",0.3048006096012192]]"#;
        assert!(matches!(Crs::from_wkt(wkt), Err(ProjectionError::Unsupported(_))));
    }

    #[test]
    fn user_input_forms() {
        assert_eq!(Crs::from_user_input("epsg:4269").unwrap().epsg(), Some(4269));
        assert_eq!(
            Crs::from_user_input("urn:ogc:def:crs:EPSG::3310").unwrap().epsg(),
            Some(3310)
        );
        assert_eq!(
            Crs::from_user_input("urn:ogc:def:crs:OGC:1.3:CRS84").unwrap().epsg(),
            Some(4326)
        );
        assert!(Crs::from_user_input("EPSG:abc").is_err());
        assert!(Crs::from_user_input("+proj=longlat").is_err());
    }

    #[test]
    fn test_crs_equivalence() {
        let a = Crs::from_epsg(4326).unwrap();
        let b = Crs::wgs84();
        assert!(a.is_equivalent(&b));
        assert_eq!(a.to_string(), "EPSG:4326");
    }

    #[test]
    fn nad83_and_wgs84_are_compatible_datums() {
        assert!(Datum::Nad83.is_compatible(&Datum::Wgs84));
        let other = Datum::Other {
            name: "D_North_American_1927".into(),
            ellipsoid: Ellipsoid::WGS84,
        };
        assert!(!other.is_compatible(&Datum::Nad83));
    }
}
