//! Coordinate resolution for decoded records.
//!
//! Two strategies, selected per dataset:
//!
//! - [`Geocoder::Composite`]: one text column holding `"<lat>,<lon>"`
//! - [`Geocoder::Planar`]: two numeric columns in a projected grid, converted
//!   with an inverse [`LambertConformalConic`] projection
//!
//! Both return `None` for anything they cannot turn into a finite coordinate
//! pair; callers drop and count those rows.

use crate::record::RawRecord;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

/// Geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    fn finite(lat: f64, lon: f64) -> Option<Self> {
        (lat.is_finite() && lon.is_finite()).then_some(Self { lat, lon })
    }
}

/// Coordinate resolution strategy for one dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Geocoder {
    /// `"lat,lon"` text in a single column.
    Composite { column: String },

    /// Planar `(x, y)` in a projected grid.
    Planar {
        x_column: String,
        y_column: String,
        projection: LambertConformalConic,
    },
}

impl Geocoder {
    /// Resolve a record's coordinates, or `None` when unresolvable.
    pub fn resolve(&self, record: &RawRecord) -> Option<LatLon> {
        match self {
            Geocoder::Composite { column } => parse_composite(record.get(column)?),
            Geocoder::Planar {
                x_column,
                y_column,
                projection,
            } => {
                let x = parse_number(record.get(x_column)?)?;
                let y = parse_number(record.get(y_column)?)?;
                projection.inverse(x, y)
            }
        }
    }

    /// Columns the strategy reads.
    pub fn required_columns(&self) -> Vec<&str> {
        match self {
            Geocoder::Composite { column } => vec![column.as_str()],
            Geocoder::Planar {
                x_column, y_column, ..
            } => vec![x_column.as_str(), y_column.as_str()],
        }
    }

    /// Columns left out of the attribute bag.
    ///
    /// The composite field duplicates the resolved coordinates and is dropped;
    /// planar columns are kept since they carry the original grid values.
    pub fn excluded_columns(&self) -> Vec<String> {
        match self {
            Geocoder::Composite { column } => vec![column.clone()],
            Geocoder::Planar { .. } => Vec::new(),
        }
    }
}

/// Parse `"<lat>,<lon>"`. Extra comma-separated parts are ignored.
pub fn parse_composite(text: &str) -> Option<LatLon> {
    if text.trim().is_empty() {
        return None;
    }
    let mut parts = text.split(',');
    let lat = parse_number(parts.next()?)?;
    let lon = parse_number(parts.next()?)?;
    LatLon::finite(lat, lon)
}

fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Two-standard-parallel Lambert conformal conic projection on an ellipsoid.
///
/// Angles are stored in degrees; the derived constants (`n`, `F`, `rho0`) are
/// computed on each call from the parameters, which keeps the type plain data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LambertConformalConic {
    /// Semi-major axis in meters.
    pub semi_major_axis: f64,
    /// Inverse flattening.
    pub inverse_flattening: f64,
    /// First standard parallel (degrees).
    pub standard_parallel_1: f64,
    /// Second standard parallel (degrees).
    pub standard_parallel_2: f64,
    /// Latitude of the false origin (degrees).
    pub latitude_of_origin: f64,
    /// Central meridian (degrees).
    pub central_meridian: f64,
    /// False easting (meters).
    pub false_easting: f64,
    /// False northing (meters).
    pub false_northing: f64,
}

struct ConeConstants {
    e: f64,
    n: f64,
    af: f64,
    rho0: f64,
}

impl LambertConformalConic {
    /// Lambert-93 (EPSG:2154) on GRS80.
    pub fn lambert93() -> Self {
        Self {
            semi_major_axis: 6_378_137.0,
            inverse_flattening: 298.257_222_101,
            standard_parallel_1: 49.0,
            standard_parallel_2: 44.0,
            latitude_of_origin: 46.5,
            central_meridian: 3.0,
            false_easting: 700_000.0,
            false_northing: 6_600_000.0,
        }
    }

    fn eccentricity(&self) -> f64 {
        let f = 1.0 / self.inverse_flattening;
        (2.0 * f - f * f).sqrt()
    }

    fn m(e: f64, phi: f64) -> f64 {
        let s = phi.sin();
        phi.cos() / (1.0 - e * e * s * s).sqrt()
    }

    fn t(e: f64, phi: f64) -> f64 {
        let s = phi.sin();
        (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - e * s) / (1.0 + e * s)).powf(e / 2.0)
    }

    fn constants(&self) -> ConeConstants {
        let e = self.eccentricity();
        let phi1 = self.standard_parallel_1.to_radians();
        let phi2 = self.standard_parallel_2.to_radians();
        let phi0 = self.latitude_of_origin.to_radians();

        let (m1, m2) = (Self::m(e, phi1), Self::m(e, phi2));
        let (t1, t2) = (Self::t(e, phi1), Self::t(e, phi2));
        let n = if (phi1 - phi2).abs() < 1e-12 {
            phi1.sin()
        } else {
            (m1.ln() - m2.ln()) / (t1.ln() - t2.ln())
        };
        let af = self.semi_major_axis * m1 / (n * t1.powf(n));
        let rho0 = af * Self::t(e, phi0).powf(n);
        ConeConstants { e, n, af, rho0 }
    }

    /// Geographic → planar. Returns `(x, y)` in meters.
    pub fn forward(&self, lat: f64, lon: f64) -> (f64, f64) {
        let c = self.constants();
        let rho = c.af * Self::t(c.e, lat.to_radians()).powf(c.n);
        let theta = c.n * (lon - self.central_meridian).to_radians();
        (
            self.false_easting + rho * theta.sin(),
            self.false_northing + c.rho0 - rho * theta.cos(),
        )
    }

    /// Planar → geographic, or `None` for non-finite input or output.
    pub fn inverse(&self, x: f64, y: f64) -> Option<LatLon> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let c = self.constants();
        let dx = x - self.false_easting;
        let dy = c.rho0 - (y - self.false_northing);
        let sign = c.n.signum();
        let rho = sign * (dx * dx + dy * dy).sqrt();
        let theta = (sign * dx).atan2(sign * dy);
        let t = (rho / c.af).powf(1.0 / c.n);

        let mut phi = FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..15 {
            let s = phi.sin();
            let next = FRAC_PI_2
                - 2.0 * (t * ((1.0 - c.e * s) / (1.0 + c.e * s)).powf(c.e / 2.0)).atan();
            let done = (next - phi).abs() < 1e-12;
            phi = next;
            if done {
                break;
            }
        }
        let lon = (theta / c.n).to_degrees() + self.central_meridian;
        LatLon::finite(phi.to_degrees(), lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composite() -> Geocoder {
        Geocoder::Composite {
            column: "geo".to_string(),
        }
    }

    #[test]
    fn test_composite_parses_lat_lon() {
        let rec = RawRecord::from_pairs([("geo", " 48.8566 , 2.3522 ")]);
        let ll = composite().resolve(&rec).unwrap();
        assert_eq!(ll, LatLon::new(48.8566, 2.3522));
    }

    #[test]
    fn test_composite_unresolvable_cases() {
        for text in ["", "   ", "48.85", "abc,2.3", "48.8,", "NaN,2.0", "inf,1"] {
            let rec = RawRecord::from_pairs([("geo", text)]);
            assert!(composite().resolve(&rec).is_none(), "{text:?} should not resolve");
        }
        let missing = RawRecord::from_pairs([("other", "1,2")]);
        assert!(composite().resolve(&missing).is_none());
    }

    #[test]
    fn test_lambert93_origin_maps_to_false_origin() {
        let proj = LambertConformalConic::lambert93();
        let (x, y) = proj.forward(46.5, 3.0);
        assert!((x - 700_000.0).abs() < 1e-6);
        assert!((y - 6_600_000.0).abs() < 1e-6);

        let ll = proj.inverse(700_000.0, 6_600_000.0).unwrap();
        assert!((ll.lat - 46.5).abs() < 1e-9);
        assert!((ll.lon - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_lambert93_paris_is_plausible() {
        // Paris lies north-west of the false origin.
        let proj = LambertConformalConic::lambert93();
        let (x, y) = proj.forward(48.8566, 2.3522);
        assert!((640_000.0..670_000.0).contains(&x), "x = {x}");
        assert!((6_850_000.0..6_875_000.0).contains(&y), "y = {y}");
    }

    #[test]
    fn test_planar_round_trip_within_one_meter() {
        let proj = LambertConformalConic::lambert93();
        for (x, y) in [
            (652_469.0, 6_862_035.0),
            (1_044_000.0, 6_298_000.0),
            (351_000.0, 6_789_000.0),
            (700_000.0, 7_100_000.0),
        ] {
            let ll = proj.inverse(x, y).unwrap();
            let (bx, by) = proj.forward(ll.lat, ll.lon);
            assert!(((bx - x).powi(2) + (by - y).powi(2)).sqrt() < 1.0);
        }
    }

    #[test]
    fn test_planar_geocoder_resolves_and_rejects() {
        let geocoder = Geocoder::Planar {
            x_column: "x".to_string(),
            y_column: "y".to_string(),
            projection: LambertConformalConic::lambert93(),
        };
        let ok = RawRecord::from_pairs([("x", "700000"), ("y", "6600000")]);
        let ll = geocoder.resolve(&ok).unwrap();
        assert!((ll.lat - 46.5).abs() < 1e-9);

        for (x, y) in [("", "6600000"), ("700000", "abc"), ("inf", "1")] {
            let bad = RawRecord::from_pairs([("x", x), ("y", y)]);
            assert!(geocoder.resolve(&bad).is_none());
        }
        assert!(geocoder.excluded_columns().is_empty());
    }
}
