use serde::{Deserialize, Serialize};

/// Fixed-point units per degree used on the wire and by the geo math.
pub const UNITS_PER_DEGREE: f64 = 3_600_000.0;

/// Geographic position in degrees.
///
/// Deserializes from either `{ lat = .., lon = .. }` or a `[lat, lon]` pair,
/// the form geofences and waypoint lists are written in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "CoordinateRepr")]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Latitude and longitude as rounded fixed-point integers.
    pub fn to_units(&self) -> (i64, i64) {
        (degrees_to_units(self.lat), degrees_to_units(self.lon))
    }

    pub fn from_units(lat: i64, lon: i64) -> Self {
        Self {
            lat: lat as f64 / UNITS_PER_DEGREE,
            lon: lon as f64 / UNITS_PER_DEGREE,
        }
    }
}

pub(crate) fn degrees_to_units(deg: f64) -> i64 {
    (deg * UNITS_PER_DEGREE).round() as i64
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CoordinateRepr {
    Pair([f64; 2]),
    Named { lat: f64, lon: f64 },
}

impl From<CoordinateRepr> for Coordinate {
    fn from(r: CoordinateRepr) -> Self {
        match r {
            CoordinateRepr::Pair([lat, lon]) => Self { lat, lon },
            CoordinateRepr::Named { lat, lon } => Self { lat, lon },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_pair_and_named_forms() {
        let pair: Coordinate = serde_json::from_str("[50.11, 14.36]").unwrap();
        let named: Coordinate = serde_json::from_str(r#"{"lat": 50.11, "lon": 14.36}"#).unwrap();
        assert_eq!(pair, named);
        assert_eq!(pair.lat, 50.11);
    }

    #[test]
    fn units_round_half_away_from_zero() {
        let c = Coordinate::new(32.50053483, -83.75835683);
        assert_eq!(c.to_units(), (117_001_925, -301_530_085));
    }
}
