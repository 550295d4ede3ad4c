use super::serde_helpers::float_from_str;
use serde::Deserialize;

/// Row of `parameters.csv` written by the plane fitting step.
#[derive(Debug, Deserialize)]
pub struct PlaneParametersRecord {
    #[serde(rename(deserialize = "Plane Coefficient a"), deserialize_with = "float_from_str")]
    pub a: f64,
    #[serde(rename(deserialize = "Plane Coefficient b"), deserialize_with = "float_from_str")]
    pub b: f64,
    #[serde(rename(deserialize = "Plane Coefficient c"), deserialize_with = "float_from_str")]
    pub c: f64,
}

/// Velocity correction plane `a*lon + b*lat + c` (mm/year).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionPlane {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl CorrectionPlane {
    pub fn evaluate(&self, longitude: f64, latitude: f64) -> f64 {
        self.a * longitude + self.b * latitude + self.c
    }
}

impl From<PlaneParametersRecord> for CorrectionPlane {
    fn from(record: PlaneParametersRecord) -> Self {
        CorrectionPlane {
            a: record.a,
            b: record.b,
            c: record.c,
        }
    }
}
