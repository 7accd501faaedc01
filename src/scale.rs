use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

const DEFAULT_SCALE: &str = include_str!("../data/grade_scale.json");

#[derive(Debug, thiserror::Error)]
pub enum ScaleError {
    #[error("grade scale `{version}` has no grades")]
    Empty { version: String },
    #[error("grade `{grade}` has invalid point value {points}")]
    InvalidPoints { grade: String, points: f64 },
    #[error("grade scale contains a blank grade")]
    BlankGrade,
    #[error("failed to read grade scale: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse grade scale: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RawScale {
    version: String,
    points: BTreeMap<String, f64>,
}

/// Letter grade to point table. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeScale {
    version: String,
    points: BTreeMap<String, f64>,
    max_point: f64,
}

impl GradeScale {
    pub fn new(
        version: impl Into<String>,
        points: BTreeMap<String, f64>,
    ) -> Result<Self, ScaleError> {
        let version = version.into();
        if points.is_empty() {
            return Err(ScaleError::Empty { version });
        }

        let mut max_point = 0.0_f64;
        for (grade, value) in &points {
            if grade.trim().is_empty() {
                return Err(ScaleError::BlankGrade);
            }
            if !value.is_finite() || *value < 0.0 {
                return Err(ScaleError::InvalidPoints {
                    grade: grade.clone(),
                    points: *value,
                });
            }
            max_point = max_point.max(*value);
        }

        Ok(Self {
            version,
            points,
            max_point,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, ScaleError> {
        let raw: RawScale = serde_json::from_str(raw)?;
        Self::new(raw.version, raw.points)
    }

    pub fn from_path(path: &Path) -> Result<Self, ScaleError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn builtin() -> Result<Self, ScaleError> {
        Self::from_json(DEFAULT_SCALE)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn point(&self, grade: &str) -> Option<f64> {
        self.points.get(grade).copied()
    }

    pub fn max_point(&self) -> f64 {
        self.max_point
    }

    pub fn grades(&self) -> impl Iterator<Item = (&str, f64)> {
        self.points.iter().map(|(grade, points)| (grade.as_str(), *points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_scale_matches_canonical_table() {
        let scale = GradeScale::builtin().unwrap();
        assert_eq!(scale.version(), "2021-regulation");
        assert_eq!(scale.point("O"), Some(10.0));
        assert_eq!(scale.point("A+"), Some(9.0));
        assert_eq!(scale.point("B+"), Some(7.0));
        assert_eq!(scale.point("P"), Some(4.0));
        assert_eq!(scale.point("Absent"), Some(0.0));
        assert_eq!(scale.point("S"), None);
        assert_eq!(scale.max_point(), 10.0);
    }

    #[test]
    fn rejects_negative_points() {
        let points = BTreeMap::from([("O".to_string(), 10.0), ("X".to_string(), -1.0)]);
        let err = GradeScale::new("bad", points).unwrap_err();
        assert!(matches!(err, ScaleError::InvalidPoints { ref grade, .. } if grade == "X"));
    }

    #[test]
    fn rejects_non_numeric_points() {
        let err = GradeScale::from_json(r#"{"version":"v","points":{"O":"ten"}}"#).unwrap_err();
        assert!(matches!(err, ScaleError::Json(_)));
    }

    #[test]
    fn rejects_empty_scale() {
        let err = GradeScale::from_json(r#"{"version":"v","points":{}}"#).unwrap_err();
        assert!(matches!(err, ScaleError::Empty { .. }));
    }

    #[test]
    fn four_point_scale_reports_its_maximum() {
        let scale =
            GradeScale::from_json(r#"{"version":"us","points":{"A":4,"B":3,"C":2,"F":0}}"#)
                .unwrap();
        assert_eq!(scale.max_point(), 4.0);
        assert_eq!(scale.grades().count(), 4);
    }
}
