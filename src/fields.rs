use crate::error::{GradeError, GradeResult};
use serde::{Deserialize, Serialize};

/// Window every grade write must fall inside before field bounds are applied.
pub const WRITE_MIN: f64 = 0.0;
pub const WRITE_MAX: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScoreField {
    Behavior,
    Applications,
    Notebook,
    Assignment,
    Exam,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldBounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    /// Value reported when no grade row exists yet for the student/term.
    pub default: f64,
}

const OBSERVED: FieldBounds = FieldBounds {
    min: 0.0,
    max: 5.0,
    step: 0.5,
    default: 5.0,
};

const GRADED: FieldBounds = FieldBounds {
    min: 0.0,
    max: 20.0,
    step: 0.5,
    default: 0.0,
};

/// Bounds per scored field. Adding a scored field means adding a row here.
pub const FIELD_BOUNDS: &[(ScoreField, FieldBounds)] = &[
    (ScoreField::Behavior, OBSERVED),
    (ScoreField::Applications, OBSERVED),
    (ScoreField::Notebook, OBSERVED),
    (ScoreField::Assignment, GRADED),
    (ScoreField::Exam, GRADED),
];

impl ScoreField {
    pub const ALL: [ScoreField; 5] = [
        ScoreField::Behavior,
        ScoreField::Applications,
        ScoreField::Notebook,
        ScoreField::Assignment,
        ScoreField::Exam,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "behavior" => Some(Self::Behavior),
            "applications" => Some(Self::Applications),
            "notebook" => Some(Self::Notebook),
            "assignment" => Some(Self::Assignment),
            "exam" => Some(Self::Exam),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Behavior => "behavior",
            Self::Applications => "applications",
            Self::Notebook => "notebook",
            Self::Assignment => "assignment",
            Self::Exam => "exam",
        }
    }

    /// Column name in the `grades` table.
    pub fn column(self) -> &'static str {
        self.as_str()
    }

    pub fn bounds(self) -> FieldBounds {
        FIELD_BOUNDS
            .iter()
            .find(|(f, _)| *f == self)
            .map(|(_, b)| *b)
            .unwrap_or(GRADED)
    }
}

impl FieldBounds {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckedScore {
    pub value: f64,
    /// Set when the submitted value was inside the write window but outside
    /// the field's own domain.
    pub clamped_from: Option<f64>,
}

/// Validates a raw grade write. Non-finite values and values outside
/// [`WRITE_MIN`, `WRITE_MAX`] are rejected; anything else is clamped to the
/// field's domain.
pub fn check_score(field: ScoreField, value: f64) -> GradeResult<CheckedScore> {
    if !value.is_finite() {
        return Err(GradeError::Validation(format!(
            "{} must be a number",
            field.as_str()
        )));
    }
    if !(WRITE_MIN..=WRITE_MAX).contains(&value) {
        return Err(GradeError::Validation(format!(
            "{} must be between {} and {}",
            field.as_str(),
            WRITE_MIN,
            WRITE_MAX
        )));
    }
    let bounds = field.bounds();
    if bounds.contains(value) {
        return Ok(CheckedScore {
            value,
            clamped_from: None,
        });
    }
    Ok(CheckedScore {
        value: bounds.clamp(value),
        clamped_from: Some(value),
    })
}
