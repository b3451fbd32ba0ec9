use serde::{Deserialize, Serialize};
use std::fmt;

pub const TERMS: std::ops::RangeInclusive<i64> = 1..=3;

/// Why a student is kept out of class statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SpecialCase {
    LongAbsence,
    Exemption,
    Medical,
    Transfer,
    Other(String),
}

impl SpecialCase {
    /// Blank input means "no special case".
    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim();
        if t.is_empty() {
            return None;
        }
        Some(Self::from(t.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::LongAbsence => "long_absence",
            Self::Exemption => "exemption",
            Self::Medical => "medical",
            Self::Transfer => "transfer",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for SpecialCase {
    fn from(s: String) -> Self {
        match s.as_str() {
            "long_absence" => Self::LongAbsence,
            "exemption" => Self::Exemption,
            "medical" => Self::Medical,
            "transfer" => Self::Transfer,
            _ => Self::Other(s),
        }
    }
}

impl From<SpecialCase> for String {
    fn from(c: SpecialCase) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for SpecialCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGrade {
    pub id: String,
    pub class_id: String,
    pub last_name: String,
    pub first_name: String,
    pub date_of_birth: Option<String>,
    pub behavior: f64,
    pub applications: f64,
    pub notebook: f64,
    pub assignment: f64,
    pub exam: f64,
    pub special_case: Option<SpecialCase>,
}

impl StudentGrade {
    pub fn is_special_case(&self) -> bool {
        self.special_case
            .as_ref()
            .map(|c| !c.as_str().trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Remark {
    Excellent,
    VeryGood,
    Good,
    Average,
    Poor,
}

impl Remark {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::VeryGood => "veryGood",
            Self::Good => "good",
            Self::Average => "average",
            Self::Poor => "poor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedStudentGrade {
    #[serde(flatten)]
    pub grade: StudentGrade,
    pub lateness: u32,
    pub absences: u32,
    pub activity_average: f64,
    pub final_average: f64,
    pub remarks: Remark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttendanceType {
    Absence,
    Tardiness,
}

impl AttendanceType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "absence" => Some(Self::Absence),
            "tardiness" => Some(Self::Tardiness),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absence => "absence",
            Self::Tardiness => "tardiness",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub date: String,
    pub time: String,
    #[serde(rename = "type")]
    pub kind: AttendanceType,
    pub year: String,
    pub term: i64,
}

/// School year plus term the grade sheet is looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub year: String,
    pub term: i64,
}

impl Period {
    pub fn new(year: impl Into<String>, term: i64) -> Self {
        Self {
            year: year.into(),
            term,
        }
    }
}
