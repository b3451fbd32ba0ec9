use crate::attendance::AttendanceStore;
use crate::error::{GradeError, GradeResult};
use crate::model::{AttendanceType, CalculatedStudentGrade};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Id,
    ClassId,
    LastName,
    FirstName,
    DateOfBirth,
    Behavior,
    Applications,
    Notebook,
    Assignment,
    Exam,
    SpecialCase,
    Lateness,
    Absences,
    ActivityAverage,
    FinalAverage,
    Remarks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Asc,
    Desc,
    #[default]
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradeSheetFilters {
    pub search_query: String,
    pub sort_field: Option<SortField>,
    pub sort_direction: SortDirection,
    pub show_special_cases_only: bool,
    pub show_absences_only: bool,
    pub absence_filter_date: Option<String>,
    pub show_lateness_only: bool,
}

impl GradeSheetFilters {
    /// The absence date in the stored `YYYY-MM-DD` form, so "2024-1-4"
    /// matches records on 2024-01-04. Non-calendar dates are rejected.
    fn absence_date(&self) -> GradeResult<Option<String>> {
        let Some(d) = self
            .absence_filter_date
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        else {
            return Ok(None);
        };
        NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map(|date| Some(date.format("%Y-%m-%d").to_string()))
            .map_err(|_| GradeError::Validation("absenceFilterDate must be YYYY-MM-DD".into()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheetView {
    pub students: Vec<CalculatedStudentGrade>,
    pub group_split_index: usize,
}

impl GradeSheetView {
    pub fn group_one(&self) -> &[CalculatedStudentGrade] {
        &self.students[..self.group_split_index]
    }

    pub fn group_two(&self) -> &[CalculatedStudentGrade] {
        &self.students[self.group_split_index..]
    }

    pub fn ids(&self) -> Vec<String> {
        self.students.iter().map(|s| s.grade.id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Text(String),
    Number(f64),
}

fn text(v: Option<&str>) -> SortValue {
    SortValue::Text(v.unwrap_or("").to_string())
}

fn sort_value(s: &CalculatedStudentGrade, field: SortField) -> SortValue {
    let g = &s.grade;
    match field {
        SortField::Id => text(Some(g.id.as_str())),
        SortField::ClassId => text(Some(g.class_id.as_str())),
        SortField::LastName => text(Some(g.last_name.as_str())),
        SortField::FirstName => text(Some(g.first_name.as_str())),
        SortField::DateOfBirth => text(g.date_of_birth.as_deref()),
        SortField::SpecialCase => text(g.special_case.as_ref().map(|c| c.as_str())),
        SortField::Remarks => text(Some(s.remarks.as_str())),
        SortField::Behavior => SortValue::Number(g.behavior),
        SortField::Applications => SortValue::Number(g.applications),
        SortField::Notebook => SortValue::Number(g.notebook),
        SortField::Assignment => SortValue::Number(g.assignment),
        SortField::Exam => SortValue::Number(g.exam),
        SortField::Lateness => SortValue::Number(f64::from(s.lateness)),
        SortField::Absences => SortValue::Number(f64::from(s.absences)),
        SortField::ActivityAverage => SortValue::Number(s.activity_average),
        SortField::FinalAverage => SortValue::Number(s.final_average),
    }
}

fn fold_char(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

fn collation_key(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(fold_char)
        .collect()
}

/// Dictionary-style comparison: case and accents only break ties.
pub fn locale_compare(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.cmp(b))
}

fn compare_values(a: &SortValue, b: &SortValue) -> Ordering {
    match (a, b) {
        (SortValue::Text(x), SortValue::Text(y)) => locale_compare(x, y),
        (SortValue::Number(x), SortValue::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

fn matches_search(s: &CalculatedStudentGrade, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let g = &s.grade;
    [&g.first_name, &g.last_name, &g.id]
        .iter()
        .any(|hay| hay.to_lowercase().contains(needle))
}

/// Runs search, special-case, absence and lateness filters in that order,
/// then sorts and computes the group split.
pub fn apply_filters(
    students: &[CalculatedStudentGrade],
    filters: &GradeSheetFilters,
    attendance: &dyn AttendanceStore,
) -> GradeResult<GradeSheetView> {
    let absence_date = filters.absence_date()?;

    let needle = filters.search_query.to_lowercase();
    let mut rows: Vec<CalculatedStudentGrade> = students
        .iter()
        .filter(|s| matches_search(s, &needle))
        .cloned()
        .collect();

    if filters.show_special_cases_only {
        rows.retain(|s| s.grade.is_special_case());
    }

    if filters.show_absences_only {
        match absence_date {
            Some(date) => {
                let absent = attendance.students_with_record_on(AttendanceType::Absence, &date)?;
                rows.retain(|s| absent.contains(&s.grade.id));
            }
            None => rows.retain(|s| s.absences > 0),
        }
    }

    if filters.show_lateness_only {
        rows.retain(|s| s.lateness > 0);
    }

    if let Some(field) = filters.sort_field {
        match filters.sort_direction {
            SortDirection::Asc => {
                rows.sort_by(|a, b| compare_values(&sort_value(a, field), &sort_value(b, field)))
            }
            SortDirection::Desc => {
                rows.sort_by(|a, b| compare_values(&sort_value(b, field), &sort_value(a, field)))
            }
            SortDirection::None => {}
        }
    }

    let group_split_index = rows.len().div_ceil(2);
    Ok(GradeSheetView {
        students: rows,
        group_split_index,
    })
}
