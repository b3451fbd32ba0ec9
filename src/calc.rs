use crate::attendance::{count_absences, count_tardiness, AttendanceStore};
use crate::error::GradeResult;
use crate::fields::ScoreField;
use crate::model::{CalculatedStudentGrade, Period, Remark, StudentGrade};

/// Credit each attendance component starts from before incidents are deducted.
const ATTENDANCE_CREDIT: u32 = 5;
const COMPONENT_MAX_TOTAL: f64 = 25.0;
const SCALE: f64 = 20.0;

/// Two-decimal rounding used for every derived score: `round(100*x) / 100`.
pub fn round_2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// One-decimal rounding used for percentages.
pub fn round_1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn attendance_credit(count: u32) -> f64 {
    f64::from(ATTENDANCE_CREDIT.saturating_sub(count))
}

/// Continuous-assessment score on a 0–20 scale.
///
/// The three observed scores are clamped to [0,5]. Tardiness and absence each
/// contribute `max(0, 5 - count)`. The five components (at most 25) are
/// rescaled to 20 and rounded to two decimals.
pub fn calculate_continuous_assessment(
    behavior: f64,
    applications: f64,
    notebook: f64,
    tardiness_count: u32,
    absence_count: u32,
) -> f64 {
    let observed = ScoreField::Behavior.bounds().clamp(behavior)
        + ScoreField::Applications.bounds().clamp(applications)
        + ScoreField::Notebook.bounds().clamp(notebook);
    let total = observed + attendance_credit(tardiness_count) + attendance_credit(absence_count);
    round_2(total * SCALE / COMPONENT_MAX_TOTAL)
}

/// Unweighted mean of the three marks, two decimals.
pub fn calculate_final_average(activity_average: f64, assignment: f64, exam: f64) -> f64 {
    round_2((activity_average + assignment + exam) / 3.0)
}

pub fn remarks_key(average: f64) -> Remark {
    if average >= 16.0 {
        Remark::Excellent
    } else if average >= 14.0 {
        Remark::VeryGood
    } else if average >= 12.0 {
        Remark::Good
    } else if average >= 10.0 {
        Remark::Average
    } else {
        Remark::Poor
    }
}

pub fn calculate_student(grade: &StudentGrade, absences: u32, lateness: u32) -> CalculatedStudentGrade {
    let activity_average = calculate_continuous_assessment(
        grade.behavior,
        grade.applications,
        grade.notebook,
        lateness,
        absences,
    );
    let final_average = calculate_final_average(activity_average, grade.assignment, grade.exam);
    CalculatedStudentGrade {
        grade: grade.clone(),
        lateness,
        absences,
        activity_average,
        final_average,
        remarks: remarks_key(final_average),
    }
}

/// Projects raw grade rows into calculated rows for one period. Counts are
/// read from `attendance` on every call.
pub fn calculate_class(
    grades: &[StudentGrade],
    attendance: &dyn AttendanceStore,
    period: &Period,
) -> GradeResult<Vec<CalculatedStudentGrade>> {
    let mut out = Vec::with_capacity(grades.len());
    for g in grades {
        let absences = count_absences(attendance, &g.id, period)?;
        let lateness = count_tardiness(attendance, &g.id, period)?;
        out.push(calculate_student(g, absences, lateness));
    }
    Ok(out)
}
