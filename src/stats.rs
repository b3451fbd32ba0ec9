use crate::calc::{round_1, round_2};
use crate::model::CalculatedStudentGrade;
use serde::Serialize;

pub const PASS_MARK: f64 = 10.0;

/// Class-wide summary shown above the grade sheet. Rates and the average are
/// preformatted strings so the UI never renders `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStatistics {
    pub total: usize,
    pub special_case_count: usize,
    pub class_average: String,
    pub pass_count: usize,
    pub fail_count: usize,
    pub pass_rate: String,
    pub fail_rate: String,
}

/// Summarises the unfiltered calculated set. Special cases are counted but
/// never enter the average or the pass/fail split.
pub fn class_statistics(students: &[CalculatedStudentGrade]) -> ClassStatistics {
    let (special, regular): (Vec<_>, Vec<_>) =
        students.iter().partition(|s| s.grade.is_special_case());

    let total = regular.len();
    if total == 0 {
        return ClassStatistics {
            total: 0,
            special_case_count: special.len(),
            class_average: "0.00".to_string(),
            pass_count: 0,
            fail_count: 0,
            pass_rate: "0.0".to_string(),
            fail_rate: "0.0".to_string(),
        };
    }

    let sum: f64 = regular.iter().map(|s| s.final_average).sum();
    let pass_count = regular
        .iter()
        .filter(|s| s.final_average >= PASS_MARK)
        .count();
    let fail_count = total - pass_count;

    // Fail rate is derived from the rounded pass rate so the two always sum to 100.
    let pass_rate = round_1(100.0 * pass_count as f64 / total as f64);
    let fail_rate = round_1(100.0 - pass_rate);

    ClassStatistics {
        total,
        special_case_count: special.len(),
        class_average: format!("{:.2}", round_2(sum / total as f64)),
        pass_count,
        fail_count,
        pass_rate: format!("{:.1}", pass_rate),
        fail_rate: format!("{:.1}", fail_rate),
    }
}
