use crate::db;
use crate::fields::{check_score, ScoreField};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_required_str, get_term, not_found, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use tracing::{info, warn};

fn grades_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let term = get_term(params)?;
    if !db::class_exists(conn, &class_id)? {
        return Err(not_found("class"));
    }
    let rows = db::load_student_grades(conn, &class_id, term)?;
    let fields: Vec<serde_json::Value> = ScoreField::ALL
        .iter()
        .map(|f| {
            let b = f.bounds();
            json!({
                "field": f.as_str(),
                "min": b.min,
                "max": b.max,
                "step": b.step,
                "default": b.default
            })
        })
        .collect();
    Ok(json!({ "term": term, "fields": fields, "grades": rows }))
}

/// Accepts a JSON number or a numeric string; anything else is not a grade.
fn parse_value(v: Option<&serde_json::Value>) -> Result<f64, HandlerErr> {
    let Some(v) = v else {
        return Err(HandlerErr::bad_params("missing value"));
    };
    let n = match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(x) if x.is_finite() => Ok(x),
        _ => Err(HandlerErr::bad_params("value must be a number")),
    }
}

fn grades_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let term = get_term(params)?;
    let field_raw = get_required_str(params, "field")?;
    let Some(field) = ScoreField::parse(&field_raw) else {
        return Err(HandlerErr::bad_params(format!("unknown field: {}", field_raw))
            .with_details(json!({
                "allowed": ScoreField::ALL.iter().map(|f| f.as_str()).collect::<Vec<_>>()
            })));
    };
    let value = parse_value(params.get("value"))?;
    let checked = check_score(field, value)?;

    if db::student_class_id(conn, &student_id)?.is_none() {
        return Err(not_found("student"));
    }
    db::upsert_grade(conn, &student_id, term, field, checked.value)?;

    let warning = checked.clamped_from.map(|raw| {
        warn!(
            student_id = %student_id,
            field = field.as_str(),
            submitted = raw,
            stored = checked.value,
            "grade clamped to field range"
        );
        let b = field.bounds();
        format!(
            "{} must be between {} and {}; stored {}",
            field.as_str(),
            b.min,
            b.max,
            checked.value
        )
    });

    info!(student_id = %student_id, term, field = field.as_str(), "grade updated");
    Ok(json!({
        "studentId": student_id,
        "term": term,
        "field": field.as_str(),
        "value": checked.value,
        "warning": warning
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.get" => Some(with_db(state, req, grades_get)),
        "grades.update" => Some(with_db(state, req, grades_update)),
        _ => None,
    }
}
