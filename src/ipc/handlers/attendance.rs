use crate::attendance::{count_absences, count_tardiness, AttendanceStore, NewAttendance, SqliteAttendance};
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_period, get_required_str, not_found, with_db};
use crate::ipc::types::{AppState, Request};
use crate::model::AttendanceType;
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

fn attendance_add(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let date = get_required_str(params, "date")?;
    let time = get_required_str(params, "time")?;
    let kind_raw = get_required_str(params, "type")?;
    let Some(kind) = AttendanceType::parse(&kind_raw) else {
        return Err(HandlerErr::bad_params("type must be absence or tardiness"));
    };
    let period = get_period(params)?;

    let mut store = SqliteAttendance::new(conn);
    let record = store.add(NewAttendance {
        student_id,
        date,
        time,
        kind,
        period,
    })?;

    info!(
        student_id = %record.student_id,
        kind = record.kind.as_str(),
        date = %record.date,
        "attendance recorded"
    );
    Ok(json!({ "recordId": record.id, "record": record }))
}

fn attendance_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let record_id = get_required_str(params, "recordId")?;
    let mut store = SqliteAttendance::new(conn);
    if !store.remove(&record_id)? {
        return Err(not_found("attendance record"));
    }
    info!(record_id = %record_id, "attendance deleted");
    Ok(json!({ "ok": true }))
}

fn attendance_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let period = get_period(params)?;
    if db::student_class_id(conn, &student_id)?.is_none() {
        return Err(not_found("student"));
    }
    let store = SqliteAttendance::new(conn);
    let records = store.list_by_student_period(&student_id, &period)?;
    Ok(json!({ "records": records }))
}

/// Per-student absence and lateness counts for one class and period.
fn attendance_class_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let period = get_period(params)?;
    if !db::class_exists(conn, &class_id)? {
        return Err(not_found("class"));
    }

    let store = SqliteAttendance::new(conn);
    let mut rows = Vec::new();
    let mut total_absences = 0u32;
    let mut total_lateness = 0u32;
    for student_id in db::class_student_ids(conn, &class_id)? {
        let absences = count_absences(&store, &student_id, &period)?;
        let lateness = count_tardiness(&store, &student_id, &period)?;
        total_absences += absences;
        total_lateness += lateness;
        rows.push(json!({
            "studentId": student_id,
            "absences": absences,
            "lateness": lateness
        }));
    }

    Ok(json!({
        "year": period.year,
        "term": period.term,
        "students": rows,
        "totals": { "absences": total_absences, "lateness": total_lateness }
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.add" => Some(with_db(state, req, attendance_add)),
        "attendance.delete" => Some(with_db(state, req, attendance_delete)),
        "attendance.list" => Some(with_db(state, req, attendance_list)),
        "attendance.classSummary" => Some(with_db(state, req, attendance_class_summary)),
        _ => None,
    }
}
