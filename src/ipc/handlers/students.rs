use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_optional_str, get_required_str, not_found, with_db};
use crate::ipc::types::{AppState, Request};
use crate::model::SpecialCase;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

fn require_class(conn: &Connection, class_id: &str) -> Result<(), HandlerErr> {
    if db::class_exists(conn, class_id)? {
        Ok(())
    } else {
        Err(not_found("class"))
    }
}

fn parse_name(v: Option<String>, key: &str) -> Result<String, HandlerErr> {
    match v {
        Some(s) if !s.is_empty() => Ok(s),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must not be empty", key))),
        None => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

/// Blank clears the date; anything else must be a calendar date.
fn parse_date_of_birth(raw: Option<String>) -> Result<Option<String>, HandlerErr> {
    match raw.filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(|d| Some(d.format("%Y-%m-%d").to_string()))
            .map_err(|_| HandlerErr::bad_params("dateOfBirth must be YYYY-MM-DD")),
    }
}

fn next_sort_order(conn: &Connection, class_id: &str) -> Result<i64, HandlerErr> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(sort_order) FROM students WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )?;
    Ok(max.map(|m| m + 1).unwrap_or(0))
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    require_class(conn, &class_id)?;

    let mut stmt = conn.prepare(
        "SELECT id, last_name, first_name, date_of_birth, special_case, sort_order, updated_at
         FROM students
         WHERE class_id = ?
         ORDER BY sort_order, rowid",
    )?;
    let students = stmt
        .query_map([&class_id], |row| {
            let id: String = row.get(0)?;
            let last_name: String = row.get(1)?;
            let first_name: String = row.get(2)?;
            let date_of_birth: Option<String> = row.get(3)?;
            let special_case: Option<String> = row.get(4)?;
            let sort_order: i64 = row.get(5)?;
            let updated_at: Option<String> = row.get(6)?;
            Ok(json!({
                "id": id,
                "classId": class_id,
                "lastName": last_name,
                "firstName": first_name,
                "displayName": format!("{}, {}", last_name, first_name),
                "dateOfBirth": date_of_birth,
                "specialCase": special_case,
                "sortOrder": sort_order,
                "updatedAt": updated_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    Ok(json!({ "students": students }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let last_name = parse_name(get_optional_str(params, "lastName")?, "lastName")?;
    let first_name = parse_name(get_optional_str(params, "firstName")?, "firstName")?;
    let date_of_birth = parse_date_of_birth(get_optional_str(params, "dateOfBirth")?)?;
    let special_case = get_optional_str(params, "specialCase")?
        .as_deref()
        .and_then(SpecialCase::parse);
    require_class(conn, &class_id)?;

    let student_id = Uuid::new_v4().to_string();
    let sort_order = next_sort_order(conn, &class_id)?;
    conn.execute(
        "INSERT INTO students(id, class_id, last_name, first_name, date_of_birth, special_case, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &class_id,
            &last_name,
            &first_name,
            &date_of_birth,
            special_case.as_ref().map(|c| c.as_str()),
            sort_order,
            db::now_rfc3339(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "students" }))
    })?;

    info!(class_id = %class_id, student_id = %student_id, "student created");
    Ok(json!({ "studentId": student_id, "sortOrder": sort_order }))
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    if db::student_class_id(conn, &student_id)?.is_none() {
        return Err(not_found("student"));
    }

    let mut sets: Vec<&'static str> = Vec::new();
    let mut values: Vec<Option<String>> = Vec::new();
    for (k, v) in patch {
        let as_opt_str = || -> Result<Option<String>, HandlerErr> {
            if v.is_null() {
                return Ok(None);
            }
            v.as_str()
                .map(|s| Some(s.trim().to_string()))
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string or null", k)))
        };
        match k.as_str() {
            "lastName" => {
                sets.push("last_name = ?");
                values.push(Some(parse_name(as_opt_str()?, k)?));
            }
            "firstName" => {
                sets.push("first_name = ?");
                values.push(Some(parse_name(as_opt_str()?, k)?));
            }
            "dateOfBirth" => {
                sets.push("date_of_birth = ?");
                values.push(parse_date_of_birth(as_opt_str()?)?);
            }
            "specialCase" => {
                sets.push("special_case = ?");
                values.push(
                    as_opt_str()?
                        .as_deref()
                        .and_then(SpecialCase::parse)
                        .map(|c| c.as_str().to_string()),
                );
            }
            _ => return Err(HandlerErr::bad_params(format!("unknown patch field: {}", k))),
        }
    }
    if sets.is_empty() {
        return Ok(json!({ "ok": true }));
    }

    sets.push("updated_at = ?");
    values.push(Some(db::now_rfc3339()));
    let sql = format!("UPDATE students SET {} WHERE id = ?", sets.join(", "));
    let mut bind: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
    bind.push(&student_id);
    conn.execute(&sql, rusqlite::params_from_iter(bind))
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string()).with_details(json!({ "table": "students" }))
        })?;

    info!(student_id = %student_id, "student updated");
    Ok(json!({ "ok": true }))
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if db::student_class_id(conn, &student_id)?.is_none() {
        return Err(not_found("student"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for (table, sql) in [
        ("attendance_records", "DELETE FROM attendance_records WHERE student_id = ?"),
        ("grades", "DELETE FROM grades WHERE student_id = ?"),
        ("students", "DELETE FROM students WHERE id = ?"),
    ] {
        tx.execute(sql, [&student_id]).map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string()).with_details(json!({ "table": table }))
        })?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    info!(student_id = %student_id, "student deleted");
    Ok(json!({ "ok": true }))
}

fn students_move(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let target_class_id = get_required_str(params, "targetClassId")?;
    let Some(from_class_id) = db::student_class_id(conn, &student_id)? else {
        return Err(not_found("student"));
    };
    require_class(conn, &target_class_id)?;
    if from_class_id == target_class_id {
        return Ok(json!({ "ok": true, "moved": false }));
    }

    let sort_order = next_sort_order(conn, &target_class_id)?;
    conn.execute(
        "UPDATE students SET class_id = ?, sort_order = ?, updated_at = ? WHERE id = ?",
        (&target_class_id, sort_order, db::now_rfc3339(), &student_id),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string()).with_details(json!({ "table": "students" }))
    })?;

    info!(
        student_id = %student_id,
        from = %from_class_id,
        to = %target_class_id,
        "student moved"
    );
    Ok(json!({ "ok": true, "moved": true, "sortOrder": sort_order }))
}

fn students_reorder(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let Some(raw) = params.get("orderedStudentIds").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing orderedStudentIds"));
    };
    let ordered = raw
        .iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| HandlerErr::bad_params("orderedStudentIds must be strings"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    db::write_class_order(conn, &class_id, &ordered)?;
    info!(class_id = %class_id, count = ordered.len(), "students reordered");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_db(state, req, students_list)),
        "students.create" => Some(with_db(state, req, students_create)),
        "students.update" => Some(with_db(state, req, students_update)),
        "students.delete" => Some(with_db(state, req, students_delete)),
        "students.move" => Some(with_db(state, req, students_move)),
        "students.reorder" => Some(with_db(state, req, students_reorder)),
        _ => None,
    }
}
