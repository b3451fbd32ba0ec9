use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_required_str, not_found, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

fn classes_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    // Correlated subquery so the count never multiplies rows.
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count
         FROM classes c
         ORDER BY c.name",
    )?;
    let classes = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let student_count: i64 = row.get(2)?;
            Ok(json!({
                "id": id,
                "name": name,
                "studentCount": student_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "classes": classes }))
}

fn classes_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name) VALUES(?, ?)",
        (&class_id, &name),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "classes" }))
    })?;

    info!(class_id = %class_id, "class created");
    Ok(json!({ "classId": class_id, "name": name }))
}

fn classes_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    if !db::class_exists(conn, &class_id)? {
        return Err(not_found("class"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    // Explicit dependency order; the schema has no ON DELETE CASCADE.
    let steps: [(&str, &str); 4] = [
        (
            "attendance_records",
            "DELETE FROM attendance_records
             WHERE student_id IN (SELECT id FROM students WHERE class_id = ?)",
        ),
        (
            "grades",
            "DELETE FROM grades
             WHERE student_id IN (SELECT id FROM students WHERE class_id = ?)",
        ),
        ("students", "DELETE FROM students WHERE class_id = ?"),
        ("classes", "DELETE FROM classes WHERE id = ?"),
    ];
    for (table, sql) in steps {
        tx.execute(sql, [&class_id]).map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string()).with_details(json!({ "table": table }))
        })?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    info!(class_id = %class_id, "class deleted");
    Ok(json!({ "ok": true }))
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    // No workspace yet is an empty dashboard, not an error.
    if state.db.is_none() {
        return crate::ipc::error::ok(&req.id, json!({ "classes": [] }));
    }
    with_db(state, req, |conn, _| classes_list(conn))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(with_db(state, req, classes_create)),
        "classes.delete" => Some(with_db(state, req, classes_delete)),
        _ => None,
    }
}
