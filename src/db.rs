use crate::error::{GradeError, GradeResult};
use crate::fields::ScoreField;
use crate::model::{SpecialCase, StudentGrade};
use crate::reorder::{merge_into_slots, ReorderBackend};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradesheet.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            date_of_birth TEXT,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    // Older workspaces predate special cases and edit timestamps.
    ensure_students_special_case(&conn)?;
    ensure_students_updated_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            student_id TEXT NOT NULL,
            term INTEGER NOT NULL,
            behavior REAL,
            applications REAL,
            notebook REAL,
            assignment REAL,
            exam REAL,
            updated_at TEXT,
            PRIMARY KEY(student_id, term),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            type TEXT NOT NULL,
            year TEXT NOT NULL,
            term INTEGER NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student_period
         ON attendance_records(student_id, year, term)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_type_date ON attendance_records(type, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_students_special_case(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "special_case")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN special_case TEXT", [])?;
    Ok(())
}

fn ensure_students_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn class_exists(conn: &Connection, class_id: &str) -> GradeResult<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

/// Class the student currently belongs to.
pub fn student_class_id(conn: &Connection, student_id: &str) -> GradeResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT class_id FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?)
}

pub fn class_student_ids(conn: &Connection, class_id: &str) -> GradeResult<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT id FROM students WHERE class_id = ? ORDER BY sort_order, rowid")?;
    let ids = stmt
        .query_map([class_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Grade rows for one class and term in roster order. Students with no
/// stored row, or with a NULL column, get the field default.
pub fn load_student_grades(
    conn: &Connection,
    class_id: &str,
    term: i64,
) -> GradeResult<Vec<StudentGrade>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.class_id, s.last_name, s.first_name, s.date_of_birth, s.special_case,
                g.behavior, g.applications, g.notebook, g.assignment, g.exam
         FROM students s
         LEFT JOIN grades g ON g.student_id = s.id AND g.term = ?
         WHERE s.class_id = ?
         ORDER BY s.sort_order, s.rowid",
    )?;
    let or_default =
        |v: Option<f64>, field: ScoreField| v.unwrap_or_else(|| field.bounds().default);
    let rows = stmt
        .query_map((term, class_id), |r| {
            let special: Option<String> = r.get(5)?;
            Ok(StudentGrade {
                id: r.get(0)?,
                class_id: r.get(1)?,
                last_name: r.get(2)?,
                first_name: r.get(3)?,
                date_of_birth: r.get(4)?,
                special_case: special.as_deref().and_then(SpecialCase::parse),
                behavior: or_default(r.get(6)?, ScoreField::Behavior),
                applications: or_default(r.get(7)?, ScoreField::Applications),
                notebook: or_default(r.get(8)?, ScoreField::Notebook),
                assignment: or_default(r.get(9)?, ScoreField::Assignment),
                exam: or_default(r.get(10)?, ScoreField::Exam),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Stores one grade column for (student, term), creating the row if needed.
pub fn upsert_grade(
    conn: &Connection,
    student_id: &str,
    term: i64,
    field: ScoreField,
    value: f64,
) -> GradeResult<()> {
    // Column names come from the fixed field table, never from input.
    let sql = format!(
        "INSERT INTO grades(student_id, term, {col}, updated_at) VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, term) DO UPDATE SET
           {col} = excluded.{col},
           updated_at = excluded.updated_at",
        col = field.column()
    );
    conn.execute(&sql, (student_id, term, value, now_rfc3339()))?;
    Ok(())
}

/// Persists a class ordering. `ordered` is either every student of the class
/// or a subset (the rows visible under a filter); a subset is written into
/// the positions its members already hold.
pub fn write_class_order(conn: &Connection, class_id: &str, ordered: &[String]) -> GradeResult<()> {
    if !class_exists(conn, class_id)? {
        return Err(GradeError::NotFound("class"));
    }
    let current = class_student_ids(conn, class_id)?;
    let current_set: HashSet<&String> = current.iter().collect();
    let mut seen: HashSet<&String> = HashSet::new();
    for id in ordered {
        if !seen.insert(id) {
            return Err(GradeError::Validation(format!(
                "orderedStudentIds contains duplicate studentId {}",
                id
            )));
        }
        if !current_set.contains(id) {
            return Err(GradeError::Validation(format!(
                "orderedStudentIds contains unknown studentId {}",
                id
            )));
        }
    }

    let merged = merge_into_slots(&current, ordered);
    let tx = conn.unchecked_transaction()?;
    for (i, sid) in merged.iter().enumerate() {
        tx.execute(
            "UPDATE students SET sort_order = ? WHERE id = ? AND class_id = ?",
            (i as i64, sid, class_id),
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Ordering backend over the workspace database.
pub struct SqliteOrder<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteOrder<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl ReorderBackend for SqliteOrder<'_> {
    fn persist_order(&mut self, class_id: &str, ordered_ids: &[String]) -> GradeResult<()> {
        write_class_order(self.conn, class_id, ordered_ids)
    }

    fn fetch_order(&mut self, class_id: &str) -> GradeResult<Vec<String>> {
        class_student_ids(self.conn, class_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open db");
        conn.execute("INSERT INTO classes(id, name) VALUES('c1', '4AM2')", [])
            .expect("class");
        for (i, (id, last)) in [("a", "Benameur"), ("b", "Cherif"), ("c", "Djebbar")]
            .iter()
            .enumerate()
        {
            conn.execute(
                "INSERT INTO students(id, class_id, last_name, first_name, sort_order)
                 VALUES(?, 'c1', ?, 'X', ?)",
                (id, last, i as i64),
            )
            .expect("student");
        }
        (dir, conn)
    }

    #[test]
    fn reopen_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        drop(open_db(dir.path()).expect("first open"));
        let conn = open_db(dir.path()).expect("second open");
        assert!(table_has_column(&conn, "students", "special_case").expect("pragma"));
        assert!(dir.path().join(DB_FILE_NAME).is_file());
    }

    #[test]
    fn missing_grade_rows_use_field_defaults() {
        let (_dir, conn) = seeded();
        upsert_grade(&conn, "b", 1, ScoreField::Exam, 13.5).expect("upsert");
        upsert_grade(&conn, "b", 1, ScoreField::Behavior, 2.0).expect("upsert");

        let rows = load_student_grades(&conn, "c1", 1).expect("load");
        assert_eq!(rows.len(), 3);
        let a = &rows[0];
        assert_eq!(
            (a.behavior, a.applications, a.notebook, a.assignment, a.exam),
            (5.0, 5.0, 5.0, 0.0, 0.0)
        );
        let b = &rows[1];
        assert_eq!((b.behavior, b.applications, b.exam), (2.0, 5.0, 13.5));

        // Other terms are independent.
        let t2 = load_student_grades(&conn, "c1", 2).expect("load t2");
        assert_eq!(t2[1].exam, 0.0);
    }

    #[test]
    fn settings_round_trip() {
        let (_dir, conn) = seeded();
        assert_eq!(settings_get_json(&conn, "k").expect("get"), None);
        settings_set_json(&conn, "k", &serde_json::json!({ "a": 1 })).expect("set");
        settings_set_json(&conn, "k", &serde_json::json!({ "a": 2 })).expect("set");
        assert_eq!(
            settings_get_json(&conn, "k").expect("get"),
            Some(serde_json::json!({ "a": 2 }))
        );
    }

    #[test]
    fn class_order_accepts_full_and_subset_orderings() {
        let (_dir, conn) = seeded();
        let ids = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        write_class_order(&conn, "c1", &ids(&["c", "a", "b"])).expect("full");
        assert_eq!(class_student_ids(&conn, "c1").expect("ids"), ids(&["c", "a", "b"]));

        write_class_order(&conn, "c1", &ids(&["b", "c"])).expect("subset");
        assert_eq!(class_student_ids(&conn, "c1").expect("ids"), ids(&["b", "a", "c"]));

        assert!(matches!(
            write_class_order(&conn, "c1", &ids(&["a", "a"])),
            Err(GradeError::Validation(_))
        ));
        assert!(matches!(
            write_class_order(&conn, "c1", &ids(&["zz"])),
            Err(GradeError::Validation(_))
        ));
        assert!(matches!(
            write_class_order(&conn, "nope", &ids(&["a"])),
            Err(GradeError::NotFound(_))
        ));
    }
}
