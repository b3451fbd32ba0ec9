use crate::error::{GradeError, GradeResult};
use crate::model::{AttendanceRecord, AttendanceType, Period, TERMS};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use std::collections::HashSet;
use uuid::Uuid;

/// An attendance incident as submitted, before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttendance {
    pub student_id: String,
    pub date: String,
    pub time: String,
    pub kind: AttendanceType,
    pub period: Period,
}

impl NewAttendance {
    /// Normalises date to `YYYY-MM-DD` and time to `HH:MM`.
    pub fn validate(mut self) -> GradeResult<Self> {
        if self.student_id.trim().is_empty() {
            return Err(GradeError::Validation("studentId must not be empty".into()));
        }
        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d")
            .map_err(|_| GradeError::Validation("date must be YYYY-MM-DD".into()))?;
        let time = NaiveTime::parse_from_str(self.time.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(self.time.trim(), "%H:%M:%S"))
            .map_err(|_| GradeError::Validation("time must be HH:MM".into()))?;
        if self.period.year.trim().is_empty() {
            return Err(GradeError::Validation("year must not be empty".into()));
        }
        if !TERMS.contains(&self.period.term) {
            return Err(GradeError::Validation("term must be 1, 2 or 3".into()));
        }
        self.date = date.format("%Y-%m-%d").to_string();
        self.time = time.format("%H:%M").to_string();
        self.period.year = self.period.year.trim().to_string();
        Ok(self)
    }
}

/// Query surface shared by every feature that reads attendance.
pub trait AttendanceStore {
    fn add(&mut self, record: NewAttendance) -> GradeResult<AttendanceRecord>;

    /// Returns false when no record had that id.
    fn remove(&mut self, record_id: &str) -> GradeResult<bool>;

    fn count_by_student_period(
        &self,
        student_id: &str,
        kind: AttendanceType,
        period: &Period,
    ) -> GradeResult<u32>;

    fn list_by_student_period(
        &self,
        student_id: &str,
        period: &Period,
    ) -> GradeResult<Vec<AttendanceRecord>>;

    /// Student ids with at least one record of `kind` on exactly `date`.
    fn students_with_record_on(
        &self,
        kind: AttendanceType,
        date: &str,
    ) -> GradeResult<HashSet<String>>;
}

pub fn count_absences(
    store: &dyn AttendanceStore,
    student_id: &str,
    period: &Period,
) -> GradeResult<u32> {
    store.count_by_student_period(student_id, AttendanceType::Absence, period)
}

pub fn count_tardiness(
    store: &dyn AttendanceStore,
    student_id: &str,
    period: &Period,
) -> GradeResult<u32> {
    store.count_by_student_period(student_id, AttendanceType::Tardiness, period)
}

/// In-process store for tests and callers without a workspace database.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryAttendance {
    records: Vec<AttendanceRecord>,
}

#[cfg(test)]
impl MemoryAttendance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }
}

#[cfg(test)]
impl AttendanceStore for MemoryAttendance {
    fn add(&mut self, record: NewAttendance) -> GradeResult<AttendanceRecord> {
        let r = record.validate()?;
        let stored = AttendanceRecord {
            id: Uuid::new_v4().to_string(),
            student_id: r.student_id,
            date: r.date,
            time: r.time,
            kind: r.kind,
            year: r.period.year,
            term: r.period.term,
        };
        self.records.push(stored.clone());
        Ok(stored)
    }

    fn remove(&mut self, record_id: &str) -> GradeResult<bool> {
        let before = self.records.len();
        self.records.retain(|r| r.id != record_id);
        Ok(self.records.len() != before)
    }

    fn count_by_student_period(
        &self,
        student_id: &str,
        kind: AttendanceType,
        period: &Period,
    ) -> GradeResult<u32> {
        let n = self
            .records
            .iter()
            .filter(|r| {
                r.student_id == student_id
                    && r.kind == kind
                    && r.year == period.year
                    && r.term == period.term
            })
            .count();
        Ok(n as u32)
    }

    fn list_by_student_period(
        &self,
        student_id: &str,
        period: &Period,
    ) -> GradeResult<Vec<AttendanceRecord>> {
        let mut out: Vec<AttendanceRecord> = self
            .records
            .iter()
            .filter(|r| r.student_id == student_id && r.year == period.year && r.term == period.term)
            .cloned()
            .collect();
        out.sort_by(|a, b| (&a.date, &a.time).cmp(&(&b.date, &b.time)));
        Ok(out)
    }

    fn students_with_record_on(
        &self,
        kind: AttendanceType,
        date: &str,
    ) -> GradeResult<HashSet<String>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.kind == kind && r.date == date)
            .map(|r| r.student_id.clone())
            .collect())
    }
}

/// Attendance backed by the workspace database.
pub struct SqliteAttendance<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteAttendance<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn record_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let kind: String = r.get(4)?;
    Ok(AttendanceRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        date: r.get(2)?,
        time: r.get(3)?,
        kind: AttendanceType::parse(&kind).unwrap_or(AttendanceType::Absence),
        year: r.get(5)?,
        term: r.get(6)?,
    })
}

impl AttendanceStore for SqliteAttendance<'_> {
    fn add(&mut self, record: NewAttendance) -> GradeResult<AttendanceRecord> {
        let r = record.validate()?;
        let exists: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM students WHERE id = ?)",
                [&r.student_id],
                |row| row.get(0),
            )?;
        if !exists {
            return Err(GradeError::NotFound("student"));
        }
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO attendance_records(id, student_id, date, time, type, year, term)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &r.student_id,
                &r.date,
                &r.time,
                r.kind.as_str(),
                &r.period.year,
                r.period.term,
            ),
        )?;
        Ok(AttendanceRecord {
            id,
            student_id: r.student_id,
            date: r.date,
            time: r.time,
            kind: r.kind,
            year: r.period.year,
            term: r.period.term,
        })
    }

    fn remove(&mut self, record_id: &str) -> GradeResult<bool> {
        let n = self
            .conn
            .execute("DELETE FROM attendance_records WHERE id = ?", [record_id])?;
        Ok(n > 0)
    }

    fn count_by_student_period(
        &self,
        student_id: &str,
        kind: AttendanceType,
        period: &Period,
    ) -> GradeResult<u32> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM attendance_records
             WHERE student_id = ? AND type = ? AND year = ? AND term = ?",
            (student_id, kind.as_str(), &period.year, period.term),
            |r| r.get(0),
        )?;
        Ok(n.max(0) as u32)
    }

    fn list_by_student_period(
        &self,
        student_id: &str,
        period: &Period,
    ) -> GradeResult<Vec<AttendanceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, student_id, date, time, type, year, term
             FROM attendance_records
             WHERE student_id = ? AND year = ? AND term = ?
             ORDER BY date, time",
        )?;
        let rows = stmt
            .query_map((student_id, &period.year, period.term), record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn students_with_record_on(
        &self,
        kind: AttendanceType,
        date: &str,
    ) -> GradeResult<HashSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT student_id FROM attendance_records WHERE type = ? AND date = ?",
        )?;
        let ids = stmt
            .query_map((kind.as_str(), date), |r| r.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incident(student: &str, date: &str, kind: AttendanceType, term: i64) -> NewAttendance {
        NewAttendance {
            student_id: student.to_string(),
            date: date.to_string(),
            time: "08:05".to_string(),
            kind,
            period: Period::new("2024-2025", term),
        }
    }

    #[test]
    fn counts_are_scoped_to_year_and_term() {
        let mut store = MemoryAttendance::new();
        store
            .add(incident("s1", "2024-10-01", AttendanceType::Absence, 1))
            .expect("add");
        store
            .add(incident("s1", "2024-10-02", AttendanceType::Absence, 1))
            .expect("add");
        store
            .add(incident("s1", "2025-01-10", AttendanceType::Absence, 2))
            .expect("add");
        store
            .add(incident("s1", "2024-10-03", AttendanceType::Tardiness, 1))
            .expect("add");

        let t1 = Period::new("2024-2025", 1);
        let t2 = Period::new("2024-2025", 2);
        assert_eq!(count_absences(&store, "s1", &t1).expect("count"), 2);
        assert_eq!(count_absences(&store, "s1", &t2).expect("count"), 1);
        assert_eq!(count_tardiness(&store, "s1", &t1).expect("count"), 1);
        assert_eq!(count_tardiness(&store, "s2", &t1).expect("count"), 0);
        assert_eq!(
            count_absences(&store, "s1", &Period::new("2023-2024", 1)).expect("count"),
            0
        );
    }

    #[test]
    fn remove_reports_whether_anything_was_deleted() {
        let mut store = MemoryAttendance::new();
        let rec = store
            .add(incident("s1", "2024-10-01", AttendanceType::Absence, 1))
            .expect("add");
        assert!(store.remove(&rec.id).expect("remove"));
        assert!(!store.remove(&rec.id).expect("remove again"));
        assert!(store.records().is_empty());
    }

    #[test]
    fn validate_rejects_bad_dates_and_terms() {
        assert!(incident("s1", "2024-13-01", AttendanceType::Absence, 1)
            .validate()
            .is_err());
        assert!(incident("s1", "2024-10-01", AttendanceType::Absence, 4)
            .validate()
            .is_err());
        let mut bad_time = incident("s1", "2024-10-01", AttendanceType::Absence, 1);
        bad_time.time = "8h".into();
        assert!(bad_time.validate().is_err());

        let mut with_seconds = incident("s1", "2024-10-01", AttendanceType::Absence, 1);
        with_seconds.time = "08:05:59".into();
        assert_eq!(with_seconds.validate().expect("valid").time, "08:05");
    }

    #[test]
    fn date_lookup_ignores_other_types() {
        let mut store = MemoryAttendance::new();
        store
            .add(incident("s1", "2024-10-01", AttendanceType::Absence, 1))
            .expect("add");
        store
            .add(incident("s2", "2024-10-01", AttendanceType::Tardiness, 1))
            .expect("add");
        let ids = store
            .students_with_record_on(AttendanceType::Absence, "2024-10-01")
            .expect("lookup");
        assert!(ids.contains("s1"));
        assert!(!ids.contains("s2"));
    }
}
