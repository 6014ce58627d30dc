//! SQLite store
//!
//! A single connection behind a `Mutex`. Allocation writes run inside an
//! `IMMEDIATE` transaction so the overlap check and the insert see the same
//! snapshot.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{ffi, params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::{ScheduleStore, StoreError, StoreResult};
use crate::models::{
    Allocation, Class, NewAllocation, NewClass, NewProfessor, NewRoom, Professor, ResourceKind,
    Room, TimeWindow,
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS professors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        qualification TEXT,
        subject TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS rooms (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        number TEXT NOT NULL,
        capacity INTEGER NOT NULL,
        block TEXT,
        room_type TEXT
    );

    CREATE TABLE IF NOT EXISTS classes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        course TEXT NOT NULL,
        term TEXT,
        student_count INTEGER
    );

    CREATE TABLE IF NOT EXISTS allocations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        professor_id INTEGER NOT NULL REFERENCES professors(id),
        room_id INTEGER NOT NULL REFERENCES rooms(id),
        class_id INTEGER NOT NULL REFERENCES classes(id),
        day_of_week TEXT NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        CONSTRAINT unique_allocation UNIQUE (room_id, day_of_week, start_time)
    );

    CREATE INDEX IF NOT EXISTS idx_allocations_slot
        ON allocations(day_of_week, start_time, end_time);
"#;

const ALLOCATION_SELECT: &str = r#"
    SELECT a.id, a.professor_id, a.room_id, a.class_id,
           a.day_of_week, a.start_time, a.end_time,
           p.name, p.email, p.qualification, p.subject,
           r.number, r.capacity, r.block, r.room_type,
           c.name, c.course, c.term, c.student_count
    FROM allocations a
    JOIN professors p ON p.id = a.professor_id
    JOIN rooms r ON r.id = a.room_id
    JOIN classes c ON c.id = a.class_id
"#;

/// SQLite implementation of [`ScheduleStore`]
pub struct SqliteScheduleStore {
    conn: Mutex<Connection>,
}

impl SqliteScheduleStore {
    /// Open (or create) a database file
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!(
                    "failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self::with_connection(conn)?;
        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Private in-memory database (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("SQLite connection lock poisoned".to_string()))
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn professor_from_row(row: &Row<'_>) -> rusqlite::Result<Professor> {
    Ok(Professor {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        qualification: row.get(3)?,
        subject: row.get(4)?,
    })
}

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<Room> {
    Ok(Room {
        id: row.get(0)?,
        number: row.get(1)?,
        capacity: row.get(2)?,
        block: row.get(3)?,
        room_type: row.get(4)?,
    })
}

fn class_from_row(row: &Row<'_>) -> rusqlite::Result<Class> {
    Ok(Class {
        id: row.get(0)?,
        name: row.get(1)?,
        course: row.get(2)?,
        term: row.get(3)?,
        student_count: row.get(4)?,
    })
}

fn allocation_from_row(row: &Row<'_>) -> rusqlite::Result<Allocation> {
    let professor_id: i64 = row.get(1)?;
    let room_id: i64 = row.get(2)?;
    let class_id: i64 = row.get(3)?;

    Ok(Allocation {
        id: row.get(0)?,
        professor_id,
        room_id,
        class_id,
        day_of_week: row.get(4)?,
        start_time: row.get(5)?,
        end_time: row.get(6)?,
        professor: Professor {
            id: professor_id,
            name: row.get(7)?,
            email: row.get(8)?,
            qualification: row.get(9)?,
            subject: row.get(10)?,
        },
        room: Room {
            id: room_id,
            number: row.get(11)?,
            capacity: row.get(12)?,
            block: row.get(13)?,
            room_type: row.get(14)?,
        },
        class: Class {
            id: class_id,
            name: row.get(15)?,
            course: row.get(16)?,
            term: row.get(17)?,
            student_count: row.get(18)?,
        },
    })
}

// ============================================================================
// Constraint mapping
// ============================================================================

fn extended_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.extended_code),
        _ => None,
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    extended_code(err) == Some(ffi::SQLITE_CONSTRAINT_UNIQUE)
}

/// Foreign-key failures become [`StoreError::ForeignKey`], everything else stays SQLite
fn classify(err: rusqlite::Error) -> StoreError {
    if extended_code(&err) == Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) {
        return StoreError::ForeignKey(err.to_string());
    }
    StoreError::Sqlite(err)
}

fn room_conflict(new: &NewAllocation) -> StoreError {
    StoreError::RoomConflict {
        room_id: new.room_id,
        day: new.day_of_week.clone(),
        start: new.start_time.clone(),
        end: new.end_time.clone(),
    }
}

fn map_allocation_write(err: rusqlite::Error, new: &NewAllocation) -> StoreError {
    if is_unique_violation(&err) {
        room_conflict(new)
    } else {
        classify(err)
    }
}

/// Overlapping bookings of the same room on the same day, except `exclude`
fn count_room_overlaps(conn: &Connection, new: &NewAllocation, exclude: i64) -> StoreResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM allocations
         WHERE room_id = ?1 AND day_of_week = ?2
           AND start_time < ?4 AND ?3 < end_time
           AND id != ?5",
        params![
            new.room_id,
            new.day_of_week,
            new.start_time,
            new.end_time,
            exclude
        ],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn fetch_allocation(conn: &Connection, id: i64) -> StoreResult<Allocation> {
    let sql = format!("{ALLOCATION_SELECT} WHERE a.id = ?1");
    conn.query_row(&sql, params![id], allocation_from_row)
        .optional()?
        .ok_or_else(|| StoreError::not_found("allocation", id))
}

#[async_trait]
impl ScheduleStore for SqliteScheduleStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    // ---- professors ----

    async fn list_professors(&self) -> StoreResult<Vec<Professor>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, email, qualification, subject FROM professors ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], professor_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn get_professor(&self, id: i64) -> StoreResult<Professor> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, email, qualification, subject FROM professors WHERE id = ?1",
            params![id],
            professor_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("professor", id))
    }

    async fn create_professor(&self, new: &NewProfessor) -> StoreResult<Professor> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO professors (name, email, qualification, subject) VALUES (?1, ?2, ?3, ?4)",
            params![new.name, new.email, new.qualification, new.subject],
        )
        .map_err(|e| duplicate_email(e, new))?;
        Ok(new.with_id(conn.last_insert_rowid()))
    }

    async fn update_professor(&self, id: i64, new: &NewProfessor) -> StoreResult<Professor> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE professors SET name = ?1, email = ?2, qualification = ?3, subject = ?4
                 WHERE id = ?5",
                params![new.name, new.email, new.qualification, new.subject, id],
            )
            .map_err(|e| duplicate_email(e, new))?;
        if changed == 0 {
            return Err(StoreError::not_found("professor", id));
        }
        Ok(new.with_id(id))
    }

    async fn delete_professor(&self, id: i64) -> StoreResult<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM professors WHERE id = ?1", params![id])
            .map_err(classify)?;
        Ok(deleted > 0)
    }

    // ---- rooms ----

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, number, capacity, block, room_type FROM rooms ORDER BY id")?;
        let rows = stmt
            .query_map([], room_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn get_room(&self, id: i64) -> StoreResult<Room> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, number, capacity, block, room_type FROM rooms WHERE id = ?1",
            params![id],
            room_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("room", id))
    }

    async fn create_room(&self, new: &NewRoom) -> StoreResult<Room> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO rooms (number, capacity, block, room_type) VALUES (?1, ?2, ?3, ?4)",
            params![new.number, new.capacity, new.block, new.room_type],
        )?;
        Ok(new.with_id(conn.last_insert_rowid()))
    }

    async fn update_room(&self, id: i64, new: &NewRoom) -> StoreResult<Room> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE rooms SET number = ?1, capacity = ?2, block = ?3, room_type = ?4 WHERE id = ?5",
            params![new.number, new.capacity, new.block, new.room_type, id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("room", id));
        }
        Ok(new.with_id(id))
    }

    async fn delete_room(&self, id: i64) -> StoreResult<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM rooms WHERE id = ?1", params![id])
            .map_err(classify)?;
        Ok(deleted > 0)
    }

    // ---- classes ----

    async fn list_classes(&self) -> StoreResult<Vec<Class>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, course, term, student_count FROM classes ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], class_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn get_class(&self, id: i64) -> StoreResult<Class> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, course, term, student_count FROM classes WHERE id = ?1",
            params![id],
            class_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("class", id))
    }

    async fn create_class(&self, new: &NewClass) -> StoreResult<Class> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO classes (name, course, term, student_count) VALUES (?1, ?2, ?3, ?4)",
            params![new.name, new.course, new.term, new.student_count],
        )?;
        Ok(new.with_id(conn.last_insert_rowid()))
    }

    async fn update_class(&self, id: i64, new: &NewClass) -> StoreResult<Class> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE classes SET name = ?1, course = ?2, term = ?3, student_count = ?4 WHERE id = ?5",
            params![new.name, new.course, new.term, new.student_count, id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("class", id));
        }
        Ok(new.with_id(id))
    }

    async fn delete_class(&self, id: i64) -> StoreResult<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM classes WHERE id = ?1", params![id])
            .map_err(classify)?;
        Ok(deleted > 0)
    }

    // ---- allocations ----

    async fn list_allocations(&self) -> StoreResult<Vec<Allocation>> {
        let conn = self.lock()?;
        let sql = format!("{ALLOCATION_SELECT} ORDER BY a.id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], allocation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn get_allocation(&self, id: i64) -> StoreResult<Allocation> {
        let conn = self.lock()?;
        fetch_allocation(&conn, id)
    }

    async fn allocations_for(&self, kind: ResourceKind, id: i64) -> StoreResult<Vec<Allocation>> {
        let conn = self.lock()?;
        let sql = format!("{ALLOCATION_SELECT} WHERE a.{} = ?1 ORDER BY a.id", kind.column());
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![id], allocation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn insert_allocation(&self, new: &NewAllocation) -> StoreResult<Allocation> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if count_room_overlaps(&tx, new, 0)? > 0 {
            return Err(room_conflict(new));
        }

        tx.execute(
            "INSERT INTO allocations
                 (professor_id, room_id, class_id, day_of_week, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.professor_id,
                new.room_id,
                new.class_id,
                new.day_of_week,
                new.start_time,
                new.end_time
            ],
        )
        .map_err(|e| map_allocation_write(e, new))?;

        let allocation = fetch_allocation(&tx, tx.last_insert_rowid())?;
        tx.commit()?;
        Ok(allocation)
    }

    async fn update_allocation(&self, id: i64, new: &NewAllocation) -> StoreResult<Allocation> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM allocations WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::not_found("allocation", id));
        }

        if count_room_overlaps(&tx, new, id)? > 0 {
            return Err(room_conflict(new));
        }

        tx.execute(
            "UPDATE allocations
             SET professor_id = ?1, room_id = ?2, class_id = ?3,
                 day_of_week = ?4, start_time = ?5, end_time = ?6
             WHERE id = ?7",
            params![
                new.professor_id,
                new.room_id,
                new.class_id,
                new.day_of_week,
                new.start_time,
                new.end_time,
                id
            ],
        )
        .map_err(|e| map_allocation_write(e, new))?;

        let allocation = fetch_allocation(&tx, id)?;
        tx.commit()?;
        Ok(allocation)
    }

    async fn delete_allocation(&self, id: i64) -> StoreResult<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM allocations WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    async fn allocated_ids(
        &self,
        kind: ResourceKind,
        day: &str,
        window: &TimeWindow,
    ) -> StoreResult<BTreeSet<i64>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT DISTINCT {} FROM allocations
             WHERE day_of_week = ?1 AND start_time < ?3 AND ?2 < end_time",
            kind.column()
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![day, window.start, window.end], |row| row.get(0))?
            .collect::<rusqlite::Result<BTreeSet<i64>>>()?;
        Ok(ids)
    }
}

fn duplicate_email(err: rusqlite::Error, new: &NewProfessor) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Duplicate {
            field: "email",
            value: new.email.clone(),
        }
    } else {
        classify(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn professor(email: &str) -> NewProfessor {
        NewProfessor {
            name: "Grace".to_string(),
            email: email.to_string(),
            qualification: Some("PhD".to_string()),
            subject: "Compilers".to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_reported() {
        let store = SqliteScheduleStore::in_memory().unwrap();
        store.create_professor(&professor("g@uni.edu")).await.unwrap();

        let err = store
            .create_professor(&professor("g@uni.edu"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "email", .. }));
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let store = SqliteScheduleStore::in_memory().unwrap();
        let err = store
            .insert_allocation(&NewAllocation {
                professor_id: 1,
                room_id: 2,
                class_id: 3,
                day_of_week: "Monday".to_string(),
                start_time: "08:00".to_string(),
                end_time: "09:00".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timetable.db");

        {
            let store = SqliteScheduleStore::new(&path).unwrap();
            store.create_professor(&professor("a@uni.edu")).await.unwrap();
        }

        let reopened = SqliteScheduleStore::new(&path).unwrap();
        assert_eq!(reopened.list_professors().await.unwrap().len(), 1);
    }
}
