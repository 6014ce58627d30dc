//! PostgreSQL store
//!
//! Pooled connections via deadpool. Allocation writes run in `SERIALIZABLE`
//! transactions and are retried a few times on serialization failures.

use std::collections::BTreeSet;

use async_trait::async_trait;
use deadpool_postgres::{
    Config as PgConfig, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime,
};
use tokio_postgres::error::SqlState;
use tokio_postgres::{IsolationLevel, NoTls, Row};

use super::{ScheduleStore, StoreError, StoreResult};
use crate::models::{
    Allocation, Class, NewAllocation, NewClass, NewProfessor, NewRoom, Professor, ResourceKind,
    Room, TimeWindow,
};

const MAX_SERIALIZATION_RETRIES: usize = 3;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS professors (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        qualification TEXT,
        subject TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS rooms (
        id BIGSERIAL PRIMARY KEY,
        number TEXT NOT NULL,
        capacity INTEGER NOT NULL,
        block TEXT,
        room_type TEXT
    );

    CREATE TABLE IF NOT EXISTS classes (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        course TEXT NOT NULL,
        term TEXT,
        student_count INTEGER
    );

    CREATE TABLE IF NOT EXISTS allocations (
        id BIGSERIAL PRIMARY KEY,
        professor_id BIGINT NOT NULL REFERENCES professors(id),
        room_id BIGINT NOT NULL REFERENCES rooms(id),
        class_id BIGINT NOT NULL REFERENCES classes(id),
        day_of_week TEXT NOT NULL,
        start_time VARCHAR(5) NOT NULL,
        end_time VARCHAR(5) NOT NULL,
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

/// PostgreSQL implementation of [`ScheduleStore`]
pub struct PostgresScheduleStore {
    pool: Pool,
}

impl PostgresScheduleStore {
    /// Build a connection pool; connections are opened lazily
    pub fn connect(database_url: &str, pool_size: usize) -> StoreResult<Self> {
        let mut config = PgConfig::new();
        config.url = Some(database_url.to_string());
        config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        config.pool = Some(PoolConfig::new(pool_size.max(1)));

        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Backend(format!("failed to create PostgreSQL pool: {e}")))?;

        Ok(Self { pool })
    }

    /// Create tables and indexes if absent
    pub async fn create_schema(&self) -> StoreResult<()> {
        let client = self.pool.get().await?;
        client.batch_execute(SCHEMA).await?;
        tracing::info!("PostgreSQL schema initialized");
        Ok(())
    }

    async fn write_allocation(
        &self,
        id: Option<i64>,
        new: &NewAllocation,
    ) -> StoreResult<Allocation> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_write_allocation(id, new).await {
                Err(StoreError::Postgres(e))
                    if e.code() == Some(&SqlState::T_R_SERIALIZATION_FAILURE) =>
                {
                    if attempt >= MAX_SERIALIZATION_RETRIES {
                        // a concurrent writer kept winning the same rows
                        return Err(room_conflict(new));
                    }
                    tracing::debug!(attempt, room_id = new.room_id, "Serialization failure, retrying");
                }
                other => return other,
            }
        }
    }

    async fn try_write_allocation(
        &self,
        id: Option<i64>,
        new: &NewAllocation,
    ) -> StoreResult<Allocation> {
        let mut client = self.pool.get().await?;
        let tx = client
            .build_transaction()
            .isolation_level(IsolationLevel::Serializable)
            .start()
            .await?;

        if let Some(id) = id {
            let exists: bool = tx
                .query_one(
                    "SELECT EXISTS(SELECT 1 FROM allocations WHERE id = $1)",
                    &[&id],
                )
                .await?
                .try_get(0)?;
            if !exists {
                return Err(StoreError::not_found("allocation", id));
            }
        }

        let overlapping: i64 = tx
            .query_one(
                "SELECT COUNT(*) FROM allocations
                 WHERE room_id = $1 AND day_of_week = $2
                   AND start_time < $4 AND $3 < end_time
                   AND id != $5",
                &[
                    &new.room_id,
                    &new.day_of_week,
                    &new.start_time,
                    &new.end_time,
                    &id.unwrap_or(0),
                ],
            )
            .await?
            .try_get(0)?;
        if overlapping > 0 {
            return Err(room_conflict(new));
        }

        let written_id: i64 = match id {
            None => tx
                .query_one(
                    "INSERT INTO allocations
                         (professor_id, room_id, class_id, day_of_week, start_time, end_time)
                     VALUES ($1, $2, $3, $4, $5, $6)
                     RETURNING id",
                    &[
                        &new.professor_id,
                        &new.room_id,
                        &new.class_id,
                        &new.day_of_week,
                        &new.start_time,
                        &new.end_time,
                    ],
                )
                .await
                .map_err(|e| map_allocation_write(e, new))?
                .try_get(0)?,
            Some(id) => {
                tx.execute(
                    "UPDATE allocations
                     SET professor_id = $1, room_id = $2, class_id = $3,
                         day_of_week = $4, start_time = $5, end_time = $6
                     WHERE id = $7",
                    &[
                        &new.professor_id,
                        &new.room_id,
                        &new.class_id,
                        &new.day_of_week,
                        &new.start_time,
                        &new.end_time,
                        &id,
                    ],
                )
                .await
                .map_err(|e| map_allocation_write(e, new))?;
                id
            }
        };

        let sql = format!("{ALLOCATION_SELECT} WHERE a.id = $1");
        let row = tx.query_one(&sql, &[&written_id]).await?;
        let allocation = allocation_from_row(&row)?;
        tx.commit().await.map_err(|e| map_allocation_write(e, new))?;
        Ok(allocation)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn professor_from_row(row: &Row) -> StoreResult<Professor> {
    Ok(Professor {
        id: row.try_get(0)?,
        name: row.try_get(1)?,
        email: row.try_get(2)?,
        qualification: row.try_get(3)?,
        subject: row.try_get(4)?,
    })
}

fn room_from_row(row: &Row) -> StoreResult<Room> {
    Ok(Room {
        id: row.try_get(0)?,
        number: row.try_get(1)?,
        capacity: row.try_get(2)?,
        block: row.try_get(3)?,
        room_type: row.try_get(4)?,
    })
}

fn class_from_row(row: &Row) -> StoreResult<Class> {
    Ok(Class {
        id: row.try_get(0)?,
        name: row.try_get(1)?,
        course: row.try_get(2)?,
        term: row.try_get(3)?,
        student_count: row.try_get(4)?,
    })
}

fn allocation_from_row(row: &Row) -> StoreResult<Allocation> {
    let professor_id: i64 = row.try_get(1)?;
    let room_id: i64 = row.try_get(2)?;
    let class_id: i64 = row.try_get(3)?;

    Ok(Allocation {
        id: row.try_get(0)?,
        professor_id,
        room_id,
        class_id,
        day_of_week: row.try_get(4)?,
        start_time: row.try_get(5)?,
        end_time: row.try_get(6)?,
        professor: Professor {
            id: professor_id,
            name: row.try_get(7)?,
            email: row.try_get(8)?,
            qualification: row.try_get(9)?,
            subject: row.try_get(10)?,
        },
        room: Room {
            id: room_id,
            number: row.try_get(11)?,
            capacity: row.try_get(12)?,
            block: row.try_get(13)?,
            room_type: row.try_get(14)?,
        },
        class: Class {
            id: class_id,
            name: row.try_get(15)?,
            course: row.try_get(16)?,
            term: row.try_get(17)?,
            student_count: row.try_get(18)?,
        },
    })
}

fn collect<T>(rows: &[Row], map: fn(&Row) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(map).collect()
}

// ============================================================================
// Constraint mapping
// ============================================================================

fn classify(err: tokio_postgres::Error) -> StoreError {
    if err.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION) {
        let detail = err
            .as_db_error()
            .map(|db| db.message().to_string())
            .unwrap_or_else(|| err.to_string());
        return StoreError::ForeignKey(detail);
    }
    StoreError::Postgres(err)
}

fn room_conflict(new: &NewAllocation) -> StoreError {
    StoreError::RoomConflict {
        room_id: new.room_id,
        day: new.day_of_week.clone(),
        start: new.start_time.clone(),
        end: new.end_time.clone(),
    }
}

fn map_allocation_write(err: tokio_postgres::Error, new: &NewAllocation) -> StoreError {
    let on_unique_allocation = err.code() == Some(&SqlState::UNIQUE_VIOLATION)
        && err
            .as_db_error()
            .and_then(|db| db.constraint())
            .is_some_and(|name| name == "unique_allocation");
    if on_unique_allocation {
        room_conflict(new)
    } else {
        classify(err)
    }
}

fn duplicate_email(err: tokio_postgres::Error, new: &NewProfessor) -> StoreError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        StoreError::Duplicate {
            field: "email",
            value: new.email.clone(),
        }
    } else {
        classify(err)
    }
}

#[async_trait]
impl ScheduleStore for PostgresScheduleStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    // ---- professors ----

    async fn list_professors(&self) -> StoreResult<Vec<Professor>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, name, email, qualification, subject FROM professors ORDER BY id",
                &[],
            )
            .await?;
        collect(&rows, professor_from_row)
    }

    async fn get_professor(&self, id: i64) -> StoreResult<Professor> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, name, email, qualification, subject FROM professors WHERE id = $1",
                &[&id],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("professor", id))?;
        professor_from_row(&row)
    }

    async fn create_professor(&self, new: &NewProfessor) -> StoreResult<Professor> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO professors (name, email, qualification, subject)
                 VALUES ($1, $2, $3, $4) RETURNING id",
                &[&new.name, &new.email, &new.qualification, &new.subject],
            )
            .await
            .map_err(|e| duplicate_email(e, new))?;
        Ok(new.with_id(row.try_get(0)?))
    }

    async fn update_professor(&self, id: i64, new: &NewProfessor) -> StoreResult<Professor> {
        let client = self.pool.get().await?;
        let changed = client
            .execute(
                "UPDATE professors SET name = $1, email = $2, qualification = $3, subject = $4
                 WHERE id = $5",
                &[&new.name, &new.email, &new.qualification, &new.subject, &id],
            )
            .await
            .map_err(|e| duplicate_email(e, new))?;
        if changed == 0 {
            return Err(StoreError::not_found("professor", id));
        }
        Ok(new.with_id(id))
    }

    async fn delete_professor(&self, id: i64) -> StoreResult<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM professors WHERE id = $1", &[&id])
            .await
            .map_err(classify)?;
        Ok(deleted > 0)
    }

    // ---- rooms ----

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, number, capacity, block, room_type FROM rooms ORDER BY id",
                &[],
            )
            .await?;
        collect(&rows, room_from_row)
    }

    async fn get_room(&self, id: i64) -> StoreResult<Room> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, number, capacity, block, room_type FROM rooms WHERE id = $1",
                &[&id],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("room", id))?;
        room_from_row(&row)
    }

    async fn create_room(&self, new: &NewRoom) -> StoreResult<Room> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO rooms (number, capacity, block, room_type)
                 VALUES ($1, $2, $3, $4) RETURNING id",
                &[&new.number, &new.capacity, &new.block, &new.room_type],
            )
            .await?;
        Ok(new.with_id(row.try_get(0)?))
    }

    async fn update_room(&self, id: i64, new: &NewRoom) -> StoreResult<Room> {
        let client = self.pool.get().await?;
        let changed = client
            .execute(
                "UPDATE rooms SET number = $1, capacity = $2, block = $3, room_type = $4
                 WHERE id = $5",
                &[&new.number, &new.capacity, &new.block, &new.room_type, &id],
            )
            .await?;
        if changed == 0 {
            return Err(StoreError::not_found("room", id));
        }
        Ok(new.with_id(id))
    }

    async fn delete_room(&self, id: i64) -> StoreResult<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM rooms WHERE id = $1", &[&id])
            .await
            .map_err(classify)?;
        Ok(deleted > 0)
    }

    // ---- classes ----

    async fn list_classes(&self) -> StoreResult<Vec<Class>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, name, course, term, student_count FROM classes ORDER BY id",
                &[],
            )
            .await?;
        collect(&rows, class_from_row)
    }

    async fn get_class(&self, id: i64) -> StoreResult<Class> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, name, course, term, student_count FROM classes WHERE id = $1",
                &[&id],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("class", id))?;
        class_from_row(&row)
    }

    async fn create_class(&self, new: &NewClass) -> StoreResult<Class> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO classes (name, course, term, student_count)
                 VALUES ($1, $2, $3, $4) RETURNING id",
                &[&new.name, &new.course, &new.term, &new.student_count],
            )
            .await?;
        Ok(new.with_id(row.try_get(0)?))
    }

    async fn update_class(&self, id: i64, new: &NewClass) -> StoreResult<Class> {
        let client = self.pool.get().await?;
        let changed = client
            .execute(
                "UPDATE classes SET name = $1, course = $2, term = $3, student_count = $4
                 WHERE id = $5",
                &[&new.name, &new.course, &new.term, &new.student_count, &id],
            )
            .await?;
        if changed == 0 {
            return Err(StoreError::not_found("class", id));
        }
        Ok(new.with_id(id))
    }

    async fn delete_class(&self, id: i64) -> StoreResult<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM classes WHERE id = $1", &[&id])
            .await
            .map_err(classify)?;
        Ok(deleted > 0)
    }

    // ---- allocations ----

    async fn list_allocations(&self) -> StoreResult<Vec<Allocation>> {
        let client = self.pool.get().await?;
        let sql = format!("{ALLOCATION_SELECT} ORDER BY a.id");
        let rows = client.query(&sql, &[]).await?;
        collect(&rows, allocation_from_row)
    }

    async fn get_allocation(&self, id: i64) -> StoreResult<Allocation> {
        let client = self.pool.get().await?;
        let sql = format!("{ALLOCATION_SELECT} WHERE a.id = $1");
        let row = client
            .query_opt(&sql, &[&id])
            .await?
            .ok_or_else(|| StoreError::not_found("allocation", id))?;
        allocation_from_row(&row)
    }

    async fn allocations_for(&self, kind: ResourceKind, id: i64) -> StoreResult<Vec<Allocation>> {
        let client = self.pool.get().await?;
        let sql = format!("{ALLOCATION_SELECT} WHERE a.{} = $1 ORDER BY a.id", kind.column());
        let rows = client.query(&sql, &[&id]).await?;
        collect(&rows, allocation_from_row)
    }

    async fn insert_allocation(&self, new: &NewAllocation) -> StoreResult<Allocation> {
        self.write_allocation(None, new).await
    }

    async fn update_allocation(&self, id: i64, new: &NewAllocation) -> StoreResult<Allocation> {
        self.write_allocation(Some(id), new).await
    }

    async fn delete_allocation(&self, id: i64) -> StoreResult<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM allocations WHERE id = $1", &[&id])
            .await?;
        Ok(deleted > 0)
    }

    async fn allocated_ids(
        &self,
        kind: ResourceKind,
        day: &str,
        window: &TimeWindow,
    ) -> StoreResult<BTreeSet<i64>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT DISTINCT {} FROM allocations
             WHERE day_of_week = $1 AND start_time < $3 AND $2 < end_time",
            kind.column()
        );
        let rows = client
            .query(&sql, &[&day, &window.start, &window.end])
            .await?;
        rows.iter()
            .map(|row| row.try_get::<_, i64>(0).map_err(StoreError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_rejects_malformed_url() {
        assert!(matches!(
            PostgresScheduleStore::connect("definitely not a url", 4),
            Err(StoreError::Backend(_))
        ));
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
    async fn test_postgres_allocation_conflict() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PostgresScheduleStore::connect(&url, 2).unwrap();
        store.create_schema().await.unwrap();

        let professor = store
            .create_professor(&NewProfessor {
                name: "Alan".to_string(),
                email: format!("alan-{}@uni.edu", uuid::Uuid::new_v4()),
                qualification: None,
                subject: "Logic".to_string(),
            })
            .await
            .unwrap();
        let room = store
            .create_room(&NewRoom {
                number: "PG-1".to_string(),
                capacity: 30,
                ..Default::default()
            })
            .await
            .unwrap();
        let class = store
            .create_class(&NewClass {
                name: "L1".to_string(),
                course: "CS".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let new = NewAllocation {
            professor_id: professor.id,
            room_id: room.id,
            class_id: class.id,
            day_of_week: "Friday".to_string(),
            start_time: "10:00".to_string(),
            end_time: "11:00".to_string(),
        };
        store.insert_allocation(&new).await.unwrap();

        let overlapping = NewAllocation {
            start_time: "10:30".to_string(),
            end_time: "11:30".to_string(),
            ..new
        };
        assert!(matches!(
            store.insert_allocation(&overlapping).await,
            Err(StoreError::RoomConflict { .. })
        ));
    }
}
