//! Common test utilities

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use class_organize::models::{
    Allocation, Class, NewAllocation, NewClass, NewProfessor, NewRoom, Professor, ResourceKind,
    Room, TimeWindow,
};
use class_organize::storage::{
    MemoryScheduleStore, ScheduleStore, SharedScheduleStore, SqliteScheduleStore, StoreResult,
};

/// One store under test; keeps its temp directory alive
pub struct Backend {
    pub name: &'static str,
    pub store: SharedScheduleStore,
    _dir: Option<TempDir>,
}

/// Every backend that runs without external services
pub fn backends() -> Vec<Backend> {
    let dir = tempfile::tempdir().expect("temp dir");
    let sqlite = SqliteScheduleStore::new(dir.path().join("timetable.db")).expect("sqlite store");

    vec![
        Backend {
            name: "memory",
            store: Arc::new(MemoryScheduleStore::new()),
            _dir: None,
        },
        Backend {
            name: "sqlite",
            store: Arc::new(sqlite),
            _dir: Some(dir),
        },
    ]
}

pub fn new_professor(i: usize) -> NewProfessor {
    NewProfessor {
        name: format!("Professor {i}"),
        email: format!("professor{i}@university.edu"),
        qualification: Some("PhD".to_string()),
        subject: "Mathematics".to_string(),
    }
}

pub fn new_room(i: usize) -> NewRoom {
    NewRoom {
        number: format!("A-{}", 100 + i),
        capacity: 40,
        block: Some("A".to_string()),
        room_type: None,
    }
}

pub fn new_class(i: usize) -> NewClass {
    NewClass {
        name: format!("Class {i}"),
        course: "Computer Science".to_string(),
        term: Some("2024.1".to_string()),
        student_count: Some(35),
    }
}

pub fn booking(
    professor: &Professor,
    room: &Room,
    class: &Class,
    day: &str,
    start: &str,
    end: &str,
) -> NewAllocation {
    NewAllocation {
        professor_id: professor.id,
        room_id: room.id,
        class_id: class.id,
        day_of_week: day.to_string(),
        start_time: start.to_string(),
        end_time: end.to_string(),
    }
}

/// Records created by [`seed`], in creation order
pub struct Seeded {
    pub professors: Vec<Professor>,
    pub rooms: Vec<Room>,
    pub classes: Vec<Class>,
}

pub async fn seed(
    store: &dyn ScheduleStore,
    professors: usize,
    rooms: usize,
    classes: usize,
) -> Seeded {
    let mut seeded = Seeded {
        professors: Vec::new(),
        rooms: Vec::new(),
        classes: Vec::new(),
    };
    for i in 0..professors {
        seeded
            .professors
            .push(store.create_professor(&new_professor(i)).await.unwrap());
    }
    for i in 0..rooms {
        seeded.rooms.push(store.create_room(&new_room(i)).await.unwrap());
    }
    for i in 0..classes {
        seeded
            .classes
            .push(store.create_class(&new_class(i)).await.unwrap());
    }
    seeded
}

/// Store view whose availability never sees booked rooms
///
/// Writes still go to the real store, so a room that looks free here can
/// still fail the conflict check on insert.
pub struct StaleRoomView {
    inner: SharedScheduleStore,
}

impl StaleRoomView {
    pub fn wrap(inner: SharedScheduleStore) -> SharedScheduleStore {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl ScheduleStore for StaleRoomView {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn list_professors(&self) -> StoreResult<Vec<Professor>> {
        self.inner.list_professors().await
    }

    async fn get_professor(&self, id: i64) -> StoreResult<Professor> {
        self.inner.get_professor(id).await
    }

    async fn create_professor(&self, new: &NewProfessor) -> StoreResult<Professor> {
        self.inner.create_professor(new).await
    }

    async fn update_professor(&self, id: i64, new: &NewProfessor) -> StoreResult<Professor> {
        self.inner.update_professor(id, new).await
    }

    async fn delete_professor(&self, id: i64) -> StoreResult<bool> {
        self.inner.delete_professor(id).await
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        self.inner.list_rooms().await
    }

    async fn get_room(&self, id: i64) -> StoreResult<Room> {
        self.inner.get_room(id).await
    }

    async fn create_room(&self, new: &NewRoom) -> StoreResult<Room> {
        self.inner.create_room(new).await
    }

    async fn update_room(&self, id: i64, new: &NewRoom) -> StoreResult<Room> {
        self.inner.update_room(id, new).await
    }

    async fn delete_room(&self, id: i64) -> StoreResult<bool> {
        self.inner.delete_room(id).await
    }

    async fn list_classes(&self) -> StoreResult<Vec<Class>> {
        self.inner.list_classes().await
    }

    async fn get_class(&self, id: i64) -> StoreResult<Class> {
        self.inner.get_class(id).await
    }

    async fn create_class(&self, new: &NewClass) -> StoreResult<Class> {
        self.inner.create_class(new).await
    }

    async fn update_class(&self, id: i64, new: &NewClass) -> StoreResult<Class> {
        self.inner.update_class(id, new).await
    }

    async fn delete_class(&self, id: i64) -> StoreResult<bool> {
        self.inner.delete_class(id).await
    }

    async fn list_allocations(&self) -> StoreResult<Vec<Allocation>> {
        self.inner.list_allocations().await
    }

    async fn get_allocation(&self, id: i64) -> StoreResult<Allocation> {
        self.inner.get_allocation(id).await
    }

    async fn allocations_for(&self, kind: ResourceKind, id: i64) -> StoreResult<Vec<Allocation>> {
        self.inner.allocations_for(kind, id).await
    }

    async fn insert_allocation(&self, new: &NewAllocation) -> StoreResult<Allocation> {
        self.inner.insert_allocation(new).await
    }

    async fn update_allocation(&self, id: i64, new: &NewAllocation) -> StoreResult<Allocation> {
        self.inner.update_allocation(id, new).await
    }

    async fn delete_allocation(&self, id: i64) -> StoreResult<bool> {
        self.inner.delete_allocation(id).await
    }

    async fn allocated_ids(
        &self,
        kind: ResourceKind,
        day: &str,
        window: &TimeWindow,
    ) -> StoreResult<BTreeSet<i64>> {
        match kind {
            ResourceKind::Room => Ok(BTreeSet::new()),
            _ => self.inner.allocated_ids(kind, day, window).await,
        }
    }
}
