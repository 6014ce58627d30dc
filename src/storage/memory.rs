//! In-memory store
//!
//! Emulates the relational constraints of the SQL backends (unique e-mail,
//! foreign keys, room uniqueness) so tests exercise the same failure modes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{ScheduleStore, StoreError, StoreResult};
use crate::models::{
    Allocation, Class, NewAllocation, NewClass, NewProfessor, NewRoom, Professor, ResourceKind,
    Room, TimeWindow,
};

#[derive(Debug, Clone)]
struct AllocationRow {
    id: i64,
    fields: NewAllocation,
}

#[derive(Debug, Default)]
struct Tables {
    professors: BTreeMap<i64, Professor>,
    rooms: BTreeMap<i64, Room>,
    classes: BTreeMap<i64, Class>,
    allocations: BTreeMap<i64, AllocationRow>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn hydrate(&self, row: &AllocationRow) -> StoreResult<Allocation> {
        let f = &row.fields;
        let professor = self
            .professors
            .get(&f.professor_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("professor", f.professor_id))?;
        let room = self
            .rooms
            .get(&f.room_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("room", f.room_id))?;
        let class = self
            .classes
            .get(&f.class_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("class", f.class_id))?;

        Ok(Allocation {
            id: row.id,
            professor_id: f.professor_id,
            room_id: f.room_id,
            class_id: f.class_id,
            day_of_week: f.day_of_week.clone(),
            start_time: f.start_time.clone(),
            end_time: f.end_time.clone(),
            professor,
            room,
            class,
        })
    }

    fn check_references(&self, new: &NewAllocation) -> StoreResult<()> {
        if !self.professors.contains_key(&new.professor_id) {
            return Err(StoreError::ForeignKey(format!(
                "professor {} does not exist",
                new.professor_id
            )));
        }
        if !self.rooms.contains_key(&new.room_id) {
            return Err(StoreError::ForeignKey(format!(
                "room {} does not exist",
                new.room_id
            )));
        }
        if !self.classes.contains_key(&new.class_id) {
            return Err(StoreError::ForeignKey(format!(
                "class {} does not exist",
                new.class_id
            )));
        }
        Ok(())
    }

    /// Same rule as the SQL count query, plus the (room, day, start) unique key
    fn check_room(&self, new: &NewAllocation, exclude: Option<i64>) -> StoreResult<()> {
        let window = new.window();
        let conflicts = self
            .allocations
            .values()
            .filter(|row| Some(row.id) != exclude)
            .filter(|row| {
                row.fields.room_id == new.room_id && row.fields.day_of_week == new.day_of_week
            })
            .any(|row| {
                row.fields.window().overlaps(&window) || row.fields.start_time == new.start_time
            });

        if conflicts {
            return Err(StoreError::RoomConflict {
                room_id: new.room_id,
                day: new.day_of_week.clone(),
                start: new.start_time.clone(),
                end: new.end_time.clone(),
            });
        }
        Ok(())
    }

    fn is_referenced(&self, kind: ResourceKind, id: i64) -> bool {
        self.allocations
            .values()
            .any(|row| row.fields.resource_id(kind) == id)
    }

    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.professors
            .values()
            .any(|p| p.email == email && Some(p.id) != except)
    }
}

/// Store that keeps everything in process memory
pub struct MemoryScheduleStore {
    tables: RwLock<Tables>,
}

impl MemoryScheduleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn referenced_error(kind: ResourceKind, id: i64) -> StoreError {
        StoreError::ForeignKey(format!("{kind} {id} is still referenced by allocations"))
    }
}

impl Default for MemoryScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn list_professors(&self) -> StoreResult<Vec<Professor>> {
        Ok(self.read()?.professors.values().cloned().collect())
    }

    async fn get_professor(&self, id: i64) -> StoreResult<Professor> {
        self.read()?
            .professors
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("professor", id))
    }

    async fn create_professor(&self, new: &NewProfessor) -> StoreResult<Professor> {
        let mut tables = self.write()?;
        if tables.email_taken(&new.email, None) {
            return Err(StoreError::Duplicate {
                field: "email",
                value: new.email.clone(),
            });
        }
        let professor = new.with_id(tables.next_id());
        tables.professors.insert(professor.id, professor.clone());
        Ok(professor)
    }

    async fn update_professor(&self, id: i64, new: &NewProfessor) -> StoreResult<Professor> {
        let mut tables = self.write()?;
        if !tables.professors.contains_key(&id) {
            return Err(StoreError::not_found("professor", id));
        }
        if tables.email_taken(&new.email, Some(id)) {
            return Err(StoreError::Duplicate {
                field: "email",
                value: new.email.clone(),
            });
        }
        let professor = new.with_id(id);
        tables.professors.insert(id, professor.clone());
        Ok(professor)
    }

    async fn delete_professor(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.write()?;
        if tables.is_referenced(ResourceKind::Professor, id) {
            return Err(Self::referenced_error(ResourceKind::Professor, id));
        }
        Ok(tables.professors.remove(&id).is_some())
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        Ok(self.read()?.rooms.values().cloned().collect())
    }

    async fn get_room(&self, id: i64) -> StoreResult<Room> {
        self.read()?
            .rooms
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("room", id))
    }

    async fn create_room(&self, new: &NewRoom) -> StoreResult<Room> {
        let mut tables = self.write()?;
        let room = new.with_id(tables.next_id());
        tables.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn update_room(&self, id: i64, new: &NewRoom) -> StoreResult<Room> {
        let mut tables = self.write()?;
        let slot = tables
            .rooms
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("room", id))?;
        *slot = new.with_id(id);
        Ok(slot.clone())
    }

    async fn delete_room(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.write()?;
        if tables.is_referenced(ResourceKind::Room, id) {
            return Err(Self::referenced_error(ResourceKind::Room, id));
        }
        Ok(tables.rooms.remove(&id).is_some())
    }

    async fn list_classes(&self) -> StoreResult<Vec<Class>> {
        Ok(self.read()?.classes.values().cloned().collect())
    }

    async fn get_class(&self, id: i64) -> StoreResult<Class> {
        self.read()?
            .classes
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("class", id))
    }

    async fn create_class(&self, new: &NewClass) -> StoreResult<Class> {
        let mut tables = self.write()?;
        let class = new.with_id(tables.next_id());
        tables.classes.insert(class.id, class.clone());
        Ok(class)
    }

    async fn update_class(&self, id: i64, new: &NewClass) -> StoreResult<Class> {
        let mut tables = self.write()?;
        let slot = tables
            .classes
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("class", id))?;
        *slot = new.with_id(id);
        Ok(slot.clone())
    }

    async fn delete_class(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.write()?;
        if tables.is_referenced(ResourceKind::Class, id) {
            return Err(Self::referenced_error(ResourceKind::Class, id));
        }
        Ok(tables.classes.remove(&id).is_some())
    }

    async fn list_allocations(&self) -> StoreResult<Vec<Allocation>> {
        let tables = self.read()?;
        tables
            .allocations
            .values()
            .map(|row| tables.hydrate(row))
            .collect()
    }

    async fn get_allocation(&self, id: i64) -> StoreResult<Allocation> {
        let tables = self.read()?;
        let row = tables
            .allocations
            .get(&id)
            .ok_or_else(|| StoreError::not_found("allocation", id))?;
        tables.hydrate(row)
    }

    async fn allocations_for(&self, kind: ResourceKind, id: i64) -> StoreResult<Vec<Allocation>> {
        let tables = self.read()?;
        tables
            .allocations
            .values()
            .filter(|row| row.fields.resource_id(kind) == id)
            .map(|row| tables.hydrate(row))
            .collect()
    }

    async fn insert_allocation(&self, new: &NewAllocation) -> StoreResult<Allocation> {
        let mut tables = self.write()?;
        tables.check_room(new, None)?;
        tables.check_references(new)?;

        let row = AllocationRow {
            id: tables.next_id(),
            fields: new.clone(),
        };
        let allocation = tables.hydrate(&row)?;
        tables.allocations.insert(row.id, row);
        Ok(allocation)
    }

    async fn update_allocation(&self, id: i64, new: &NewAllocation) -> StoreResult<Allocation> {
        let mut tables = self.write()?;
        if !tables.allocations.contains_key(&id) {
            return Err(StoreError::not_found("allocation", id));
        }
        tables.check_room(new, Some(id))?;
        tables.check_references(new)?;

        let row = AllocationRow {
            id,
            fields: new.clone(),
        };
        let allocation = tables.hydrate(&row)?;
        tables.allocations.insert(id, row);
        Ok(allocation)
    }

    async fn delete_allocation(&self, id: i64) -> StoreResult<bool> {
        Ok(self.write()?.allocations.remove(&id).is_some())
    }

    async fn allocated_ids(
        &self,
        kind: ResourceKind,
        day: &str,
        window: &TimeWindow,
    ) -> StoreResult<BTreeSet<i64>> {
        let tables = self.read()?;
        Ok(tables
            .allocations
            .values()
            .filter(|row| row.fields.day_of_week == day && row.fields.window().overlaps(window))
            .map(|row| row.fields.resource_id(kind))
            .collect())
    }
}
