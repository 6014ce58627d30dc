//! Availability resolver
//!
//! For one day and window, keeps the resources that have no overlapping
//! allocation. Each kind is resolved independently: fetch all records, fetch
//! the booked ids, filter.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::error::AllocationResult;
use crate::models::{Class, Professor, Resource, Room, SlotRequest, TimeWindow};
use crate::storage::ScheduleStore;

/// Free resources for one slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub professors: Vec<Professor>,
    pub rooms: Vec<Room>,
    pub classes: Vec<Class>,
}

impl Availability {
    /// Upper bound on allocations a batch can create
    pub fn capacity(&self) -> usize {
        self.professors
            .len()
            .min(self.rooms.len())
            .min(self.classes.len())
    }

    /// True when at least one kind has nothing free
    pub fn is_insufficient(&self) -> bool {
        self.capacity() == 0
    }
}

/// Drop every resource whose id is booked; storage order is kept
pub fn exclude_booked<R: Resource>(all: Vec<R>, booked: &BTreeSet<i64>) -> Vec<R> {
    all.into_iter()
        .filter(|resource| !booked.contains(&resource.id()))
        .collect()
}

/// Professors with no allocation on `day` overlapping `window`
pub async fn available_professors(
    store: &dyn ScheduleStore,
    day: &str,
    window: &TimeWindow,
) -> AllocationResult<Vec<Professor>> {
    let all = store.list_professors().await?;
    let booked = store.allocated_ids(Professor::KIND, day, window).await?;
    Ok(exclude_booked(all, &booked))
}

/// Rooms with no allocation on `day` overlapping `window`
pub async fn available_rooms(
    store: &dyn ScheduleStore,
    day: &str,
    window: &TimeWindow,
) -> AllocationResult<Vec<Room>> {
    let all = store.list_rooms().await?;
    let booked = store.allocated_ids(Room::KIND, day, window).await?;
    Ok(exclude_booked(all, &booked))
}

/// Classes with no allocation on `day` overlapping `window`
pub async fn available_classes(
    store: &dyn ScheduleStore,
    day: &str,
    window: &TimeWindow,
) -> AllocationResult<Vec<Class>> {
    let all = store.list_classes().await?;
    let booked = store.allocated_ids(Class::KIND, day, window).await?;
    Ok(exclude_booked(all, &booked))
}

/// Resolve all three kinds for an already validated slot
pub async fn resolve(store: &dyn ScheduleStore, slot: &SlotRequest) -> AllocationResult<Availability> {
    let window = slot.window();
    let day = slot.day_of_week.as_str();

    let availability = Availability {
        professors: available_professors(store, day, &window).await?,
        rooms: available_rooms(store, day, &window).await?,
        classes: available_classes(store, day, &window).await?,
    };

    tracing::debug!(
        day,
        window = %window,
        professors = availability.professors.len(),
        rooms = availability.rooms.len(),
        classes = availability.classes.len(),
        "Resolved availability"
    );

    Ok(availability)
}
