//! Allocation engine
//!
//! Single conflict-checked writes and best-effort batch auto-allocation on
//! top of a [`ScheduleStore`].

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use super::availability::{self, Availability};
use super::error::{AllocationError, AllocationResult};
use super::pairing::shuffle_and_pair;
use crate::metrics;
use crate::models::{
    Allocation, Class, NewAllocation, Professor, ResourceKind, Room, SlotRequest, TimeWindow,
};
use crate::storage::{ScheduleStore, SharedScheduleStore};

/// Result of one auto-allocation run
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    /// Allocations written, in creation order
    pub created: Vec<Allocation>,
    /// Candidate pairings tried
    pub attempted: usize,
    /// Candidates whose write failed
    pub skipped: usize,
}

/// Availability resolution plus conflict-checked allocation writes
#[derive(Clone)]
pub struct AllocationEngine {
    store: SharedScheduleStore,
}

impl AllocationEngine {
    pub fn new(store: SharedScheduleStore) -> Self {
        Self { store }
    }

    /// Underlying store
    pub fn store(&self) -> &SharedScheduleStore {
        &self.store
    }

    fn store_ref(&self) -> &dyn ScheduleStore {
        self.store.as_ref()
    }

    // ---- availability ----

    pub async fn available_professors(
        &self,
        day: &str,
        window: &TimeWindow,
    ) -> AllocationResult<Vec<Professor>> {
        availability::available_professors(self.store_ref(), day, window).await
    }

    pub async fn available_rooms(&self, day: &str, window: &TimeWindow) -> AllocationResult<Vec<Room>> {
        availability::available_rooms(self.store_ref(), day, window).await
    }

    pub async fn available_classes(
        &self,
        day: &str,
        window: &TimeWindow,
    ) -> AllocationResult<Vec<Class>> {
        availability::available_classes(self.store_ref(), day, window).await
    }

    /// Free professors, rooms and classes for a slot
    pub async fn availability(&self, slot: &SlotRequest) -> AllocationResult<Availability> {
        slot.validate().map_err(AllocationError::Validation)?;
        availability::resolve(self.store_ref(), slot).await
    }

    // ---- single writes ----

    /// Create one allocation if its room is free for that day and window
    ///
    /// Professor and class double booking is only reported in the log.
    pub async fn create_allocation(&self, new: NewAllocation) -> AllocationResult<Allocation> {
        new.validate().map_err(AllocationError::Validation)?;
        self.warn_on_double_booking(&new, None).await;

        let allocation = self.persist(&new).await?;
        metrics::record_allocations_created("single", 1);
        tracing::info!(
            allocation_id = allocation.id,
            room_id = allocation.room_id,
            day = %allocation.day_of_week,
            window = %allocation.window(),
            "Allocation created"
        );
        Ok(allocation)
    }

    /// Replace an allocation; its own booking does not count as a conflict
    pub async fn update_allocation(
        &self,
        id: i64,
        new: NewAllocation,
    ) -> AllocationResult<Allocation> {
        new.validate().map_err(AllocationError::Validation)?;
        self.warn_on_double_booking(&new, Some(id)).await;

        let result = self.store.update_allocation(id, &new).await;
        if let Err(crate::storage::StoreError::RoomConflict { .. }) = &result {
            metrics::record_room_conflict();
        }
        let allocation = result?;
        tracing::info!(allocation_id = id, room_id = allocation.room_id, "Allocation updated");
        Ok(allocation)
    }

    async fn persist(&self, new: &NewAllocation) -> AllocationResult<Allocation> {
        match self.store.insert_allocation(new).await {
            Ok(allocation) => Ok(allocation),
            Err(e) => {
                let err = AllocationError::from(e);
                if matches!(err, AllocationError::Conflict { .. }) {
                    metrics::record_room_conflict();
                }
                Err(err)
            }
        }
    }

    async fn warn_on_double_booking(&self, new: &NewAllocation, exclude: Option<i64>) {
        let window = new.window();
        for kind in [ResourceKind::Professor, ResourceKind::Class] {
            let id = new.resource_id(kind);
            let existing = match self.store.allocations_for(kind, id).await {
                Ok(existing) => existing,
                Err(e) => {
                    tracing::debug!(error = %e, %kind, id, "Skipping double-booking check");
                    continue;
                }
            };

            let clash = existing.iter().find(|a| {
                Some(a.id) != exclude
                    && a.day_of_week == new.day_of_week
                    && a.window().overlaps(&window)
            });
            if let Some(other) = clash {
                tracing::warn!(
                    %kind,
                    id,
                    day = %new.day_of_week,
                    window = %window,
                    other_allocation = other.id,
                    "Resource already allocated in an overlapping window"
                );
            }
        }
    }

    // ---- batch ----

    /// Allocate as many free (professor, room, class) triples as possible
    ///
    /// Each free list is shuffled with `rng` and zipped positionally. A failed
    /// candidate is skipped; the run only fails when nothing is free or when
    /// every candidate failed.
    pub async fn auto_allocate<R>(
        &self,
        slot: &SlotRequest,
        rng: &mut R,
    ) -> AllocationResult<BatchOutcome>
    where
        R: Rng + Send + ?Sized,
    {
        slot.validate().map_err(AllocationError::Validation)?;
        let _timer = metrics::start_batch_timer();

        let availability = availability::resolve(self.store_ref(), slot).await?;
        if availability.is_insufficient() {
            metrics::record_batch_run("insufficient");
            return Err(AllocationError::InsufficientResources {
                professors: availability.professors.len(),
                rooms: availability.rooms.len(),
                classes: availability.classes.len(),
            });
        }

        let candidates = shuffle_and_pair(availability, rng);
        let attempted = candidates.len();
        let mut created = Vec::with_capacity(attempted);

        for candidate in &candidates {
            let new = candidate.to_new_allocation(slot);
            match self.persist(&new).await {
                Ok(allocation) => created.push(allocation),
                Err(e) => {
                    tracing::warn!(
                        professor_id = new.professor_id,
                        room_id = new.room_id,
                        class_id = new.class_id,
                        error = %e,
                        "Skipping candidate"
                    );
                }
            }
        }

        if created.is_empty() {
            metrics::record_batch_run("none_created");
            return Err(AllocationError::NoAllocationCreated { attempted });
        }

        let outcome = BatchOutcome {
            skipped: attempted - created.len(),
            attempted,
            created,
        };

        metrics::record_batch_run("created");
        metrics::record_allocations_created("batch", outcome.created.len());
        tracing::info!(
            day = %slot.day_of_week,
            window = %slot.window(),
            attempted = outcome.attempted,
            created = outcome.created.len(),
            skipped = outcome.skipped,
            "Auto-allocation finished"
        );

        Ok(outcome)
    }

    /// [`auto_allocate`](Self::auto_allocate) with a generator seeded from OS entropy
    pub async fn auto_allocate_fresh(&self, slot: &SlotRequest) -> AllocationResult<BatchOutcome> {
        let mut rng = ChaCha8Rng::from_entropy();
        self.auto_allocate(slot, &mut rng).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{NewClass, NewProfessor, NewRoom};
    use crate::storage::MemoryScheduleStore;

    async fn seeded(professors: usize, rooms: usize, classes: usize) -> AllocationEngine {
        let store = Arc::new(MemoryScheduleStore::new());
        for i in 0..professors {
            store
                .create_professor(&NewProfessor {
                    name: format!("Professor {i}"),
                    email: format!("prof{i}@uni.edu"),
                    qualification: None,
                    subject: "Physics".to_string(),
                })
                .await
                .unwrap();
        }
        for i in 0..rooms {
            store
                .create_room(&NewRoom {
                    number: format!("B-{i}"),
                    capacity: 30,
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        for i in 0..classes {
            store
                .create_class(&NewClass {
                    name: format!("Class {i}"),
                    course: "Engineering".to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        AllocationEngine::new(store)
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(2024)
    }

    async fn first_ids(engine: &AllocationEngine) -> (i64, i64, i64) {
        let p = engine.store().list_professors().await.unwrap()[0].id;
        let r = engine.store().list_rooms().await.unwrap()[0].id;
        let c = engine.store().list_classes().await.unwrap()[0].id;
        (p, r, c)
    }

    fn booking(p: i64, r: i64, c: i64, day: &str, start: &str, end: &str) -> NewAllocation {
        NewAllocation {
            professor_id: p,
            room_id: r,
            class_id: c,
            day_of_week: day.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    #[tokio::test]
    async fn test_room_overlap_rejected_touching_accepted() {
        let engine = seeded(1, 1, 1).await;
        let (p, r, c) = first_ids(&engine).await;

        engine
            .create_allocation(booking(p, r, c, "Monday", "10:00", "11:00"))
            .await
            .unwrap();

        let err = engine
            .create_allocation(booking(p, r, c, "Monday", "10:30", "11:30"))
            .await
            .unwrap_err();
        assert!(matches!(err, AllocationError::Conflict { room_id, .. } if room_id == r));

        let touching = engine
            .create_allocation(booking(p, r, c, "Monday", "11:00", "12:00"))
            .await
            .unwrap();
        assert_eq!(touching.room_id, r);
    }

    #[tokio::test]
    async fn test_invalid_window_never_reaches_store() {
        let engine = seeded(1, 1, 1).await;
        let (p, r, c) = first_ids(&engine).await;

        let err = engine
            .create_allocation(booking(p, r, c, "Monday", "11:00", "10:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, AllocationError::Validation(_)));
        assert!(engine.store().list_allocations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_excludes_itself() {
        let engine = seeded(1, 1, 1).await;
        let (p, r, c) = first_ids(&engine).await;

        let created = engine
            .create_allocation(booking(p, r, c, "Wednesday", "08:00", "10:00"))
            .await
            .unwrap();
        let moved = engine
            .update_allocation(created.id, booking(p, r, c, "Wednesday", "09:00", "11:00"))
            .await
            .unwrap();
        assert_eq!(moved.id, created.id);
        assert_eq!(moved.start_time, "09:00");
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let engine = seeded(1, 1, 1).await;
        let (p, r, c) = first_ids(&engine).await;

        let err = engine
            .update_allocation(999, booking(p, r, c, "Monday", "08:00", "09:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, AllocationError::NotFound { id: 999, .. }));
    }

    #[tokio::test]
    async fn test_availability_excludes_booked_professor() {
        let engine = seeded(3, 3, 3).await;
        let (p, r, c) = first_ids(&engine).await;
        engine
            .create_allocation(booking(p, r, c, "Monday", "09:00", "10:00"))
            .await
            .unwrap();

        let same = engine
            .availability(&SlotRequest::new("Monday", "09:00", "10:00"))
            .await
            .unwrap();
        assert_eq!(same.professors.len(), 2);
        assert!(same.professors.iter().all(|prof| prof.id != p));

        let later = engine
            .availability(&SlotRequest::new("Monday", "10:00", "11:00"))
            .await
            .unwrap();
        assert_eq!(later.professors.len(), 3);

        let other_day = engine
            .availability(&SlotRequest::new("monday", "09:00", "10:00"))
            .await
            .unwrap();
        assert_eq!(other_day.professors.len(), 3);
    }

    #[tokio::test]
    async fn test_batch_is_bounded_by_scarcest_kind() {
        let engine = seeded(2, 5, 3).await;
        let outcome = engine
            .auto_allocate(&SlotRequest::new("Thursday", "14:00", "15:40"), &mut rng())
            .await
            .unwrap();

        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.skipped, 0);
        assert_ne!(outcome.created[0].professor_id, outcome.created[1].professor_id);
        assert_ne!(outcome.created[0].room_id, outcome.created[1].room_id);
        assert_ne!(outcome.created[0].class_id, outcome.created[1].class_id);
    }

    #[tokio::test]
    async fn test_batch_with_nothing_free_fails() {
        let engine = seeded(2, 0, 2).await;
        let err = engine
            .auto_allocate(&SlotRequest::new("Friday", "08:00", "09:00"), &mut rng())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AllocationError::InsufficientResources { rooms: 0, .. }
        ));
        assert!(engine.store().list_allocations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_batch_for_same_slot_is_insufficient() {
        let engine = seeded(2, 2, 2).await;
        let slot = SlotRequest::new("Friday", "08:00", "09:00");

        engine.auto_allocate(&slot, &mut rng()).await.unwrap();
        let err = engine.auto_allocate(&slot, &mut rng()).await.unwrap_err();
        assert!(matches!(err, AllocationError::InsufficientResources { .. }));
    }

    #[tokio::test]
    async fn test_batch_requires_complete_slot() {
        let engine = seeded(1, 1, 1).await;
        let err = engine
            .auto_allocate(&SlotRequest::new("", "08:00", "09:00"), &mut rng())
            .await
            .unwrap_err();
        assert!(matches!(err, AllocationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_fresh_batch_allocates() {
        let engine = seeded(1, 1, 1).await;
        let outcome = engine
            .auto_allocate_fresh(&SlotRequest::new("Saturday", "07:00", "08:00"))
            .await
            .unwrap();
        assert_eq!(outcome.created.len(), 1);
    }
}
