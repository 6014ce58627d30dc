//! Allocation engine scenarios, run against every local backend

mod common;

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use class_organize::allocation::{intervals_overlap, AllocationEngine, AllocationError};
use class_organize::models::SlotRequest;
use class_organize::storage::MemoryScheduleStore;
use common::{backends, booking, seed, StaleRoomView};

fn rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

#[test]
fn test_overlap_cases() {
    // touching
    assert!(!intervals_overlap("10:00", "11:00", "11:00", "12:00"));
    // nested
    assert!(intervals_overlap("08:00", "12:00", "09:00", "10:00"));
    // partial
    assert!(intervals_overlap("10:00", "11:00", "10:30", "11:30"));
    // identical
    assert!(intervals_overlap("10:00", "11:00", "10:00", "11:00"));
}

#[tokio::test]
async fn test_single_create_enforces_room_non_overlap() {
    for backend in backends() {
        let s = seed(backend.store.as_ref(), 1, 1, 1).await;
        let engine = AllocationEngine::new(backend.store.clone());
        let (p, r, c) = (&s.professors[0], &s.rooms[0], &s.classes[0]);

        engine
            .create_allocation(booking(p, r, c, "Monday", "10:00", "11:00"))
            .await
            .unwrap();

        let err = engine
            .create_allocation(booking(p, r, c, "Monday", "10:30", "11:30"))
            .await
            .unwrap_err();
        assert!(matches!(err, AllocationError::Conflict { .. }), "{}: {err:?}", backend.name);

        let created = engine
            .create_allocation(booking(p, r, c, "Monday", "11:00", "12:00"))
            .await
            .unwrap();
        assert_eq!(created.professor, *p, "{}", backend.name);
        assert_eq!(created.room, *r);
        assert_eq!(created.class, *c);
    }
}

#[tokio::test]
async fn test_availability_excludes_only_overlapping_bookings() {
    for backend in backends() {
        let s = seed(backend.store.as_ref(), 3, 3, 3).await;
        let engine = AllocationEngine::new(backend.store.clone());
        let busy = &s.professors[1];

        engine
            .create_allocation(booking(busy, &s.rooms[0], &s.classes[0], "Monday", "09:00", "10:00"))
            .await
            .unwrap();

        let during = engine
            .availability(&SlotRequest::new("Monday", "09:00", "10:00"))
            .await
            .unwrap();
        let ids: Vec<i64> = during.professors.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![s.professors[0].id, s.professors[2].id], "{}", backend.name);
        assert_eq!(during.rooms.len(), 2);
        assert_eq!(during.classes.len(), 2);

        let after = engine
            .availability(&SlotRequest::new("Monday", "10:00", "11:00"))
            .await
            .unwrap();
        assert_eq!(after.professors.len(), 3, "{}", backend.name);
    }
}

#[tokio::test]
async fn test_availability_rejects_incomplete_slot() {
    for backend in backends() {
        let engine = AllocationEngine::new(backend.store.clone());
        let err = engine
            .availability(&SlotRequest::new("Monday", "", "10:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, AllocationError::Validation(_)), "{}", backend.name);
    }
}

#[tokio::test]
async fn test_batch_attempts_at_most_scarcest_count() {
    for backend in backends() {
        seed(backend.store.as_ref(), 2, 5, 3).await;
        let engine = AllocationEngine::new(backend.store.clone());

        let outcome = engine
            .auto_allocate(&SlotRequest::new("Tuesday", "08:00", "09:40"), &mut rng(7))
            .await
            .unwrap();

        assert_eq!(outcome.attempted, 2, "{}", backend.name);
        assert_eq!(outcome.created.len(), 2);
        assert_eq!(backend.store.list_allocations().await.unwrap().len(), 2);
        for allocation in &outcome.created {
            assert_eq!(allocation.day_of_week, "Tuesday");
            assert_eq!(allocation.start_time, "08:00");
            assert_eq!(allocation.end_time, "09:40");
        }
    }
}

#[tokio::test]
async fn test_batch_with_an_empty_kind_creates_nothing() {
    for backend in backends() {
        seed(backend.store.as_ref(), 3, 3, 0).await;
        let engine = AllocationEngine::new(backend.store.clone());

        let err = engine
            .auto_allocate(&SlotRequest::new("Tuesday", "08:00", "09:00"), &mut rng(1))
            .await
            .unwrap_err();
        assert!(
            matches!(err, AllocationError::InsufficientResources { classes: 0, .. }),
            "{}: {err:?}",
            backend.name
        );
        assert!(backend.store.list_allocations().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_batch_skips_conflicting_candidate_and_keeps_the_rest() {
    for backend in backends() {
        let s = seed(backend.store.as_ref(), 3, 2, 3).await;

        // rooms[0] is taken, but the stale view still offers it
        backend
            .store
            .insert_allocation(&booking(&s.professors[0], &s.rooms[0], &s.classes[0], "Thursday", "14:00", "15:00"))
            .await
            .unwrap();
        let engine = AllocationEngine::new(StaleRoomView::wrap(backend.store.clone()));

        let outcome = engine
            .auto_allocate(&SlotRequest::new("Thursday", "14:00", "15:00"), &mut rng(99))
            .await
            .unwrap();

        assert_eq!(outcome.attempted, 2, "{}", backend.name);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.created[0].room_id, s.rooms[1].id);
    }
}

#[tokio::test]
async fn test_batch_where_every_candidate_fails() {
    for backend in backends() {
        let s = seed(backend.store.as_ref(), 2, 1, 2).await;
        backend
            .store
            .insert_allocation(&booking(&s.professors[0], &s.rooms[0], &s.classes[0], "Friday", "08:00", "09:00"))
            .await
            .unwrap();
        let engine = AllocationEngine::new(StaleRoomView::wrap(backend.store.clone()));

        let err = engine
            .auto_allocate(&SlotRequest::new("Friday", "08:00", "09:00"), &mut rng(3))
            .await
            .unwrap_err();
        assert!(
            matches!(err, AllocationError::NoAllocationCreated { attempted: 1 }),
            "{}: {err:?}",
            backend.name
        );
    }
}

#[tokio::test]
async fn test_same_seed_same_pairing() {
    let mut runs = Vec::new();
    for _ in 0..2 {
        let store = Arc::new(MemoryScheduleStore::new());
        seed(store.as_ref(), 4, 4, 4).await;
        let engine = AllocationEngine::new(store);
        let outcome = engine
            .auto_allocate(&SlotRequest::new("Monday", "08:00", "09:00"), &mut rng(2024))
            .await
            .unwrap();
        let triples: Vec<(i64, i64, i64)> = outcome
            .created
            .iter()
            .map(|a| (a.professor_id, a.room_id, a.class_id))
            .collect();
        runs.push(triples);
    }
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0].len(), 4);
}

#[tokio::test]
async fn test_repeated_reads_embed_identical_records() {
    for backend in backends() {
        let s = seed(backend.store.as_ref(), 1, 1, 1).await;
        let engine = AllocationEngine::new(backend.store.clone());
        let created = engine
            .create_allocation(booking(&s.professors[0], &s.rooms[0], &s.classes[0], "Saturday", "07:00", "08:00"))
            .await
            .unwrap();

        let first = backend.store.get_allocation(created.id).await.unwrap();
        let second = backend.store.get_allocation(created.id).await.unwrap();
        assert_eq!(first.professor, second.professor, "{}", backend.name);
        assert_eq!(first.room, second.room);
        assert_eq!(first.class, second.class);
    }
}
