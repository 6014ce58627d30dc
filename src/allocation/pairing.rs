//! Candidate generation for batch allocation
//!
//! Each free list is shuffled on its own, then the i-th professor, room and
//! class form the i-th candidate. The zip stops at the shortest list, so every
//! resource appears in at most one candidate.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::availability::Availability;
use crate::models::{Class, NewAllocation, Professor, Room, SlotRequest};

/// One professor, room and class proposed for the same slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub professor: Professor,
    pub room: Room,
    pub class: Class,
}

impl Candidate {
    /// Allocation input for this candidate in `slot`
    pub fn to_new_allocation(&self, slot: &SlotRequest) -> NewAllocation {
        NewAllocation {
            professor_id: self.professor.id,
            room_id: self.room.id,
            class_id: self.class.id,
            day_of_week: slot.day_of_week.clone(),
            start_time: slot.start_time.clone(),
            end_time: slot.end_time.clone(),
        }
    }
}

/// Positional zip of the three lists, truncated to the shortest
pub fn pair_candidates(
    professors: Vec<Professor>,
    rooms: Vec<Room>,
    classes: Vec<Class>,
) -> Vec<Candidate> {
    professors
        .into_iter()
        .zip(rooms)
        .zip(classes)
        .map(|((professor, room), class)| Candidate {
            professor,
            room,
            class,
        })
        .collect()
}

/// Shuffle each list independently, then pair positionally
pub fn shuffle_and_pair<R: Rng + ?Sized>(availability: Availability, rng: &mut R) -> Vec<Candidate> {
    let Availability {
        mut professors,
        mut rooms,
        mut classes,
    } = availability;

    professors.shuffle(rng);
    rooms.shuffle(rng);
    classes.shuffle(rng);

    pair_candidates(professors, rooms, classes)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn professors(n: i64) -> Vec<Professor> {
        (1..=n)
            .map(|id| Professor {
                id,
                name: format!("P{id}"),
                email: format!("p{id}@uni.edu"),
                ..Default::default()
            })
            .collect()
    }

    fn rooms(n: i64) -> Vec<Room> {
        (1..=n)
            .map(|id| Room {
                id: 100 + id,
                number: format!("R{id}"),
                ..Default::default()
            })
            .collect()
    }

    fn classes(n: i64) -> Vec<Class> {
        (1..=n)
            .map(|id| Class {
                id: 200 + id,
                name: format!("C{id}"),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_pairing_is_positional() {
        let candidates = pair_candidates(professors(3), rooms(3), classes(3));
        assert_eq!(candidates.len(), 3);
        for (i, candidate) in candidates.iter().enumerate() {
            let i = i as i64 + 1;
            assert_eq!(candidate.professor.id, i);
            assert_eq!(candidate.room.id, 100 + i);
            assert_eq!(candidate.class.id, 200 + i);
        }
    }

    #[test]
    fn test_pairing_truncates_to_shortest() {
        assert_eq!(pair_candidates(professors(2), rooms(5), classes(3)).len(), 2);
        assert_eq!(pair_candidates(professors(4), rooms(1), classes(3)).len(), 1);
        assert!(pair_candidates(professors(4), rooms(4), Vec::new()).is_empty());
    }

    #[test]
    fn test_shuffle_uses_each_resource_once() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let availability = Availability {
            professors: professors(6),
            rooms: rooms(4),
            classes: classes(5),
        };

        let candidates = shuffle_and_pair(availability, &mut rng);
        assert_eq!(candidates.len(), 4);

        let profs: HashSet<i64> = candidates.iter().map(|c| c.professor.id).collect();
        let rooms: HashSet<i64> = candidates.iter().map(|c| c.room.id).collect();
        let classes: HashSet<i64> = candidates.iter().map(|c| c.class.id).collect();
        assert_eq!(profs.len(), 4);
        assert_eq!(rooms.len(), 4);
        assert_eq!(classes.len(), 4);
    }

    #[test]
    fn test_same_seed_same_pairs() {
        let availability = Availability {
            professors: professors(8),
            rooms: rooms(8),
            classes: classes(8),
        };

        let a = shuffle_and_pair(availability.clone(), &mut ChaCha8Rng::seed_from_u64(42));
        let b = shuffle_and_pair(availability, &mut ChaCha8Rng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_candidate_carries_slot() {
        let candidate = pair_candidates(professors(1), rooms(1), classes(1)).remove(0);
        let slot = SlotRequest::new("Tuesday", "13:00", "14:40");

        let new = candidate.to_new_allocation(&slot);
        assert_eq!(new.professor_id, 1);
        assert_eq!(new.room_id, 101);
        assert_eq!(new.class_id, 201);
        assert_eq!(new.day_of_week, "Tuesday");
        assert_eq!(new.end_time, "14:40");
    }
}
