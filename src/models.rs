// Core records for the timetable: resources, allocations and time windows

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::allocation::overlap::intervals_overlap;

// ============================================================================
// Resources
// ============================================================================

/// Professor who can be assigned to teach a class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Professor {
    pub id: i64,
    pub name: String,
    pub email: String, // unique across professors
    pub qualification: Option<String>,
    pub subject: String,
}

/// Fields accepted when creating or replacing a professor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NewProfessor {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub qualification: Option<String>,
    pub subject: String,
}

impl NewProfessor {
    /// Check required fields
    pub fn validate(&self) -> Result<(), String> {
        require("name", &self.name)?;
        require("email", &self.email)?;
        require("subject", &self.subject)?;
        if !self.email.contains('@') {
            return Err(format!("email '{}' is not a valid address", self.email));
        }
        Ok(())
    }

    /// Attach a store-assigned identity
    pub fn with_id(&self, id: i64) -> Professor {
        Professor {
            id,
            name: self.name.clone(),
            email: self.email.clone(),
            qualification: self.qualification.clone(),
            subject: self.subject.clone(),
        }
    }
}

/// Physical room where a class is held
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Room {
    pub id: i64,
    pub number: String,
    pub capacity: i32,
    pub block: Option<String>,
    pub room_type: Option<String>, // laboratory, lecture hall, ...
}

/// Fields accepted when creating or replacing a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NewRoom {
    pub number: String,
    pub capacity: i32,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub room_type: Option<String>,
}

impl NewRoom {
    /// Check required fields
    pub fn validate(&self) -> Result<(), String> {
        require("number", &self.number)?;
        if self.capacity < 0 {
            return Err(format!("capacity must not be negative (got {})", self.capacity));
        }
        Ok(())
    }

    /// Attach a store-assigned identity
    pub fn with_id(&self, id: i64) -> Room {
        Room {
            id,
            number: self.number.clone(),
            capacity: self.capacity,
            block: self.block.clone(),
            room_type: self.room_type.clone(),
        }
    }
}

/// Student cohort that attends lessons together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Class {
    pub id: i64,
    pub name: String,
    pub course: String,
    pub term: Option<String>,
    pub student_count: Option<i32>,
}

/// Fields accepted when creating or replacing a class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NewClass {
    pub name: String,
    pub course: String,
    #[serde(default)]
    pub term: Option<String>,
    #[serde(default)]
    pub student_count: Option<i32>,
}

impl NewClass {
    /// Check required fields
    pub fn validate(&self) -> Result<(), String> {
        require("name", &self.name)?;
        require("course", &self.course)?;
        if let Some(count) = self.student_count {
            if count < 0 {
                return Err(format!("student_count must not be negative (got {count})"));
            }
        }
        Ok(())
    }

    /// Attach a store-assigned identity
    pub fn with_id(&self, id: i64) -> Class {
        Class {
            id,
            name: self.name.clone(),
            course: self.course.clone(),
            term: self.term.clone(),
            student_count: self.student_count,
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} is required"));
    }
    Ok(())
}

/// The three resource kinds an allocation ties together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Professor,
    Room,
    Class,
}

impl ResourceKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Professor => "professor",
            Self::Room => "room",
            Self::Class => "class",
        }
    }

    /// Foreign-key column in the allocations table
    pub fn column(&self) -> &'static str {
        match self {
            Self::Professor => "professor_id",
            Self::Room => "room_id",
            Self::Class => "class_id",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Anything that can be booked into a slot
pub trait Resource: Clone + Send + Sync {
    const KIND: ResourceKind;

    fn id(&self) -> i64;
}

impl Resource for Professor {
    const KIND: ResourceKind = ResourceKind::Professor;

    fn id(&self) -> i64 {
        self.id
    }
}

impl Resource for Room {
    const KIND: ResourceKind = ResourceKind::Room;

    fn id(&self) -> i64 {
        self.id
    }
}

impl Resource for Class {
    const KIND: ResourceKind = ResourceKind::Class;

    fn id(&self) -> i64 {
        self.id
    }
}

// ============================================================================
// Time windows
// ============================================================================

/// Half-open `[start, end)` window of "HH:MM" clock times
///
/// Times are kept as strings and compared lexicographically, which is only
/// sound because [`TimeWindow::validate`] insists on zero-padded 24h values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Both ends are "HH:MM" and the window is not empty
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [("start_time", &self.start), ("end_time", &self.end)] {
            if value.is_empty() {
                return Err(format!("{field} is required"));
            }
            if !is_clock_time(value) {
                return Err(format!("{field} '{value}' must be a zero-padded HH:MM time"));
            }
        }
        if self.start >= self.end {
            return Err(format!(
                "start_time '{}' must be earlier than end_time '{}'",
                self.start, self.end
            ));
        }
        Ok(())
    }

    /// Whether the two windows share any instant
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        intervals_overlap(&self.start, &self.end, &other.start, &other.end)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Check for a zero-padded 24h "HH:MM" time
pub fn is_clock_time(value: &str) -> bool {
    static CLOCK_RE: OnceLock<Regex> = OnceLock::new();

    let re = CLOCK_RE
        .get_or_init(|| Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").expect("Invalid regex pattern"));

    re.is_match(value)
}

/// A weekday label plus a window, as requested for auto-allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRequest {
    #[serde(default)]
    pub day_of_week: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
}

impl SlotRequest {
    pub fn new(
        day_of_week: impl Into<String>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
    ) -> Self {
        Self {
            day_of_week: day_of_week.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time.clone(), self.end_time.clone())
    }

    /// All three fields present and the window well-formed
    pub fn validate(&self) -> Result<(), String> {
        if self.day_of_week.trim().is_empty()
            || self.start_time.is_empty()
            || self.end_time.is_empty()
        {
            return Err("day_of_week, start_time and end_time are required".to_string());
        }
        self.window().validate()
    }
}

// ============================================================================
// Allocations
// ============================================================================

/// Fields accepted when creating or replacing an allocation
///
/// Embedded records sent by clients are ignored; only the identifiers count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAllocation {
    pub professor_id: i64,
    pub room_id: i64,
    pub class_id: i64,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
}

impl NewAllocation {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time.clone(), self.end_time.clone())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.day_of_week.trim().is_empty() {
            return Err("day_of_week is required".to_string());
        }
        self.window().validate()
    }

    /// Identifier of the resource of the given kind
    pub fn resource_id(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Professor => self.professor_id,
            ResourceKind::Room => self.room_id,
            ResourceKind::Class => self.class_id,
        }
    }
}

/// A scheduled lesson with its three resources embedded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: i64,
    pub professor_id: i64,
    pub room_id: i64,
    pub class_id: i64,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    pub professor: Professor,
    pub room: Room,
    pub class: Class,
}

impl Allocation {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time.clone(), self.end_time.clone())
    }
}
