//! Notifications sent after an allocation is created
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │      Notifier                              │
//! │  - builds an AllocationNotice              │
//! │  - spawns a detached delivery task         │
//! │  - logs and counts every outcome           │
//! └────────────────────────────────────────────┘
//!                     │
//!             ┌───────┴───────┐
//!             ▼               ▼
//!       ┌─────────┐     ┌──────────┐
//!       │ Webhook │     │  Resend  │
//!       │ Channel │     │  e-mail  │
//!       └─────────┘     └──────────┘
//! ```
//!
//! Delivery never blocks the request that created the allocation and a
//! failed delivery never turns into an error for it.

pub mod channels;
mod dispatcher;

use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Allocation;

pub use channels::email::{ResendChannel, ResendConfig};
pub use channels::webhook::{WebhookChannel, WebhookConfig};
pub use channels::{Channel, ChannelError, ChannelResult, DeliveryStatus};
pub use dispatcher::Notifier;

const SUBJECT_TEMPLATE: &str = "New allocation created: {{class_name}} in room {{room_number}}";

const TEXT_TEMPLATE: &str = "\
Allocation #{{allocation_id}} was created.

Class:     {{class_name}} ({{course}})
Professor: {{professor_name}} <{{professor_email}}>
Room:      {{room_number}}
When:      {{day_of_week}} {{start_time}}-{{end_time}}
";

const HTML_TEMPLATE: &str = r#"<h2>New allocation created</h2>
<p>Allocation <strong>#{{allocation_id}}</strong> was created.</p>
<table>
  <tr><td>Class</td><td>{{class_name}} ({{course}})</td></tr>
  <tr><td>Professor</td><td>{{professor_name}} &lt;{{professor_email}}&gt;</td></tr>
  <tr><td>Room</td><td>{{room_number}}</td></tr>
  <tr><td>When</td><td>{{day_of_week}} {{start_time}}-{{end_time}}</td></tr>
</table>
"#;

/// What gets announced about a newly created allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationNotice {
    /// Unique per notice; doubles as an idempotency key
    pub id: Uuid,
    pub allocation_id: i64,
    pub professor_name: String,
    pub professor_email: String,
    pub room_number: String,
    pub class_name: String,
    pub course: String,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    pub created_at: DateTime<Utc>,
}

impl AllocationNotice {
    pub fn from_allocation(allocation: &Allocation) -> Self {
        Self {
            id: Uuid::new_v4(),
            allocation_id: allocation.id,
            professor_name: allocation.professor.name.clone(),
            professor_email: allocation.professor.email.clone(),
            room_number: allocation.room.number.clone(),
            class_name: allocation.class.name.clone(),
            course: allocation.class.course.clone(),
            day_of_week: allocation.day_of_week.clone(),
            start_time: allocation.start_time.clone(),
            end_time: allocation.end_time.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Rendered subject and bodies of a notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNotice {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Handlebars renderer for notices
pub struct NoticeRenderer {
    handlebars: Handlebars<'static>,
}

impl NoticeRenderer {
    /// Renderer with the built-in templates
    pub fn new() -> ChannelResult<Self> {
        let mut handlebars = Handlebars::new();
        for (name, template) in [
            ("subject", SUBJECT_TEMPLATE),
            ("text", TEXT_TEMPLATE),
            ("html", HTML_TEMPLATE),
        ] {
            handlebars
                .register_template_string(name, template)
                .map_err(|e| ChannelError::TemplateSetup(Box::new(e)))?;
        }
        // subject and text are not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        Ok(Self { handlebars })
    }

    pub fn render(&self, notice: &AllocationNotice) -> ChannelResult<RenderedNotice> {
        let subject = self.handlebars.render("subject", notice)?;
        let text = self.handlebars.render("text", notice)?;

        let escaped = EscapedNotice::from(notice);
        let html = self.handlebars.render("html", &escaped)?;

        Ok(RenderedNotice {
            subject,
            text,
            html,
        })
    }
}

/// Notice with every text field HTML-escaped for the html template
#[derive(Serialize)]
struct EscapedNotice {
    allocation_id: i64,
    professor_name: String,
    professor_email: String,
    room_number: String,
    class_name: String,
    course: String,
    day_of_week: String,
    start_time: String,
    end_time: String,
}

impl From<&AllocationNotice> for EscapedNotice {
    fn from(notice: &AllocationNotice) -> Self {
        let esc = |s: &str| handlebars::html_escape(s);
        Self {
            allocation_id: notice.allocation_id,
            professor_name: esc(&notice.professor_name),
            professor_email: esc(&notice.professor_email),
            room_number: esc(&notice.room_number),
            class_name: esc(&notice.class_name),
            course: esc(&notice.course),
            day_of_week: esc(&notice.day_of_week),
            start_time: esc(&notice.start_time),
            end_time: esc(&notice.end_time),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Class, Professor, Room};

    pub(crate) fn sample_allocation() -> Allocation {
        Allocation {
            id: 17,
            professor_id: 1,
            room_id: 2,
            class_id: 3,
            day_of_week: "Monday".to_string(),
            start_time: "08:00".to_string(),
            end_time: "09:40".to_string(),
            professor: Professor {
                id: 1,
                name: "Barbara Liskov".to_string(),
                email: "liskov@uni.edu".to_string(),
                qualification: Some("PhD".to_string()),
                subject: "Programming".to_string(),
            },
            room: Room {
                id: 2,
                number: "A-101".to_string(),
                capacity: 40,
                block: Some("A".to_string()),
                room_type: None,
            },
            class: Class {
                id: 3,
                name: "CS <1>".to_string(),
                course: "Computer Science".to_string(),
                term: None,
                student_count: Some(35),
            },
        }
    }

    #[test]
    fn test_notice_from_allocation() {
        let notice = AllocationNotice::from_allocation(&sample_allocation());
        assert_eq!(notice.allocation_id, 17);
        assert_eq!(notice.room_number, "A-101");
        assert_eq!(notice.professor_email, "liskov@uni.edu");
    }

    #[test]
    fn test_render_notice() {
        let renderer = NoticeRenderer::new().unwrap();
        let notice = AllocationNotice::from_allocation(&sample_allocation());
        let rendered = renderer.render(&notice).unwrap();

        assert_eq!(
            rendered.subject,
            "New allocation created: CS <1> in room A-101"
        );
        assert!(rendered.text.contains("Monday 08:00-09:40"));
        assert!(rendered.html.contains("#17"));
        assert!(rendered.html.contains("CS &lt;1&gt;"));
        assert!(!rendered.html.contains("CS <1>"));
    }
}
