//! `Emails.To.Send`: at-least-once outbound email delivery with a bounded
//! retry count.
//!
//! State is `{ list: Vec<EmailAttempt> }`, not a bare array - folding
//! against the array directly would make every reducer branch reach past
//! the projection's own `DynState` wrapper for a type that isn't there.
//! Each `Email.Failed` increments `attempt`; once an entry reaches
//! [`MAX_ATTEMPTS`], `reduce` drops it rather than retrying forever. A
//! welcome email is queued automatically whenever a member's subscription
//! is confirmed, so the retry path has a real producer rather than only a
//! standalone queue command.

use serde::{Deserialize, Serialize};
use txn_core::{downcast_mut, ChangeState, Command, CoreError, DynState, Event, NewEvent, ViewState};

pub const PARTITION: &str = "emails";

/// Maximum delivery attempts before an email is dropped.
pub const MAX_ATTEMPTS: u32 = 10;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmailAttempt {
    pub id: String,
    pub to: String,
    pub attempt: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EmailsToSendState {
    pub list: Vec<EmailAttempt>,
}

/// Queues a new outbound email directly. Most entries in `Emails.To.Send`
/// instead arrive via `Member.Subscribed` (see [`EmailsToSend::reduce`]);
/// this command exists for callers that need to queue one without going
/// through the assignment flow.
pub struct EmailsQueue;

impl ChangeState for EmailsQueue {
    fn view_id(&self) -> &'static str {
        "Emails.Queue"
    }

    fn initial_state(&self) -> Box<dyn DynState> {
        Box::new(())
    }

    fn reduce(&self, _state: &mut dyn DynState, _event: &Event) -> bool {
        false
    }

    fn map(&self, command: &Command, _state: &dyn DynState) -> Result<Vec<NewEvent>, CoreError> {
        let to = command
            .data
            .get("to")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| CoreError::MapperFailure {
                view_id: self.view_id(),
                reason: "to is required".to_string(),
            })?;
        let id = command
            .data
            .get("id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| CoreError::MapperFailure {
                view_id: self.view_id(),
                reason: "id is required".to_string(),
            })?;

        Ok(vec![NewEvent::new(
            PARTITION,
            "Email.Queued",
            serde_json::json!({ "id": id, "to": to }),
        )])
    }
}

/// The bounded-retry view over outstanding deliveries.
pub struct EmailsToSend;

impl ViewState for EmailsToSend {
    fn view_id(&self) -> &'static str {
        "Emails.To.Send"
    }

    fn initial_state(&self) -> Box<dyn DynState> {
        Box::new(EmailsToSendState::default())
    }

    fn reduce(&self, state: &mut dyn DynState, event: &Event) -> bool {
        let state = downcast_mut::<EmailsToSendState>(state);
        match event.event_type.as_str() {
            "Email.Queued" => {
                let (Some(id), Some(to)) = (
                    event.data.get("id").and_then(serde_json::Value::as_str),
                    event.data.get("to").and_then(serde_json::Value::as_str),
                ) else {
                    return false;
                };
                state.list.push(EmailAttempt {
                    id: id.to_string(),
                    to: to.to_string(),
                    attempt: 0,
                });
                true
            }
            "Member.Subscribed" => {
                let Some(member_id) = event.data.get("memberId").and_then(serde_json::Value::as_str) else {
                    return false;
                };
                state.list.push(EmailAttempt {
                    id: format!("welcome-{member_id}"),
                    to: format!("{member_id}@example.com"),
                    attempt: 0,
                });
                true
            }
            "Email.Succeeded" => {
                let Some(id) = event.data.get("id").and_then(serde_json::Value::as_str) else {
                    return false;
                };
                let before = state.list.len();
                state.list.retain(|email| email.id != id);
                state.list.len() != before
            }
            "Email.Failed" => {
                let Some(id) = event.data.get("id").and_then(serde_json::Value::as_str) else {
                    return false;
                };
                let Some(email) = state.list.iter_mut().find(|email| email.id == id) else {
                    return false;
                };
                email.attempt += 1;
                if email.attempt >= MAX_ATTEMPTS {
                    state.list.retain(|email| email.id != id);
                }
                true
            }
            _ => false,
        }
    }
}
