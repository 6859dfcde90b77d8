//! `Subscription.Assign.Members`: a state-machine fixpoint that turns one
//! command into a per-member dispatch loop.
//!
//! `Subscription.Assign.Members` starts the assignment and records every
//! member as pending in `Assignment.Tracker`. That dirties the tracker,
//! which triggers [`AssignmentTrackerStateMachine`], which issues one
//! `Members.Subscribe.Dispatch` command per still-undispatched member -
//! recording that a subscription attempt is in flight, not its outcome.
//! The outcome only arrives later, via a separate `Members.Confirm.Subscription`
//! command (in production this would be driven by a callback from whatever
//! member service actually performs the subscription; here it's issued by
//! [`crate::effect::MemberConfirmEffect`] after a commit). That separation
//! is why, right after the initial assignment commits, `pending` is still
//! the full member list: dispatch and resolution are two different
//! transactions.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use txn_core::{
    downcast_mut, ChangeState, Command, CoreAccess, CoreError, DynState, Event, NewEvent, QueryResult, StateMachine,
    ViewState,
};

pub const PARTITION: &str = "members";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AssignmentTrackerState {
    pub pending: Vec<String>,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    /// Members a `Members.Subscribe.Dispatch` command has already been
    /// issued for. Without this, every re-trigger of the fixpoint would
    /// re-dispatch every member still in `pending`, including ones already
    /// in flight.
    pub dispatched: HashSet<String>,
    /// Which subscription each pending member belongs to, so the dispatch
    /// command (and everything downstream of it) can carry `subscriptionId`
    /// rather than losing it the moment the member-assignment fixpoint
    /// takes over.
    #[serde(rename = "subscriptionOf")]
    pub subscription_of: HashMap<String, String>,
}

/// Starts an assignment: records every member as pending. Carries no
/// mapper-owned state of its own - the interesting bookkeeping lives in
/// [`AssignmentTracker`].
pub struct SubscriptionAssignMembers;

impl ChangeState for SubscriptionAssignMembers {
    fn view_id(&self) -> &'static str {
        "Subscription.Assign.Members"
    }

    fn initial_state(&self) -> Box<dyn DynState> {
        Box::new(())
    }

    fn reduce(&self, _state: &mut dyn DynState, _event: &Event) -> bool {
        false
    }

    fn map(&self, command: &Command, _state: &dyn DynState) -> Result<Vec<NewEvent>, CoreError> {
        let subscription_id = command
            .data
            .get("subscriptionId")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| CoreError::MapperFailure {
                view_id: self.view_id(),
                reason: "subscriptionId is required".to_string(),
            })?;
        let members: Vec<String> = command
            .data
            .get("members")
            .and_then(serde_json::Value::as_array)
            .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        if members.is_empty() {
            return Err(CoreError::MapperFailure {
                view_id: self.view_id(),
                reason: "members must not be empty".to_string(),
            });
        }

        Ok(vec![NewEvent::new(
            PARTITION,
            "Members.AssignmentStarted",
            serde_json::json!({ "subscriptionId": subscription_id, "members": members }),
        )])
    }
}

/// Records that a subscription attempt has been dispatched for one member.
/// Issued by [`AssignmentTrackerStateMachine`], never by a caller directly.
pub struct MembersSubscribeDispatch;

impl ChangeState for MembersSubscribeDispatch {
    fn view_id(&self) -> &'static str {
        "Members.Subscribe.Dispatch"
    }

    fn initial_state(&self) -> Box<dyn DynState> {
        Box::new(())
    }

    fn reduce(&self, _state: &mut dyn DynState, _event: &Event) -> bool {
        false
    }

    fn map(&self, command: &Command, _state: &dyn DynState) -> Result<Vec<NewEvent>, CoreError> {
        let member_id = command
            .data
            .get("memberId")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| CoreError::MapperFailure {
                view_id: self.view_id(),
                reason: "memberId is required".to_string(),
            })?;
        let subscription_id = command
            .data
            .get("subscriptionId")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        Ok(vec![NewEvent::new(
            PARTITION,
            "Member.DispatchRecorded",
            serde_json::json!({ "memberId": member_id, "subscriptionId": subscription_id }),
        )])
    }
}

/// Resolves a single member's subscription attempt, once whatever performed
/// it reports back. A member id starting with `bad-` fails deterministically,
/// so tests can exercise both outcomes without randomness or a real service.
pub struct MembersConfirmSubscription;

impl ChangeState for MembersConfirmSubscription {
    fn view_id(&self) -> &'static str {
        "Members.Confirm.Subscription"
    }

    fn initial_state(&self) -> Box<dyn DynState> {
        Box::new(())
    }

    fn reduce(&self, _state: &mut dyn DynState, _event: &Event) -> bool {
        false
    }

    fn map(&self, command: &Command, _state: &dyn DynState) -> Result<Vec<NewEvent>, CoreError> {
        let member_id = command
            .data
            .get("memberId")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| CoreError::MapperFailure {
                view_id: self.view_id(),
                reason: "memberId is required".to_string(),
            })?;
        let subscription_id = command
            .data
            .get("subscriptionId")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        let event = if member_id.starts_with("bad-") {
            NewEvent::new(
                PARTITION,
                "Member.SubscriptionFailed",
                serde_json::json!({ "memberId": member_id, "subscriptionId": subscription_id }),
            )
        } else {
            NewEvent::new(
                PARTITION,
                "Member.Subscribed",
                serde_json::json!({ "memberId": member_id, "subscriptionId": subscription_id }),
            )
        };
        Ok(vec![event])
    }
}

/// Tracks the state of an in-flight assignment.
pub struct AssignmentTracker;

impl ViewState for AssignmentTracker {
    fn view_id(&self) -> &'static str {
        "Assignment.Tracker"
    }

    fn initial_state(&self) -> Box<dyn DynState> {
        Box::new(AssignmentTrackerState::default())
    }

    fn reduce(&self, state: &mut dyn DynState, event: &Event) -> bool {
        let state = downcast_mut::<AssignmentTrackerState>(state);
        match event.event_type.as_str() {
            "Members.AssignmentStarted" => {
                let (Some(subscription_id), Some(members)) = (
                    event.data.get("subscriptionId").and_then(serde_json::Value::as_str),
                    event.data.get("members").and_then(serde_json::Value::as_array),
                ) else {
                    return false;
                };
                let mut changed = false;
                for member_id in members.iter().filter_map(|v| v.as_str()) {
                    if !state.pending.iter().any(|m| m == member_id)
                        && !state.completed.iter().any(|m| m == member_id)
                        && !state.failed.iter().any(|m| m == member_id)
                    {
                        state.pending.push(member_id.to_string());
                        state.subscription_of.insert(member_id.to_string(), subscription_id.to_string());
                        changed = true;
                    }
                }
                changed
            }
            "Member.DispatchRecorded" => {
                let Some(member_id) = event.data.get("memberId").and_then(serde_json::Value::as_str) else {
                    return false;
                };
                state.dispatched.insert(member_id.to_string())
            }
            "Member.Subscribed" | "Member.SubscriptionFailed" => {
                let Some(member_id) = event.data.get("memberId").and_then(serde_json::Value::as_str) else {
                    return false;
                };
                let Some(position) = state.pending.iter().position(|m| m == member_id) else {
                    return false;
                };
                let member_id = state.pending.remove(position);
                state.subscription_of.remove(&member_id);
                if event.event_type == "Member.Subscribed" {
                    state.completed.push(member_id);
                } else {
                    state.failed.push(member_id);
                }
                true
            }
            _ => false,
        }
    }
}

/// Drains `Assignment.Tracker`'s pending list by issuing one
/// `Members.Subscribe.Dispatch` command per member not yet dispatched.
pub struct AssignmentTrackerStateMachine;

impl StateMachine for AssignmentTrackerStateMachine {
    fn view_id(&self) -> &'static str {
        "Assignment.Tracker.Dispatcher"
    }

    fn trigger_view_id(&self) -> &'static str {
        "Assignment.Tracker"
    }

    fn trigger(&self, core: &mut dyn CoreAccess) -> Result<(), CoreError> {
        let QueryResult::Found(tracker) = core.query("Assignment.Tracker", &[]) else {
            return Ok(());
        };
        let pending: Vec<String> = tracker
            .get("pending")
            .and_then(serde_json::Value::as_array)
            .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let dispatched: HashSet<String> = tracker
            .get("dispatched")
            .and_then(serde_json::Value::as_array)
            .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let subscription_of = tracker.get("subscriptionOf").and_then(serde_json::Value::as_object);

        for member_id in pending {
            if dispatched.contains(&member_id) {
                continue;
            }
            let subscription_id = subscription_of
                .and_then(|map| map.get(&member_id))
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            core.produce(Command::new(
                "Members.Subscribe.Dispatch",
                serde_json::json!({ "memberId": member_id, "subscriptionId": subscription_id }),
            ))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use txn_core::FunctionalCore;

    fn core() -> FunctionalCore {
        FunctionalCore::builder()
            .with_change_state(Box::new(SubscriptionAssignMembers))
            .with_change_state(Box::new(MembersSubscribeDispatch))
            .with_change_state(Box::new(MembersConfirmSubscription))
            .with_view_state(Box::new(AssignmentTracker))
            .with_state_machine(Box::new(AssignmentTrackerStateMachine))
            .build()
    }

    #[test]
    fn dispatch_runs_once_but_leaves_pending_until_confirmed() {
        let mut core = core();
        core.produce(Command::new(
            "Subscription.Assign.Members",
            serde_json::json!({ "subscriptionId": "sub-1", "members": ["alice"] }),
        ))
        .unwrap();
        core.commit();

        let QueryResult::Found(tracker) = core.query("Assignment.Tracker", &[]) else {
            panic!("tracker missing");
        };
        assert_eq!(tracker["dispatched"].as_array().unwrap().len(), 1);
        assert_eq!(tracker["pending"].as_array().unwrap().len(), 1, "not yet confirmed");
    }

    #[test]
    fn confirmation_moves_member_from_pending_to_resolved() {
        let mut core = core();
        core.produce(Command::new(
            "Subscription.Assign.Members",
            serde_json::json!({ "subscriptionId": "sub-1", "members": ["alice", "bad-bob"] }),
        ))
        .unwrap();
        core.commit();

        core.produce(Command::new(
            "Members.Confirm.Subscription",
            serde_json::json!({ "memberId": "alice", "subscriptionId": "sub-1" }),
        ))
        .unwrap();
        core.produce(Command::new(
            "Members.Confirm.Subscription",
            serde_json::json!({ "memberId": "bad-bob", "subscriptionId": "sub-1" }),
        ))
        .unwrap();
        core.commit();

        let QueryResult::Found(tracker) = core.query("Assignment.Tracker", &[]) else {
            panic!("tracker missing");
        };
        assert!(tracker["pending"].as_array().unwrap().is_empty());
        assert_eq!(tracker["completed"][0], "alice");
        assert_eq!(tracker["failed"][0], "bad-bob");
    }
}
