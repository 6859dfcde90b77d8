//! `Subscription.Create` / `Subscription.List`: the smallest complete
//! vertical slice - a mapper that derives an id purely from its own
//! reducer's fold, and a read-only view over the result.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use txn_core::{downcast_mut, downcast_ref, ChangeState, Command, CoreError, DynState, Event, NewEvent, ViewState};

/// Where `Subscription.Created` events land.
pub const PARTITION: &str = "subscriptions";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SubscriptionCreateState {
    /// Count of subscriptions created so far. The only state this mapper
    /// needs: the next id is derived from it, never assigned by `map`.
    pub created: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub plan: String,
    #[serde(rename = "createdBy")]
    pub created_by: String,
    pub members: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SubscriptionListState {
    #[serde(flatten)]
    pub subscriptions: HashMap<String, SubscriptionRecord>,
}

/// Interprets `Subscription.Create` commands.
///
/// `map` never mutates state and never allocates the new subscription's id
/// itself - it reads `state.created` (the count of `Subscription.Created`
/// events folded so far) and derives `sub-{n+1}` from it. The id only
/// becomes real once the emitted event is folded back through `reduce`,
/// which is what keeps a command handler's view of "what id will this get"
/// consistent with what replay will reconstruct.
pub struct SubscriptionCreate;

impl ChangeState for SubscriptionCreate {
    fn view_id(&self) -> &'static str {
        "Subscription.Create"
    }

    fn initial_state(&self) -> Box<dyn DynState> {
        Box::new(SubscriptionCreateState::default())
    }

    fn reduce(&self, state: &mut dyn DynState, event: &Event) -> bool {
        if event.event_type != "Subscription.Created" {
            return false;
        }
        downcast_mut::<SubscriptionCreateState>(state).created += 1;
        true
    }

    fn map(&self, command: &Command, state: &dyn DynState) -> Result<Vec<NewEvent>, CoreError> {
        let plan = command
            .data
            .get("plan")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .trim();
        if plan.is_empty() {
            return Err(CoreError::MapperFailure {
                view_id: self.view_id(),
                reason: "plan must not be empty".to_string(),
            });
        }
        let created_by = command
            .data
            .get("createdBy")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        let created = downcast_ref::<SubscriptionCreateState>(state).created;
        let subscription_id = format!("sub-{}", created + 1);
        Ok(vec![NewEvent::new(
            PARTITION,
            "Subscription.Created",
            serde_json::json!({
                "subscriptionId": subscription_id,
                "plan": plan,
                "createdBy": created_by,
            }),
        )])
    }
}

/// A read-only roster of every subscription created, keyed by id.
pub struct SubscriptionList;

impl ViewState for SubscriptionList {
    fn view_id(&self) -> &'static str {
        "Subscription.List"
    }

    fn initial_state(&self) -> Box<dyn DynState> {
        Box::new(SubscriptionListState::default())
    }

    fn reduce(&self, state: &mut dyn DynState, event: &Event) -> bool {
        let state = downcast_mut::<SubscriptionListState>(state);
        match event.event_type.as_str() {
            "Subscription.Created" => {
                let (Some(id), Some(plan)) = (
                    event.data.get("subscriptionId").and_then(serde_json::Value::as_str),
                    event.data.get("plan").and_then(serde_json::Value::as_str),
                ) else {
                    return false;
                };
                let created_by = event
                    .data
                    .get("createdBy")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                state.subscriptions.insert(
                    id.to_string(),
                    SubscriptionRecord {
                        plan: plan.to_string(),
                        created_by: created_by.to_string(),
                        members: Vec::new(),
                    },
                );
                true
            }
            "Member.Subscribed" => {
                let (Some(subscription_id), Some(member_id)) = (
                    event.data.get("subscriptionId").and_then(serde_json::Value::as_str),
                    event.data.get("memberId").and_then(serde_json::Value::as_str),
                ) else {
                    return false;
                };
                let Some(record) = state.subscriptions.get_mut(subscription_id) else {
                    return false;
                };
                record.members.push(member_id.to_string());
                true
            }
            _ => false,
        }
    }
}
