//! The `test_mode` self-check: runs the same scenarios exercised by
//! `subscriptions-demo`'s test suite, but through a live
//! [`CoordinatorHandle`] end-to-end (critical section, append, commit)
//! rather than calling [`txn_core::FunctionalCore`] directly. A clean exit
//! from this function is the signal operators use to confirm a deployment
//! can produce, commit and query correctly before routing real traffic to it.

use anyhow::{bail, Context};
use txn_core::{Command, QueryResult};
use txn_coordinator::CoordinatorHandle;

/// Run the self-check scenario suite.
///
/// # Errors
///
/// Returns an error describing the first assertion that failed, or any
/// [`txn_coordinator::CoordinatorError`] encountered along the way.
pub async fn run(handle: &CoordinatorHandle) -> anyhow::Result<()> {
    check_subscription_create(handle).await?;
    check_assignment_dispatch(handle).await?;
    Ok(())
}

async fn check_subscription_create(handle: &CoordinatorHandle) -> anyhow::Result<()> {
    let events = handle
        .submit(|core| {
            core.produce(Command::new(
                "Subscription.Create",
                serde_json::json!({ "plan": "self-check", "createdBy": "ops@example.com" }),
            ))
        })
        .await
        .context("submitting Subscription.Create")?;

    let Some(id) = events
        .first()
        .and_then(|event| event.data.get("subscriptionId"))
        .and_then(|v| v.as_str())
    else {
        bail!("Subscription.Create did not emit a subscriptionId");
    };
    if id != "sub-1" {
        bail!("expected the first subscription to be sub-1, got {id}");
    }

    let record = handle
        .submit(|core| Ok(core.query("Subscription.List", &["sub-1"])))
        .await
        .context("querying Subscription.List")?;
    let QueryResult::Found(record) = record else {
        bail!("Subscription.List was not populated for sub-1");
    };
    if record.get("plan").and_then(|v| v.as_str()) != Some("self-check") {
        bail!("Subscription.List/sub-1 did not round-trip its plan: {record}");
    }
    Ok(())
}

async fn check_assignment_dispatch(handle: &CoordinatorHandle) -> anyhow::Result<()> {
    handle
        .submit(|core| {
            core.produce(Command::new(
                "Subscription.Assign.Members",
                serde_json::json!({ "subscriptionId": "sub-1", "members": ["self-check-member"] }),
            ))
        })
        .await
        .context("submitting Subscription.Assign.Members")?;

    let tracker = handle
        .submit(|core| Ok(core.query("Assignment.Tracker", &[])))
        .await
        .context("querying Assignment.Tracker")?;
    let QueryResult::Found(tracker) = tracker else {
        bail!("Assignment.Tracker was not populated");
    };
    let dispatched = tracker
        .get("dispatched")
        .and_then(|v| v.as_array())
        .is_some_and(|arr| arr.iter().any(|v| v.as_str() == Some("self-check-member")));
    if !dispatched {
        bail!("assignment fixpoint did not dispatch self-check-member: {tracker}");
    }

    handle
        .submit(|core| {
            core.produce(Command::new(
                "Members.Confirm.Subscription",
                serde_json::json!({ "memberId": "self-check-member", "subscriptionId": "sub-1" }),
            ))
        })
        .await
        .context("submitting Members.Confirm.Subscription")?;

    let tracker = handle
        .submit(|core| Ok(core.query("Assignment.Tracker", &[])))
        .await
        .context("querying Assignment.Tracker after confirmation")?;
    let QueryResult::Found(tracker) = tracker else {
        bail!("Assignment.Tracker was not populated after confirmation");
    };
    let pending_empty = tracker.get("pending").and_then(|v| v.as_array()).is_some_and(Vec::is_empty);
    if !pending_empty {
        bail!("assignment did not resolve after confirmation: {tracker}");
    }
    Ok(())
}
