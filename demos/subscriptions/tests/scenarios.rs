#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use subscriptions_demo::build_core;
use txn_core::{Command, QueryResult};

/// S1: creating two subscriptions allocates `sub-1` then `sub-2`, purely
/// from the reducer's own fold - `map` never assigns the id itself.
#[test]
fn creates_subscriptions_with_sequential_ids() {
    let mut core = build_core();

    let first = core
        .produce(Command::new(
            "Subscription.Create",
            serde_json::json!({ "plan": "gold", "createdBy": "alice@example.com" }),
        ))
        .expect("first create succeeds");
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].data["subscriptionId"], "sub-1");
    core.commit();

    let second = core
        .produce(Command::new(
            "Subscription.Create",
            serde_json::json!({ "plan": "silver", "createdBy": "bob@example.com" }),
        ))
        .expect("second create succeeds");
    assert_eq!(second[0].data["subscriptionId"], "sub-2");
    core.commit();

    let QueryResult::Found(record) = core.query("Subscription.List", &["sub-1"]) else {
        panic!("expected sub-1 to be in Subscription.List");
    };
    assert_eq!(record["plan"], "gold");
    assert_eq!(record["createdBy"], "alice@example.com");
    assert_eq!(record["members"], serde_json::json!([]));
}

/// S3: assigning members to a subscription starts the fixpoint, which
/// dispatches exactly once per member and leaves them pending until each
/// is separately confirmed - dispatch and resolution are different
/// transactions, so `pending` is still the full list right after commit.
#[test]
fn assignment_starts_and_dispatches_without_resolving() {
    let mut core = build_core();

    core.produce(Command::new(
        "Subscription.Assign.Members",
        serde_json::json!({
            "subscriptionId": "sub-1",
            "members": ["alice", "bad-bob", "carol"],
        }),
    ))
    .expect("assignment starts");
    core.commit();

    let QueryResult::Found(tracker) = core.query("Assignment.Tracker", &[]) else {
        panic!("expected Assignment.Tracker state");
    };
    let as_vec = |key: &str| -> Vec<String> {
        tracker[key]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    };
    assert_eq!(as_vec("pending"), vec!["alice", "bad-bob", "carol"]);
    assert!(as_vec("completed").is_empty());
    assert!(as_vec("failed").is_empty());
    assert_eq!(tracker["dispatched"].as_array().unwrap().len(), 3, "every member dispatched exactly once");
}

/// Confirming each dispatched member resolves the fixpoint to completion,
/// with a mix of successes and a deterministic failure.
#[test]
fn confirming_dispatched_members_drains_the_tracker() {
    let mut core = build_core();

    core.produce(Command::new(
        "Subscription.Assign.Members",
        serde_json::json!({ "subscriptionId": "sub-1", "members": ["alice", "bad-bob"] }),
    ))
    .expect("assignment starts");
    core.commit();

    for member_id in ["alice", "bad-bob"] {
        core.produce(Command::new(
            "Members.Confirm.Subscription",
            serde_json::json!({ "memberId": member_id, "subscriptionId": "sub-1" }),
        ))
        .expect("confirmation succeeds");
        core.commit();
    }

    let QueryResult::Found(tracker) = core.query("Assignment.Tracker", &[]) else {
        panic!("expected Assignment.Tracker state");
    };
    assert!(tracker["pending"].as_array().unwrap().is_empty());
    assert_eq!(tracker["completed"], serde_json::json!(["alice"]));
    assert_eq!(tracker["failed"], serde_json::json!(["bad-bob"]));
}

/// S4: when the second command in a transaction fails, rolling back
/// undoes the first command's effects too - the transaction is atomic.
#[test]
fn rollback_undoes_the_whole_transaction() {
    let mut core = build_core();

    let outcome = (|| -> Result<(), txn_core::CoreError> {
        core.produce(Command::new(
            "Subscription.Create",
            serde_json::json!({ "plan": "gold", "createdBy": "alice@example.com" }),
        ))?;
        core.produce(Command::new("Subscription.Create", serde_json::json!({ "plan": "" })))?;
        Ok(())
    })();

    assert!(outcome.is_err(), "second create should fail mapper validation");
    core.rollback();

    let QueryResult::Found(created) = core.query("Subscription.Create", &["created"]) else {
        panic!("expected Subscription.Create state to exist even at zero");
    };
    assert_eq!(created, 0, "rollback should have undone Alice's creation too");
}

/// S6: a tenth consecutive delivery failure drops the email instead of
/// retrying it an eleventh time.
#[test]
fn email_delivery_drops_after_max_attempts() {
    let mut core = build_core();

    core.produce(Command::new(
        "Emails.Queue",
        serde_json::json!({ "id": "email-1", "to": "alice@example.com" }),
    ))
    .expect("queueing succeeds");
    core.commit();

    for attempt in 1..=subscriptions_demo::email::MAX_ATTEMPTS {
        core.consume(vec![txn_core::NewEvent::new(
            subscriptions_demo::email::PARTITION,
            "Email.Failed",
            serde_json::json!({ "id": "email-1" }),
        )])
        .unwrap_or_else(|_| panic!("attempt {attempt} should fold cleanly"));
    }

    let QueryResult::Found(list) = core.query("Emails.To.Send", &["list"]) else {
        panic!("expected Emails.To.Send state");
    };
    assert!(
        list.as_array().expect("list is an array").is_empty(),
        "email should have been dropped after {} attempts",
        subscriptions_demo::email::MAX_ATTEMPTS
    );
}
