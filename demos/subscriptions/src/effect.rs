//! Post-commit fan-out: sending queued emails and confirming dispatched
//! subscription attempts. Both follow the same shape - react to an event,
//! perform the side effect, fold the outcome back as a new event - because
//! that's the only way a functional core ever learns about the outside
//! world.

use std::future::Future;
use std::pin::Pin;

use txn_core::{Command, Event, NewEvent};
use txn_coordinator::{CoordinatorHandle, EffectCallback};

use crate::email::PARTITION as EMAIL_PARTITION;

/// Sends a queued email through `sender`, then records the outcome -
/// `Email.Succeeded` on success, `Email.Failed` on failure - so
/// [`crate::email::EmailsToSend`]'s retry bookkeeping sees every attempt
/// exactly once. The outcome is an externally-confirmed fact rather than a
/// business decision, so it's folded in directly via `consume` instead of
/// going through a mapper.
pub struct SendEmailEffect<S> {
    sender: S,
}

/// Whatever actually delivers the email. A trait rather than a concrete
/// HTTP client: outbound transport is this demo's integration boundary,
/// not something the engine should hardcode a vendor for.
pub trait EmailSender: Send + Sync {
    /// Attempt delivery. `Ok(())` means accepted for delivery.
    fn send<'a>(&'a self, to: &'a str) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>>;
}

/// An `EmailSender` that always succeeds, for `test_mode` and for tests
/// that only care about the retry-bookkeeping path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmailSender;

impl EmailSender for NoopEmailSender {
    fn send<'a>(&'a self, _to: &'a str) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

impl<S> SendEmailEffect<S> {
    pub fn new(sender: S) -> Self {
        Self { sender }
    }
}

impl<S> EffectCallback for SendEmailEffect<S>
where
    S: EmailSender,
{
    fn matches(&self, event: &Event) -> bool {
        event.event_type == "Email.Queued"
    }

    fn handle<'a>(
        &'a self,
        event: Event,
        coordinator: CoordinatorHandle,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Some(id) = event.data.get("id").and_then(serde_json::Value::as_str) else {
                tracing::warn!("Email.Queued event missing id, dropping");
                return;
            };
            let Some(to) = event.data.get("to").and_then(serde_json::Value::as_str) else {
                tracing::warn!(id, "Email.Queued event missing recipient, dropping");
                return;
            };

            let outcome = self.sender.send(to).await;
            let event_type = match &outcome {
                Ok(()) => "Email.Succeeded",
                Err(reason) => {
                    tracing::warn!(id, reason, "email delivery failed, recording attempt");
                    "Email.Failed"
                }
            };
            let id = id.to_string();

            let result = coordinator
                .submit(move |core| {
                    core.consume(vec![NewEvent::new(EMAIL_PARTITION, event_type, serde_json::json!({ "id": id }))])
                })
                .await;
            if let Err(err) = result {
                tracing::error!(error = %err, "failed to record email delivery outcome");
            }
        })
    }
}

/// Confirms a dispatched subscription attempt, once whatever performed it
/// reports back. This demo has no real member service to call out to, so
/// `MembersConfirmSubscription`'s mapper decides the outcome deterministically;
/// in production this effect would be where the actual call happens.
pub struct MemberConfirmEffect;

impl EffectCallback for MemberConfirmEffect {
    fn matches(&self, event: &Event) -> bool {
        event.event_type == "Member.DispatchRecorded"
    }

    fn handle<'a>(&'a self, event: Event, coordinator: CoordinatorHandle) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Some(member_id) = event.data.get("memberId").and_then(serde_json::Value::as_str) else {
                tracing::warn!("Member.DispatchRecorded event missing memberId, dropping");
                return;
            };
            let member_id = member_id.to_string();
            let subscription_id = event
                .data
                .get("subscriptionId")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            let result = coordinator
                .submit(move |core| {
                    core.produce(Command::new(
                        "Members.Confirm.Subscription",
                        serde_json::json!({ "memberId": member_id, "subscriptionId": subscription_id }),
                    ))
                })
                .await;
            if let Err(err) = result {
                tracing::error!(error = %err, "failed to confirm member subscription");
            }
        })
    }
}
