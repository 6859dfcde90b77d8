//! A worked domain exercising every engine module: subscription creation
//! with mapper-derived ids, a member-assignment state-machine fixpoint, and
//! bounded-retry email delivery.

pub mod assignment;
pub mod effect;
pub mod email;
pub mod subscription;

use std::sync::Arc;

use txn_core::FunctionalCore;
use txn_coordinator::EffectFanout;

/// Build a [`FunctionalCore`] with every projection and state machine in
/// this domain registered.
#[must_use]
pub fn build_core() -> FunctionalCore {
    FunctionalCore::builder()
        .with_change_state(Box::new(subscription::SubscriptionCreate))
        .with_view_state(Box::new(subscription::SubscriptionList))
        .with_change_state(Box::new(assignment::SubscriptionAssignMembers))
        .with_change_state(Box::new(assignment::MembersSubscribeDispatch))
        .with_change_state(Box::new(assignment::MembersConfirmSubscription))
        .with_view_state(Box::new(assignment::AssignmentTracker))
        .with_state_machine(Box::new(assignment::AssignmentTrackerStateMachine))
        .with_change_state(Box::new(email::EmailsQueue))
        .with_view_state(Box::new(email::EmailsToSend))
        .build()
}

/// Build the effect fan-out for this domain, wired to `sender` for outbound
/// email delivery.
#[must_use]
pub fn build_effects<S>(sender: S) -> EffectFanout
where
    S: effect::EmailSender + 'static,
{
    EffectFanout::new(vec![
        Arc::new(effect::SendEmailEffect::new(sender)),
        Arc::new(effect::MemberConfirmEffect),
    ])
}
