//! Billing subscriptions.

use serde::Serialize;
use uuid::Uuid;

use crate::BoxFuture;

/// Every new account starts on a trial of its environment's plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewSubscription {
    pub account_id: Uuid,
    pub plan_id: String,
    pub trial_days: u32,
}

pub trait Subscriptions: Send + Sync {
    /// Returns the id of the new subscription.
    fn create_subscription(&self, subscription: NewSubscription) -> BoxFuture<'_, Uuid>;
}
