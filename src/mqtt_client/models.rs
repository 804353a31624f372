use chrono::{DateTime, Utc};
use serde_derive::Serialize;

use crate::cups_client::subscription::Lease;

// ////// //
// Status //
// ////// //

#[derive(Debug, Serialize)]
pub struct MqttIndicatorStatus {
    pub is_subscribed: bool,
    pub subscription_id: Option<i32>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub tracked_jobs: usize,
    pub cups_indicator_version: String,
}

impl MqttIndicatorStatus {
    pub fn new(lease: &Lease, tracked_jobs: usize) -> Self {
        MqttIndicatorStatus {
            is_subscribed: lease.subscription_id.is_some(),
            subscription_id: lease.subscription_id,
            lease_expires_at: lease.expires_at,
            tracked_jobs,
            cups_indicator_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
