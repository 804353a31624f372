use std::time::Duration;

use chrono::{DateTime, Utc};
use humantime::format_duration;
use log::{info, warn};
use tokio::time::Instant;

use super::client::CupsError;

/// Print server operations needed to hold a notification lease.
#[allow(async_fn_in_trait)]
pub trait SubscriptionApi {
    /// Returns the server-assigned `notify-subscription-id`.
    async fn create_subscription(&self, lease: Duration) -> Result<i32, CupsError>;
    async fn renew_subscription(&self, subscription_id: i32, lease: Duration) -> Result<(), CupsError>;
    async fn cancel_subscription(&self, subscription_id: i32) -> Result<(), CupsError>;
}

#[derive(Debug, Clone)]
pub struct Lease {
    pub subscription_id: Option<i32>,
    pub lease_duration: Duration,
    pub renew_before: Duration,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Lease {
    pub fn new(lease_duration: Duration, renew_before: Duration) -> Self {
        Self { subscription_id: None, lease_duration, renew_before, expires_at: None }
    }

    /// How long after a successful create or renew the next renewal fires.
    pub fn renewal_period(&self) -> Duration {
        self.lease_duration.saturating_sub(self.renew_before)
    }
}

/// Creates, renews and cancels the notification lease. Failures never leave
/// this type; they are logged and turned into the next timer deadline.
pub struct SubscriptionManager<C> {
    api: C,
    lease: Lease,
    retry_interval: Duration,
    renew_at: Option<Instant>,
}

impl<C: SubscriptionApi> SubscriptionManager<C> {
    pub fn new(api: C, lease: Lease, retry_interval: Duration) -> Self {
        Self { api, lease, retry_interval, renew_at: None }
    }

    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    pub fn subscription_id(&self) -> Option<i32> {
        self.lease.subscription_id
    }

    /// The single armed renewal deadline, if any.
    pub fn renew_at(&self) -> Option<Instant> {
        self.renew_at
    }

    pub async fn create_subscription(&mut self) {
        match self.api.create_subscription(self.lease.lease_duration).await {
            Ok(subscription_id) => {
                info!(
                    "Subscribed to CUPS notifications as subscription {subscription_id}, lease {}",
                    format_duration(self.lease.lease_duration)
                );
                self.lease.subscription_id = Some(subscription_id);
                self.arm_next_period();
            }
            Err(e) => {
                warn!("Error subscribing to CUPS notifications: {e}");
                self.lease.subscription_id = None;
                self.lease.expires_at = None;
                self.renew_at = Some(Instant::now() + self.retry_interval);
            }
        }
    }

    pub async fn renew_subscription(&mut self) {
        let Some(subscription_id) = self.lease.subscription_id else {
            info!("No CUPS subscription held, creating a new one");
            return self.create_subscription().await;
        };

        match self.api.renew_subscription(subscription_id, self.lease.lease_duration).await {
            Ok(()) => {
                info!("Renewed CUPS subscription {subscription_id}");
                self.arm_next_period();
            }
            Err(e) => {
                warn!("Error renewing CUPS subscription {subscription_id}: {e}");
                self.create_subscription().await;
            }
        }
    }

    pub async fn cancel_subscription(&mut self) {
        self.renew_at = None;
        let Some(subscription_id) = self.lease.subscription_id.take().filter(|id| *id > 0) else {
            return;
        };
        self.lease.expires_at = None;

        match self.api.cancel_subscription(subscription_id).await {
            Ok(()) => info!("Canceled CUPS subscription {subscription_id}"),
            Err(e) => warn!("Error canceling CUPS subscription {subscription_id}: {e}"),
        }
    }

    fn arm_next_period(&mut self) {
        let period = self.lease.renewal_period();
        self.renew_at = Some(Instant::now() + period);
        self.lease.expires_at = chrono::Duration::from_std(self.lease.lease_duration)
            .ok()
            .and_then(|lease| Utc::now().checked_add_signed(lease));
    }
}

/// Resolves at `deadline`, or never when nothing is armed.
pub async fn sleep_until_renewal(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
