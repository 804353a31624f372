use std::{collections::HashMap, time::Duration};

use backon::{ExponentialBuilder, Retryable};
use ipp::prelude::*;
use log::{debug, trace, warn};
use snafu::{OptionExt, ResultExt, Snafu};
use url::Url;

use crate::config::models::Cups;

use super::{
    events::NotificationApi,
    subscription::SubscriptionApi,
    wire::{self, IppMessage, IppResponse},
};

const NOTIFY_SUBSCRIPTION_ID: &str = "notify-subscription-id";
const NOTIFY_LEASE_DURATION: &str = "notify-lease-duration";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// One `event-notification-attributes` group, keyed by attribute name.
pub type NotificationAttributes = HashMap<String, IppAttribute>;

pub fn build_cups_url(cups_settings: &Cups) -> Result<String, CupsError> {
    let mut cups_url = Url::parse(&cups_settings.uri).context(UrlSnafu { uri: cups_settings.uri.clone() })?;
    if !cups_settings.username.is_empty() && !cups_settings.password.is_empty() {
        cups_url
            .set_username(&cups_settings.username)
            .ok()
            .context(InvalidUriSnafu { uri: cups_settings.uri.clone() })?;
        cups_url
            .set_password(Some(&cups_settings.password))
            .ok()
            .context(InvalidUriSnafu { uri: cups_settings.uri.clone() })?;
    }

    Ok(cups_url.to_string())
}

/// The HTTP endpoint for an `ipp://` or `ipps://` server uri.
pub fn http_endpoint(uri: &str) -> String {
    if let Some(rest) = uri.strip_prefix("ipps://") {
        format!("https://{}", with_default_port(rest, 443))
    } else if let Some(rest) = uri.strip_prefix("ipp://") {
        format!("http://{}", with_default_port(rest, 631))
    } else {
        uri.to_string()
    }
}

fn with_default_port(rest: &str, port: u16) -> String {
    let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let has_port = host.rsplit_once(':').is_some_and(|(_, given)| given.parse::<u16>().is_ok());
    if has_port {
        format!("{authority}/{path}")
    } else {
        format!("{authority}:{port}/{path}")
    }
}

/// Talks IPP to the print server. Every operation is one HTTP POST; there is
/// no persistent socket to keep alive between polls.
#[derive(Debug, Clone)]
pub struct CupsClient {
    uri: Uri,
    endpoint: String,
    http: reqwest::Client,
    user_name: Option<String>,
}

impl CupsClient {
    pub fn new(cups_settings: &Cups) -> Result<Self, CupsError> {
        let url = build_cups_url(cups_settings)?;
        let uri: Uri = url.parse().ok().context(InvalidUriSnafu { uri: url.clone() })?;
        let user_name = Some(cups_settings.username.clone()).filter(|name| !name.is_empty());

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .tls_backend_native()
            .tls_danger_accept_invalid_certs(cups_settings.ignore_tls_errors)
            .tls_danger_accept_invalid_hostnames(cups_settings.ignore_tls_errors)
            .build()
            .context(HttpClientSnafu)?;

        Ok(Self { endpoint: http_endpoint(&url), uri, http, user_name })
    }

    /// Builds the client and makes sure the server answers, retrying a few
    /// times before giving up.
    pub async fn connect(cups_settings: &Cups) -> Result<Self, CupsError> {
        let client = Self::new(cups_settings)?;
        (|| client.check_reachable())
            .retry(ExponentialBuilder::default().with_factor(4.0).with_max_times(3))
            .notify(|e: &CupsError, wait: Duration| warn!("CUPS is not answering ({e}), retrying in {wait:?}"))
            .await?;
        Ok(client)
    }

    /// Round trip a `CUPS-Get-Printers` request to make sure the server answers at all.
    pub async fn check_reachable(&self) -> Result<(), CupsError> {
        let resp = self.send_ipp_request(self.new_request(Operation::CupsGetPrinters as u16), "CUPS-Get-Printers").await?;
        debug!("CUPS answered the reachability check with {:?}", resp.status_code());
        Ok(())
    }

    fn new_request(&self, operation: u16) -> IppMessage {
        let mut req = IppMessage::request(operation, &self.uri);
        if let Some(user_name) = &self.user_name {
            req.add(
                wire::OPERATION_ATTRIBUTES,
                IppAttribute::new("requesting-user-name", IppValue::NameWithoutLanguage(user_name.clone())),
            );
        }
        req
    }

    /// Send `req` to the server and get the response, whatever its IPP status.
    async fn send_ipp_request(&self, req: IppMessage, operation: &'static str) -> Result<IppResponse, CupsError> {
        trace!("Sending {operation} to {}", self.endpoint);
        let response = self
            .http
            .post(&self.endpoint)
            .header("content-type", "application/ipp")
            .body(req.to_bytes())
            .send()
            .await
            .context(HttpSnafu { operation })?;

        let http_status = response.status();
        if !http_status.is_success() {
            return HttpStatusSnafu { operation, status: http_status.as_u16() }.fail();
        }

        let body = response.bytes().await.context(HttpSnafu { operation })?;
        wire::parse_response(&body).context(DecodeSnafu { operation })
    }

    /// Like [`Self::send_ipp_request`], but a non-success status is an error too.
    async fn send_checked(&self, req: IppMessage, operation: &'static str) -> Result<IppResponse, CupsError> {
        let resp = self.send_ipp_request(req, operation).await?;
        check_status(&resp, operation)?;
        Ok(resp)
    }
}

fn check_status(resp: &IppResponse, operation: &'static str) -> Result<(), CupsError> {
    let status = resp.status_code();
    if !status.is_success() {
        return StatusSnafu { operation, status: format!("{status:?}") }.fail();
    }
    Ok(())
}

fn lease_seconds(lease: Duration) -> i32 {
    i32::try_from(lease.as_secs()).unwrap_or(i32::MAX)
}

/// The subscription id a Create-Printer-Subscriptions response hands out.
pub fn subscription_id(resp: &IppResponse) -> Result<i32, CupsError> {
    let id = resp
        .groups_of(wire::SUBSCRIPTION_ATTRIBUTES)
        .chain(resp.groups_of(wire::OPERATION_ATTRIBUTES))
        .find_map(|group| group.attributes.get(NOTIFY_SUBSCRIPTION_ID))
        .and_then(|attr| attr.value().as_integer().copied())
        .context(MissingAttributeSnafu { name: NOTIFY_SUBSCRIPTION_ID })?;
    Ok(id)
}

/// The `event-notification-attributes` groups of a Get-Notifications response, in order.
pub fn notification_groups(resp: IppResponse) -> Vec<NotificationAttributes> {
    resp.groups
        .into_iter()
        .filter(|group| group.tag == wire::EVENT_NOTIFICATION_ATTRIBUTES)
        .map(|group| group.attributes)
        .collect()
}

impl SubscriptionApi for CupsClient {
    async fn create_subscription(&self, lease: Duration) -> Result<i32, CupsError> {
        let mut req = self.new_request(wire::CREATE_PRINTER_SUBSCRIPTIONS);
        req.add(
            wire::SUBSCRIPTION_ATTRIBUTES,
            IppAttribute::new("notify-events", IppValue::Keyword("all".to_string())),
        );
        req.add(
            wire::SUBSCRIPTION_ATTRIBUTES,
            IppAttribute::new("notify-pull-method", IppValue::Keyword("ippget".to_string())),
        );
        req.add(
            wire::SUBSCRIPTION_ATTRIBUTES,
            IppAttribute::new(NOTIFY_LEASE_DURATION, IppValue::Integer(lease_seconds(lease))),
        );

        let resp = self.send_checked(req, "Create-Printer-Subscriptions").await?;
        subscription_id(&resp)
    }

    async fn renew_subscription(&self, subscription_id: i32, lease: Duration) -> Result<(), CupsError> {
        let mut req = self.new_request(wire::RENEW_SUBSCRIPTION);
        req.add(
            wire::OPERATION_ATTRIBUTES,
            IppAttribute::new(NOTIFY_SUBSCRIPTION_ID, IppValue::Integer(subscription_id)),
        );
        req.add(
            wire::SUBSCRIPTION_ATTRIBUTES,
            IppAttribute::new(NOTIFY_LEASE_DURATION, IppValue::Integer(lease_seconds(lease))),
        );

        self.send_checked(req, "Renew-Subscription").await?;
        Ok(())
    }

    async fn cancel_subscription(&self, subscription_id: i32) -> Result<(), CupsError> {
        let mut req = self.new_request(wire::CANCEL_SUBSCRIPTION);
        req.add(
            wire::OPERATION_ATTRIBUTES,
            IppAttribute::new(NOTIFY_SUBSCRIPTION_ID, IppValue::Integer(subscription_id)),
        );

        self.send_checked(req, "Cancel-Subscription").await?;
        Ok(())
    }
}

impl NotificationApi for CupsClient {
    async fn get_notifications(&self, subscription_id: i32, first_sequence: i32) -> Result<Vec<NotificationAttributes>, CupsError> {
        let mut req = self.new_request(wire::GET_NOTIFICATIONS);
        req.add(
            wire::OPERATION_ATTRIBUTES,
            IppAttribute::new("notify-subscription-ids", IppValue::Integer(subscription_id)),
        );
        req.add(
            wire::OPERATION_ATTRIBUTES,
            IppAttribute::new("notify-sequence-numbers", IppValue::Integer(first_sequence)),
        );
        req.add(
            wire::OPERATION_ATTRIBUTES,
            IppAttribute::new("notify-wait", IppValue::Boolean(false)),
        );

        let resp = self.send_checked(req, "Get-Notifications").await?;
        Ok(notification_groups(resp))
    }
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
pub enum CupsError {
    #[snafu(display("Could not parse CUPS url '{uri}'"))]
    Url { uri: String, source: url::ParseError },
    #[snafu(display("'{uri}' is not usable as an IPP uri"))]
    InvalidUri { uri: String },
    #[snafu(display("Could not set up the HTTP client"))]
    HttpClient { source: reqwest::Error },
    #[snafu(display("{operation} request failed"))]
    Http { operation: &'static str, source: reqwest::Error },
    #[snafu(display("{operation} was answered with HTTP {status}"))]
    HttpStatus { operation: &'static str, status: u16 },
    #[snafu(display("{operation} response is not valid IPP"))]
    Decode { operation: &'static str, source: std::io::Error },
    #[snafu(display("{operation} returned status {status}"))]
    Status { operation: &'static str, status: String },
    #[snafu(display("Response doesn't contain {name}"))]
    MissingAttribute { name: &'static str },
}
