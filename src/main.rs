use std::{cell::RefCell, rc::Rc};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use tokio::time::{interval, MissedTickBehavior};

use crate::actions::desktop::{Desktop, SettingsLauncher};
use crate::actions::group::ActionGroup;
use crate::cli::{Cli, Commands};
use crate::config::models::Settings;
use crate::cups_client::client::CupsClient;
use crate::cups_client::events::EventSource;
use crate::cups_client::subscription::{sleep_until_renewal, Lease, SubscriptionManager};
use crate::menu::synchronizer::Menu;
use crate::mqtt_client::exporter::{BusEvent, Exporter};
use crate::mqtt_client::models::MqttIndicatorStatus;

mod actions;
mod cli;
mod config;
mod cups_client;
mod menu;
mod mqtt_client;
mod signal;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    colog::init();

    let cli = Cli::parse();
    let settings = crate::config::loading::load_config().context("Could not load configuration")?;
    let _sentry = init_sentry(&settings);

    let client = CupsClient::connect(&settings.cups)
        .await
        .with_context(|| format!("Cannot reach CUPS at {}", settings.cups.uri))?;

    match cli.command {
        Some(Commands::Dump) => dump(client, &settings).await,
        None => run(client, &settings).await,
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref().filter(|dsn| !dsn.is_empty())?;
    match dsn.parse::<sentry::types::Dsn>() {
        Ok(dsn) => Some(sentry::init(sentry::ClientOptions {
            dsn: Some(dsn),
            release: sentry::release_name!(),
            ..Default::default()
        })),
        Err(e) => {
            warn!("Ignoring invalid Sentry DSN: {e}");
            None
        }
    }
}

fn subscription_manager(client: CupsClient, settings: &Settings) -> SubscriptionManager<CupsClient> {
    SubscriptionManager::new(
        client,
        Lease::new(settings.cups.lease_duration, settings.cups.renew_before),
        settings.cups.retry_interval,
    )
}

/// Follows CUPS and exports the menu until the broker connection goes away.
async fn run(client: CupsClient, settings: &Settings) -> Result<()> {
    let desktop = Desktop::detect();
    info!("Running on desktop {desktop:?}");

    let launcher = SettingsLauncher::new(desktop, settings.settings.url_dispatcher.clone());
    let actions = Rc::new(RefCell::new(ActionGroup::new(launcher)));
    info!("Exporting actions: {}", actions.borrow().list_actions().collect::<Vec<_>>().join(", "));
    let menu = Rc::new(RefCell::new(Menu::new(actions.clone())));

    let mut source = EventSource::new(client.clone());
    let job_menu = menu.clone();
    source.job_state_changed().connect(move |job| job_menu.borrow_mut().on_job_state_changed(job));
    let printer_menu = menu.clone();
    source.printer_state_changed().connect(move |printer| printer_menu.borrow_mut().on_printer_state_changed(printer));

    let mut subscriptions = subscription_manager(client, settings);
    let mut exporter = Exporter::new(&settings.mqtt);
    let mut poll = interval(settings.cups.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut acquired = false;

    loop {
        tokio::select! {
            event = exporter.poll() => match event {
                Ok(BusEvent::Acquired) => {
                    if !acquired {
                        acquired = true;
                        subscriptions.create_subscription().await;
                    }
                }
                Ok(BusEvent::Activate(name)) => {
                    actions.borrow().activate(&name);
                }
                Err(e) => {
                    error!("{} exiting; failed/lost broker connection: {e}", env!("CARGO_PKG_NAME"));
                    break;
                }
            },
            _ = poll.tick() => {
                if let Some(subscription_id) = subscriptions.subscription_id() {
                    source.poll(subscription_id).await;
                }
            }
            _ = sleep_until_renewal(subscriptions.renew_at()) => subscriptions.renew_subscription().await,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }

        if acquired {
            let status = MqttIndicatorStatus::new(subscriptions.lease(), menu.borrow().store().len());
            exporter.publish(&actions.borrow(), menu.borrow().model(), &status);
        }
    }

    subscriptions.cancel_subscription().await;
    Ok(())
}

/// Prints every decoded notification as a JSON line until interrupted.
async fn dump(client: CupsClient, settings: &Settings) -> Result<()> {
    let mut source = EventSource::new(client.clone());
    source.job_state_changed().connect(|job| print_json("job", job));
    source.printer_state_changed().connect(|printer| print_json("printer", printer));

    let mut subscriptions = subscription_manager(client, settings);
    subscriptions.create_subscription().await;

    let mut poll = interval(settings.cups.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = poll.tick() => {
                if let Some(subscription_id) = subscriptions.subscription_id() {
                    source.poll(subscription_id).await;
                }
            }
            _ = sleep_until_renewal(subscriptions.renew_at()) => subscriptions.renew_subscription().await,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    subscriptions.cancel_subscription().await;
    Ok(())
}

fn print_json<T: serde::Serialize>(kind: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(payload) => println!("{{\"{kind}\":{payload}}}"),
        Err(e) => warn!("Cannot serialize {kind} event: {e}"),
    }
}
