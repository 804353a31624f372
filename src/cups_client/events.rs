use ipp::prelude::*;
use log::{debug, warn};
use snafu::{OptionExt, Snafu};

use crate::signal::Signal;

use super::{
    client::{CupsError, NotificationAttributes},
    models::{Job, JobState, Notification, Printer, PrinterState},
};

#[allow(async_fn_in_trait)]
pub trait NotificationApi {
    /// Fetches the notifications of `subscription_id` numbered `first_sequence` and up.
    async fn get_notifications(&self, subscription_id: i32, first_sequence: i32) -> Result<Vec<NotificationAttributes>, CupsError>;
}

/// Pulls notifications from the print server and forwards them, decoded and
/// in arrival order, to whoever is connected to the two signals.
pub struct EventSource<C> {
    api: C,
    printer_state_changed: Signal<Printer>,
    job_state_changed: Signal<Job>,
    // (subscription id, next expected sequence number)
    cursor: Option<(i32, i32)>,
}

impl<C: NotificationApi> EventSource<C> {
    pub fn new(api: C) -> Self {
        Self {
            api,
            printer_state_changed: Signal::new(),
            job_state_changed: Signal::new(),
            cursor: None,
        }
    }

    pub fn printer_state_changed(&mut self) -> &mut Signal<Printer> {
        &mut self.printer_state_changed
    }

    pub fn job_state_changed(&mut self) -> &mut Signal<Job> {
        &mut self.job_state_changed
    }

    /// Fetches and dispatches everything new on `subscription_id`. Returns how
    /// many notifications were dispatched; fetch errors are logged and count as none.
    pub async fn poll(&mut self, subscription_id: i32) -> usize {
        let first_sequence = match self.cursor {
            Some((id, next)) if id == subscription_id => next,
            _ => 1,
        };

        let groups = match self.api.get_notifications(subscription_id, first_sequence).await {
            Ok(groups) => groups,
            Err(e) => {
                warn!("Error fetching CUPS notifications for subscription {subscription_id}: {e}");
                return 0;
            }
        };

        let mut next_sequence = first_sequence;
        let mut dispatched = 0;
        for group in &groups {
            if let Some(sequence) = integer(group, "notify-sequence-number") {
                if sequence < first_sequence {
                    continue;
                }
                next_sequence = next_sequence.max(sequence + 1);
            }

            match decode_notification(group) {
                Ok(Some(notification)) => {
                    self.dispatch(&notification);
                    dispatched += 1;
                }
                Ok(None) => {}
                Err(e) => warn!("Dropping CUPS notification: {e}"),
            }
        }

        self.cursor = Some((subscription_id, next_sequence));
        dispatched
    }

    pub fn dispatch(&mut self, notification: &Notification) {
        match notification {
            Notification::Printer { printer, .. } => self.printer_state_changed.emit(printer),
            Notification::Job { job, .. } => self.job_state_changed.emit(job),
        }
    }
}

/// Decodes one `event-notification-attributes` group. Events that are neither
/// about a job nor a printer decode to `None`.
pub fn decode_notification(group: &NotificationAttributes) -> Result<Option<Notification>, DecodeError> {
    let event = text(group, "notify-subscribed-event");
    let sequence = integer(group, "notify-sequence-number").unwrap_or_default();

    if event.starts_with("job-") {
        let printer = decode_printer(group);
        let raw_id = integer(group, "job-id").context(MissingSnafu { name: "job-id", event: event.clone() })?;
        let id = u32::try_from(raw_id).ok().context(InvalidJobIdSnafu { id: raw_id })?;
        let job = Job {
            id,
            name: text(group, "job-name"),
            state: JobState::from(enumeration(group, "job-state").unwrap_or_default()),
            state_reasons: text(group, "job-state-reasons"),
            impressions_completed: integer(group, "job-impressions-completed")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or_default(),
            printer,
        };
        Ok(Some(Notification::Job { sequence, job }))
    } else if event.starts_with("printer-") {
        Ok(Some(Notification::Printer { sequence, printer: decode_printer(group) }))
    } else {
        debug!("Ignoring CUPS event '{event}'");
        Ok(None)
    }
}

fn decode_printer(group: &NotificationAttributes) -> Printer {
    Printer {
        name: text(group, "printer-name"),
        uri: text(group, "printer-uri"),
        text: text(group, "notify-text"),
        state: PrinterState::from(enumeration(group, "printer-state").unwrap_or_default()),
        state_reasons: text(group, "printer-state-reasons"),
        accepting_jobs: matches!(group.get("printer-is-accepting-jobs").map(|a| a.value()), Some(IppValue::Boolean(true))),
    }
}

// Not every notification carries every attribute, so missing strings are empty.
fn text(group: &NotificationAttributes, name: &str) -> String {
    group.get(name).map(|attr| attr.value().to_string()).unwrap_or_default()
}

fn integer(group: &NotificationAttributes, name: &str) -> Option<i32> {
    group.get(name).and_then(|attr| attr.value().as_integer().copied())
}

fn enumeration(group: &NotificationAttributes, name: &str) -> Option<i32> {
    group.get(name).and_then(|attr| attr.value().as_enum().or(attr.value().as_integer()).copied())
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("'{event}' notification without {name}"))]
    Missing { name: &'static str, event: String },
    #[snafu(display("Invalid job id {id}"))]
    InvalidJobId { id: i32 },
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::VecDeque, rc::Rc};

    use super::*;
    use crate::cups_client::{client::notification_groups, wire};

    fn attrs(values: Vec<(&str, IppValue)>) -> NotificationAttributes {
        values.into_iter().map(|(name, value)| (name.to_string(), IppAttribute::new(name, value))).collect()
    }

    fn job_group(sequence: i32, job_id: i32, state: i32) -> NotificationAttributes {
        attrs(vec![
            ("notify-subscribed-event", IppValue::Keyword("job-state-changed".into())),
            ("notify-sequence-number", IppValue::Integer(sequence)),
            ("notify-text", IppValue::TextWithoutLanguage("Deep Thought".into())),
            ("printer-name", IppValue::NameWithoutLanguage("deep-thought".into())),
            ("printer-uri", IppValue::Uri("ipp://localhost/printers/deep-thought".into())),
            ("printer-state", IppValue::Enum(4)),
            ("printer-state-reasons", IppValue::Keyword("none".into())),
            ("printer-is-accepting-jobs", IppValue::Boolean(true)),
            ("job-id", IppValue::Integer(job_id)),
            ("job-state", IppValue::Enum(state)),
            ("job-state-reasons", IppValue::Keyword("job-printing".into())),
            ("job-name", IppValue::NameWithoutLanguage("Life, The Universe, and Everything".into())),
            ("job-impressions-completed", IppValue::Integer(3)),
        ])
    }

    #[derive(Default)]
    struct MockNotificationApi {
        responses: RefCell<VecDeque<Result<Vec<NotificationAttributes>, CupsError>>>,
        requests: RefCell<Vec<(i32, i32)>>,
    }

    impl NotificationApi for &MockNotificationApi {
        async fn get_notifications(&self, subscription_id: i32, first_sequence: i32) -> Result<Vec<NotificationAttributes>, CupsError> {
            self.requests.borrow_mut().push((subscription_id, first_sequence));
            self.responses.borrow_mut().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[test]
    fn job_notification_decodes_with_printer_snapshot() {
        let notification = decode_notification(&job_group(7, 42, 5)).expect("decodes").expect("is a job event");

        let Notification::Job { sequence, job } = notification else {
            panic!("expected a job notification");
        };
        assert_eq!(sequence, 7);
        assert_eq!(job.id, 42);
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.name, "Life, The Universe, and Everything");
        assert_eq!(job.state_reasons, "job-printing");
        assert_eq!(job.impressions_completed, 3);
        assert_eq!(job.printer.name, "deep-thought");
        assert_eq!(job.printer.text, "Deep Thought");
        assert_eq!(job.printer.state, PrinterState::Processing);
        assert!(job.printer.accepting_jobs);
    }

    #[test]
    fn printer_notification_decodes() {
        let group = attrs(vec![
            ("notify-subscribed-event", IppValue::Keyword("printer-state-changed".into())),
            ("notify-sequence-number", IppValue::Integer(2)),
            ("printer-name", IppValue::NameWithoutLanguage("marvin".into())),
            ("printer-state", IppValue::Enum(5)),
            ("printer-is-accepting-jobs", IppValue::Boolean(false)),
        ]);

        let Some(Notification::Printer { printer, .. }) = decode_notification(&group).expect("decodes") else {
            panic!("expected a printer notification");
        };
        assert_eq!(printer.name, "marvin");
        assert_eq!(printer.display_name(), "marvin");
        assert_eq!(printer.state, PrinterState::Stopped);
        assert!(!printer.accepting_jobs);
    }

    #[test]
    fn unknown_job_state_survives_decoding() {
        let Some(Notification::Job { job, .. }) = decode_notification(&job_group(1, 1, 99)).expect("decodes") else {
            panic!("expected a job notification");
        };
        assert_eq!(job.state, JobState::Unknown(99));
    }

    #[test]
    fn server_events_are_ignored() {
        let group = attrs(vec![("notify-subscribed-event", IppValue::Keyword("server-restarted".into()))]);
        assert!(decode_notification(&group).expect("decodes").is_none());
    }

    #[test]
    fn job_event_without_id_is_an_error() {
        let mut group = job_group(1, 1, 3);
        group.remove("job-id");
        assert!(matches!(decode_notification(&group), Err(DecodeError::Missing { name: "job-id", .. })));

        let group = job_group(1, -4, 3);
        assert!(matches!(decode_notification(&group), Err(DecodeError::InvalidJobId { id: -4 })));
    }

    #[test]
    fn encoded_get_notifications_response_decodes_to_events() {
        let as_attributes = |group: NotificationAttributes| group.into_values().collect::<Vec<_>>();
        let printer_event = attrs(vec![
            ("notify-subscribed-event", IppValue::Keyword("printer-stopped".into())),
            ("notify-sequence-number", IppValue::Integer(8)),
            ("printer-name", IppValue::NameWithoutLanguage("marvin".into())),
            ("printer-state", IppValue::Enum(5)),
        ]);
        let body = wire::tests::encode_response(
            StatusCode::SuccessfulOk as u16,
            &[
                (wire::OPERATION_ATTRIBUTES, vec![IppAttribute::new("attributes-charset", IppValue::Charset("utf-8".into()))]),
                (wire::EVENT_NOTIFICATION_ATTRIBUTES, as_attributes(job_group(7, 42, 5))),
                (wire::EVENT_NOTIFICATION_ATTRIBUTES, as_attributes(printer_event)),
            ],
        );

        let response = wire::parse_response(&body).expect("parses");
        let groups = notification_groups(response);
        assert_eq!(groups.len(), 2);

        let Some(Notification::Job { sequence, job }) = decode_notification(&groups[0]).expect("decodes") else {
            panic!("expected a job notification");
        };
        assert_eq!(sequence, 7);
        assert_eq!(job.id, 42);
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.printer.text, "Deep Thought");

        let Some(Notification::Printer { printer, .. }) = decode_notification(&groups[1]).expect("decodes") else {
            panic!("expected a printer notification");
        };
        assert_eq!(printer.name, "marvin");
        assert_eq!(printer.state, PrinterState::Stopped);
    }

    #[tokio::test]
    async fn poll_dispatches_in_order_and_advances_the_cursor() {
        let api = MockNotificationApi::default();
        api.responses.borrow_mut().push_back(Ok(vec![job_group(1, 10, 3), job_group(2, 11, 5)]));
        api.responses.borrow_mut().push_back(Ok(vec![job_group(3, 10, 9)]));
        let mut source = EventSource::new(&api);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let first = seen.clone();
        source.job_state_changed().connect(move |job| first.borrow_mut().push((job.id, job.state)));
        let second = seen.clone();
        source.job_state_changed().connect(move |job| second.borrow_mut().push((job.id + 100, job.state)));

        assert_eq!(source.poll(8).await, 2);
        assert_eq!(source.poll(8).await, 1);

        assert_eq!(*api.requests.borrow(), vec![(8, 1), (8, 3)]);
        assert_eq!(
            *seen.borrow(),
            vec![
                (10, JobState::Pending),
                (110, JobState::Pending),
                (11, JobState::Processing),
                (111, JobState::Processing),
                (10, JobState::Completed),
                (110, JobState::Completed),
            ]
        );
    }

    #[tokio::test]
    async fn new_subscription_restarts_the_sequence() {
        let api = MockNotificationApi::default();
        api.responses.borrow_mut().push_back(Ok(vec![job_group(4, 10, 3)]));
        let mut source = EventSource::new(&api);

        source.poll(8).await;
        source.poll(8).await;
        source.poll(9).await;

        assert_eq!(*api.requests.borrow(), vec![(8, 1), (8, 5), (9, 1)]);
    }

    #[tokio::test]
    async fn fetch_errors_and_bad_groups_are_dropped() {
        let api = MockNotificationApi::default();
        api.responses.borrow_mut().push_back(Err(CupsError::Status {
            operation: "Get-Notifications",
            status: "ClientErrorNotFound".to_string(),
        }));
        let mut broken = job_group(1, 10, 3);
        broken.remove("job-id");
        api.responses.borrow_mut().push_back(Ok(vec![broken, job_group(2, 12, 4)]));
        let mut source = EventSource::new(&api);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        source.job_state_changed().connect(move |job| sink.borrow_mut().push(job.id));

        assert_eq!(source.poll(1).await, 0);
        assert_eq!(source.poll(1).await, 1);
        assert_eq!(*seen.borrow(), vec![12]);
        assert_eq!(*api.requests.borrow(), vec![(1, 1), (1, 1)]);
    }
}
