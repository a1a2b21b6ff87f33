// Watch command - follow the live activity feed

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::output::{badge, OutputFormat};
use anyhow::{bail, Result};
use chrono::Utc;
use folio_pulse::{
    relative_time, ActivityEvent, ApiClient, EventId, EventStreamClient, FeedSnapshot,
    PulseConfig, StreamMode, UnreadTracker,
};
use tokio::time::Instant;

struct Printer {
    output: OutputFormat,
    quiet: bool,
    printed: HashSet<EventId>,
    connected: bool,
}

impl Printer {
    /// Print events not shown yet, oldest first
    fn print_new(&mut self, events: &[ActivityEvent], unread: usize) -> Result<()> {
        let now = Utc::now();
        for event in events.iter().rev() {
            if !self.printed.insert(event.id.clone()) {
                continue;
            }
            if self.output.is_text() {
                println!(
                    "{:<10}  {:<20}  {}  {}",
                    relative_time(event.timestamp, now),
                    event.event_type.label(),
                    event.action,
                    badge(unread)
                );
            } else {
                self.output.print_value(event)?;
            }
        }
        Ok(())
    }

    fn report_connectivity(&mut self, snapshot: &FeedSnapshot) {
        if snapshot.is_connected == self.connected {
            return;
        }
        self.connected = snapshot.is_connected;
        if self.quiet || !self.output.is_text() {
            return;
        }
        match (snapshot.is_connected, &snapshot.last_error) {
            (true, _) => eprintln!("-- reconnected"),
            (false, Some(error)) => eprintln!("-- disconnected: {}", error),
            (false, None) => eprintln!("-- disconnected"),
        }
    }
}

/// Sleep until `at`, or forever when there is nothing scheduled
async fn sleep_until_some(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

pub async fn run(
    config: &PulseConfig,
    output: OutputFormat,
    quiet: bool,
    duration: Option<u64>,
) -> Result<()> {
    let api = Arc::new(ApiClient::from_config(config));
    let client = EventStreamClient::new(api, config.stream.clone());
    let mut tracker = UnreadTracker::new(config.unread_before_first_view);
    let mut snapshots = client.subscribe();

    if !client.connect().await {
        let reason = client.last_error().unwrap_or_else(|| "unknown error".to_string());
        bail!("could not connect to the activity stream: {}", reason);
    }

    let mut printer = Printer {
        output,
        quiet,
        printed: HashSet::new(),
        connected: true,
    };

    // Everything fetched on connect counts as seen
    let initial = snapshots.borrow_and_update().clone();
    tracker.mark_seen(&initial.events);
    printer.print_new(&initial.events, 0)?;
    if output.is_text() && !quiet {
        eprintln!("-- watching for new activity (Ctrl-C to stop)");
    }

    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let until_deadline = sleep_until_some(deadline);
    tokio::pin!(until_deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // A dropped push channel is not retried by the client
    let retry_push = config.stream.mode == StreamMode::Sse;
    let mut reconnect_at: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = &mut until_deadline => break,
            _ = sleep_until_some(reconnect_at), if reconnect_at.is_some() => {
                reconnect_at = None;
                if !client.connect().await {
                    reconnect_at = Some(Instant::now() + config.stream.poll_interval);
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                printer.report_connectivity(&snapshot);
                printer.print_new(&snapshot.events, tracker.unread_count(&snapshot.events))?;

                if retry_push && !snapshot.is_connected && reconnect_at.is_none() {
                    reconnect_at = Some(Instant::now() + config.stream.poll_interval);
                }
            }
        }
    }

    client.disconnect();

    if output.is_text() && !quiet {
        let events = client.events();
        eprintln!("-- {} unread since start", tracker.unread_count(&events));
    }
    Ok(())
}
