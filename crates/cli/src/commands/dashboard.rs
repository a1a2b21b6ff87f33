// Dashboard command - refresh every source and print results as they land

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};
use anyhow::Result;
use chrono::Utc;
use folio_pulse::{
    relative_time, ApiClient, DashboardAggregator, DashboardMetric, DashboardView, PulseConfig,
    VisitPoint,
};
use tracing::warn;

const ACTIVITY_ROWS: usize = 8;

fn metric_text<T>(metric: &DashboardMetric<T>, render: impl Fn(&T) -> String) -> String {
    let value = metric.value.as_ref().map(render);
    match (&metric.error, value) {
        (Some(error), Some(stale)) => format!("{} (stale: {})", stale, error),
        (Some(error), None) => format!("unavailable ({})", error),
        (None, Some(value)) => value,
        (None, None) => "-".to_string(),
    }
}

fn visits_text(points: &[VisitPoint]) -> String {
    let total: u64 = points.iter().map(|p| p.count).sum();
    let days = points
        .iter()
        .map(|p| format!("{} {}", p.label, p.count))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} total [{}]", total, days)
}

/// Print every metric that finished since the last call
fn print_resolved(view: &DashboardView, reported: &mut HashSet<&'static str>) {
    let count = |n: &u64| n.to_string();
    let rows = [
        ("Users", view.users.loading, metric_text(&view.users, count)),
        ("Projects", view.projects.loading, metric_text(&view.projects, count)),
        ("Blog posts", view.blog_posts.loading, metric_text(&view.blog_posts, count)),
        ("Messages", view.messages.loading, metric_text(&view.messages, count)),
        (
            "Weekly visits",
            view.weekly_visits.loading,
            metric_text(&view.weekly_visits, |p| visits_text(p)),
        ),
    ];
    for (label, loading, text) in rows {
        if !loading && reported.insert(label) {
            print_field(label, &text);
        }
    }
}

pub async fn run(config: &PulseConfig, output: OutputFormat, quiet: bool, wait: u64) -> Result<()> {
    let api = Arc::new(ApiClient::from_config(config));
    let dashboard = DashboardAggregator::from_config(config, api);

    if !dashboard.connect_stream().await && !quiet {
        warn!("Activity stream unavailable; recent activity will be empty");
    }

    let mut sub = dashboard.subscribe();
    let handle = dashboard.refresh_all();
    let deadline = tokio::time::sleep(Duration::from_secs(wait));
    tokio::pin!(deadline);

    let mut reported = HashSet::new();
    let mut timed_out = false;
    loop {
        let view = dashboard.view(ACTIVITY_ROWS);
        if output.is_text() {
            print_resolved(&view, &mut reported);
        }
        if !view.is_loading() {
            break;
        }
        tokio::select! {
            _ = &mut deadline => {
                timed_out = true;
                break;
            }
            _ = sub.users.changed() => {}
            _ = sub.projects.changed() => {}
            _ = sub.blog_posts.changed() => {}
            _ = sub.messages.changed() => {}
            _ = sub.weekly_visits.changed() => {}
            // Service statuses have no channel of their own
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
        }
    }
    if timed_out {
        warn!(wait_secs = wait, "Dashboard sources still loading after wait");
    } else {
        handle.join().await;
    }

    let view = dashboard.view(ACTIVITY_ROWS);
    dashboard.stream().disconnect();

    if !output.is_text() {
        return output.print_value(&view);
    }

    println!();
    print_table_header(&[("SERVICE", 20), ("STATUS", 10), ("LATENCY", 9)]);
    for service in &view.services {
        let status = match (service.status.checking, service.status.alive) {
            (true, _) => "checking",
            (false, Some(true)) => "up",
            (false, Some(false)) => "down",
            (false, None) => "unknown",
        };
        let latency = service
            .status
            .latency_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        print_table_row(&[(&service.service.name, 20), (status, 10), (&latency, 9)]);
    }

    if quiet {
        return Ok(());
    }

    println!();
    if view.recent_activity.is_empty() {
        match &view.stream_error {
            Some(error) => println!("No recent activity ({})", error),
            None => println!("No recent activity"),
        }
        return Ok(());
    }
    let now = Utc::now();
    for event in &view.recent_activity {
        println!(
            "{:<10}  {:<20}  {}",
            relative_time(event.timestamp, now),
            event.event_type.label(),
            event.action
        );
    }
    Ok(())
}
