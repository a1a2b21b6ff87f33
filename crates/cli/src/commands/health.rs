// Health command - probe configured services

use std::sync::Arc;

use crate::output::{print_table_header, print_table_row, OutputFormat};
use anyhow::{anyhow, bail, Result};
use folio_pulse::{
    HealthProbePool, HealthSummary, HttpHealthProbe, PulseConfig, ServiceStatus, ServiceView,
};
use serde::Serialize;

#[derive(Serialize)]
struct HealthReport {
    services: Vec<ServiceView>,
    summary: HealthSummary,
    transcript: Vec<String>,
}

fn status_label(status: &ServiceStatus) -> &'static str {
    match status.alive {
        Some(true) => "up",
        Some(false) => "down",
        None => "unknown",
    }
}

pub async fn run(
    config: &PulseConfig,
    output: OutputFormat,
    quiet: bool,
    service: Option<String>,
) -> Result<()> {
    let pool = HealthProbePool::new(
        config.services.clone(),
        Arc::new(HttpHealthProbe::new()),
        config.probe.clone(),
    );

    let checked = match service {
        Some(id) => {
            let status = pool
                .check_one(&id)
                .await
                .ok_or_else(|| anyhow!("unknown service '{}'", id))?;
            let descriptor = pool
                .service(&id)
                .cloned()
                .ok_or_else(|| anyhow!("unknown service '{}'", id))?;
            vec![(descriptor, status)]
        }
        None => pool.check_all().await,
    };

    let summary = pool.summary();
    let report = HealthReport {
        services: checked
            .into_iter()
            .map(|(service, status)| ServiceView { service, status })
            .collect(),
        summary,
        transcript: pool.log().render(),
    };

    if output.is_text() {
        print_table_header(&[("SERVICE", 20), ("STATUS", 8), ("LATENCY", 9), ("URL", 40)]);
        for view in &report.services {
            let latency = view
                .status
                .latency_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_else(|| "-".to_string());
            print_table_row(&[
                (&view.service.name, 20),
                (status_label(&view.status), 8),
                (&latency, 9),
                (&view.service.health_url, 40),
            ]);
        }

        if !quiet {
            println!();
            for line in &report.transcript {
                println!("  {}", line);
            }
            println!();
            println!("{} up, {} down", summary.alive, summary.down);
        }
    } else {
        output.print_value(&report)?;
    }

    if summary.down > 0 {
        bail!("{} service(s) down", summary.down);
    }
    Ok(())
}
