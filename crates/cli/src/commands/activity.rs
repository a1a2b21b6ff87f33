// Activity command - one page of the historical log

use std::sync::Arc;

use crate::output::{print_table_header, print_table_row, OutputFormat};
use anyhow::Result;
use chrono::Utc;
use folio_pulse::{
    relative_time, ActivityLogQuery, ActivityType, ApiClient, PulseConfig, QueryParams,
};

pub struct ActivityArgs {
    pub page: u32,
    pub limit: u32,
    pub event_type: Option<String>,
    pub search: Option<String>,
}

pub async fn run(
    config: &PulseConfig,
    output: OutputFormat,
    quiet: bool,
    args: ActivityArgs,
) -> Result<()> {
    let api = Arc::new(ApiClient::from_config(config));
    let mut query = ActivityLogQuery::new(api);

    query
        .query(QueryParams {
            page: args.page,
            page_size: args.limit,
            type_filter: args.event_type.map(ActivityType::from),
        })
        .await?;
    if let Some(term) = &args.search {
        query.set_search_term(term.as_str());
    }

    let rows = query.visible_items();

    if !output.is_text() {
        output.print_value(&rows)?;
        return Ok(());
    }

    if rows.is_empty() {
        match &args.search {
            Some(term) if !query.is_empty() => {
                println!("No activity on this page matches '{}'", term)
            }
            _ => println!("No activity found"),
        }
        return Ok(());
    }

    let now = Utc::now();
    print_table_header(&[("WHEN", 12), ("TYPE", 20), ("ACTION", 40), ("USER", 16)]);
    for event in &rows {
        let when = relative_time(event.timestamp, now);
        let label = event.event_type.label();
        print_table_row(&[
            (&when, 12),
            (&label, 20),
            (&event.action, 40),
            (event.user_id.as_deref().unwrap_or("-"), 16),
        ]);
    }

    if !quiet {
        println!();
        println!("Page {} of {}", query.page(), query.total_pages());
    }

    Ok(())
}
