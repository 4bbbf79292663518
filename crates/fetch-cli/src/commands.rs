use anyhow::Result;
use arrow::util::pretty::print_batches;
use colored::Colorize;
use fetch_core::{ClientConfig, QueryRequest};
use fetch_flight::FlightConnector;
use fetch_orchestrator::{DrainItem, QueryOrchestrator, RequestReport, RequestState};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;

/// Run one request to completion, printing batches as they arrive
pub async fn run_request(config: &ClientConfig, request: QueryRequest) -> Result<RequestState> {
    println!(
        "{} {} via {}",
        "→".bright_blue(),
        request,
        config.coordinator.to_string().bright_cyan()
    );

    let connector = Arc::new(FlightConnector::new(config.connection.clone()));
    let orchestrator = QueryOrchestrator::from_config(connector, config);
    let mut handle = orchestrator.submit(request);

    let canceller = handle.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let mut request_error = None;
    let mut current = None;
    {
        let mut drain = handle.drain();
        while let Some(item) = drain.next().await {
            match item {
                Ok(DrainItem::Batch { endpoint, batch }) => {
                    if current != Some(endpoint) {
                        println!("{}", format!("Endpoint {}", endpoint).bright_yellow());
                        current = Some(endpoint);
                    }
                    print_batches(&[batch])?;
                }
                Ok(DrainItem::EndpointFailed(e)) => {
                    println!("{} {}", "✗".bright_red(), e);
                }
                Err(e) => request_error = Some(e),
            }
        }
    }
    interrupt.abort();

    let state = handle.wait().await;
    if let Some(e) = request_error {
        println!("{} {}", "Request failed:".bright_red().bold(), e);
    }
    if let Some(report) = handle.report() {
        print_summary(&report);
    }

    Ok(state)
}

/// Write the effective configuration to `path`
pub fn write_config(config: &ClientConfig, path: &Path) -> Result<()> {
    config.save(path)?;
    println!(
        "{} Configuration written to {:?}",
        "✓".bright_green(),
        path
    );
    Ok(())
}

fn print_summary(report: &RequestReport) {
    println!();
    println!("{}", "Summary:".bright_green().bold());
    println!("{}", "─".repeat(50));
    println!("  Request:        {}", report.request_id);
    println!("  State:          {}", colored_state(report.state));
    println!(
        "  Endpoints:      {} ok, {} failed",
        report.succeeded(),
        report.failed()
    );
    println!("  Batches:        {}", report.total_batches());
    println!("  Rows:           {}", report.total_rows());
    println!(
        "  Elapsed:        {:.2}ms",
        report.elapsed.as_secs_f64() * 1000.0
    );

    for endpoint in &report.endpoints {
        let route = endpoint
            .route
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        match &endpoint.error {
            None => println!(
                "  {} {:<4} {:<9} {} batches, {} rows",
                "✓".bright_green(),
                endpoint.index.to_string(),
                route,
                endpoint.batches,
                endpoint.rows
            ),
            Some(error) => println!(
                "  {} {:<4} {:<9} {}",
                "✗".bright_red(),
                endpoint.index.to_string(),
                route,
                error.bright_black()
            ),
        }
    }
    println!("{}", "─".repeat(50));
}

fn colored_state(state: RequestState) -> colored::ColoredString {
    let label = state.to_string();
    match state {
        RequestState::Completed => label.bright_green(),
        RequestState::PartiallyFailed => label.bright_yellow(),
        RequestState::Failed => label.bright_red(),
        _ => label.normal(),
    }
}
