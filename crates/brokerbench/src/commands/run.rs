use std::sync::Arc;

use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use libbrokerbench_brokers::BrokerSet;
use libbrokerbench_core::{
    load_all, BenchConfig, BenchError, BenchmarkDriver, DriverConfig, MetricsAggregator,
    MetricsLog, MetricsReport, Result, RunSummary, SendAdapter, StopHandle, SystemSampler,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{Cli, RunArgs};
use crate::commands::load_config;
use crate::output::output_success;

#[derive(Serialize)]
struct RunOutput {
    summary: RunSummary,
    report: MetricsReport,
    metrics_log: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_path: Option<String>,
}

fn apply_args(config: &mut BenchConfig, args: &RunArgs) {
    if let Some(secs) = args.duration {
        config.duration_secs = secs;
    }
    if let Some(ms) = args.pause_ms {
        config.batch_pause_ms = ms;
    }
    if let Some(path) = &args.metrics_log {
        config.metrics_log = path.clone();
    }
    if let Some(path) = &args.report {
        config.report_path = Some(path.clone());
    }
    if args.fsync {
        config.fsync = true;
    }
}

pub async fn run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let mut config = load_config(cli)?;
    apply_args(&mut config, args);
    config.validate()?;

    let batches = load_all(&config.data_dir)?;
    if batches.is_empty() {
        return Err(BenchError::Config(format!(
            "no usable batches in {}",
            config.data_dir.display()
        )));
    }

    let log = MetricsLog::create(&config.metrics_log, config.fsync)?;
    let metrics = Arc::new(MetricsAggregator::new(log));
    let sampler = Arc::new(SystemSampler::new());

    let brokers = BrokerSet::connect(&config).await?;
    let adapters: Vec<SendAdapter> = brokers
        .backends()
        .iter()
        .map(|backend| SendAdapter::new(Arc::clone(backend), Arc::clone(&metrics), sampler.clone()))
        .collect();

    let names = brokers.names();

    let mut driver = BenchmarkDriver::new(adapters, batches, DriverConfig::from(&config));
    let signals = tokio::spawn(stop_on_signal(driver.stop_handle()));

    let result = driver.run().await;
    signals.abort();
    brokers.shutdown().await;

    let summary = result?;
    let report = MetricsReport::collect(&metrics, &names);
    if let Some(path) = &config.report_path {
        report.save(path)?;
        info!("Wrote report to {}", path.display());
    }

    let human = render_summary(&summary, &report);
    output_success(
        cli,
        RunOutput {
            summary,
            report,
            metrics_log: config.metrics_log.display().to_string(),
            report_path: config.report_path.as_ref().map(|p| p.display().to_string()),
        },
        &human,
    );
    Ok(())
}

fn render_summary(summary: &RunSummary, report: &MetricsReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Broker", "Messages", "Msg/s", "Latency ms", "p50", "p99", "Memory MB", "CPU %",
    ]);

    for (name, metrics) in &report.backends {
        let latencies = report.latencies.get(name);
        let p50 = latencies.map(|l| l.p50_ms.to_string()).unwrap_or_else(|| "-".to_string());
        let p99 = latencies.map(|l| l.p99_ms.to_string()).unwrap_or_else(|| "-".to_string());
        match metrics {
            Some(m) => table.add_row(vec![
                name.clone(),
                m.message_count.to_string(),
                format!("{:.2}", m.throughput),
                format!("{:.2}", m.latency),
                p50,
                p99,
                format!("{:.2}", m.memory_usage),
                format!("{:.2}", m.cpu_usage),
            ]),
            None => table.add_row(vec![
                name.clone(),
                "0".to_string(),
                "-".to_string(),
                "-".to_string(),
                p50,
                p99,
                "-".to_string(),
                "-".to_string(),
            ]),
        };
    }

    format!(
        "{}\n{} batches, {} sends ({} failed) in {:.1}s{}",
        table,
        summary.batches,
        summary.payloads_dispatched,
        summary.failed,
        summary.elapsed.as_secs_f64(),
        if summary.cancelled { ", stopped early" } else { "" }
    )
}

/// Stop the driver on Ctrl+C or SIGTERM
async fn stop_on_signal(stop: StopHandle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Received shutdown signal, finishing current batch");
    stop.stop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_flags_override_config() {
        let mut config = BenchConfig::default();
        let args = RunArgs {
            duration: Some(5),
            pause_ms: Some(0),
            metrics_log: Some(PathBuf::from("out.csv")),
            report: Some(PathBuf::from("report.json")),
            fsync: true,
        };
        apply_args(&mut config, &args);

        assert_eq!(config.duration_secs, 5);
        assert_eq!(config.batch_pause_ms, 0);
        assert_eq!(config.metrics_log, PathBuf::from("out.csv"));
        assert_eq!(config.report_path, Some(PathBuf::from("report.json")));
        assert!(config.fsync);
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let mut config = BenchConfig {
            duration_secs: 30,
            fsync: true,
            ..BenchConfig::default()
        };
        apply_args(&mut config, &RunArgs::default());
        assert_eq!(config.duration_secs, 30);
        assert!(config.fsync);
    }
}
