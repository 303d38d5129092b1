//! Structured diagnostic logging setup: stderr by default, or an
//! hourly-rolling file when `--diag-log-dir` is given.

use std::path::PathBuf;

use clap::ValueEnum;
use metrics_prometheus::recorder::Layer as _;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "kebab_case")]
pub enum DiagnosticFormat {
    Pretty,
    Full,
    Compact,
    Json,
}

pub struct LoggingConfig<'a> {
    pub log_dir: Option<PathBuf>,
    pub filter_env_var: &'a str,
    pub default_filter: &'a str,
    pub diag_format: DiagnosticFormat,
}

impl LoggingConfig<'_> {
    pub fn init(&self) -> anyhow::Result<()> {
        let log_writer = if let Some(log_dir) = &self.log_dir {
            let file_appender = tracing_appender::rolling::hourly(log_dir, "msgqd.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // The guard flushes on drop; leak it so logging survives for
            // the rest of the process instead of stopping when `init`
            // returns.
            std::mem::forget(guard);
            BoxMakeWriter::new(non_blocking)
        } else {
            BoxMakeWriter::new(std::io::stderr)
        };

        let layer = fmt::layer().with_thread_names(true).with_writer(log_writer);
        let layer = match self.diag_format {
            DiagnosticFormat::Pretty => layer.pretty().boxed(),
            DiagnosticFormat::Full => layer.boxed(),
            DiagnosticFormat::Compact => layer.compact().boxed(),
            DiagnosticFormat::Json => layer.json().boxed(),
        };

        let env_filter = EnvFilter::try_new(
            std::env::var(self.filter_env_var)
                .as_deref()
                .unwrap_or(self.default_filter),
        )?;

        tracing_subscriber::registry()
            .with(layer.with_filter(env_filter))
            .with(metrics_tracing_context::MetricsLayer::new())
            .init();

        // Installs the `metrics` facade's global recorder, backed by the
        // default prometheus registry and enriched with active tracing
        // span fields — so `metrics::counter!`/`prometheus::IntCounter`
        // call sites across the workspace land in the same registry.
        metrics::set_boxed_recorder(Box::new(
            metrics_tracing_context::TracingContextLayer::all()
                .layer(metrics_prometheus::Recorder::builder().build()),
        ))?;
        Ok(())
    }
}
