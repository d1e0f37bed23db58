use crate::config::LoggingConfig;
use std::fs::{File, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directive used when `RUST_LOG` is unset.
fn default_directive(level: &str) -> String {
    format!("reldo_escrow={level},reldo_node={level},reldo={level}")
}

/// Level selected by `-v` flags, falling back to the configured one.
pub fn effective_level(config: &LoggingConfig, cli_verbose: u8) -> &str {
    match cli_verbose {
        0 => &config.level,
        1 => "debug",
        _ => "trace",
    }
}

pub fn build_filter(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<EnvFilter> {
    let level = effective_level(config, cli_verbose);
    let mut filter = EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_directive(level)),
    );
    for (module, level) in &config.module_filters {
        filter = filter.add_directive(format!("{}={}", module, level).parse()?);
    }
    Ok(filter)
}

fn open_log_file(config: &LoggingConfig) -> anyhow::Result<Option<Mutex<File>>> {
    match &config.file_output {
        Some(path) => Ok(Some(Mutex::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        ))),
        None => Ok(None),
    }
}

/// Initialize the global subscriber from configuration.
pub fn init_logging(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<()> {
    let filter = build_filter(config, cli_verbose)?;
    let file = open_log_file(config)?;
    let subscriber = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_line_number(true)
                .with_file(true);
            let file_layer = file.map(|f| fmt::layer().json().with_writer(f).with_ansi(false));
            subscriber.with(json_layer).with(file_layer).try_init()?;
        }
        "compact" => {
            let compact_layer = fmt::layer()
                .compact()
                .with_target(false)
                .with_line_number(false)
                .with_file(false);
            let file_layer =
                file.map(|f| fmt::layer().compact().with_writer(f).with_ansi(false));
            subscriber.with(compact_layer).with(file_layer).try_init()?;
        }
        _ => {
            // Source locations only when debugging
            let level = effective_level(config, cli_verbose);
            let show_location = matches!(level, "debug" | "trace");
            let pretty_layer = fmt::layer()
                .with_target(show_location)
                .with_line_number(show_location)
                .with_file(show_location);
            let file_layer = file.map(|f| fmt::layer().with_writer(f).with_ansi(false));
            subscriber.with(pretty_layer).with(file_layer).try_init()?;
        }
    }

    Ok(())
}
