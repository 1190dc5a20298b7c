use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::schema::LoggingConfig;
use crate::utils::ensure_dir;

/// Crates whose level follows the `--debug` flag
const BRIDGE_TARGETS: &[&str] = &[
    "xm2toot",
    "xm2toot_core",
    "xm2toot_mastodon",
    "xm2toot_commands",
    "xm2toot_channels",
];

/// XMPP library crates whose level follows the `-x` flag
const XMPP_TARGETS: &[&str] = &["tokio_xmpp", "xmpp_parsers"];

/// Verbosity switches from the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLevels {
    /// Debug output for the bridge itself
    pub debug: bool,
    /// Debug output for the XMPP library
    pub xmpp_debug: bool,
}

/// Build the filter directives for the given config and flags
///
/// The config level covers every target unless a flag raises one group
/// to debug. Per-module overrides come last. `RUST_LOG`, when set,
/// replaces all of this.
pub fn filter_directives(config: &LoggingConfig, levels: LogLevels) -> String {
    let mut directives = vec![config.level.clone()];

    if levels.debug {
        directives.extend(BRIDGE_TARGETS.iter().map(|t| format!("{}=debug", t)));
    }
    if levels.xmpp_debug {
        directives.extend(XMPP_TARGETS.iter().map(|t| format!("{}=debug", t)));
    }

    let mut overrides: Vec<_> = config.overrides.iter().collect();
    overrides.sort();
    for (module, level) in overrides {
        directives.push(format!("{}={}", module, level));
    }

    directives.join(",")
}

/// Initialize the logging system
pub fn init_logging(config: &LoggingConfig, levels: LogLevels) -> WorkerGuard {
    // 1. Log Level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = filter_directives(config, levels);
        EnvFilter::try_new(&directives).unwrap_or_else(|e| {
            eprintln!("Invalid log directives {:?}: {}", directives, e);
            EnvFilter::new("info")
        })
    });

    // 2. Log Format
    let format_str = std::env::var("LOG_FORMAT").unwrap_or_else(|_| config.format.clone());
    let is_json = format_str.eq_ignore_ascii_case("json");

    // 3. File Appender, producing xm2toot.log.YYYY-MM-DD
    let log_dir = ensure_dir(&config.dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "xm2toot.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // 4. Layers
    let stdout_layer = if is_json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let file_layer = if is_json {
        fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed()
    };

    // 5. Init Subscriber
    Registry::default()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // 6. Cleanup old logs
    if let Err(e) = cleanup_old_logs(&log_dir, 7) {
        eprintln!("Failed to clean up old logs: {}", e);
    }

    guard
}

/// Clean up log files older than `days` days
fn cleanup_old_logs(dir: &Path, days: u64) -> std::io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    let now = std::time::SystemTime::now();
    let threshold = std::time::Duration::from_secs(days * 24 * 3600);

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with("xm2toot.log"));
        if !path.is_file() || !is_log {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > threshold) {
            if let Err(e) = std::fs::remove_file(&path) {
                eprintln!("Failed to remove old log file {:?}: {}", path, e);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        let directives = filter_directives(&LoggingConfig::default(), LogLevels::default());
        assert_eq!(directives, "info");
        EnvFilter::try_new(&directives).unwrap();
    }

    #[test]
    fn test_config_level_reaches_bridge_crates() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            ..Default::default()
        };
        let directives = filter_directives(&config, LogLevels::default());
        assert_eq!(directives, "debug");

        let subscriber = Registry::default().with(EnvFilter::try_new(&directives).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(target: "xm2toot_mastodon::stream", tracing::Level::DEBUG));
        });
    }

    #[test]
    fn test_debug_flags_are_independent() {
        let levels = LogLevels {
            debug: true,
            xmpp_debug: false,
        };
        let directives = filter_directives(&LoggingConfig::default(), levels);
        assert!(directives.contains("xm2toot_channels=debug"));
        assert!(!directives.contains("tokio_xmpp"));

        let levels = LogLevels {
            debug: false,
            xmpp_debug: true,
        };
        let directives = filter_directives(&LoggingConfig::default(), levels);
        assert!(!directives.contains("xm2toot_channels"));
        assert!(directives.contains("xmpp_parsers=debug"));

        let subscriber = Registry::default().with(EnvFilter::try_new(&directives).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(target: "tokio_xmpp::client", tracing::Level::DEBUG));
            assert!(!tracing::enabled!(target: "xm2toot_channels::bridge", tracing::Level::DEBUG));
        });
    }

    #[test]
    fn test_overrides_come_last() {
        let mut config = LoggingConfig::default();
        config
            .overrides
            .insert("xm2toot_mastodon".to_string(), "trace".to_string());

        let directives = filter_directives(&config, LogLevels::default());
        assert!(directives.ends_with("xm2toot_mastodon=trace"));
    }

    #[test]
    fn test_cleanup_keeps_recent_logs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = tmp.path().join("xm2toot.log.2026-01-01");
        std::fs::write(&log, "line").unwrap();

        cleanup_old_logs(tmp.path(), 7).unwrap();
        assert!(log.exists());
    }
}
