use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::{config::LogConfig, errors::Error, Result};

/// Keeps the non-blocking file writer alive. Drop it last, on process exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize tracing for the process from an explicit config.
///
/// `RUST_LOG` overrides the configured directives. The BBS adapter is kept at
/// `warn` unless debug mode is on, since its screen traffic is noisy.
pub fn init(service_name: &str, cfg: &LogConfig) -> Result<LogGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(directives(service_name, cfg))
            .map_err(|e| Error::Config(format!("invalid log level {:?}: {e}", cfg.level)))?,
    };

    let console: Box<dyn Layer<Registry> + Send + Sync> = if cfg.json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed()
    } else {
        fmt::layer().with_target(false).with_ansi(true).boxed()
    };
    let mut layers = vec![console];

    let mut file_guard = None;
    if let Some(dir) = &cfg.dir {
        std::fs::create_dir_all(dir)?;
        let appender = tracing_appender::rolling::daily(dir, format!("{service_name}.log"));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .boxed(),
        );
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| Error::External(format!("tracing init failed: {e}")))?;

    tracing::debug!(
        level = cfg.effective_level(),
        json = cfg.json,
        os = std::env::consts::OS,
        "logging initialized"
    );

    Ok(LogGuard { _file: file_guard })
}

fn directives(service_name: &str, cfg: &LogConfig) -> String {
    let level = cfg.effective_level();
    let adapter = if cfg.debug_mode { "debug" } else { "warn" };
    format!(
        "{level},{service_name}={level},pas_core={level},pas_telegram={level},pas_ptt={adapter}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_is_quiet_by_default() {
        let d = directives("pas", &LogConfig::default());
        assert!(d.starts_with("info,"));
        assert!(d.contains("pas_ptt=warn"));
        assert!(EnvFilter::try_new(d).is_ok());
    }

    #[test]
    fn debug_mode_opens_everything() {
        let cfg = LogConfig {
            debug_mode: true,
            ..LogConfig::default()
        };
        let d = directives("pas", &cfg);
        assert!(d.contains("pas=debug"));
        assert!(d.contains("pas_ptt=debug"));
    }
}
