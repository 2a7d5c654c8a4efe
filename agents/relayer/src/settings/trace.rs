use eyre::Result;
use serde::Deserialize;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt,
    prelude::*,
    Layer, Registry,
};

/// Verbosity of the relayer's log output; unknown names read as `info`
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Off,
    Error,
    Warn,
    Debug,
    Trace,
    #[default]
    #[serde(other)]
    Info,
}

impl Level {
    fn as_filter(self) -> LevelFilter {
        match self {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
        }
    }
}

/// Output format of the log lines
#[derive(Default, Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Style {
    /// Multi-line, human friendly
    Pretty,
    /// One JSON object per event
    Json,
    /// Single line, abbreviated
    Compact,
    /// The default `tracing_subscriber` format
    #[serde(other)]
    #[default]
    Full,
}

/// Configuration for the tracing subscriber of the relayer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TracingConfig {
    #[serde(default)]
    pub fmt: Style,
    #[serde(default)]
    pub level: Level,
}

impl TracingConfig {
    fn targets(&self) -> Targets {
        let targets = Targets::new().with_default(self.level.as_filter());
        if self.level == Level::Trace {
            return targets;
        }
        // transport crates only get to log below info at trace level
        ["hyper", "h2", "reqwest"]
            .into_iter()
            .fold(targets, |targets, noisy| {
                targets.with_target(noisy, LevelFilter::INFO)
            })
    }

    /// Attempt to instantiate and register a tracing subscriber setup from
    /// settings.
    pub fn start_tracing(&self) -> Result<()> {
        let targets = self.targets();
        let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match self.fmt {
            Style::Pretty => fmt::layer().pretty().with_filter(targets).boxed(),
            Style::Json => fmt::layer().json().with_filter(targets).boxed(),
            Style::Compact => fmt::layer().compact().with_filter(targets).boxed(),
            Style::Full => fmt::layer().with_filter(targets).boxed(),
        };
        let err_layer = tracing_error::ErrorLayer::default();

        let subscriber = Registry::default().with(fmt_layer).with(err_layer);
        subscriber.try_init()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_values_fall_back_to_defaults() {
        let config: TracingConfig =
            serde_json::from_str(r#"{"fmt": "fancy", "level": "loud"}"#).unwrap();
        assert_eq!(config.fmt, Style::Full);
        assert_eq!(config.level, Level::Info);

        let config: TracingConfig =
            serde_json::from_str(r#"{"fmt": "json", "level": "debug"}"#).unwrap();
        assert_eq!(config.fmt, Style::Json);
        assert_eq!(config.level, Level::Debug);
    }

    #[test]
    fn test_dependency_noise_is_quieted_below_trace() {
        let config = TracingConfig {
            fmt: Style::Compact,
            level: Level::Debug,
        };
        let targets = config.targets();
        assert!(!targets.would_enable("hyper::proto", &tracing::Level::DEBUG));
        assert!(targets.would_enable("relayer::processor", &tracing::Level::DEBUG));
    }

    #[test]
    fn test_trace_level_lets_transport_logs_through() {
        let config = TracingConfig {
            fmt: Style::Full,
            level: Level::Trace,
        };
        let targets = config.targets();
        assert!(targets.would_enable("hyper::proto", &tracing::Level::TRACE));

        let quiet = TracingConfig {
            fmt: Style::Full,
            level: Level::Off,
        };
        assert!(!quiet.targets().would_enable("relayer", &tracing::Level::ERROR));
    }
}
