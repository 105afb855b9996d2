//! Tracing subscriber setup for binaries
//!
//! The library only emits `tracing` events; whoever runs it decides where
//! they go. SIP traces are emitted at debug level under [`SIP_TRACE_TARGET`].
//! With [`LoggingConfig::sip_trace`] on they are shown whatever the base
//! level is, so `--log-level warn` still prints the signaling.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{DuetError, DuetResult};

/// Target used for simulated SIP message traces
pub const SIP_TRACE_TARGET: &str = "sipduet_core::sip";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    /// One JSON object per line on stdout
    pub json: bool,
    /// Show SIP traces regardless of `level`
    pub sip_trace: bool,
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            json: false,
            sip_trace: false,
        }
    }

    pub fn json(mut self, enabled: bool) -> Self {
        self.json = enabled;
        self
    }

    pub fn sip_trace(mut self, enabled: bool) -> Self {
        self.sip_trace = enabled;
        self
    }

    /// `RUST_LOG`-style directives, then the base level, then the SIP
    /// trace directive. Later directives for the same target win.
    fn filter(&self, env_directives: &str) -> DuetResult<EnvFilter> {
        let mut filter = EnvFilter::builder()
            .parse_lossy(env_directives)
            .add_directive(self.level.into());
        if self.sip_trace {
            let directive = format!("{}=debug", SIP_TRACE_TARGET)
                .parse::<Directive>()
                .map_err(|e| DuetError::config(format!("bad SIP trace directive: {}", e)))?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn setup_logging(config: &LoggingConfig) -> DuetResult<()> {
    let env_directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let subscriber = fmt::Subscriber::builder().with_env_filter(config.filter(&env_directives)?);

    let installed = if config.json {
        subscriber.with_writer(std::io::stdout).json().try_init()
    } else {
        subscriber.try_init()
    };
    installed.map_err(|e| DuetError::config(format!("failed to install logger: {}", e)))
}

/// Parse a log level such as `debug` or `WARN`
pub fn parse_log_level(level: &str) -> DuetResult<Level> {
    Level::from_str(level).map_err(|_| DuetError::config(format!("Invalid log level: {}", level)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(config: &LoggingConfig, env: &str) -> String {
        config.filter(env).unwrap().to_string().to_lowercase()
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(matches!(
            parse_log_level("chatty"),
            Err(DuetError::Configuration { .. })
        ));
    }

    #[test]
    fn test_sip_trace_adds_target_directive() {
        let quiet = LoggingConfig::new(Level::WARN);
        assert!(!rendered(&quiet, "").contains(SIP_TRACE_TARGET));

        let traced = LoggingConfig::new(Level::WARN).sip_trace(true);
        let filter = rendered(&traced, "");
        assert!(filter.contains(&format!("{}=debug", SIP_TRACE_TARGET)), "{}", filter);
        assert!(filter.contains("warn"), "{}", filter);
    }

    #[test]
    fn test_env_directives_are_kept() {
        let config = LoggingConfig::default().sip_trace(true).json(true);
        assert!(config.json);
        let filter = rendered(&config, "tokio=trace");
        assert!(filter.contains("tokio=trace"), "{}", filter);
        assert!(filter.contains(SIP_TRACE_TARGET), "{}", filter);
    }
}
