//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber filtered at `level`.
///
/// A non-empty `RUST_LOG` takes precedence over `level`. Returns `false` if a
/// subscriber was already installed, so repeated calls are harmless.
pub fn init_tracing(level: &str) -> bool {
    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_tracing("debug");
        assert!(!init_tracing("not a level"));

        let config = crate::OrchestratorConfig {
            log_level: "warn".to_string(),
            ..Default::default()
        };
        assert!(!config.init_tracing());
    }
}
