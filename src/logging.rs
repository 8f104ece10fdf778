//! Diagnostic logging setup.
//!
//! Library code only emits `tracing` events; the binary installs the
//! subscriber once at startup. Output goes to stderr so it never mixes with
//! the transcript on stdout.

use tracing_subscriber::EnvFilter;

/// Environment variable checked first for a filter directive.
pub const LOG_ENV_VAR: &str = "LLMSCHAT_LOG";
pub const DEFAULT_LOG_FILTER: &str = "llmschat=warn";

fn pick_filter(
    app_env: Option<String>,
    rust_log: Option<String>,
    configured: Option<&str>,
) -> String {
    [app_env, rust_log, configured.map(str::to_owned)]
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

/// Filter directives in effect: `LLMSCHAT_LOG`, then `RUST_LOG`, then the
/// configured filter, then the default.
pub fn filter_directives(configured: Option<&str>) -> String {
    pick_filter(
        std::env::var(LOG_ENV_VAR).ok(),
        std::env::var("RUST_LOG").ok(),
        configured,
    )
}

/// Install the global subscriber. Calling it again is a no-op.
pub fn init(configured: Option<&str>) {
    let directives = filter_directives(configured);
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|err| {
        eprintln!("Ignoring invalid log filter '{directives}': {err}");
        EnvFilter::new(DEFAULT_LOG_FILTER)
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_variable_wins_over_everything() {
        assert_eq!(
            pick_filter(
                Some("llmschat=trace".into()),
                Some("debug".into()),
                Some("info")
            ),
            "llmschat=trace"
        );
    }

    #[test]
    fn blank_values_fall_through() {
        assert_eq!(
            pick_filter(Some("  ".into()), None, Some("llmschat=debug")),
            "llmschat=debug"
        );
        assert_eq!(pick_filter(None, Some(String::new()), None), DEFAULT_LOG_FILTER);
    }

    #[test]
    fn rust_log_beats_config() {
        assert_eq!(
            pick_filter(None, Some("warn".into()), Some("llmschat=debug")),
            "warn"
        );
    }

    #[test]
    fn init_twice_does_not_panic() {
        init(Some("llmschat=off"));
        init(None);
    }
}
