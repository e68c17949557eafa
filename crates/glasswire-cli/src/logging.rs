//! Tracing subscriber setup from the `logging` config section.

use glasswire_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Filter directives: base level plus per-crate overrides.
fn directives(config: &LoggingConfig, verbose: bool) -> String {
    let level = if verbose {
        "debug"
    } else {
        config.level.as_deref().unwrap_or("info")
    };
    std::iter::once(level)
        .chain(config.filters.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. `RUST_LOG` wins unless `--verbose` is set.
pub fn init(config: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let directives = directives(config, verbose);
    let filter = if verbose {
        EnvFilter::new(directives)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (config.format.as_str(), config.output.as_str()) {
        ("json", "stdout") => builder.json().with_writer(std::io::stdout).try_init(),
        ("json", _) => builder.json().with_writer(std::io::stderr).try_init(),
        (_, "stdout") => builder.with_writer(std::io::stdout).try_init(),
        _ => builder.with_writer(std::io::stderr).try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(level: Option<&str>, filters: &[&str]) -> LoggingConfig {
        LoggingConfig {
            format: "plain".into(),
            level: level.map(str::to_string),
            filters: filters.iter().map(|f| f.to_string()).collect(),
            output: "stderr".into(),
        }
    }

    #[test]
    fn test_default_level_is_info() {
        assert_eq!(directives(&config(None, &[]), false), "info");
    }

    #[test]
    fn test_filters_are_appended() {
        let c = config(Some("warn"), &["glasswire_surface=debug", "tower_http=info"]);
        assert_eq!(
            directives(&c, false),
            "warn,glasswire_surface=debug,tower_http=info"
        );
    }

    #[test]
    fn test_verbose_forces_debug() {
        let c = config(Some("error"), &["hyper=warn"]);
        assert_eq!(directives(&c, true), "debug,hyper=warn");
    }
}
