pub use agentdeck::shared::cli::{Cli, VERSION};

use agentdeck::domains::settings::DaemonSettings;

const DEFAULT_LOG_FILTER: &str = "agentdeck=info";

/// `RUST_LOG` wins; otherwise the `--log-level` filter, otherwise info for
/// this crate only.
pub fn init_logging(cli_filter: Option<&str>) {
    let fallback = cli_filter
        .map(str::trim)
        .filter(|filter| !filter.is_empty())
        .unwrap_or(DEFAULT_LOG_FILTER);
    let env = env_logger::Env::default().default_filter_or(fallback);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();
}

/// Flags take precedence over the settings file.
pub fn apply_overrides(cli: &Cli, settings: &mut DaemonSettings) {
    if let Some(database) = &cli.database {
        settings.storage.database_path = Some(database.clone());
    }
    if cli.resume_orphans {
        settings.daemon.resume_orphaned_sessions = true;
    }
}
