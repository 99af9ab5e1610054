//! Configuration via environment variables with typed defaults, following
//! the teacher's `load_config()` pattern (`Config::default()` plus
//! `std::env::var(...).unwrap_or_else(...)`), split one struct per
//! subsystem since each component (database, replicator, checkpointer) has
//! its own independent set of knobs.

use serde::Deserialize;

/// Database-level settings: where the backing store lives and how many
/// concurrent readers [`crate::support::DatabasePool`] keeps open.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub db_path: String,
    /// Defaults to [`crate::support::pool::DEFAULT_READER_COUNT`] (spec.md §5).
    pub reader_pool_size: usize,
    pub debug: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_path: "litecore.sqlite".to_string(),
            reader_pool_size: crate::support::pool::DEFAULT_READER_COUNT,
            debug: false,
        }
    }
}

/// Replicator timeouts and flow-control knobs (spec.md §5).
#[derive(Debug, Deserialize, Clone)]
pub struct ReplicatorConfig {
    pub remote_url: String,
    pub continuous: bool,
    pub connect_timeout_secs: u64,
    pub reply_timeout_secs: u64,
    pub close_timeout_secs: u64,
    pub send_buffer_size: usize,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            remote_url: String::new(),
            continuous: true,
            connect_timeout_secs: 30,
            reply_timeout_secs: 60,
            close_timeout_secs: 5,
            send_buffer_size: crate::replicator::SEND_BUFFER_SIZE,
        }
    }
}

/// Checkpointer autosave policy (spec.md §4.4).
#[derive(Debug, Deserialize, Clone)]
pub struct CheckpointConfig {
    pub autosave_delay_secs: u64,
    pub min_changes_to_keep: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { autosave_delay_secs: 5, min_changes_to_keep: crate::tracker::DEFAULT_MIN_CHANGES_TO_KEEP }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub replicator: ReplicatorConfig,
    pub checkpoint: CheckpointConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(default)
}

/// Loads configuration from environment variables, falling back to
/// [`Config::default`] for anything unset or unparsable.
pub fn load_config() -> anyhow::Result<Config> {
    let defaults = Config::default();

    let database = DatabaseConfig {
        db_path: std::env::var("LITECORE_DB_PATH").unwrap_or(defaults.database.db_path),
        reader_pool_size: env_or("LITECORE_READER_POOL_SIZE", defaults.database.reader_pool_size),
        debug: env_bool("LITECORE_DEBUG", defaults.database.debug),
    };

    let replicator = ReplicatorConfig {
        remote_url: std::env::var("LITECORE_REMOTE_URL").unwrap_or(defaults.replicator.remote_url),
        continuous: env_bool("LITECORE_CONTINUOUS", defaults.replicator.continuous),
        connect_timeout_secs: env_or("LITECORE_CONNECT_TIMEOUT_SECS", defaults.replicator.connect_timeout_secs),
        reply_timeout_secs: env_or("LITECORE_REPLY_TIMEOUT_SECS", defaults.replicator.reply_timeout_secs),
        close_timeout_secs: env_or("LITECORE_CLOSE_TIMEOUT_SECS", defaults.replicator.close_timeout_secs),
        send_buffer_size: env_or("LITECORE_SEND_BUFFER_SIZE", defaults.replicator.send_buffer_size),
    };

    let checkpoint = CheckpointConfig {
        autosave_delay_secs: env_or("LITECORE_AUTOSAVE_DELAY_SECS", defaults.checkpoint.autosave_delay_secs),
        min_changes_to_keep: env_or("LITECORE_MIN_CHANGES_TO_KEEP", defaults.checkpoint.min_changes_to_keep),
    };

    Ok(Config { database, replicator, checkpoint })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_database_config_matches_spec_constants() {
        let cfg = DatabaseConfig::default();
        assert_eq!(cfg.reader_pool_size, 5);
        assert!(!cfg.debug);
    }

    #[test]
    fn default_replicator_timeouts_match_spec_section_5() {
        let cfg = ReplicatorConfig::default();
        assert_eq!(cfg.connect_timeout_secs, 30);
        assert_eq!(cfg.reply_timeout_secs, 60);
        assert_eq!(cfg.close_timeout_secs, 5);
        assert_eq!(cfg.send_buffer_size, 256 * 1024);
    }

    #[test]
    fn load_config_falls_back_to_defaults_when_unset() {
        std::env::remove_var("LITECORE_DB_PATH");
        std::env::remove_var("LITECORE_CONTINUOUS");
        let cfg = load_config().unwrap();
        assert_eq!(cfg.database.db_path, "litecore.sqlite");
        assert!(cfg.replicator.continuous);
    }

    #[test]
    fn load_config_reads_overrides() {
        std::env::set_var("LITECORE_DB_PATH", "/tmp/custom.sqlite");
        std::env::set_var("LITECORE_READER_POOL_SIZE", "10");
        let cfg = load_config().unwrap();
        assert_eq!(cfg.database.db_path, "/tmp/custom.sqlite");
        assert_eq!(cfg.database.reader_pool_size, 10);
        std::env::remove_var("LITECORE_DB_PATH");
        std::env::remove_var("LITECORE_READER_POOL_SIZE");
    }

    #[test]
    fn load_config_ignores_an_unparsable_override_and_keeps_the_default() {
        std::env::set_var("LITECORE_READER_POOL_SIZE", "not_a_number");
        let cfg = load_config().unwrap();
        assert_eq!(cfg.database.reader_pool_size, 5);
        std::env::remove_var("LITECORE_READER_POOL_SIZE");
    }
}
