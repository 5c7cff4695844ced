use clap::{CommandFactory, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{DEFAULT_LOWER_BOUND, DEFAULT_UPPER_BOUND};

/// Default number of readings examined by the trend classifier.
pub const DEFAULT_LOOKBACK: usize = 6;

/// Default page size for point listings.
pub const DEFAULT_POINTS_LIMIT: usize = 2000;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Ingest CGM exports and derive glucose insights
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cgm-trace",
    about = "Ingest CGM exports and derive glucose insights",
    version
)]
pub struct Settings {
    /// Directory holding the per-user JSON-lines store
    #[arg(long, global = true, env = "CGM_TRACE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Timezone used for timestamps without an offset (auto-detected if not specified)
    #[arg(long, global = true, default_value = "auto")]
    pub timezone: String,

    /// Abort an operation that runs longer than this many seconds
    #[arg(long, global = true)]
    pub deadline_secs: Option<u64>,

    /// Logging level
    #[arg(long, global = true, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Forget persisted data directory and timezone
    #[arg(long, global = true)]
    pub clear: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Normalize a CSV export and append its readings for a user
    Ingest {
        #[arg(long)]
        user: String,
        #[arg(long)]
        file: PathBuf,
        /// Drop readings before this ISO-8601 instant
        #[arg(long)]
        start: Option<String>,
        /// Drop readings after this ISO-8601 instant
        #[arg(long)]
        end: Option<String>,
    },
    /// List stored readings, oldest first
    Points {
        #[arg(long)]
        user: String,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long, default_value_t = DEFAULT_POINTS_LIMIT)]
        limit: usize,
    },
    /// Summarize readings over a time window
    Summary {
        #[arg(long)]
        user: String,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long, default_value_t = DEFAULT_LOWER_BOUND)]
        lower: f64,
        #[arg(long, default_value_t = DEFAULT_UPPER_BOUND)]
        upper: f64,
    },
    /// Classify short-horizon risk from the latest readings
    Recommend {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "rule")]
        method: String,
        #[arg(long, default_value_t = DEFAULT_LOOKBACK)]
        lookback: usize,
    },
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.cgm-trace/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl LastUsedParams {
    /// `~/.cgm-trace/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Persisted-params path under an arbitrary home directory.
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".cgm-trace").join("last_used.json")
    }

    /// Missing or unreadable files yield empty params.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Written to a sibling `.json.tmp` file, then renamed over `path`.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Remove persisted params; absent files are fine.
    pub fn clear_at(path: &std::path::Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse argv, fill unset data dir / timezone from the persisted file,
    /// then save the merged values back.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Same as [`Settings::load_with_last_used`] with an explicit argument
    /// list and config path, so tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            let _ = LastUsedParams::clear_at(config_path);
            return Self::apply_debug(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI and environment always win over persisted values.
        if !is_arg_explicitly_set(&matches, "data_dir") && settings.data_dir.is_none() {
            settings.data_dir = last.data_dir;
        }
        if !is_arg_explicitly_set(&matches, "timezone") {
            if let Some(tz) = last.timezone {
                settings.timezone = tz;
            }
        }

        settings = Self::apply_debug(settings);

        let params = LastUsedParams::from(&settings);
        let _ = params.save_to(config_path);

        settings
    }

    /// Directory of the JSON-lines store, `~/.cgm-trace/store` by default.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".cgm-trace")
                .join("store")
        })
    }

    /// `--debug` overrides the log level.
    fn apply_debug(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            data_dir: s.data_dir.clone(),
            timezone: Some(s.timezone.clone()),
        }
    }
}

/// Whether `name` came from argv rather than a default or the environment.
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
