//! ritmo-config: configuration loading for the ritmo daemon.
//!
//! Configuration lives in `~/.ritmo/config.json5`; a missing file falls
//! back to defaults. Credentials are never part of the config file — they
//! are probed from environment variables (a `.env` file is honored).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ritmo_types::{RuleError, ScheduleRule, ServiceKind, TaskSpec};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
    #[error("task {task}: {source}")]
    InvalidRule {
        task: String,
        #[source]
        source: RuleError,
    },
    #[error("{entry} is enabled but has no command configured")]
    MissingCommand { entry: String },
}

// ──────────────────── Scheduler ────────────────────

/// Scheduler loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between evaluation ticks.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Settle delay before the first evaluation after start.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Seconds a task stays Completed/Failed before resetting to Idle.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_tick_secs() -> u64 {
    60
}

fn default_settle_secs() -> u64 {
    5
}

fn default_cooldown_secs() -> u64 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            settle_secs: default_settle_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

// ──────────────────── Services ────────────────────

fn default_true() -> bool {
    true
}

/// Expired-data cleanup service. Needs no external credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cleanup_interval")]
    pub interval_hours: u64,
    /// Archive expired records instead of deleting them.
    #[serde(default = "default_true")]
    pub archive_expired_events: bool,
    /// Argv for the subprocess handler backing the cleanup pass.
    #[serde(default)]
    pub command: Vec<String>,
}

fn default_cleanup_interval() -> u64 {
    24
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_cleanup_interval(),
            archive_expired_events: true,
            command: Vec::new(),
        }
    }
}

/// External calendar sync service. Credential-gated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSyncConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_sync_interval")]
    pub interval_hours: u64,
    /// Create local records for events found upstream.
    #[serde(default)]
    pub auto_create_events: bool,
    /// Argv for the subprocess handler backing the sync pass.
    #[serde(default)]
    pub command: Vec<String>,
}

fn default_sync_interval() -> u64 {
    6
}

impl Default for CalendarSyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_sync_interval(),
            auto_create_events: false,
            command: Vec::new(),
        }
    }
}

/// AI enrichment service. Credential-gated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_enrichment_interval")]
    pub interval_hours: u64,
    /// Let the enrichment pass assign categories.
    #[serde(default = "default_true")]
    pub auto_categorize: bool,
    /// Let the enrichment pass extract structured metadata.
    #[serde(default = "default_true")]
    pub auto_extract_metadata: bool,
    /// Argv for the subprocess handler backing the enrichment pass.
    #[serde(default)]
    pub command: Vec<String>,
}

fn default_enrichment_interval() -> u64 {
    12
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_enrichment_interval(),
            auto_categorize: true,
            auto_extract_metadata: true,
            command: Vec::new(),
        }
    }
}

/// Per-service configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub calendar_sync: CalendarSyncConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

// ──────────────────── Top Level ────────────────────

/// Top-level ritmo configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RitmoConfig {
    /// Scheduler loop timing.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Scheduled tasks, keyed by task id.
    #[serde(default)]
    pub tasks: HashMap<String, TaskSpec>,
    /// Background services.
    #[serde(default)]
    pub services: ServicesConfig,
}

impl RitmoConfig {
    /// Check rules and that every enabled entry carries a command.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (id, spec) in &self.tasks {
            spec.rule.validate().map_err(|source| ConfigError::InvalidRule {
                task: id.clone(),
                source,
            })?;
            if spec.enabled && spec.command.is_empty() {
                return Err(ConfigError::MissingCommand {
                    entry: format!("task {id}"),
                });
            }
        }
        let services = &self.services;
        for (name, enabled, command) in [
            ("cleanup", services.cleanup.enabled, &services.cleanup.command),
            (
                "calendar_sync",
                services.calendar_sync.enabled,
                &services.calendar_sync.command,
            ),
            (
                "enrichment",
                services.enrichment.enabled,
                &services.enrichment.command,
            ),
        ] {
            if enabled && command.is_empty() {
                return Err(ConfigError::MissingCommand {
                    entry: format!("service {name}"),
                });
            }
        }
        Ok(())
    }

    /// Starter configuration written by `ritmo init`: the recurring task
    /// table shipped as disabled examples with placeholder commands.
    pub fn example() -> Self {
        use chrono::Weekday;

        let mut tasks = HashMap::new();
        let mut example = |id: &str, name: &str, rule: ScheduleRule, command: &str| {
            tasks.insert(
                id.to_string(),
                TaskSpec {
                    name: name.to_string(),
                    rule,
                    enabled: false,
                    command: vec![command.to_string()],
                    settings: HashMap::new(),
                },
            );
        };

        example(
            "metrics-analysis",
            "Metrics analysis",
            ScheduleRule::DailyAt { hour: 8, minute: 0 },
            "/usr/local/bin/analyze-metrics",
        );
        example(
            "financial-report",
            "Financial report",
            ScheduleRule::WeeklyAt {
                weekday: Weekday::Mon,
                hour: 8,
                minute: 0,
            },
            "/usr/local/bin/financial-report",
        );
        example(
            "content-suggestions",
            "Content suggestions",
            ScheduleRule::DailyAt { hour: 10, minute: 0 },
            "/usr/local/bin/suggest-content",
        );
        example(
            "seo-review",
            "SEO review",
            ScheduleRule::WeeklyAt {
                weekday: Weekday::Wed,
                hour: 8,
                minute: 0,
            },
            "/usr/local/bin/seo-review",
        );
        example(
            "anomaly-watch",
            "Anomaly watch",
            ScheduleRule::Hourly,
            "/usr/local/bin/detect-anomalies",
        );
        example(
            "data-backup",
            "Data backup",
            ScheduleRule::DailyAt { hour: 3, minute: 0 },
            "/usr/local/bin/backup-data",
        );
        example(
            "cache-cleanup",
            "Cache cleanup",
            ScheduleRule::WeeklyAt {
                weekday: Weekday::Sun,
                hour: 8,
                minute: 0,
            },
            "/usr/local/bin/clean-cache",
        );

        Self {
            scheduler: SchedulerConfig::default(),
            tasks,
            services: ServicesConfig::default(),
        }
    }
}

// ──────────────────── Paths & Loading ────────────────────

/// Resolve the ritmo config directory (~/.ritmo/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".ritmo"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.ritmo/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Resolve the run ledger database path (~/.ritmo/ritmo.db).
pub fn ledger_db_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("ritmo.db"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<RitmoConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load and validate configuration from a specific path, falling back to
/// defaults if the file does not exist.
pub fn load_config_from(path: &Path) -> Result<RitmoConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(RitmoConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: RitmoConfig = json5::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Ensure the config directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = config_dir()?;
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

/// Save configuration to a specific path.
pub fn save_config_to(path: &Path, config: &RitmoConfig) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::Io(std::io::Error::other(e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

// ──────────────────── Credentials ────────────────────

/// Environment variable holding the calendar sync API key.
pub const CALENDAR_API_KEY_VAR: &str = "RITMO_CALENDAR_API_KEY";
/// Environment variable holding the enrichment API key.
pub const AI_API_KEY_VAR: &str = "RITMO_AI_API_KEY";

/// Check whether the credentials a service needs are configured.
///
/// Probes environment configuration only; absence returns false, never an
/// error. Cleanup requires no external credentials.
pub fn has_credentials(kind: ServiceKind) -> bool {
    match kind {
        ServiceKind::Cleanup => true,
        ServiceKind::CalendarSync => env_non_empty(CALENDAR_API_KEY_VAR),
        ServiceKind::Enrichment => env_non_empty(AI_API_KEY_VAR),
    }
}

fn env_non_empty(var: &str) -> bool {
    std::env::var(var).map(|v| !v.trim().is_empty()).unwrap_or(false)
}
