//! Process configuration, loaded from `WATCHIT_*` environment variables.
//!
//! Loading itself is an out-of-scope external collaborator (the core only
//! consumes a fully-populated [`Config`]), but the struct and its validation
//! are ambient infrastructure and implemented in full.

use validator::Validate;

use crate::error::ConfigError;

/// Everything named in the configuration surface, with the original
/// project's defaults preserved where the environment doesn't override them.
#[derive(Debug, Clone, Validate)]
pub struct Config {
    pub db_path: String,
    /// Passed as `SqliteStore::connect`'s `db_key` to encrypt the local
    /// store, matching `core/db.py`'s `PRAGMA key`. `None` opens a plain,
    /// unencrypted database.
    pub db_key: Option<String>,
    pub policy_version: String,
    pub sched_name: String,
    pub sched_days: String,
    pub sched_quiet: String,
    pub parent_pin: String,
    pub judge_model: String,
    pub judge_base_url: String,
    pub bind_host: String,
    pub bind_port: u16,
    pub pg_dsn: Option<String>,
    pub enable_ocr: bool,
    #[validate(range(min = 0.0, max = 1.0))]
    pub ocr_confidence_threshold: f64,
    pub save_screenshots: bool,
    pub screenshots_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: "child_monitor.db".into(),
            db_key: None,
            policy_version: "1.0.0".into(),
            sched_name: "schoolnights".into(),
            sched_days: "Mon,Tue,Wed,Thu".into(),
            sched_quiet: "21:00-07:00".into(),
            parent_pin: "123456".into(),
            judge_model: "llama3".into(),
            judge_base_url: "http://localhost:11434".into(),
            bind_host: "127.0.0.1".into(),
            bind_port: 4849,
            pg_dsn: None,
            enable_ocr: true,
            ocr_confidence_threshold: 0.7,
            save_screenshots: false,
            screenshots_dir: "screenshots".into(),
        }
    }
}

fn env_or(key: &'static str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidEnv {
                key,
                message: format!("expected a boolean, got {raw:?}"),
            }),
        },
    }
}

fn env_parse<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidEnv {
            key,
            message: format!("could not parse {raw:?}"),
        }),
    }
}

impl Config {
    /// Load from the process environment, applying `.env` first via
    /// `dotenvy`, then validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        let config = Config {
            db_path: env_or("WATCHIT_DB_PATH", &defaults.db_path),
            db_key: std::env::var("WATCHIT_DB_KEY").ok(),
            policy_version: env_or("WATCHIT_POLICY_VERSION", &defaults.policy_version),
            sched_name: env_or("WATCHIT_SCHEDULE_NAME", &defaults.sched_name),
            sched_days: env_or("WATCHIT_SCHEDULE_DAYS", &defaults.sched_days),
            sched_quiet: env_or("WATCHIT_SCHEDULE_QUIET", &defaults.sched_quiet),
            parent_pin: env_or("WATCHIT_PARENT_PIN", &defaults.parent_pin),
            judge_model: env_or("WATCHIT_JUDGE_MODEL", &defaults.judge_model),
            judge_base_url: env_or("WATCHIT_JUDGE_BASE_URL", &defaults.judge_base_url),
            bind_host: env_or("WATCHIT_BIND_HOST", &defaults.bind_host),
            bind_port: env_parse("WATCHIT_BIND_PORT", defaults.bind_port)?,
            pg_dsn: std::env::var("WATCHIT_PG_DSN").ok(),
            enable_ocr: env_bool("WATCHIT_ENABLE_OCR", defaults.enable_ocr)?,
            ocr_confidence_threshold: env_parse(
                "WATCHIT_OCR_CONFIDENCE_THRESHOLD",
                defaults.ocr_confidence_threshold,
            )?,
            save_screenshots: env_bool("WATCHIT_SAVE_SCREENSHOTS", defaults.save_screenshots)?,
            screenshots_dir: env_or("WATCHIT_SCREENSHOTS_DIR", &defaults.screenshots_dir),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().expect("defaults are valid");
    }
}
