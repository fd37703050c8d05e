use chrono::Weekday;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::time::Duration;
use tally_core::models::ReconcilerConfig;
use tally_core::projection::TaskFilter;
use tally_core::reset::ResetSchedule;
use tally_core::templates::{default_templates, TaskTemplate};

use crate::timezone::detect_system_timezone;

const CONFIG_FILE: &str = "tally.toml";

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding every storage key
    pub database_path: String,
    pub reconcile_interval_ms: u64,
    /// Filter used by `list` when none is given
    pub default_filter: TaskFilter,
    /// IANA zone used to display reset times
    pub display_timezone: String,
    pub reset: ResetConfig,
    /// Templates used by `seed`
    pub templates: Vec<TaskTemplate>,
}

/// Reset boundaries, always in UTC
#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct ResetConfig {
    pub daily_hour: u32,
    /// Day name or abbreviation, e.g. "wed"
    pub weekly_anchor: String,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            daily_hour: 0,
            weekly_anchor: "wed".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "tally.db".to_string(),
            reconcile_interval_ms: 1000,
            default_filter: TaskFilter::All,
            display_timezone: detect_system_timezone(),
            reset: ResetConfig::default(),
            templates: default_templates(),
        }
    }
}

impl Config {
    pub fn new() -> Result<Self, figment::Error> {
        Self::from_figment(Figment::new().merge(Toml::file(CONFIG_FILE)))
    }

    fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.merge(Env::prefixed("TALLY_")).extract()
    }

    pub fn schedule(&self) -> anyhow::Result<ResetSchedule> {
        let anchor: Weekday = self
            .reset
            .weekly_anchor
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid weekly reset day: '{}'", self.reset.weekly_anchor))?;
        Ok(ResetSchedule::new(self.reset.daily_hour, anchor)?)
    }

    pub fn reconciler(&self) -> anyhow::Result<ReconcilerConfig> {
        Ok(ReconcilerConfig {
            interval: Duration::from_millis(self.reconcile_interval_ms),
            schedule: self.schedule()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database_path, "tally.db");
        assert_eq!(config.reconcile_interval_ms, 1000);
        assert_eq!(config.schedule().unwrap(), ResetSchedule::default());
    }

    #[test]
    fn test_toml_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                database_path = "chars.db"
                default_filter = "unfinished"

                [reset]
                daily_hour = 5
                weekly_anchor = "thursday"
                "#,
            )?;
            let config = Config::new()?;
            assert_eq!(config.database_path, "chars.db");
            assert_eq!(config.default_filter, TaskFilter::Unfinished);
            let schedule = config.schedule().unwrap();
            assert_eq!(schedule.daily_hour, 5);
            assert_eq!(schedule.weekly_anchor, Weekday::Thu);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TALLY_DATABASE_PATH", "/tmp/env.db");
            jail.set_env("TALLY_RECONCILE_INTERVAL_MS", "250");
            let config = Config::from_figment(Figment::from(Serialized::default("database_path", "x.db")))?;
            assert_eq!(config.database_path, "/tmp/env.db");
            assert_eq!(config.reconcile_interval_ms, 250);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_reset_config() {
        let config = Config {
            reset: ResetConfig {
                daily_hour: 24,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.schedule().is_err());

        let config = Config {
            reset: ResetConfig {
                weekly_anchor: "someday".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.schedule().is_err());
    }
}
