// ⚙️ Configuration - TOML file + UNISKOR_* environment overrides
//
// Every section has defaults matching the live YÖKAK portal, so running
// without a config file works out of the box.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};
use crate::normalizer::RowMap;
use crate::table::NumberLocale;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub locale: NumberLocale,
    #[serde(default)]
    pub rows: RowMap,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ============================================================================
// SECTIONS
// ============================================================================

/// Where the report portal lives and how its DOM is probed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub url: String,
    pub user_agent: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,

    /// Ordered from most specific to catch-all.
    pub activation_selectors: Vec<String>,
    pub activation_keywords: ActivationKeywords,
    /// How many elements per selector are inspected before moving on.
    pub max_candidates: usize,

    /// `{id}` is replaced by the entity id.
    pub entity_selector: String,
    pub table_selector: String,

    /// Keyword for the line-scan fallback of discovery.
    pub markup_keyword: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        PortalConfig {
            url: "https://mis.yokak.gov.tr/Perf".to_string(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36"
                .to_string(),
            headless: true,
            window_width: 1920,
            window_height: 1080,
            activation_selectors: [
                "div[onclick*='university']",
                "div[onclick*='uni']",
                "div[class*='university']",
                "div[class*='uni']",
                "div[data-university-id]",
                "div[data-universityid]",
                "div[onclick]",
                "div[class*='click']",
                "div[class*='select']",
                "div",
                "span",
                "a",
                "button",
                "*[onclick]",
                "*[class*='university']",
                "*[class*='uni']",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            activation_keywords: ActivationKeywords::default(),
            max_candidates: 50,
            entity_selector: "div[data-university-id='{id}']".to_string(),
            table_selector: "table.table".to_string(),
            markup_keyword: "üniversitesi".to_string(),
        }
    }
}

impl PortalConfig {
    pub fn entity_selector_for(&self, id: &str) -> String {
        self.entity_selector.replace("{id}", id)
    }
}

/// Domain vocabulary used to recognise the "university selector" control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationKeywords {
    pub text: Vec<String>,
    pub onclick: Vec<String>,
    pub class: Vec<String>,
}

impl Default for ActivationKeywords {
    fn default() -> Self {
        ActivationKeywords {
            text: vec!["üniversite".to_string(), "university".to_string()],
            onclick: vec!["uni".to_string(), "university".to_string()],
            class: vec!["fa-university".to_string()],
        }
    }
}

/// Bounded waits, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub settle_ms: u64,
    pub activation_wait_ms: u64,
    pub element_wait_ms: u64,
    pub click_settle_ms: u64,
    pub table_wait_ms: u64,
    pub inter_entity_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            settle_ms: 5_000,
            activation_wait_ms: 5_000,
            element_wait_ms: 10_000,
            click_settle_ms: 2_000,
            table_wait_ms: 15_000,
            inter_entity_delay_ms: 1_000,
        }
    }
}

impl TimingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn activation_wait(&self) -> Duration {
        Duration::from_millis(self.activation_wait_ms)
    }

    pub fn element_wait(&self) -> Duration {
        Duration::from_millis(self.element_wait_ms)
    }

    pub fn click_settle(&self) -> Duration {
        Duration::from_millis(self.click_settle_ms)
    }

    pub fn table_wait(&self) -> Duration {
        Duration::from_millis(self.table_wait_ms)
    }

    pub fn inter_entity_delay(&self) -> Duration {
        Duration::from_millis(self.inter_entity_delay_ms)
    }

    /// Zero-length waits everywhere. Used by fixture-driven tests.
    pub fn immediate() -> Self {
        TimingConfig {
            settle_ms: 0,
            activation_wait_ms: 0,
            element_wait_ms: 0,
            click_settle_ms: 0,
            table_wait_ms: 0,
            inter_entity_delay_ms: 0,
        }
    }
}

/// Artifact locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub data_dir: PathBuf,
    /// One `<year>.csv` sheet per year, values as extracted.
    pub raw_workbook: PathBuf,
    /// Same sheets, each column divided by its mean.
    pub normalized_workbook: PathBuf,
    /// Written by the external statistical step.
    pub processed_workbook: PathBuf,
    pub dataset: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            data_dir: PathBuf::from("data"),
            raw_workbook: PathBuf::from("data/hamveri"),
            normalized_workbook: PathBuf::from("data/hamveri_translog"),
            processed_workbook: PathBuf::from("data/sfa_skorlar"),
            dataset: PathBuf::from("data/data.json"),
        }
    }
}

/// The external statistical tool, invoked as a black box.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub commands: Vec<String>,
    pub script: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            commands: vec![
                "Rscript".to_string(),
                "Rscript.exe".to_string(),
                "/usr/bin/Rscript".to_string(),
            ],
            script: PathBuf::from("Etkinlik_skorlari.R"),
            args: vec!["0".to_string()],
            working_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:8000".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
                "http://localhost:5173".to_string(),
                "http://localhost:5174".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

impl Config {
    /// Parse from a TOML string. Missing sections fall back to defaults.
    pub fn from_toml_str(toml_str: &str) -> PipelineResult<Self> {
        toml::from_str(toml_str).map_err(|e| PipelineError::Config(format!("invalid TOML: {}", e)))
    }

    /// Load from an optional file, then apply `UNISKOR_*` overrides and validate.
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let mut config = match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| {
                    PipelineError::Config(format!("cannot read {}: {}", p.display(), e))
                })?;
                Self::from_toml_str(&content)?
            }
            None => Config::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> PipelineResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("UNISKOR_PORTAL_URL") {
            self.portal.url = v;
        }
        if let Some(v) = lookup("UNISKOR_PORTAL_HEADLESS") {
            self.portal.headless = parse_env("UNISKOR_PORTAL_HEADLESS", &v)?;
        }
        if let Some(v) = lookup("UNISKOR_TIMING_TABLE_WAIT_MS") {
            self.timing.table_wait_ms = parse_env("UNISKOR_TIMING_TABLE_WAIT_MS", &v)?;
        }
        if let Some(v) = lookup("UNISKOR_TIMING_INTER_ENTITY_DELAY_MS") {
            self.timing.inter_entity_delay_ms =
                parse_env("UNISKOR_TIMING_INTER_ENTITY_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("UNISKOR_LOCALE_THOUSANDS") {
            self.locale.thousands = parse_env("UNISKOR_LOCALE_THOUSANDS", &v)?;
        }
        if let Some(v) = lookup("UNISKOR_LOCALE_DECIMAL") {
            self.locale.decimal = parse_env("UNISKOR_LOCALE_DECIMAL", &v)?;
        }
        if let Some(v) = lookup("UNISKOR_OUTPUT_DATA_DIR") {
            self.output.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("UNISKOR_OUTPUT_DATASET") {
            self.output.dataset = PathBuf::from(v);
        }
        if let Some(v) = lookup("UNISKOR_STATS_SCRIPT") {
            self.stats.script = PathBuf::from(v);
        }
        if let Some(v) = lookup("UNISKOR_SERVER_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = lookup("UNISKOR_SERVER_CORS_ORIGINS") {
            self.server.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = lookup("UNISKOR_LOG_LEVEL") {
            self.logging.level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> PipelineResult<()> {
        self.rows.validate()?;

        if self.locale.thousands == self.locale.decimal {
            return Err(PipelineError::Config(format!(
                "thousands and decimal separators are both '{}'",
                self.locale.decimal
            )));
        }
        if self.portal.activation_selectors.is_empty() {
            return Err(PipelineError::Config(
                "portal.activation_selectors must not be empty".to_string(),
            ));
        }
        if !self.portal.entity_selector.contains("{id}") {
            return Err(PipelineError::Config(
                "portal.entity_selector must contain an {id} placeholder".to_string(),
            ));
        }
        if self.timing.table_wait_ms == 0 || self.timing.element_wait_ms == 0 {
            return Err(PipelineError::Config(
                "element and table waits must be bounded and non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> PipelineResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PipelineError::Config(format!("invalid value for {}: '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::FieldKey;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.locale.thousands, '.');
        assert_eq!(config.locale.decimal, ',');
        assert_eq!(config.rows.entries.len(), 20);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [portal]
            url = "http://localhost:9999/Perf"

            [timing]
            table_wait_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.portal.url, "http://localhost:9999/Perf");
        assert_eq!(config.portal.table_selector, "table.table");
        assert_eq!(config.timing.table_wait(), Duration::from_millis(500));
        assert_eq!(config.timing.element_wait_ms, 10_000);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("UNISKOR_SERVER_BIND", "127.0.0.1:9000"),
            ("UNISKOR_SERVER_CORS_ORIGINS", "https://uniskor.example, http://localhost:3000"),
            ("UNISKOR_PORTAL_HEADLESS", "false"),
            ("UNISKOR_LOCALE_DECIMAL", "."),
            ("UNISKOR_LOCALE_THOUSANDS", ","),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.server.cors_origins.len(), 2);
        assert!(!config.portal.headless);
        assert_eq!(config.locale.decimal, '.');
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_env_override_is_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(|k| (k == "UNISKOR_TIMING_TABLE_WAIT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_same_separators_rejected() {
        let mut config = Config::default();
        config.locale.thousands = ',';
        assert!(config.validate().is_err());
    }

    fn rows_toml(shift: impl Fn(FieldKey, usize) -> (FieldKey, usize)) -> String {
        RowMap::default()
            .entries
            .iter()
            .map(|m| {
                let (field, row) = shift(m.field, m.row);
                format!("[[rows.entries]]\nrow = {}\nfield = \"{}\"\n", row, field)
            })
            .collect()
    }

    #[test]
    fn test_row_map_from_toml() {
        let toml_str = rows_toml(|field, row| match field {
            FieldKey::Y1 => (field, 11),
            FieldKey::T1 => (field, 6),
            _ => (field, row),
        });
        let config = Config::from_toml_str(&toml_str).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.rows.entries.len(), 20);
        assert_eq!(config.rows.row_of(FieldKey::Y1), Some(11));
        assert_eq!(config.rows.row_of(FieldKey::T1), Some(6));
        assert_eq!(config.rows.row_of(FieldKey::Y3), Some(58));
    }

    #[test]
    fn test_row_map_from_toml_rejects_duplicate_field() {
        let toml_str = rows_toml(|field, row| match field {
            FieldKey::Y2 => (FieldKey::Y1, row),
            _ => (field, row),
        });
        let config = Config::from_toml_str(&toml_str).unwrap();
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_entity_selector_template() {
        let portal = PortalConfig::default();
        assert_eq!(
            portal.entity_selector_for("104"),
            "div[data-university-id='104']"
        );
    }
}
