//! Configuration management for mapleads
//!
//! All configuration is loaded from `./config/mapleads.toml`.
//! The template embedded below is the only place defaults live.

use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/mapleads.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = include_str!("../config/mapleads.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid CSS selector in '{field}': {selector} ({error})")]
    InvalidSelector {
        field: String,
        selector: String,
        error: String,
    },

    #[error("Invalid URL in '{field}': {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Strategy '{name}' uses mapper 'attribute' but sets no 'attribute'")]
    MissingAttribute { name: String },

    #[error("Invalid column layout: {0}")]
    InvalidColumns(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub browser: BrowserConfig,
    pub search: SearchConfig,
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub repair: RepairConfig,
}

/// Headless browser launch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub navigation_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_idle_timeout_secs() -> u64 {
    120
}

/// Search surface and wait budgets
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub base_url: String,
    pub search_input_selector: String,
    pub result_container_selector: String,
    pub result_selector: String,
    pub scroll_container_selector: String,
    pub input_timeout_ms: u64,
    pub results_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Maximum scroll/expand actions after the first results appear
    pub scroll_rounds: usize,
    /// Budget each scroll gets to surface new results
    pub settle_delay_ms: u64,
}

/// How a matched element is turned into a value
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MapperKind {
    /// Text content of the element
    Text,
    /// Value of the attribute named by `attribute`
    Attribute,
    /// Decoded place name from the element's `href`
    PlaceLink,
}

/// One ranked name strategy
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub selector: String,
    pub mapper: MapperKind,
    #[serde(default)]
    pub attribute: Option<String>,
}

/// One auxiliary field rule
#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    pub key: String,
    pub selector: String,
    pub mapper: MapperKind,
    #[serde(default)]
    pub attribute: Option<String>,
}

/// Record extraction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorConfig {
    pub min_name_length: usize,
    pub link_marker: String,
    pub link_selector: String,
    #[serde(default)]
    pub emit_sentinel_when_linked: bool,
    pub strategies: Vec<StrategyConfig>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

/// CSV repair configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RepairConfig {
    #[serde(default = "default_name_column")]
    pub name_column: usize,
    #[serde(default = "default_link_column")]
    pub link_column: usize,
    #[serde(default = "default_min_columns")]
    pub min_columns: usize,
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
}

fn default_name_column() -> usize {
    1
}

fn default_link_column() -> usize {
    5
}

fn default_min_columns() -> usize {
    6
}

fn default_preview_rows() -> usize {
    5
}

fn default_output_prefix() -> String {
    "leads_corrigidos_manual".to_string()
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            name_column: default_name_column(),
            link_column: default_link_column(),
            min_columns: default_min_columns(),
            preview_rows: default_preview_rows(),
            output_prefix: default_output_prefix(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.browser.navigation_timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "browser.navigation_timeout_secs".to_string(),
            });
        }

        // Search surface
        if url::Url::parse(&self.search.base_url).is_err() {
            return Err(ConfigError::InvalidUrl {
                field: "search.base_url".to_string(),
                url: self.search.base_url.clone(),
            });
        }
        validate_selector("search.search_input_selector", &self.search.search_input_selector)?;
        validate_selector("search.result_container_selector", &self.search.result_container_selector)?;
        validate_selector("search.result_selector", &self.search.result_selector)?;
        validate_selector("search.scroll_container_selector", &self.search.scroll_container_selector)?;
        if self.search.results_timeout_ms == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "search.results_timeout_ms".to_string(),
            });
        }
        if self.search.input_timeout_ms == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "search.input_timeout_ms".to_string(),
            });
        }

        // Extraction strategies
        if self.extractor.strategies.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "extractor.strategies".to_string(),
            });
        }
        if self.extractor.link_marker.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "extractor.link_marker".to_string(),
            });
        }
        validate_selector("extractor.link_selector", &self.extractor.link_selector)?;
        for (i, strategy) in self.extractor.strategies.iter().enumerate() {
            if strategy.name.is_empty() {
                return Err(ConfigError::EmptyRequired {
                    field: format!("extractor.strategies[{}].name", i),
                });
            }
            validate_selector(&format!("extractor.strategies[{}].selector", i), &strategy.selector)?;
            if strategy.mapper == MapperKind::Attribute && strategy.attribute.is_none() {
                return Err(ConfigError::MissingAttribute {
                    name: strategy.name.clone(),
                });
            }
        }
        for (i, field) in self.extractor.fields.iter().enumerate() {
            if field.key.is_empty() {
                return Err(ConfigError::EmptyRequired {
                    field: format!("extractor.fields[{}].key", i),
                });
            }
            validate_selector(&format!("extractor.fields[{}].selector", i), &field.selector)?;
            if field.mapper == MapperKind::Attribute && field.attribute.is_none() {
                return Err(ConfigError::MissingAttribute {
                    name: field.key.clone(),
                });
            }
        }

        // Repair column layout
        let repair = &self.repair;
        if repair.name_column == repair.link_column {
            return Err(ConfigError::InvalidColumns(
                "repair.name_column and repair.link_column must differ".to_string(),
            ));
        }
        if repair.name_column >= repair.min_columns || repair.link_column >= repair.min_columns {
            return Err(ConfigError::InvalidColumns(format!(
                "repair.min_columns ({}) must exceed both name_column ({}) and link_column ({})",
                repair.min_columns, repair.name_column, repair.link_column
            )));
        }
        if repair.output_prefix.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "repair.output_prefix".to_string(),
            });
        }

        Ok(())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        let path = Path::new(CONFIG_PATH);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        atty::is(atty::Stream::Stdin)
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config() -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config()?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}

fn validate_selector(field: &str, selector: &str) -> Result<(), ConfigError> {
    scraper::Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        field: field.to_string(),
        selector: selector.to_string(),
        error: format!("{:?}", e),
    })?;
    Ok(())
}
