use std::path::PathBuf;

use mapleads::config::{AppConfig, DEFAULT_CONFIG};

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn load_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", relative))
}

/// The embedded default configuration, parsed and validated.
pub fn default_config() -> AppConfig {
    let config: AppConfig = toml::from_str(DEFAULT_CONFIG).expect("default config parses");
    config.validate().expect("default config validates");
    config
}
