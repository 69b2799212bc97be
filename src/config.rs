use std::path::Path;
use std::sync::OnceLock;

use anyhow::Context;
use serde::Deserialize;

static CONFIG: OnceLock<Config> = OnceLock::new();

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub knobs: KnobsConfig,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Name filter for the synthesizer's MIDI ports.
    pub port: Option<String>,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct KnobsConfig {
    /// Name filter for the knob controller's input port.
    pub port: Option<String>,
    pub first_cc: u8,
    pub count: u8,
    pub relative: bool,
}

impl Default for KnobsConfig {
    fn default() -> Self {
        KnobsConfig {
            port: None,
            first_cc: 20,
            count: 8,
            relative: true,
        }
    }
}

pub fn load(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
}

pub fn init(config: Config) {
    CONFIG.set(config).ok();
}

pub fn device_port() -> Option<&'static str> {
    CONFIG.get().and_then(|c| c.device.port.as_deref())
}

pub fn knobs() -> KnobsConfig {
    CONFIG.get().map(|c| c.knobs.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_sections_take_defaults() {
        let config: Config = toml::from_str("[device]\nport = \"Blofeld\"\n").unwrap();
        assert_eq!(config.device.port.as_deref(), Some("Blofeld"));
        assert_eq!(config.knobs.first_cc, 20);
        assert_eq!(config.knobs.count, 8);
        assert!(config.knobs.relative);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[knobs]\nport = \"BCR\"\nfirst_cc = 1\nrelative = false").unwrap();
        let config = load(file.path()).unwrap();
        assert_eq!(config.knobs.port.as_deref(), Some("BCR"));
        assert_eq!(config.knobs.first_cc, 1);
        assert_eq!(config.knobs.count, 8);
        assert!(!config.knobs.relative);
        assert!(config.device.port.is_none());
    }
}
