use anyhow::{Context, Result};

pub mod network;
pub mod settings;

pub use network::*;
pub use settings::*;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub network: NetworkConfig,
    pub settings: TrafficSettings,
}

impl SimulationConfig {
    pub fn load_from_files(network_path: &str, settings_path: &str) -> Result<Self> {
        let network_content = std::fs::read_to_string(network_path)
            .with_context(|| format!("reading {}", network_path))?;
        let settings_content = std::fs::read_to_string(settings_path)
            .with_context(|| format!("reading {}", settings_path))?;

        Self::from_toml_str(&network_content, &settings_content)
    }

    pub fn from_toml_str(network_toml: &str, settings_toml: &str) -> Result<Self> {
        let network: NetworkConfig = toml::from_str(network_toml)?;
        let settings: TrafficSettings = toml::from_str(settings_toml)?;

        // Validate configurations
        network.validate()?;
        settings.validate()?;

        Ok(SimulationConfig { network, settings })
    }
}

pub trait Validate {
    fn validate(&self) -> Result<()>;
}
