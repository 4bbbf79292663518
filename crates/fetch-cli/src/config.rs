use anyhow::{Context, Result};
use fetch_core::{ClientConfig, Location};
use std::path::Path;

/// Settings given on the command line; each one wins over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub coordinator: Option<String>,
    pub max_concurrency: Option<usize>,
    pub derived_ticket: Option<String>,
    pub token: Option<String>,
}

impl Overrides {
    pub fn apply(&self, mut config: ClientConfig) -> ClientConfig {
        if let Some(coordinator) = &self.coordinator {
            config.coordinator = Location::new(coordinator.as_str());
        }
        if let Some(n) = self.max_concurrency {
            config.orchestrator = config.orchestrator.with_max_concurrent_fetches(n);
        }
        if let Some(ticket) = &self.derived_ticket {
            config.redirect = config.redirect.with_derived_ticket(ticket.as_str());
        }
        if let Some(token) = &self.token {
            config.connection = config.connection.with_bearer_token(token.as_str());
        }
        config
    }
}

pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<ClientConfig> {
    let config = match path {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => ClientConfig::default(),
    };
    Ok(overrides.apply(config))
}
