use mesh_dns_domain::{CliOverrides, ProxyConfig};
use tracing_subscriber::EnvFilter;

pub fn load_config(path: Option<&str>, overrides: CliOverrides) -> anyhow::Result<ProxyConfig> {
    let mut config = match path {
        Some(path) => ProxyConfig::from_toml_str(&std::fs::read_to_string(path)?)?,
        None => ProxyConfig::default(),
    };
    config.apply_overrides(overrides);
    Ok(config)
}

pub fn init_logging(config: &ProxyConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
