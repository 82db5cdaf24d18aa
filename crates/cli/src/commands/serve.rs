//! `token-sidecar serve` — start the HTTP gateway.

use sidecar_config::AppConfig;

pub async fn run(port_override: Option<u16>, host_override: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.bind_port = port;
    }
    if let Some(host) = host_override {
        config.bind_host = host;
    }

    println!("Consumer Token Sidecar");
    println!("  Listening:    {}:{}", config.bind_host, config.bind_port);
    println!("  Gateway:      {}", config.gateway_admin_url);
    println!("  Breaker:      {}", if config.breaker_enabled { "enabled" } else { "disabled" });
    println!("  HA mode:      {}", config.ha_mode);

    sidecar_gateway::start(config).await?;

    Ok(())
}
