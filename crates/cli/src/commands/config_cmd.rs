//! `token-sidecar config` — configuration inspection commands.

use sidecar_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("  config parsed successfully");

            let mut warnings = Vec::new();
            if config.cors_allow_origin == "*" {
                warnings.push("CORS_ALLOW_ORIGIN is \"*\" — fine for dev, tighten for production");
            }
            if !config.breaker_enabled {
                warnings.push("BREAKER_ENABLED=false — the admin API has no circuit protection");
            }

            if warnings.is_empty() {
                println!("  all checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("  warning: {w}");
                }
            }

            println!();
            println!("  gateway admin:  {}", config.gateway_admin_url);
            println!("  bind address:   {}:{}", config.bind_host, config.bind_port);
            println!("  token ttl:      {} min", config.token_ttl_minutes);
            println!("  ha mode:        {}", config.ha_mode);
        }
        Err(e) => {
            println!("  config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("failed to load config: {e}"))?;
    println!("{config:#?}");
    Ok(())
}
