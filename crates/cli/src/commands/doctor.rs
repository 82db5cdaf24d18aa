//! `token-sidecar doctor` — diagnose configuration and upstream reachability.

use sidecar_config::AppConfig;
use sidecar_gatewayclient::GatewayAdminClient;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Consumer Token Sidecar Doctor");
    println!("=============================\n");

    let mut issues = 0;

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  config loaded");
            config
        }
        Err(e) => {
            println!("  config error: {e}");
            println!("\n  1 issue(s) found. See above for details.");
            return Err(e.into());
        }
    };

    if config.ha_mode && config.shared_kv_url.is_none() {
        println!("  HA_MODE=true but SHARED_KV_URL is unset");
        issues += 1;
    } else {
        println!("  HA configuration consistent");
    }

    let client = GatewayAdminClient::new(config.gateway_admin_url.clone(), config.gateway_admin_token.clone());
    let status = client.health_check().await;
    if status.healthy {
        println!("  gateway admin API reachable ({} ms)", status.response_time_ms);
    } else {
        println!(
            "  gateway admin API unreachable: {}",
            status.error.as_deref().unwrap_or("unknown error")
        );
        issues += 1;
    }

    println!();
    if issues == 0 {
        println!("  all checks passed");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
