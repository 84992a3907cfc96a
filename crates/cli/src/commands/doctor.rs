//! `kotoba doctor` — Diagnose setup health.

use kotoba_config::AppConfig;

use super::runtime;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Kotoba Doctor — Setup Diagnostics");
    println!("=================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  [warn] No config file — run `kotoba onboard` (using defaults)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  [ ok ] Config valid");
            config
        }
        Err(e) => {
            println!("  [fail] Config invalid: {e}");
            println!("\n  1 fatal issue. Fix the config and re-run.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  [ ok ] API key configured");

        // Live reachability check against the configured endpoint
        match runtime::build_model(&config) {
            Ok(model) => match model.health_check().await {
                Ok(true) => println!("  [ ok ] Model endpoint reachable: {}", config.api_url),
                Ok(false) | Err(_) => {
                    println!("  [warn] Model endpoint unreachable: {}", config.api_url);
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  [fail] Model client: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  [warn] No API key — set KOTOBA_API_KEY or add api_key to config.toml");
        issues += 1;
    }

    match config.store.backend.as_str() {
        "in_memory" => println!("  [ ok ] Store: in_memory (sessions will not persist)"),
        _ => {
            let path = config.store_path();
            println!("  [ ok ] Store: sqlite at {}", path.display());
        }
    }

    if config.memory.enabled {
        match &config.memory.url {
            Some(url) => println!("  [ ok ] Memory service: {url}"),
            None => {
                println!("  [fail] memory.enabled is set but memory.url is missing");
                issues += 1;
            }
        }
    } else {
        println!("  [ ok ] Memory service disabled (replies won't be personalized)");
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
