//! `anemone doctor`: check that everything a turn needs is reachable.

use anemone_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Anemone doctor");
    println!("==============\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  [warn] No config file, using defaults (run `anemone onboard`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  [ok]   Config valid");
            config
        }
        Err(e) => {
            println!("  [fail] Config invalid: {e}");
            println!("\n  1 issue found.");
            return Ok(());
        }
    };

    let providers = anemone_providers::build_from_config(&config);
    match providers.default() {
        Some(provider) => match provider.health_check().await {
            Ok(true) => {
                println!("  [ok]   Backend '{}' reachable", provider.name());
                match provider.list_models().await {
                    Ok(models) if models.iter().any(|m| m.starts_with(&config.default_model)) => {
                        println!("  [ok]   Model '{}' available", config.default_model);
                    }
                    Ok(models) if models.is_empty() => {
                        println!("  [warn] Backend did not list its models");
                    }
                    Ok(_) => {
                        println!("  [fail] Model '{}' not found on the backend", config.default_model);
                        issues += 1;
                    }
                    Err(e) => {
                        println!("  [warn] Could not list models: {e}");
                    }
                }
            }
            Ok(false) | Err(_) => {
                println!("  [fail] Backend '{}' not reachable. Is it running?", provider.name());
                issues += 1;
            }
        },
        None => {
            println!("  [fail] Provider '{}' is not configured", config.default_provider);
            issues += 1;
        }
    }

    match anemone_memory::build_from_config(&config.memory).await {
        Ok(store) => match store.count().await {
            Ok(count) => println!("  [ok]   Memory store '{}' holds {count} memories", store.name()),
            Err(e) => {
                println!("  [fail] Memory store '{}' unreadable: {e}", store.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  [fail] Memory store unavailable: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
