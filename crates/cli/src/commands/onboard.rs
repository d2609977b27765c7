//! `anemone onboard`: first-time setup.

use anemone_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");
    let memory_dir = AppConfig::memory_dir();

    println!("Anemone: first-time setup");
    println!("=========================\n");

    if config_dir.exists() {
        println!("  Config directory exists: {}", config_dir.display());
    } else {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    }

    if !memory_dir.exists() {
        std::fs::create_dir_all(&memory_dir)?;
        println!("  Created memory directory: {}", memory_dir.display());
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and run onboard again.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created config.toml at: {}", config_path.display());
        println!("\n  Next steps:");
        println!("    1. Start Ollama and pull a model: ollama pull phi4-mini");
        println!("    2. Optionally load the demo memories: anemone seed");
        println!("    3. Run: anemone chat\n");
    }

    Ok(())
}
