//! `anemone memory`: inspect or clear the configured store.

use std::io::Write;

pub async fn stats() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let store = anemone_memory::build_from_config(&config.memory).await?;

    println!("Memory");
    println!("======");
    println!("  Backend:  {}", store.name());
    if let Some(path) = &config.memory.path {
        println!("  Path:     {}", path.display());
    } else {
        println!("  Path:     {} (default)", anemone_config::AppConfig::memory_dir().display());
    }
    println!("  Memories: {}", store.count().await?);

    Ok(())
}

pub async fn search(query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let store = anemone_memory::build_from_config(&config.memory).await?;

    let found = store.retrieve(query).await?;
    if found.is_empty() {
        println!("No memory matches \"{query}\".");
    } else {
        println!("{found}");
    }

    Ok(())
}

pub async fn clear(confirmed: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let store = anemone_memory::build_from_config(&config.memory).await?;
    let count = store.count().await?;

    if !confirmed {
        print!("Delete all {count} memories from the '{}' store? [y/N] ", store.name());
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Nothing deleted.");
            return Ok(());
        }
    }

    store.clear().await?;
    println!("Deleted {count} memories.");
    Ok(())
}
