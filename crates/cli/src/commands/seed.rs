//! `anemone seed`: load the demo memories.

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let store = anemone_memory::build_from_config(&config.memory).await?;

    let added = anemone_memory::seed(store.as_ref()).await?;
    let total = store.count().await?;
    println!("Seeded {added} memories into the '{}' store ({total} total).", store.name());

    Ok(())
}
