//! `anemone gateway`: serve the chat page and APIs.

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config()?;
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Anemone gateway");
    println!("  Chat page: http://{}:{}/", config.gateway.host, config.gateway.port);
    println!("  Backend:   {} ({})", config.default_provider, config.default_model);
    println!("  Memory:    {}", config.memory.backend);

    anemone_gateway::start(config).await
}
