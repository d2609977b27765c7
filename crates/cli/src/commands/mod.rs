pub mod chat;
pub mod doctor;
pub mod gateway;
pub mod memory;
pub mod onboard;
pub mod seed;

use anemone_config::AppConfig;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}").into())
}
