//! Backend selection from config.
//!
//! Every `[providers.<name>]` table becomes an OpenAI-compatible backend.
//! The default backend is always registered, so a fresh install with no
//! provider tables talks to a local Ollama.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anemone_config::{AppConfig, ProviderConfig};
use anemone_core::provider::Provider;
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;

/// Base URLs of backends that need no `api_url`.
const KNOWN_BACKENDS: &[(&str, &str)] = &[
    ("ollama", "http://localhost:11434/v1"),
    ("openai", "https://api.openai.com/v1"),
    ("openrouter", "https://openrouter.ai/api/v1"),
    ("groq", "https://api.groq.com/openai/v1"),
    ("vllm", "http://localhost:8000/v1"),
    ("llamacpp", "http://localhost:8080/v1"),
    ("lmstudio", "http://localhost:1234/v1"),
];

const FALLBACK_URL: &str = "http://localhost:11434/v1";

fn known_url(name: &str) -> &'static str {
    KNOWN_BACKENDS
        .iter()
        .find(|(known, _)| *known == name)
        .map_or(FALLBACK_URL, |(_, url)| *url)
}

/// Named backends plus the one turns use by default.
pub struct ProviderRouter {
    backends: BTreeMap<String, Arc<dyn Provider>>,
    default_name: String,
}

impl ProviderRouter {
    pub fn new(default_name: impl Into<String>) -> Self {
        Self {
            backends: BTreeMap::new(),
            default_name: default_name.into(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.backends.insert(name.into(), provider);
    }

    /// The backend named by `default_provider`, if registered.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.get(&self.default_name)
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.backends.get(name).cloned()
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }
}

fn backend(name: &str, table: Option<&ProviderConfig>, config: &AppConfig, timeout: Duration) -> OpenAiCompatProvider {
    let api_key = table
        .and_then(|t| t.api_key.clone())
        .or_else(|| config.api_key.clone())
        .unwrap_or_default();
    let url = table
        .and_then(|t| t.api_url.clone())
        .unwrap_or_else(|| known_url(name).to_string());

    debug!(provider = %name, url = %url, "Registering backend");
    OpenAiCompatProvider::new(name, &url, &api_key).with_timeout(timeout)
}

/// Build every configured backend.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    // Outlives the per-fragment step timeout so the step reports the timeout.
    let timeout = Duration::from_secs(config.agent.request_timeout_secs.saturating_add(5));
    let mut router = ProviderRouter::new(config.default_provider.as_str());

    for (name, table) in &config.providers {
        router.register(name.as_str(), Arc::new(backend(name, Some(table), config, timeout)));
    }

    if router.default().is_none() {
        let name = config.default_provider.as_str();
        router.register(name, Arc::new(backend(name, None, config, timeout)));
    }

    router
}
