//! Configuration loading for the gateway.
//!
//! Two YAML files are read once at startup: `models.yaml` (model name →
//! backend endpoint) and `keys.yaml` (API key → principal). The resulting
//! [`GatewayConfig`] is immutable for the lifetime of the process; API keys
//! are stored as SHA-256 digests, never in plain text.

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Fully loaded gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Model name → backend entry. Keys are exact, case-sensitive.
    pub models: HashMap<String, ModelEntry>,

    /// SHA-256 digest of an API key → principal metadata.
    pub keys: HashMap<String, KeyConfig>,

    /// Server bind settings.
    pub server: ServerConfig,

    /// Idle timeout between streamed chunks, in seconds.
    pub stream_idle_timeout_secs: u64,
}

/// A single Ollama backend, addressed by host and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Public model name clients use. Filled from the YAML map key.
    #[serde(skip)]
    pub name: String,

    /// Host where the backend is running
    #[serde(default = "default_backend_host")]
    pub host: String,

    /// Port where the backend is listening
    pub port: u16,

    /// Model identifier the backend itself knows (e.g. "llama3:8b")
    pub model: String,

    /// Quantization level (e.g. "Q4_K_M"), informational only
    #[serde(default)]
    pub quant: Option<String>,

    /// Per-request timeout in seconds for buffered completions
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl ModelEntry {
    /// Base URL of the backend. Never exposed to clients.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Principal metadata attached to an API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Human-readable name for the key
    pub name: String,

    /// Usage quota. Parsed and logged but not enforced.
    #[serde(default = "default_quota")]
    pub quota: String,

    /// Whether this key is active
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_backend_host() -> String {
    "localhost".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_quota() -> String {
    "unlimited".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_stream_idle_timeout() -> u64 {
    120
}

#[derive(Deserialize)]
struct ModelsFile {
    #[serde(default)]
    models: HashMap<String, ModelEntry>,
}

#[derive(Deserialize)]
struct KeysFile {
    #[serde(default)]
    keys: HashMap<String, KeyConfig>,
}

/// Hex-encoded SHA-256 digest of an API key.
///
/// Keys are compared by digest so a lookup never branches on the raw key
/// bytes, avoiding timing side channels on the key content.
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

impl GatewayConfig {
    /// Load configuration from `models.yaml` and `keys.yaml` in `config_dir`.
    ///
    /// Environment variables override file values: `OLLAMAO_HOST`,
    /// `OLLAMAO_PORT`, `OLLAMAO_STREAM_IDLE_TIMEOUT_SECS`.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let models = load_models(&config_dir.join("models.yaml"))?;
        let keys = load_keys(&config_dir.join("keys.yaml"))?;

        let mut server = ServerConfig::default();
        if let Ok(host) = std::env::var("OLLAMAO_HOST") {
            server.host = host;
        }
        if let Ok(port_str) = std::env::var("OLLAMAO_PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                server.port = port;
            }
        }

        let stream_idle_timeout_secs = std::env::var("OLLAMAO_STREAM_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or_else(default_stream_idle_timeout);

        Ok(Self {
            models,
            keys,
            server,
            stream_idle_timeout_secs,
        })
    }
}

fn load_models(path: &Path) -> Result<HashMap<String, ModelEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read models config: {}", path.display()))?;
    let expanded = expand_env_vars(&content);

    let file: ModelsFile = serde_yaml::from_str(&expanded)
        .with_context(|| format!("Failed to parse models config: {}", path.display()))?;

    if file.models.is_empty() {
        bail!("No models configured in {}", path.display());
    }

    let mut models = HashMap::with_capacity(file.models.len());
    for (name, mut entry) in file.models {
        entry.name = name.clone();
        models.insert(name, entry);
    }
    Ok(models)
}

fn load_keys(path: &Path) -> Result<HashMap<String, KeyConfig>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read keys config: {}", path.display()))?;
    let expanded = expand_env_vars(&content);

    let file: KeysFile = serde_yaml::from_str(&expanded)
        .with_context(|| format!("Failed to parse keys config: {}", path.display()))?;

    if file.keys.is_empty() {
        bail!("No API keys configured in {}", path.display());
    }

    // Only the digest of each key survives loading.
    Ok(file
        .keys
        .into_iter()
        .map(|(key, config)| (hash_key(&key), config))
        .collect())
}

/// Expand environment variables in configuration content.
///
/// Supports patterns: ${VAR}, ${VAR:-default}, ${VAR:default}
fn expand_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::?-?([^}]*))?\}").unwrap();

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_config(dir: &Path, models: &str, keys: &str) {
        let mut f = fs::File::create(dir.join("models.yaml")).unwrap();
        f.write_all(models.as_bytes()).unwrap();
        let mut f = fs::File::create(dir.join("keys.yaml")).unwrap();
        f.write_all(keys.as_bytes()).unwrap();
    }

    const MODELS_YAML: &str = r#"
models:
  llama3:
    port: 11434
    model: llama3:8b
    quant: Q4_K_M
  mistral:
    host: 10.0.0.2
    port: 11435
    model: mistral:7b
    timeout: 60
"#;

    const KEYS_YAML: &str = r#"
keys:
  my-key:
    name: alice
  disabled-key:
    name: bob
    quota: unlimited
    enabled: false
"#;

    #[test]
    #[serial]
    fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), MODELS_YAML, KEYS_YAML);

        let config = GatewayConfig::load(dir.path()).unwrap();

        assert_eq!(config.models.len(), 2);
        let llama = &config.models["llama3"];
        assert_eq!(llama.name, "llama3");
        assert_eq!(llama.host, "localhost");
        assert_eq!(llama.port, 11434);
        assert_eq!(llama.model, "llama3:8b");
        assert_eq!(llama.quant.as_deref(), Some("Q4_K_M"));
        assert_eq!(llama.timeout, 30);
        assert_eq!(llama.base_url(), "http://localhost:11434");

        let mistral = &config.models["mistral"];
        assert_eq!(mistral.host, "10.0.0.2");
        assert_eq!(mistral.timeout, 60);

        // Keys are stored by digest, not in plain text.
        assert_eq!(config.keys.len(), 2);
        assert!(!config.keys.contains_key("my-key"));
        let alice = &config.keys[&hash_key("my-key")];
        assert_eq!(alice.name, "alice");
        assert_eq!(alice.quota, "unlimited");
        assert!(alice.enabled);
        assert!(!config.keys[&hash_key("disabled-key")].enabled);
    }

    #[test]
    #[serial]
    fn test_load_config_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GatewayConfig::load(dir.path()).is_err());
    }

    #[test]
    #[serial]
    fn test_load_config_empty_models() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "models: {}\n", KEYS_YAML);
        assert!(GatewayConfig::load(dir.path()).is_err());
    }

    #[test]
    #[serial]
    fn test_env_var_overrides() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), MODELS_YAML, KEYS_YAML);

        std::env::set_var("OLLAMAO_HOST", "127.0.0.1");
        std::env::set_var("OLLAMAO_PORT", "9000");

        let config = GatewayConfig::load(dir.path()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);

        std::env::remove_var("OLLAMAO_HOST");
        std::env::remove_var("OLLAMAO_PORT");
    }

    #[test]
    #[serial]
    fn test_expand_env_vars_in_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("TEST_BACKEND_HOST", "gpu-node-1");
        let models = r#"
models:
  llama3:
    host: ${TEST_BACKEND_HOST}
    port: 11434
    model: llama3:8b
"#;
        write_config(dir.path(), models, KEYS_YAML);

        let config = GatewayConfig::load(dir.path()).unwrap();
        assert_eq!(config.models["llama3"].host, "gpu-node-1");

        std::env::remove_var("TEST_BACKEND_HOST");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("MISSING_VAR");
        assert_eq!(
            expand_env_vars("host: ${MISSING_VAR:-fallback}"),
            "host: fallback"
        );
        assert_eq!(
            expand_env_vars("host: ${MISSING_VAR:fallback}"),
            "host: fallback"
        );
    }

    #[test]
    fn test_hash_key_stable_and_distinct() {
        assert_eq!(hash_key("my-key"), hash_key("my-key"));
        assert_ne!(hash_key("my-key"), hash_key("other-key"));
        // hex sha256 is 64 chars
        assert_eq!(hash_key("my-key").len(), 64);
    }

    #[test]
    fn test_server_defaults() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8000);
    }
}
