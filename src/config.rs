use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::request::url_host;

pub const KEY_TUNNEL_HOST: &str = "tunnel_host";
pub const KEY_TUNNEL_PORT: &str = "tunnel_port";
pub const KEY_DEBUG_MODE: &str = "debug_mode";
pub const KEY_ROUTE_ALL: &str = "route_all";
pub const KEY_WHITELIST_DOMAINS: &str = "whitelist_domains";
pub const KEY_CA_BUNDLE: &str = "ca_bundle";

pub const DEFAULT_TUNNEL_HOST: &str = "127.0.0.1";
pub const DEFAULT_TUNNEL_PORT: u16 = 8080;
pub const DEFAULT_CA_BUNDLE: &str = "/etc/ssl/cert.pem";

/// Key/value settings backend owned by the host environment
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, ConfigError>;
    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError>;
    fn remove(&self, key: &str) -> Result<(), ConfigError>;
}

/// Immutable snapshot of the tunnel settings.
///
/// A snapshot is loaded from a [`ConfigStore`] at the start of every routing
/// decision or health check and is never mutated afterwards. Saving settings
/// writes a new snapshot to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub tunnel_host: String,
    pub tunnel_port: u16,
    pub debug_mode: bool,
    pub route_all: bool,
    pub whitelist_domains: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            tunnel_host: DEFAULT_TUNNEL_HOST.to_string(),
            tunnel_port: DEFAULT_TUNNEL_PORT,
            debug_mode: false,
            route_all: false,
            whitelist_domains: Vec::new(),
        }
    }
}

impl ProxyConfig {
    /// Load a sanitized snapshot. Missing or invalid values fall back to defaults.
    pub fn load(store: &dyn ConfigStore) -> Result<Self, ConfigError> {
        Ok(Self {
            tunnel_host: sanitize_host(store.get(KEY_TUNNEL_HOST)?.as_ref()),
            tunnel_port: sanitize_port(store.get(KEY_TUNNEL_PORT)?.as_ref()),
            debug_mode: sanitize_flag(store.get(KEY_DEBUG_MODE)?.as_ref()),
            route_all: sanitize_flag(store.get(KEY_ROUTE_ALL)?.as_ref()),
            whitelist_domains: parse_whitelist(store.get(KEY_WHITELIST_DOMAINS)?.as_ref()),
        })
    }

    /// Persist this snapshot, replacing whatever the store held before.
    pub fn save(&self, store: &dyn ConfigStore) -> Result<(), ConfigError> {
        store.set(KEY_TUNNEL_HOST, Value::from(self.tunnel_host.clone()))?;
        store.set(KEY_TUNNEL_PORT, Value::from(self.tunnel_port))?;
        store.set(KEY_DEBUG_MODE, Value::from(self.debug_mode))?;
        store.set(KEY_ROUTE_ALL, Value::from(self.route_all))?;
        store.set(
            KEY_WHITELIST_DOMAINS,
            Value::from(self.whitelist_domains.join("\n")),
        )?;
        Ok(())
    }

    /// `socks5h://host:port`, the proxy URL clients should dial.
    pub fn proxy_url(&self) -> String {
        format!("socks5h://{}:{}", url_host(&self.tunnel_host), self.tunnel_port)
    }
}

/// Write default values for every key the store does not hold yet.
pub fn seed_defaults(store: &dyn ConfigStore) -> Result<(), ConfigError> {
    let defaults = ProxyConfig::default();
    let entries = [
        (KEY_TUNNEL_HOST, Value::from(defaults.tunnel_host)),
        (KEY_TUNNEL_PORT, Value::from(defaults.tunnel_port)),
        (KEY_DEBUG_MODE, Value::from(defaults.debug_mode)),
        (KEY_ROUTE_ALL, Value::from(defaults.route_all)),
        (KEY_WHITELIST_DOMAINS, Value::from(String::new())),
    ];
    for (key, value) in entries {
        if store.get(key)?.is_none() {
            store.set(key, value)?;
        }
    }
    Ok(())
}

/// Trust bundle path configured for routed requests.
pub fn load_ca_bundle(store: &dyn ConfigStore) -> Result<PathBuf, ConfigError> {
    let path = match store.get(KEY_CA_BUNDLE)? {
        Some(Value::String(s)) if !s.trim().is_empty() => PathBuf::from(s.trim()),
        _ => PathBuf::from(DEFAULT_CA_BUNDLE),
    };
    Ok(path)
}

fn sanitize_host(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => DEFAULT_TUNNEL_HOST.to_string(),
    }
}

// Absolute value of the integer, as the settings form always stored it.
fn sanitize_port(value: Option<&Value>) -> u16 {
    let raw = match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    raw.map(i64::unsigned_abs)
        .and_then(|port| u16::try_from(port).ok())
        .filter(|port| *port > 0)
        .unwrap_or(DEFAULT_TUNNEL_PORT)
}

fn sanitize_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "on" | "yes"
        ),
        _ => false,
    }
}

fn parse_whitelist(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split('\n')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// In-memory store, used by embedders that keep settings elsewhere and by tests
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: RwLock<BTreeMap<String, Value>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        let values = self.values.read().map_err(|_| ConfigError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let mut values = self.values.write().map_err(|_| ConfigError::Poisoned)?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ConfigError> {
        let mut values = self.values.write().map_err(|_| ConfigError::Poisoned)?;
        values.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk, rewritten on every change
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: RwLock<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Map::new(),
            Ok(text) => serde_json::from_str::<Map<String, Value>>(&text).map_err(|source| {
                ConfigError::Malformed {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, text).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl ConfigStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        let values = self.values.read().map_err(|_| ConfigError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let mut values = self.values.write().map_err(|_| ConfigError::Poisoned)?;
        values.insert(key.to_string(), value);
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> Result<(), ConfigError> {
        let mut values = self.values.write().map_err(|_| ConfigError::Poisoned)?;
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}
