//! Bridge configuration
//!
//! Loaded from environment variables (`EDITOR_BRIDGE_*`) or a TOML document.
//! Missing or unparsable values fall back to the defaults.

use crate::observability::LogFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which key-value store backs the project record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KvBackend {
    #[default]
    Memory,
    LocalFs,
}

impl KvBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Some(KvBackend::Memory),
            "localfs" | "fs" | "disk" => Some(KvBackend::LocalFs),
            _ => None,
        }
    }
}

/// Location of one logical database / object store pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvStoreConfig {
    pub backend: KvBackend,
    /// Root directory for the local filesystem backend
    pub data_dir: PathBuf,
    pub database: String,
    pub object_store: String,
    /// Key the whole project record is stored under
    pub document_id: String,
}

impl Default for KvStoreConfig {
    fn default() -> Self {
        Self::projects()
    }
}

impl KvStoreConfig {
    /// Project records
    pub fn projects() -> Self {
        KvStoreConfig {
            backend: KvBackend::Memory,
            data_dir: PathBuf::from("./data"),
            database: "web-editor".to_string(),
            object_store: "web-projects".to_string(),
            document_id: "project".to_string(),
        }
    }

    /// Unpublished drafts, kept apart from project records
    pub fn drafts() -> Self {
        KvStoreConfig {
            database: "web-editor-drafts".to_string(),
            object_store: "drafts".to_string(),
            ..Self::projects()
        }
    }

    /// On-disk store rooted at `data_dir`
    pub fn local_fs(data_dir: impl Into<PathBuf>) -> Self {
        KvStoreConfig {
            backend: KvBackend::LocalFs,
            data_dir: data_dir.into(),
            ..Self::projects()
        }
    }
}

/// Autosave policy written into the engine configuration and used by the
/// debounced writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    pub enabled: bool,
    /// Quiet period after the last mutation before a store fires
    #[serde(with = "duration_millis")]
    pub delay: Duration,
    /// Upper bound on how long a sustained burst may defer the store.
    /// `None` means the store waits for the burst to end.
    #[serde(with = "option_duration_millis")]
    pub max_wait: Option<Duration>,
    /// Load the stored project when the engine initializes
    pub autoload: bool,
    pub steps_before_save: u32,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        AutosaveConfig {
            enabled: true,
            delay: Duration::from_millis(500),
            max_wait: None,
            autoload: true,
            steps_before_save: 1,
        }
    }
}

impl AutosaveConfig {
    pub fn test() -> Self {
        AutosaveConfig {
            delay: Duration::from_millis(50),
            ..Default::default()
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub storage: KvStoreConfig,
    pub drafts: DraftsConfig,
    pub autosave: AutosaveConfig,
    pub log_format: LogFormat,
    /// Endpoint computing the utility stylesheet for the classes in use
    pub stylesheet_endpoint: Option<String>,
}

/// Drafts share the project backend and directory; only the names differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftsConfig {
    pub database: String,
    pub object_store: String,
}

impl Default for DraftsConfig {
    fn default() -> Self {
        let drafts = KvStoreConfig::drafts();
        DraftsConfig {
            database: drafts.database,
            object_store: drafts.object_store,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup` (environment-style names)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = BridgeConfig::default();
        let flag = |name: &str, default: bool| {
            lookup(name)
                .map(|v| v == "true" || v == "1")
                .unwrap_or(default)
        };
        let millis = |name: &str| {
            lookup(name)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
        };

        BridgeConfig {
            storage: KvStoreConfig {
                backend: lookup("EDITOR_BRIDGE_STORE")
                    .and_then(|v| KvBackend::parse(&v))
                    .unwrap_or(defaults.storage.backend),
                data_dir: lookup("EDITOR_BRIDGE_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.data_dir),
                database: lookup("EDITOR_BRIDGE_DB_NAME").unwrap_or(defaults.storage.database),
                object_store: lookup("EDITOR_BRIDGE_STORE_NAME")
                    .unwrap_or(defaults.storage.object_store),
                document_id: lookup("EDITOR_BRIDGE_DOCUMENT_ID")
                    .unwrap_or(defaults.storage.document_id),
            },
            drafts: defaults.drafts,
            autosave: AutosaveConfig {
                enabled: flag("EDITOR_BRIDGE_AUTOSAVE", defaults.autosave.enabled),
                delay: millis("EDITOR_BRIDGE_AUTOSAVE_DELAY_MS").unwrap_or(defaults.autosave.delay),
                max_wait: millis("EDITOR_BRIDGE_AUTOSAVE_MAX_WAIT_MS"),
                autoload: flag("EDITOR_BRIDGE_AUTOLOAD", defaults.autosave.autoload),
                steps_before_save: lookup("EDITOR_BRIDGE_STEPS_BEFORE_SAVE")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.autosave.steps_before_save),
            },
            log_format: lookup("EDITOR_BRIDGE_LOG_FORMAT")
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            stylesheet_endpoint: lookup("EDITOR_BRIDGE_STYLESHEET_URL"),
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Store settings for drafts, on the project backend
    pub fn drafts_store(&self) -> KvStoreConfig {
        KvStoreConfig {
            database: self.drafts.database.clone(),
            object_store: self.drafts.object_store.clone(),
            ..self.storage.clone()
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
