/// Configuration for the navigator.
///
/// Loaded from a JSON file, then overridden from `CODECOMPASS_*` environment
/// variables so connection credentials never live in source.
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "codecompass.json";

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> PathBuf {
    PathBuf::from(".codecompass/graph.db")
}

fn default_graph_url() -> String {
    "falkor://localhost:6379".to_string()
}

fn default_graph_name() -> String {
    "codecompass".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".codecompass/chunk_index.json")
}

fn default_module_prefix_chars() -> usize {
    2000
}

fn default_k1() -> f64 {
    1.5
}

fn default_b() -> f64 {
    0.75
}

fn default_edges_path() -> PathBuf {
    PathBuf::from(".codecompass/edges.json")
}

fn default_search_top_k() -> usize {
    8
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackendKind {
    #[default]
    Sqlite,
    #[serde(alias = "falkordb")]
    Falkor,
}

impl FromStr for GraphBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "falkor" | "falkordb" => Ok(Self::Falkor),
            other => anyhow::bail!("unknown graph backend '{other}' (sqlite or falkor)"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GraphConfig {
    #[serde(default)]
    pub backend: GraphBackendKind,

    /// SQLite backend file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// FalkorDB endpoint, `falkor://host:port`.
    #[serde(default = "default_graph_url")]
    pub url: String,

    #[serde(default = "default_graph_name")]
    pub graph_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,

    /// Characters of each file kept in its module chunk.
    #[serde(default = "default_module_prefix_chars")]
    pub module_prefix_chars: usize,

    #[serde(default = "default_k1")]
    pub k1: f64,

    #[serde(default = "default_b")]
    pub b: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default = "default_edges_path")]
    pub edges_path: PathBuf,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackendKind::default(),
            db_path: default_db_path(),
            url: default_graph_url(),
            graph_name: default_graph_name(),
            user: None,
            password: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            module_prefix_chars: default_module_prefix_chars(),
            k1: default_k1(),
            b: default_b(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            index: IndexConfig::default(),
            edges_path: default_edges_path(),
            search_top_k: default_search_top_k(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file, then apply environment overrides.
    ///
    /// If `config_path` is empty, defaults to [`DEFAULT_CONFIG_FILE`].
    /// A missing file yields defaults; invalid JSON is logged and also
    /// yields defaults.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_FILE
        } else {
            config_path
        };

        let mut cfg = if Path::new(path).exists() {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {path}"))?;
            match serde_json::from_str::<Config>(&data) {
                Ok(c) => {
                    info!("Loaded configuration from {path}");
                    c
                }
                Err(e) => {
                    warn!("Invalid JSON in {path}: {e}");
                    warn!("Using default configuration");
                    Self::default()
                }
            }
        } else {
            info!("{path} not found, using defaults");
            Self::default()
        };

        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Apply `CODECOMPASS_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CODECOMPASS_GRAPH_BACKEND") {
            self.graph.backend = v.parse().context("CODECOMPASS_GRAPH_BACKEND")?;
        }
        if let Some(v) = get("CODECOMPASS_GRAPH_DB") {
            self.graph.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("CODECOMPASS_GRAPH_URL") {
            self.graph.url = v;
        }
        if let Some(v) = get("CODECOMPASS_GRAPH_NAME") {
            self.graph.graph_name = v;
        }
        if let Some(v) = get("CODECOMPASS_GRAPH_USER") {
            self.graph.user = Some(v);
        }
        if let Some(v) = get("CODECOMPASS_GRAPH_PASSWORD") {
            self.graph.password = Some(v);
        }
        if let Some(v) = get("CODECOMPASS_INDEX_PATH") {
            self.index.path = PathBuf::from(v);
        }
        Ok(())
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(
            self.index.module_prefix_chars > 0,
            "index.module_prefix_chars must be positive"
        );
        anyhow::ensure!(self.index.k1 >= 0.0, "index.k1 must be non-negative");
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.index.b),
            "index.b must be between 0 and 1"
        );
        anyhow::ensure!(
            self.graph.connect_timeout_ms > 0,
            "graph.connect_timeout_ms must be positive"
        );
        if self.graph.backend == GraphBackendKind::Falkor {
            anyhow::ensure!(
                !self.graph.url.trim().is_empty(),
                "graph.url must be set for falkor"
            );
            anyhow::ensure!(
                !self.graph.graph_name.trim().is_empty(),
                "graph.graph_name must be set for falkor"
            );
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
