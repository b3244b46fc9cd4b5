//! Available-agent catalog: static, operator-configured invocation records.

use serde::{Deserialize, Serialize};

/// A declarative record describing how to spawn a named CLI agent.
///
/// Loaded once at startup from a TOML file (see [`CatalogFile`]); not
/// mutable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Templated command string. The only documented placeholder is
    /// `{thread_id}`; any other `{...}` token is rejected at invocation
    /// time.
    pub invoke_command: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_enabled() -> bool {
    true
}

/// On-disk shape of the catalog TOML file: `[[agent]]` tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFile {
    #[serde(default, rename = "agent")]
    pub agents: Vec<CatalogEntry>,
}
