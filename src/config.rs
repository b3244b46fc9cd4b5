//! Runtime configuration: environment-first with CLI overrides, matching
//! the teacher's env-first resolution style.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Args;

/// Resolved configuration for a single bus process.
///
/// The core only ever sees these values at construction time — it does
/// not read the environment itself (spec §6).
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub db_path: PathBuf,
    pub heartbeat_timeout_secs: u64,
    pub msg_wait_timeout_secs: u64,
    pub msg_wait_timeout_max_secs: u64,
    pub upload_dir: PathBuf,
    pub upload_max_total_bytes: Option<u64>,
    pub catalog_path: Option<PathBuf>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".parse().expect("valid default bind addr"),
            port: 39765,
            db_path: PathBuf::from("./agentbus.db"),
            heartbeat_timeout_secs: 30,
            msg_wait_timeout_secs: 300,
            msg_wait_timeout_max_secs: 600,
            upload_dir: PathBuf::from("./uploads"),
            upload_max_total_bytes: None,
            catalog_path: default_catalog_path(),
        }
    }
}

/// `~/.config/agentbus/catalog.toml` if a config directory exists on this
/// platform, otherwise no default (an explicit `--catalog-path` is then
/// required to load one).
fn default_catalog_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("agentbus").join("catalog.toml"))
}

/// CLI flags that override [`BusConfig`]'s environment-derived defaults.
///
/// Every field also reads its matching `AGENTBUS_*` environment variable
/// (via clap's `env` feature) before falling back to the programmatic
/// default, the way the teacher's config layer resolves env over
/// hardcoded values.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long, env = "AGENTBUS_BIND_ADDR")]
    pub bind_addr: Option<IpAddr>,

    #[arg(long, env = "AGENTBUS_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "AGENTBUS_DB_PATH")]
    pub db_path: Option<PathBuf>,

    #[arg(long, env = "AGENTBUS_HEARTBEAT_TIMEOUT_SECS")]
    pub heartbeat_timeout_secs: Option<u64>,

    #[arg(long, env = "AGENTBUS_MSG_WAIT_TIMEOUT_SECS")]
    pub msg_wait_timeout_secs: Option<u64>,

    #[arg(long, env = "AGENTBUS_MSG_WAIT_TIMEOUT_MAX_SECS")]
    pub msg_wait_timeout_max_secs: Option<u64>,

    #[arg(long, env = "AGENTBUS_UPLOAD_DIR")]
    pub upload_dir: Option<PathBuf>,

    #[arg(long, env = "AGENTBUS_UPLOAD_MAX_TOTAL_BYTES")]
    pub upload_max_total_bytes: Option<u64>,

    #[arg(long, env = "AGENTBUS_CATALOG_PATH")]
    pub catalog_path: Option<PathBuf>,
}

impl ConfigArgs {
    /// Merge CLI/env overrides onto [`BusConfig::default`].
    pub fn resolve(self) -> BusConfig {
        let defaults = BusConfig::default();
        BusConfig {
            bind_addr: self.bind_addr.unwrap_or(defaults.bind_addr),
            port: self.port.unwrap_or(defaults.port),
            db_path: self.db_path.unwrap_or(defaults.db_path),
            heartbeat_timeout_secs: self
                .heartbeat_timeout_secs
                .unwrap_or(defaults.heartbeat_timeout_secs),
            msg_wait_timeout_secs: self
                .msg_wait_timeout_secs
                .unwrap_or(defaults.msg_wait_timeout_secs),
            msg_wait_timeout_max_secs: self
                .msg_wait_timeout_max_secs
                .unwrap_or(defaults.msg_wait_timeout_max_secs),
            upload_dir: self.upload_dir.unwrap_or(defaults.upload_dir),
            upload_max_total_bytes: self
                .upload_max_total_bytes
                .or(defaults.upload_max_total_bytes),
            catalog_path: self.catalog_path.or(defaults.catalog_path),
        }
    }
}
