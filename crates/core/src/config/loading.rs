use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use locus_wire::Address;

use super::types::LocusConfig;
use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

impl LocusConfig {
    /// Parse config from a TOML string, then apply environment overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Result<Self, CoreError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn center_address(&self) -> Result<Address, CoreError> {
        parse_address("center.address", &self.center.address)
    }

    pub fn worker_address(&self) -> Result<Address, CoreError> {
        parse_address("worker.address", &self.worker.address)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.network.request_timeout_ms)
    }

    /// Worker slot count with `0` resolved to the machine's parallelism.
    pub fn resolved_ncores(&self) -> u32 {
        if self.worker.ncores > 0 {
            return self.worker.ncores;
        }
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(1)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `LOCUS_SECTION_KEY` overrides `section.key`.
    /// - `LOCUS_CENTER_ADDRESS` -> `center.address`
    /// - `LOCUS_WORKER_ADDRESS` -> `worker.address`
    /// - `LOCUS_WORKER_NCORES` -> `worker.ncores`
    /// - `LOCUS_NETWORK_REQUEST_TIMEOUT_MS` -> `network.request_timeout_ms`
    ///
    /// Numeric values that do not parse are ignored.
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(v) = env_opt("LOCUS_CENTER_ADDRESS") {
            self.center.address = v;
        }
        if let Some(v) = env_opt("LOCUS_WORKER_ADDRESS") {
            self.worker.address = v;
        }
        if let Some(n) = env_opt("LOCUS_WORKER_NCORES").and_then(|v| v.parse().ok()) {
            self.worker.ncores = n;
        }
        if let Some(ms) = env_opt("LOCUS_NETWORK_REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok())
        {
            self.network.request_timeout_ms = ms;
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

pub(super) fn parse_address(field: &str, value: &str) -> Result<Address, CoreError> {
    value
        .parse()
        .map_err(|e| CoreError::Config(format!("invalid {field} '{value}': {e}")))
}
