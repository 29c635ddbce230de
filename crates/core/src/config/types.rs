use serde::{Deserialize, Serialize};

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration for a locus deployment.
///
/// Every section is optional in the file; binaries pick the sections
/// they need.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocusConfig {
    #[serde(default)]
    pub center: CenterSection,

    #[serde(default)]
    pub worker: WorkerSection,

    #[serde(default)]
    pub network: NetworkSection,
}

// ── Section configs ─────────────────────────────────────────────────

/// Where the center listens, and where workers and pools find it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CenterSection {
    #[serde(default = "default_center_address")]
    pub address: String,
}

fn default_center_address() -> String {
    "127.0.0.1:8787".into()
}

impl Default for CenterSection {
    fn default() -> Self {
        Self {
            address: default_center_address(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSection {
    #[serde(default = "default_worker_address")]
    pub address: String,

    /// Concurrent task slots. `0` means one per available CPU.
    #[serde(default)]
    pub ncores: u32,
}

fn default_worker_address() -> String {
    "127.0.0.1:8788".into()
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            address: default_worker_address(),
            ncores: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSection {
    /// How long a request waits for its reply before the peer is treated
    /// as unreachable.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}
