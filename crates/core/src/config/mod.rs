//! Cluster configuration (`locus.toml` plus `LOCUS_*` environment overrides).

mod loading;
mod types;
mod validation;


pub use loading::load_dotenv;
pub use types::{CenterSection, LocusConfig, NetworkSection, WorkerSection};
