//! The locus center: registry of live workers, their core counts, and the
//! location of every stored key.

pub mod center;
pub mod client;
pub mod state;

pub use center::{Center, CenterHandle};
pub use client::CenterClient;
pub use state::CenterState;
