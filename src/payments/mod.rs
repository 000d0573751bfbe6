//! VTU provider integration: normalized requests, vendor backends and the
//! settings-driven client that selects the active backend per call.

pub mod client;
pub mod error;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;

pub use client::ProviderClient;
pub use error::{ProviderError, ProviderResult};
pub use provider::VtuProvider;
