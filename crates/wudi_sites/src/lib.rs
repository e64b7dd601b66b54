pub mod adapter;
pub mod adapters;
pub mod phrases;
pub mod registry;

pub use adapter::{AdapterState, Classification, SiteAdapter, SiteOutcome};
pub use registry::adapter_for;
