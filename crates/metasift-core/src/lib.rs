pub mod config;
pub mod logging;

pub mod cache;
pub mod cancel;
pub mod checksum;
pub mod container;
pub mod error;
pub mod fetch;
pub mod metadata;
pub mod orchestrator;
pub mod range_registry;
pub mod resolver;
pub mod sniff;
pub mod stealth;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::ResolveError;
pub use metadata::{MetadataMap, MetadataValue};
pub use resolver::MetadataResolver;
pub use sniff::ContainerKind;
