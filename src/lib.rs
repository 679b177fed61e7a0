//! classmerge library crate.
//!
//! Composes a class from a base source file and an ordered list of override
//! fragments contributed by independent providers. The merged class carries
//! every provider's members plus a single synthesized constructor, and is
//! stored in a cache under a deterministic identifier so a class loader can
//! pick it up instead of the original.
//!
//! The `classmerge` binary drives this from `classmerge.toml`; everything is
//! exposed here so integration tests can run the engine directly.

pub mod cache;
pub mod compose;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod parser;
pub mod registry;
pub mod report;

pub use cache::{CacheIdentifier, CacheStore, FileCacheStore, MemoryCacheStore};
pub use compose::{ComposeSettings, Composer, MergedUnit};
pub use error::ComposeError;
pub use registry::{DirectoryResolver, ProviderResolver, Registry};
pub use report::{KeyOutcome, RebuildReport};
