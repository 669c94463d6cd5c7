//! Feed discovery: which URLs to try this run.
//!
//! The [`FeedDiscoveryAgent`] combines three strategies over the store
//! snapshot: re-checking known sources, expanding publisher URL patterns over
//! language editions, and the externally supplied hint seeds
//! ([`SeedSource`]). URL construction and filtering are pure; fetching is
//! left to the validator.

mod agent;
mod seeds;

pub use agent::FeedDiscoveryAgent;
pub use seeds::{ChainedSeeds, SeedFile, SeedSource, StaticSeeds, parse_seed_list};
