//! Shared test utilities for the resource-mirror workspace.
//!
//! A dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`resource`]: scripted resources, including mid-stream failures
//! - [`counting`]: an item kind that counts how often it is loaded
//! - [`server`]: a minimal HTTP server for remote items

pub mod counting;
pub mod resource;
pub mod server;

pub use counting::{COUNTED_KIND, LoadCounter, register_counted};
pub use resource::StaticResource;
pub use server::{FixtureServer, Route};
