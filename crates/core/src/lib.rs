//! Domain types shared by the orchestrator, the provider clients and the
//! asset store server.

pub mod asset;
pub mod config;
pub mod error;
pub mod hashing;
pub mod job;
pub mod types;
