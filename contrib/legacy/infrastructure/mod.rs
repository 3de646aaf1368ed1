// Infrastructure layer
// Shared services: config, persistence, observability

pub mod config;
pub mod persistence;
pub mod observability;
