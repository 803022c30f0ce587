//! coachgen: AI coaching content with status-tracked generation jobs.
//!
//! A mutation stores a Pending placeholder job and returns it at once. A
//! supervised background run assembles athlete context, renders a prompt
//! template, calls the configured provider, validates the response and
//! persists the outcome. Every run ends with exactly one completed or failed
//! notification on the in-process bus.

pub mod api;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod generation;
pub mod job;
pub mod logging;
pub mod model;
pub mod notify;
pub mod prompt;
pub mod provider;
pub mod schema;
pub mod store;
pub mod types;
