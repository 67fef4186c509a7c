//! Shared domain types for the trapcam agent.

pub mod action;
pub mod config;
pub mod events;
pub mod http;
pub mod image;
pub mod link;
pub mod telemetry;

mod errors;

pub use errors::{Result, TrapcamError};
