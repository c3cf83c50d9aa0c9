//! Storage Layer
//!
//! JSON persistence of agent settings.

pub mod config;

pub use config::*;
