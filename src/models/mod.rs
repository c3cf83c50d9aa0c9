//! Data Models
//!
//! The conversation aggregate, its step state machine, and agent settings.

pub mod settings;
pub mod step;
pub mod thread;

pub use settings::*;
pub use step::*;
pub use thread::*;
