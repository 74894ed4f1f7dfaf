//! Shared domain types for penwatch.
//!
//! - [`reading`]: one cycle of temperature and pen presence.
//! - [`fields`]: mapping readings onto ThingSpeak channel fields.
//! - [`thingspeak`]: update/feed wire format.
//! - [`range`]: the safe storage temperature band.
//! - [`alert`]: alert evaluation and cooldown.
//! - [`config`]: environment variable access shared by the binaries.

pub mod alert;
pub mod config;
pub mod error;
pub mod fields;
pub mod range;
pub mod reading;
pub mod thingspeak;
pub mod types;

pub use error::CoreError;
