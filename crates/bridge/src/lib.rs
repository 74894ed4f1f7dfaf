//! Cloud-side half of penwatch: reads the fridge channel and raises alerts.

pub mod config;
pub mod delivery;
pub mod feed;
pub mod sync;
