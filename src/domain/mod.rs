//! Domain Module
//!
//! Pure data model: light state, commands, wire envelopes, and settings.

pub mod settings;
pub mod state;
