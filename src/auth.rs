//! Credential domain types: secrets, lifecycle states, and token state.

pub mod secret;
pub mod state;

pub use secret::*;
pub use state::*;
