//! Request handlers.

pub mod health;
pub mod invoke;

pub use health::*;
pub use invoke::{invoke, Envelope};
