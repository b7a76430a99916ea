//! Domain model module declarations.

pub mod instance;
pub mod key_event;
