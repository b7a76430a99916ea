#![forbid(unsafe_code)]

//! Keystroke delivery, control-mode plumbing, and lifecycle supervision for
//! agent processes hosted in tmux sessions.

pub mod config;
pub mod control;
pub mod errors;
pub mod input;
pub mod lifecycle;
pub mod models;
pub mod process;
pub mod tmux;

use std::future::Future;
use std::pin::Pin;

pub use config::{BatchConfig, SupervisorConfig};
pub use errors::{AppError, Result};

/// Boxed future returned by the crate's dyn-compatible async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
