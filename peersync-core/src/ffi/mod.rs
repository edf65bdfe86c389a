//! FFI bindings for native UI integration
//!
//! This module provides the interface exposed via uniffi to Swift/Kotlin.

mod bridge;
mod session;
mod types;

pub use session::*;
pub use types::*;
