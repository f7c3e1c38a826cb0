//! Configuration module for noteguard
//!
//! This module provides configuration management including:
//! - Platform path resolution
//! - User settings persistence (encryption, destination, retention, schedule)

pub mod paths;
pub mod settings;

pub use paths::NoteguardPaths;
pub use settings::Settings;
