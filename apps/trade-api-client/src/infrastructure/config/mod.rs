//! Configuration Module
//!
//! Configuration loading for the trade API client.

mod settings;

pub use settings::{
    CallbackPanicPolicy, ClientConfig, ConfigError, Credentials, DEFAULT_ENDPOINT, ShutdownPolicy,
    StreamSettings,
};
