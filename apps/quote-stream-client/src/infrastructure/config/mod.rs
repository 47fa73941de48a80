//! Configuration Module
//!
//! Configuration loading for the quote client.

mod settings;

pub use settings::{
    AuthToken, ClientConfig, ConfigError, DEFAULT_ORIGIN, DEFAULT_URL, DEFAULT_USER_AGENT,
    EndpointSettings,
};
