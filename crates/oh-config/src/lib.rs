//! Client configuration for the openHAB rule engine
//!
//! Configuration is read from a YAML file and then overridden from the
//! environment:
//!
//! - `OPENHAB_URL` - Server base URL
//! - `OPENHAB_TOKEN` - API token sent as a bearer token
//! - `OPENHAB_USER` / `OPENHAB_PASSWORD` - Basic auth credentials
//!
//! String values may use the `!env_var VAR` tag to pull a single value from
//! the environment.
//!
//! # Example
//!
//! ```ignore
//! use oh_config::load_config;
//!
//! let config = load_config("/etc/openhab-rules/config.yaml")?;
//! println!("connecting to {}", config.url);
//! ```

mod config;
pub mod duration;
mod error;
mod loader;

pub use config::{BackoffConfig, ClientConfig};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str};
