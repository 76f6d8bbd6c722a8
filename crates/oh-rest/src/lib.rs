//! REST access for rules
//!
//! [`RestClient`] wraps the server's item and thing resources. Rule code
//! reads items through the [`ItemCache`], which loads an item on first use
//! and follows item events on the internal bus afterwards.

mod cache;
mod client;
mod error;

pub use cache::{ItemCache, ItemSource};
pub use client::{RestClient, ThingInfo};
pub use error::{RestError, RestResult};
