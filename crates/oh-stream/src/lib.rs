//! Event stream ingestion
//!
//! Opens the server's `text/event-stream` endpoint, frames it into
//! `event:`/`data:` pairs, decodes each payload and publishes the typed
//! events onto the internal and user buses. The connection is retried
//! forever with exponential backoff and jitter; backoff resets once a
//! connection has stayed open for the configured stability period.
//!
//! ```text
//! server → LineBuffer → FrameParser → decode → EventBus (internal + user)
//! ```

mod backoff;
mod error;
mod frame;
mod ingester;

pub use backoff::{Backoff, ReconnectState};
pub use error::{StreamError, StreamResult};
pub use frame::{Frame, FrameParser, FrameState, LineBuffer, ALIVE_EVENT};
pub use ingester::StreamIngester;
