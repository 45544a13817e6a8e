//! Live push stream from the server
//!
//! The streaming API delivers timeline mutations over a persistent
//! websocket as tagged text frames. [`StreamingTransport`] owns one such
//! connection, decodes each frame into a [`StreamEvent`], and republishes it
//! through multi-fire signals so any number of feed providers can share the
//! connection. [`StreamingController`] derives the authoritative streaming
//! domain for an account session and hands out one cached, connected
//! transport per logical timeline.

pub mod controller;
pub mod event;
pub mod transport;

pub use controller::StreamingController;
pub use event::{FrameError, StreamEvent};
pub use transport::{
    ConnectionState, ReconnectPolicy, StreamingConfig, StreamingError, StreamingTransport,
    Timeline,
};
