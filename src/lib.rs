//! RTMS relay gateway.
//!
//! Receives meeting lifecycle webhooks, dials out to the provider's
//! signaling and media WebSocket servers, records the media frames it
//! receives, and fans transcript events out to connected browsers.
//!
//! ```text
//!  POST /webhook ──► SessionManager ──► signaling task ──► media task
//!                                          │  keep-alive      │ frames
//!                                          ▼                  ▼
//!                                      ready ack ◄──── RecordingWriter
//!                                                           │
//!  GET /ws ◄──────── FanoutHub ◄── transcripts ─────────────┤
//!  GET /recordings ◄─────────────── artifacts ◄─────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod hub;
pub mod media;
pub mod protocol;
pub mod recorder;
pub mod session;
pub mod signaling;

pub use config::Config;
pub use hub::FanoutHub;
pub use session::SessionManager;
