//! # Connect Collab Client
//!
//! Runtime half of the collaboration client: the WebSocket session
//! transport, the session management HTTP API, configuration and metrics.
//! This library is used by both the `collab-cli` binary and integration tests.
//!
//! ```no_run
//! use collab_client::{ClientConfig, CollaborationClient};
//! use collab_core::{CollabEvent, ParticipantRole};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let client = CollaborationClient::new(ClientConfig::from_env()?);
//! client.add_event_listener("participant_joined", |event: &CollabEvent| {
//!     println!("{event:?}");
//! });
//! client.join_session("s1", "u1", "Alice", ParticipantRole::Editor);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod cli;
pub mod config;
pub mod metrics;
pub mod timer;
pub mod transport;

pub use api::{ApiError, SessionApi};
pub use cli::{CliArgs, Command};
pub use config::{ClientConfig, ConfigError};
pub use timer::{Timer, TokioTimer};
pub use transport::{CollaborationClient, TransportError};
