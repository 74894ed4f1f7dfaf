//! Network uplinks that publish a [`Reading`] to the ThingSpeak channel.
//!
//! Two transports exist:
//!
//! - [`http::HttpUplink`]: the host has IP connectivity and calls the
//!   `update` endpoint directly.
//! - [`modem::ModemUplink`]: a serial modem is driven with AT commands to
//!   open a TCP socket and send a literal HTTP GET.
//!
//! Both produce a [`WriteOutcome`] carrying the HTTP status and the entry id
//! ThingSpeak assigned. Neither retries: the next reporting cycle is the
//! retry.

pub mod http;
pub mod modem;

use async_trait::async_trait;
use penwatch_core::reading::Reading;
use penwatch_core::thingspeak::WriteOutcome;

pub use http::HttpUplink;
pub use modem::{AtModem, ModemError, ModemUplink};

/// Error type for a failed publish attempt.
#[derive(Debug, thiserror::Error)]
pub enum UplinkError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The modem exchange failed.
    #[error("Modem exchange failed: {0}")]
    Modem(#[from] ModemError),

    /// The blocking modem task panicked or was cancelled.
    #[error("Modem task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A transport able to write one reading to the channel.
#[async_trait]
pub trait Uplink: Send {
    /// Short transport name for logs.
    fn name(&self) -> &'static str;

    /// Write `reading` to the channel and report what the server answered.
    async fn publish(&mut self, reading: &Reading) -> Result<WriteOutcome, UplinkError>;
}
