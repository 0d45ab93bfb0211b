//! Telephony provider integration
//!
//! Wire types for the bidirectional media stream WebSocket, TwiML response
//! builders, the per-account REST client used for hangups and transfers,
//! and webhook signature validation.

pub mod rest;
pub mod signature;
pub mod stream;
pub mod twiml;

pub use rest::TwilioClient;
pub use stream::{outbound, StreamEvent};

use thiserror::Error;

/// Telephony errors
#[derive(Error, Debug)]
pub enum TelephonyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },
}
