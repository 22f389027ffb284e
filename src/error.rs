//! Crate-wide error taxonomy.
//!
//! Every fallible operation in the hub ultimately produces a [`HubError`].
//! Handlers convert recoverable variants into `{"error": "..."}` response
//! payloads (see `dispatcher`); the websocket session layer closes the
//! connection on the rest (see `ws_session`).

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum HubError {
    /// A request was missing a required field or had one of the wrong shape.
    BadRequest(String),
    /// `cmd` did not match any registered command.
    UnknownCommand(String),
    /// The request body was not valid JSON.
    InvalidJson(String),
    /// A field expected to be a hex string wasn't.
    InvalidHex(String),
    /// A field was present but out of range / otherwise unusable.
    InvalidParameter(String),
    /// A job needs the signing dongle capability and none is attached.
    DongleRequired,
    /// The dongle is attached but a crypto operation on it failed.
    CryptoFailure(String),
    /// Catch-all for anything else that should still be reported, not panic.
    InternalError(String),
    /// A transport-level read did not complete before its deadline.
    ReadTimeout,
    /// The connection is being closed at the protocol level.
    ProtocolClose(CloseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    BadPayload,
    InternalError,
    GoingAway,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::BadPayload => "bad_payload",
            CloseReason::InternalError => "internal_error",
            CloseReason::GoingAway => "going_away",
        }
    }
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::BadRequest(m) => write!(f, "Bad request: {m}"),
            HubError::UnknownCommand(c) => write!(f, "Command '{c}' not implemented."),
            HubError::InvalidJson(m) => write!(f, "Invalid JSON: {m}"),
            HubError::InvalidHex(m) => write!(f, "Invalid hex: {m}"),
            HubError::InvalidParameter(m) => write!(f, "Invalid parameter: {m}"),
            HubError::DongleRequired => write!(f, "DongleRequired"),
            HubError::CryptoFailure(m) => write!(f, "Crypto failure: {m}"),
            HubError::InternalError(m) => write!(f, "Internal error: {m}"),
            HubError::ReadTimeout => write!(f, "Read timeout"),
            HubError::ProtocolClose(r) => write!(f, "Protocol close: {}", r.as_str()),
        }
    }
}

impl std::error::Error for HubError {}

impl From<std::io::Error> for HubError {
    fn from(e: std::io::Error) -> Self {
        HubError::InternalError(format!("IO error: {e}"))
    }
}

impl From<rosc::OscError> for HubError {
    fn from(e: rosc::OscError) -> Self {
        HubError::InvalidParameter(format!("OSC error: {e}"))
    }
}

impl From<serde_json::Error> for HubError {
    fn from(e: serde_json::Error) -> Self {
        HubError::InvalidJson(e.to_string())
    }
}

impl HubError {
    /// The structured `{"error": "..."}` payload a handler / dispatcher
    /// returns for a recoverable error.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_message_matches_spec_wording() {
        let e = HubError::UnknownCommand("fluffle".to_string());
        assert_eq!(e.to_string(), "Command 'fluffle' not implemented.");
    }

    #[test]
    fn to_json_wraps_display_in_error_field() {
        let e = HubError::BadRequest("missing id".to_string());
        assert_eq!(e.to_json(), serde_json::json!({"error": "Bad request: missing id"}));
    }
}
