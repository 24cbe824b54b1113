//! Payloads of the authentication channels.

use serde::{Deserialize, Serialize};

/// Client-to-server messages on the `auth-request` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum AuthRequest {
    /// Ask the server to mail a login code.
    EmailLogin {
        /// Address to send the code to.
        email: String,
    },
    /// Exchange a mailed code for a session token.
    EmailCodeValidation {
        /// Address the code was sent to.
        email: String,
        /// The code itself.
        code: String,
    },
    /// Re-announce an existing session on a fresh connection.
    TokenLogin {
        /// Previously issued session token.
        #[serde(rename = "sessionToken")]
        session_token: String,
    },
}

/// Server-to-client messages on the `auth-response` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum AuthResponse {
    /// The server asks the client to identify itself.
    ///
    /// Some servers deliver this twice per connection.
    Challenge,
    /// Result of [`AuthRequest::EmailLogin`].
    EmailLoginResponse {
        /// Whether the code was sent.
        success: bool,
    },
    /// Result of [`AuthRequest::EmailCodeValidation`].
    EmailCodeResponse {
        /// Whether the code was accepted.
        success: bool,
        /// Newly issued session token on success.
        #[serde(
            rename = "sessionToken",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        session_token: Option<String>,
    },
    /// Result of [`AuthRequest::TokenLogin`].
    TokenLoginResponse {
        /// Whether the token was accepted.
        success: bool,
    },
}
