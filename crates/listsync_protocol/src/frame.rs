//! JSON frames multiplexing the logical channels over one connection.
//!
//! Every websocket text frame is one of:
//!
//! ```text
//! {"type":"message","channel":"app-event","body":{"action":"item.add",...},"ackId":3}
//! {"type":"ack","ackId":3}
//! ```
//!
//! Clients attach an `ackId` when they want a receipt; the server answers
//! with an `ack` frame carrying the same id.

use crate::auth::{AuthRequest, AuthResponse};
use crate::error::{ProtocolError, ProtocolResult};
use crate::event::AppEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A logical channel carried inside `message` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Domain events, both directions.
    AppEvent,
    /// Client authentication requests.
    AuthRequest,
    /// Server authentication responses.
    AuthResponse,
}

impl Channel {
    /// Returns the wire name of the channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::AppEvent => "app-event",
            Channel::AuthRequest => "auth-request",
            Channel::AuthResponse => "auth-response",
        }
    }

    /// Parses a wire channel name.
    pub fn parse(name: &str) -> ProtocolResult<Self> {
        match name {
            "app-event" => Ok(Channel::AppEvent),
            "auth-request" => Ok(Channel::AuthRequest),
            "auth-response" => Ok(Channel::AuthResponse),
            other => Err(ProtocolError::UnknownChannel(other.to_string())),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A domain event.
    App(AppEvent),
    /// An authentication request.
    Auth(AuthRequest),
}

impl Outbound {
    /// Returns the channel this message travels on.
    pub fn channel(&self) -> Channel {
        match self {
            Outbound::App(_) => Channel::AppEvent,
            Outbound::Auth(_) => Channel::AuthRequest,
        }
    }
}

/// A message the client receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A domain event.
    App(AppEvent),
    /// An authentication response.
    Auth(AuthResponse),
}

impl Inbound {
    /// Returns the channel this message travels on.
    pub fn channel(&self) -> Channel {
        match self {
            Inbound::App(_) => Channel::AppEvent,
            Inbound::Auth(_) => Channel::AuthResponse,
        }
    }
}

/// Untyped frame as it appears on the wire.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawFrame {
    Message {
        channel: String,
        body: serde_json::Value,
        #[serde(rename = "ackId", default, skip_serializing_if = "Option::is_none")]
        ack_id: Option<u64>,
    },
    Ack {
        #[serde(rename = "ackId")]
        ack_id: u64,
    },
}

/// A frame sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFrame {
    /// The payload.
    pub message: Outbound,
    /// Receipt id requested from the server, if any.
    pub ack_id: Option<u64>,
}

impl ClientFrame {
    /// Creates a frame without an ack request.
    pub fn new(message: Outbound) -> Self {
        Self {
            message,
            ack_id: None,
        }
    }

    /// Creates a frame asking the server to acknowledge `ack_id`.
    pub fn with_ack(message: Outbound, ack_id: u64) -> Self {
        Self {
            message,
            ack_id: Some(ack_id),
        }
    }

    /// Encodes to a JSON text frame.
    pub fn encode(&self) -> ProtocolResult<String> {
        let body = match &self.message {
            Outbound::App(event) => serde_json::to_value(event)?,
            Outbound::Auth(request) => serde_json::to_value(request)?,
        };
        let raw = RawFrame::Message {
            channel: self.message.channel().as_str().to_string(),
            body,
            ack_id: self.ack_id,
        };
        Ok(serde_json::to_string(&raw)?)
    }

    /// Decodes a JSON text frame. Used by servers and test peers.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        match serde_json::from_str::<RawFrame>(text)? {
            RawFrame::Message {
                channel,
                body,
                ack_id,
            } => {
                let message = match Channel::parse(&channel)? {
                    Channel::AppEvent => Outbound::App(serde_json::from_value(body)?),
                    Channel::AuthRequest => Outbound::Auth(serde_json::from_value(body)?),
                    Channel::AuthResponse => {
                        return Err(ProtocolError::WrongDirection {
                            channel,
                            direction: "client",
                        })
                    }
                };
                Ok(Self { message, ack_id })
            }
            RawFrame::Ack { .. } => Err(ProtocolError::WrongDirection {
                channel: "ack".into(),
                direction: "client",
            }),
        }
    }
}

/// A frame sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// A pushed message.
    Message(Inbound),
    /// Receipt for a client frame that carried `ack_id`.
    Ack(u64),
}

impl ServerFrame {
    /// Encodes to a JSON text frame. Used by servers and test peers.
    pub fn encode(&self) -> ProtocolResult<String> {
        let raw = match self {
            ServerFrame::Message(inbound) => RawFrame::Message {
                channel: inbound.channel().as_str().to_string(),
                body: match inbound {
                    Inbound::App(event) => serde_json::to_value(event)?,
                    Inbound::Auth(response) => serde_json::to_value(response)?,
                },
                ack_id: None,
            },
            ServerFrame::Ack(ack_id) => RawFrame::Ack { ack_id: *ack_id },
        };
        Ok(serde_json::to_string(&raw)?)
    }

    /// Decodes a JSON text frame.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        match serde_json::from_str::<RawFrame>(text)? {
            RawFrame::Message { channel, body, .. } => {
                let inbound = match Channel::parse(&channel)? {
                    Channel::AppEvent => Inbound::App(serde_json::from_value(body)?),
                    Channel::AuthResponse => Inbound::Auth(serde_json::from_value(body)?),
                    Channel::AuthRequest => {
                        return Err(ProtocolError::WrongDirection {
                            channel,
                            direction: "server",
                        })
                    }
                };
                Ok(ServerFrame::Message(inbound))
            }
            RawFrame::Ack { ack_id } => Ok(ServerFrame::Ack(ack_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;

    #[test]
    fn client_frame_wire_shape() {
        let frame = ClientFrame::with_ack(
            Outbound::App(AppEvent::add_item("g1", Item::new("i1", "Milk"))),
            7,
        );
        let value: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "type": "message",
                "channel": "app-event",
                "ackId": 7,
                "body": {
                    "action": "item.add",
                    "listId": "g1",
                    "item": {"id": "i1", "name": "Milk"}
                }
            })
        );
        assert_eq!(ClientFrame::decode(&frame.encode().unwrap()).unwrap(), frame);
    }

    #[test]
    fn client_frame_without_ack_omits_field() {
        let frame = ClientFrame::new(Outbound::Auth(AuthRequest::EmailLogin {
            email: "a@b.c".into(),
        }));
        let text = frame.encode().unwrap();
        assert!(!text.contains("ackId"));
        assert!(text.contains(r#""channel":"auth-request""#));
    }

    #[test]
    fn server_ack_decodes() {
        let frame = ServerFrame::decode(r#"{"type":"ack","ackId":42}"#).unwrap();
        assert_eq!(frame, ServerFrame::Ack(42));
    }

    #[test]
    fn server_message_decodes_by_channel() {
        let app = ServerFrame::decode(
            r#"{"type":"message","channel":"app-event","body":{"action":"lists.init","lists":[]}}"#,
        )
        .unwrap();
        assert_eq!(
            app,
            ServerFrame::Message(Inbound::App(AppEvent::ListsInit { lists: vec![] }))
        );

        let auth = ServerFrame::decode(
            r#"{"type":"message","channel":"auth-response","body":{"action":"challenge"}}"#,
        )
        .unwrap();
        assert_eq!(auth, ServerFrame::Message(Inbound::Auth(AuthResponse::Challenge)));
    }

    #[test]
    fn server_decode_rejects_garbage() {
        assert!(matches!(
            ServerFrame::decode("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            ServerFrame::decode(r#"{"type":"message","channel":"chat","body":{}}"#),
            Err(ProtocolError::UnknownChannel(_))
        ));
        assert!(matches!(
            ServerFrame::decode(
                r#"{"type":"message","channel":"auth-request","body":{"action":"email-login","email":"x"}}"#
            ),
            Err(ProtocolError::WrongDirection { .. })
        ));
        assert!(matches!(
            ServerFrame::decode(
                r#"{"type":"message","channel":"app-event","body":{"action":"item.explode"}}"#
            ),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn channel_names() {
        for channel in [Channel::AppEvent, Channel::AuthRequest, Channel::AuthResponse] {
            assert_eq!(Channel::parse(channel.as_str()).unwrap(), channel);
        }
        assert_eq!(Channel::AppEvent.to_string(), "app-event");
    }
}
