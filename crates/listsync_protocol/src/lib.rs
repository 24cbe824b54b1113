//! # listsync protocol
//!
//! Domain model, events and wire frames for listsync.
//!
//! This crate provides:
//! - [`Item`] and [`ShoppingList`], the values derived by folding events
//! - [`AppEvent`], the sum type of domain events, and the pure [`fold`]
//! - [`AuthRequest`] / [`AuthResponse`] for the authentication channel
//! - [`ClientFrame`] / [`ServerFrame`], the JSON envelope multiplexing the
//!   `app-event`, `auth-request` and `auth-response` channels plus acks
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod error;
mod event;
mod frame;
mod model;

pub use auth::{AuthRequest, AuthResponse};
pub use error::{ProtocolError, ProtocolResult};
pub use event::{fold, fold_all, AppEvent};
pub use frame::{Channel, ClientFrame, Inbound, Outbound, ServerFrame};
pub use model::{Item, ShoppingList};
