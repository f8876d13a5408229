//! Protocol message types and codec.
//!
//! This module defines the wire format exchanged with the remote end.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `CommandEnvelope` | Local → Remote | `{id, method, params}` |
//! | `ResponseEnvelope` | Remote → Local | `{id, result}` or `{id, error}` |
//! | `Event` | Remote → Local | `{method, params}`, no id |
//!
//! # Method Naming
//!
//! Commands and events use `Domain.name` format:
//!
//! - `Page.navigate`
//! - `Target.getTargets`
//! - `Network.requestWillBeSent`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Frame encoding and inbound classification |
//! | `command` | The `Command` contract and `RawCommand` |
//! | `event` | Event type and typed payload trait |
//! | `request` | Command and response envelopes |

// ============================================================================
// Submodules
// ============================================================================

/// Frame encoding and decoding.
pub mod codec;

/// Command contract.
pub mod command;

/// Event message types.
pub mod event;

/// Command and response envelopes.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{DecodedMessage, decode, encode};
pub use command::{Command, Empty, RawCommand, serialize_params};
pub use event::{Event, EventPayload};
pub use request::{CommandEnvelope, RemoteError, ResponseEnvelope};
