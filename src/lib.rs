//! Byzantine reliable broadcast (Bracha) protocol core.
//!
//! The crate implements the round state machine, quorum arithmetic and the
//! dispatcher loop of Bracha-style reliable broadcast. Networking, identity
//! and wire encoding are external collaborators behind the
//! [`network::Transport`] seam.

pub mod broadcast;
pub mod config;
pub mod core;
pub mod logging;
pub mod network;
pub mod peer;

pub use crate::broadcast::delivery::DeliveredBroadcast;
pub use crate::broadcast::{ProtocolId, RbMsg, Stage};
pub use crate::config::Configuration;
pub use crate::core::builder::RbcBuilder;
pub use crate::core::manager::{RbcHandle, RbcManager};
pub use crate::core::RbcError;
pub use crate::network::{ChannelTransport, NetworkCommunication, Transport};
pub use crate::peer::PeerId;
