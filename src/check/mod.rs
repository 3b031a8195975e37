//! Discovery engine: probes, boots and maps a transputer network.
//!
//! A check starts at the root, which is wired straight to the host adaptor.
//! Once the root runs the check program it relays iserver frames, letting the
//! host address any node by its route of link indices and repeat the same
//! probe, boot, speed test and stats sequence one hop further out.

pub mod boot;
pub mod error;
pub mod findtype;
pub mod stats;
pub mod topology;
pub mod walk;
pub mod wire;

pub use boot::{BootImages, BootParams, BootProgram};
pub use error::{Error, Phase};
pub use topology::{LinkState, Node, NodeId, NodeType, Peer, Topology};
pub use walk::{Config, Walker};
