//! Discovery and boot of transputer networks hanging off a single host link.
//!
//! The root transputer is probed for its type, loaded with a check program
//! and then used as a relay to probe, boot and measure every node reachable
//! through its links. The result is a [`check::Topology`] describing the tree.

pub mod check;
pub mod hex;
pub mod link;
