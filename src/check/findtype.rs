//! Works out what kind of transputer sits on a link from the shape of its
//! reply to the boot probe.

use std::time::Duration;

use tracing::{debug, trace};

use super::{
    error::{expect_written, Error},
    topology::{NodeId, NodeType, Topology},
    wire::{self, BOOTSTRING, BOOTSTRING_LEN, TAG_PROBE},
};
use crate::{
    hex::HexDisplayExt,
    link::{Link, LinkStatus},
};

/// Single byte reads spent waiting for the root's reply.
pub const PROBE_ATTEMPTS: usize = 30;

/// Longest reply to the boot probe.
pub const REPLY_MAX: usize = 4;

const SIGNATURE: [u8; 2] = [0xAA, 0xAA];

/// Classifies a probe reply by its length and signature.
pub fn classify(reply: &[u8]) -> Result<NodeType, Error> {
    match reply {
        [_] => Ok(NodeType::C4),
        [a, b] if [*a, *b] == SIGNATURE => Ok(NodeType::T16),
        [a, b, _, _] if [*a, *b] == SIGNATURE => Ok(NodeType::T32),
        [] => Err(Error::ProtocolDesync("no reply to boot probe".into())),
        other => Err(Error::ProtocolDesync(format!(
            "unrecognised {} byte reply to boot probe: {}",
            other.len(),
            other.hex()
        ))),
    }
}

/// Boots the root with the probe and classifies whatever it sends back.
pub fn detect_root_type<L: Link + ?Sized>(
    link: &mut L,
    settle: Duration,
) -> Result<NodeType, Error> {
    let written = link.write_count(&BOOTSTRING, BOOTSTRING_LEN)?;
    expect_written(BOOTSTRING_LEN, written)?;
    link.wait(settle);

    let reply = read_reply(link);
    debug!("root replied {}", reply.hex());
    classify(&reply)
}

/// Reads the reply one byte at a time until four bytes arrive, the link
/// loses sync, or [`PROBE_ATTEMPTS`] reads have been made.
fn read_reply<L: Link + ?Sized>(link: &mut L) -> Vec<u8> {
    let mut reply = Vec::with_capacity(REPLY_MAX);
    for _ in 0..PROBE_ATTEMPTS {
        match link.read(1) {
            Ok(bytes) => reply.extend(bytes.into_iter().take(1)),
            Err(LinkStatus::NoSync) => break,
            Err(status) => trace!("probe read: {}", status),
        }
        if reply.len() == REPLY_MAX {
            break;
        }
    }
    reply
}

/// Probes `port` of an already booted node. Returns `None` when nothing
/// answers on that link.
pub fn probe_link<L: Link + ?Sized>(
    link: &mut L,
    topology: &Topology,
    node: NodeId,
    port: u8,
    settle: Duration,
) -> Result<Option<NodeType>, Error> {
    let route = topology.route_via(node, port);
    wire::send_route(link, &route, TAG_PROBE)?;
    wire::write_payload(link, &BOOTSTRING, true)?;
    link.wait(settle);

    let reply = wire::get_iserver_frame(link, REPLY_MAX)?;
    if reply.is_empty() {
        return Ok(None);
    }
    debug!("link {} of node {} replied {}", port, node, reply.hex());
    classify(&reply).map(Some)
}
