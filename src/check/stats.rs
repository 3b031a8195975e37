//! Link speed probing and collection of the per-node stats record.

use arrayref::array_ref;
use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use super::{
    error::Error,
    topology::{NodeId, Topology},
    wire::{self, LSPEED_BLOCK_LEN, TAG_LSPEED},
};
use crate::link::Link;

/// Size of the stats record every booted node reports.
pub const STATS_LEN: usize = 6;

/// Reference clock the raw link divisor is taken against.
pub const LINK_CLOCK_HZ: f64 = 256_000_000.0;

/// type (u16) | processor speed (u8) | boot link (u8) | link divisor (u16)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatsRecord {
    pub type_code: u16,
    pub processor_speed: u8,
    pub boot_link: u8,
    pub link_speed_raw: u16,
}

impl StatsRecord {
    pub fn decode(bytes: &[u8; STATS_LEN]) -> Self {
        Self {
            type_code: LittleEndian::read_u16(array_ref![bytes, 0, 2]),
            processor_speed: bytes[2],
            boot_link: bytes[3],
            link_speed_raw: LittleEndian::read_u16(array_ref![bytes, 4, 2]),
        }
    }

    pub fn link_speed(&self) -> f64 {
        link_speed_hz(self.link_speed_raw)
    }
}

/// Converts a raw link divisor to Hz. A zero divisor means no measurement.
pub fn link_speed_hz(raw: u16) -> f64 {
    if raw == 0 {
        return 0.0;
    }
    LINK_CLOCK_HZ / f64::from(raw)
}

/// Starts the link speed test of `node`. The root gets a raw block of zeros;
/// any other node is tested over the link its parent reaches it through.
pub fn measure_link_speed<L: Link + ?Sized>(
    link: &mut L,
    topology: &Topology,
    node: NodeId,
) -> Result<(), Error> {
    if topology.node(node).is_root() {
        debug!("streaming {} bytes to the root", LSPEED_BLOCK_LEN);
        return wire::write_all(link, &[0u8; LSPEED_BLOCK_LEN]);
    }
    let route = topology.compute_route(node);
    wire::send_route(link, &route, TAG_LSPEED)
}

/// Reads the stats record `node` sends once booted and folds it into the
/// topology. An empty frame carries no record, so it is rejected along with
/// any other frame that is not exactly [`STATS_LEN`] bytes.
pub fn get_stats<L: Link + ?Sized>(
    link: &mut L,
    topology: &mut Topology,
    node: NodeId,
) -> Result<StatsRecord, Error> {
    let frame = wire::get_iserver_frame(link, STATS_LEN)?;
    if frame.len() != STATS_LEN {
        return Err(Error::FrameLengthInvalid {
            declared: frame.len(),
            max: STATS_LEN,
        });
    }
    let record = StatsRecord::decode(array_ref![frame, 0, STATS_LEN]);
    debug!("node {} reports {:?}", node, record);

    topology.set_boot_link(node, record.boot_link)?;
    let n = topology.node_mut(node);
    n.type_code = Some(record.type_code);
    n.node_type = n.node_type.refine(record.type_code);
    n.processor_speed = record.processor_speed;
    n.link_speed = record.link_speed();
    n.info = frame;
    Ok(record)
}
