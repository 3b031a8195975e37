//! Fixed wire constants, iserver framing and bounded-retry reads.
//!
//! An iserver frame is a little-endian `u16` length followed by that many
//! payload bytes. The root transputer talks to the host directly; every node
//! behind it is reached through frames relayed by the nodes on its route.

use byteorder::{ByteOrder, LittleEndian};
use tracing::trace;

use super::error::{expect_written, Error};
use crate::{hex::HexDisplayExt, link::Link};

pub const BOOTSTRING_LEN: usize = 24;

/// Probe sent to an unbooted transputer. The reply identifies its word size.
pub const BOOTSTRING: [u8; BOOTSTRING_LEN] = [
    23, 0xB1, 0xD1, 0x24, 0xF2, 0x21, 0xFC, 0x24, 0xF2, 0x21, 0xF8, 0xF0, 0x60,
    0x5C, 0x2A, 0x2A, 0x2A, 0x4A, 0xFF, 0x21, 0x2F, 0xFF, 0x02, 0x00,
];

// The leading byte of a boot packet is the length of the code that follows.
const _: () = assert!(BOOTSTRING[0] as usize == BOOTSTRING_LEN - 1);

/// Subsystem reset pulses written to the root's subsystem port.
pub const SSRESETLO: [u8; 9] = [0, 0, 0, 0, 0, 0, 0, 0, 0];
pub const SSRESETHI: [u8; 9] = [0, 0, 0, 0, 0, 1, 0, 0, 0];

/// Bootcode sent ahead of the parameter block. Like any boot packet it
/// starts with the length of the code that follows.
pub const BOOTCODE: [u8; 48] = [
    47, 0x24, 0xF2, 0x21, 0xFC, 0x24, 0xF2, 0x21, 0xF8, 0xF0, 0x60, 0x5C,
    0x2A, 0x2A, 0x2A, 0x4A, 0xD0, 0x71, 0x24, 0xF2, 0x54, 0xF7, 0x70, 0x24,
    0xF2, 0x48, 0xF7, 0x70, 0x51, 0x24, 0xF2, 0x44, 0xF7, 0x70, 0x52, 0x24,
    0xF2, 0x44, 0xF7, 0x70, 0x53, 0x11, 0xD2, 0x72, 0xF6, 0x60, 0x0F, 0xF0,
];

const _: () = assert!(BOOTCODE[0] as usize == BOOTCODE.len() - 1);

/// Escape prefix of an in-band tag.
pub const TAG_ESCAPE: [u8; 2] = [0xFF, 0xFF];
/// A boot frame for the routed node follows.
pub const TAG_BOOT: u8 = 0x01;
/// Link speed test of the routed link.
pub const TAG_LSPEED: u8 = 0x02;
/// Boot probe for whatever is attached to the routed link.
pub const TAG_PROBE: u8 = 0x03;

/// Largest chunk of a program body sent in one write.
pub const SEGSIZE: usize = 511;

/// Zero bytes streamed to the root to exercise the raw link.
pub const LSPEED_BLOCK_LEN: usize = 257;

/// Reads allowed before [`accumulate`] gives up.
pub const READ_ATTEMPTS: usize = 10;

/// Three byte in-band tag.
pub fn tag(tag: u8) -> [u8; 3] {
    [TAG_ESCAPE[0], TAG_ESCAPE[1], tag]
}

/// Wraps `payload` in an iserver frame.
pub fn iserver_frame(payload: &[u8]) -> Result<Vec<u8>, Error> {
    let len = u16::try_from(payload.len()).map_err(|_| Error::FrameLengthInvalid {
        declared: payload.len(),
        max: u16::MAX as usize,
    })?;
    let mut buf = vec![0u8; 2 + payload.len()];
    LittleEndian::write_u16(&mut buf[..2], len);
    buf[2..].copy_from_slice(payload);
    Ok(buf)
}

/// Splits a program body into segments of at most [`SEGSIZE`] bytes.
pub fn segments(payload: &[u8]) -> std::slice::Chunks<'_, u8> {
    payload.chunks(SEGSIZE)
}

/// Writes `bytes` in one go and fails unless all of them were accepted.
pub fn write_all<L: Link + ?Sized>(link: &mut L, bytes: &[u8]) -> Result<(), Error> {
    let written = link.write_count(bytes, bytes.len())?;
    expect_written(bytes.len(), written)
}

/// Writes `payload` either as is or wrapped in an iserver frame.
pub fn write_payload<L: Link + ?Sized>(
    link: &mut L,
    payload: &[u8],
    framed: bool,
) -> Result<(), Error> {
    if framed {
        write_all(link, &iserver_frame(payload)?)
    } else {
        write_all(link, payload)
    }
}

/// Sends the route header for `route` followed by the in-band tag `t`, so
/// that the nodes along the route relay what follows instead of consuming it.
pub fn send_route<L: Link + ?Sized>(link: &mut L, route: &[u8], t: u8) -> Result<(), Error> {
    trace!("routing {} to [{}]", t, route.hex());
    write_payload(link, route, true)?;
    write_all(link, &tag(t))
}

/// Collects exactly `target` bytes, tolerating short reads for at most
/// [`READ_ATTEMPTS`] reads. A link status aborts immediately.
pub fn accumulate<L: Link + ?Sized>(link: &mut L, target: usize) -> Result<Vec<u8>, Error> {
    let mut acc = Vec::with_capacity(target);
    for _ in 0..READ_ATTEMPTS {
        if acc.len() >= target {
            break;
        }
        let mut bytes = link.read(target - acc.len())?;
        bytes.truncate(target - acc.len());
        acc.extend_from_slice(&bytes);
    }
    if acc.len() != target {
        return Err(Error::ProtocolTimeout {
            expected: target,
            received: acc.len(),
        });
    }
    trace!("accumulated {}", acc.hex());
    Ok(acc)
}

/// Reads one iserver frame of at most `max_length` payload bytes. An empty
/// frame is returned as an empty payload.
pub fn get_iserver_frame<L: Link + ?Sized>(
    link: &mut L,
    max_length: usize,
) -> Result<Vec<u8>, Error> {
    let header = accumulate(link, 2)?;
    let declared = LittleEndian::read_u16(&header) as usize;
    if declared > max_length {
        return Err(Error::FrameLengthInvalid {
            declared,
            max: max_length,
        });
    }
    if declared == 0 {
        return Ok(Vec::new());
    }
    accumulate(link, declared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{script::ScriptedLink, LinkStatus};

    #[test]
    fn accumulates_across_short_reads() {
        let mut link = ScriptedLink::new().reply(&[1, 2]).reply(&[]).reply(&[3, 4, 5]);
        assert_eq!(accumulate(&mut link, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(link.reads(), 3);
        assert_eq!(link.pending_replies(), 1);
    }

    #[test]
    fn gives_up_after_ten_reads() {
        let mut link = ScriptedLink::new().reply(&[9]);
        match accumulate(&mut link, 6) {
            Err(Error::ProtocolTimeout { expected, received }) => {
                assert_eq!((expected, received), (6, 1));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(link.reads(), READ_ATTEMPTS);
    }

    #[test]
    fn link_status_stops_accumulation() {
        let mut link = ScriptedLink::new()
            .reply(&[1])
            .status(LinkStatus::NoSync)
            .reply(&[2]);
        assert!(matches!(
            accumulate(&mut link, 2),
            Err(Error::ProtocolDesync(_))
        ));
        assert_eq!(link.reads(), 2);

        let mut link = ScriptedLink::new().status(LinkStatus::Busy);
        assert!(matches!(
            accumulate(&mut link, 2),
            Err(Error::Status(LinkStatus::Busy))
        ));
    }

    #[test]
    fn reads_iserver_frames() {
        let mut link = ScriptedLink::new().frame(&[7, 8, 9]);
        assert_eq!(get_iserver_frame(&mut link, 6).unwrap(), vec![7, 8, 9]);

        let mut link = ScriptedLink::new().frame(&[]);
        assert!(get_iserver_frame(&mut link, 6).unwrap().is_empty());

        let mut link = ScriptedLink::new().frame(&[0; 7]);
        assert!(matches!(
            get_iserver_frame(&mut link, 6),
            Err(Error::FrameLengthInvalid {
                declared: 7,
                max: 6
            })
        ));
    }

    #[test]
    fn frames_carry_a_little_endian_length() {
        let payload = vec![0x5A; 0x0102];
        let frame = iserver_frame(&payload).unwrap();
        assert_eq!(&frame[..2], &[0x02, 0x01]);
        assert_eq!(&frame[2..], payload.as_slice());
    }

    #[test]
    fn segments_cover_the_payload() {
        for len in [0usize, 1, 510, 511, 512, 1022, 2048, 3072] {
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let chunks: Vec<&[u8]> = segments(&payload).collect();
            assert_eq!(chunks.len(), (len + SEGSIZE - 1) / SEGSIZE);
            if let Some((last, full)) = chunks.split_last() {
                assert!(full.iter().all(|c| c.len() == SEGSIZE));
                assert!(!last.is_empty() && last.len() <= SEGSIZE);
            }
            assert_eq!(chunks.concat(), payload);
        }
    }

    #[test]
    fn short_writes_are_reported() {
        let mut link = ScriptedLink::new().short_write_at(0, 4);
        assert!(matches!(
            write_payload(&mut link, &[0; 9], false),
            Err(Error::ShortWrite {
                expected: 9,
                written: 4
            })
        ));
        write_payload(&mut link, &[1, 2], true).unwrap();
        assert_eq!(link.writes()[1], vec![2, 0, 1, 2]);
    }

    #[test]
    fn route_header_precedes_the_tag() {
        let mut link = ScriptedLink::new();
        send_route(&mut link, &[2, 0, 3], TAG_LSPEED).unwrap();
        assert_eq!(
            link.writes(),
            &[vec![3, 0, 2, 0, 3], vec![0xFF, 0xFF, TAG_LSPEED]]
        );

        let mut link = ScriptedLink::new().short_write_at(1, 2);
        assert!(matches!(
            send_route(&mut link, &[1], TAG_BOOT),
            Err(Error::ShortWrite {
                expected: 3,
                written: 2
            })
        ));
    }

    #[test]
    fn probe_tables_have_their_declared_lengths() {
        assert_eq!(BOOTSTRING.len(), BOOTSTRING_LEN);
        assert_eq!(tag(TAG_BOOT), [0xFF, 0xFF, TAG_BOOT]);
    }
}
