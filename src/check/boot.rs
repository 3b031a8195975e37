//! Three phase loading of the check program: bootcode, parameter block and
//! program body. The root is written to directly; any other node is reached
//! through iserver frames relayed along its route.

use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, debug_span};

use super::{
    error::{Context, Error, Phase},
    topology::{NodeId, Topology, WordSize},
    wire::{self, BOOTCODE, TAG_BOOT},
};
use crate::link::Link;

/// Load parameters of a boot program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootParams {
    pub codesize: u32,
    pub offset: u32,
    pub workspace: u32,
    pub vectorspace: u32,
    pub bytes_per_word: usize,
}

/// Check program for 16-bit transputers.
pub const PARAMS_16: BootParams = BootParams {
    codesize: 2048,
    offset: 0,
    workspace: 0x0100,
    vectorspace: 0,
    bytes_per_word: 2,
};

/// Check program for 32-bit transputers.
pub const PARAMS_32: BootParams = BootParams {
    codesize: 3072,
    offset: 0,
    workspace: 0x0400,
    vectorspace: 0,
    bytes_per_word: 4,
};

impl BootParams {
    pub fn for_word_size(word_size: WordSize) -> Self {
        match word_size {
            WordSize::Bits16 => PARAMS_16,
            WordSize::Bits32 => PARAMS_32,
        }
    }

    /// Workspace, vector space, code size and offset, each little-endian in
    /// `bytes_per_word` bytes.
    pub fn parameter_block(&self) -> Result<Vec<u8>, Error> {
        let bpw = self.bytes_per_word;
        if !matches!(bpw, 2 | 4) {
            return Err(Error::ParameterOverflow {
                value: self.codesize,
                bytes_per_word: bpw,
            });
        }
        let mut block = vec![0u8; 4 * bpw];
        let fields = [self.workspace, self.vectorspace, self.codesize, self.offset];
        for (slot, value) in block.chunks_exact_mut(bpw).zip(fields) {
            if bpw < 4 && u64::from(value) >> (8 * bpw) != 0 {
                return Err(Error::ParameterOverflow {
                    value,
                    bytes_per_word: bpw,
                });
            }
            LittleEndian::write_uint(slot, u64::from(value), bpw);
        }
        Ok(block)
    }
}

/// A boot image together with the table it is loaded with.
#[derive(Clone, Debug)]
pub struct BootProgram {
    params: BootParams,
    code: Vec<u8>,
}

impl BootProgram {
    /// Rejects images whose size disagrees with the table or whose
    /// parameters do not fit the word size.
    pub fn new(params: BootParams, code: Vec<u8>) -> Result<Self, Error> {
        if code.len() != params.codesize as usize {
            return Err(Error::BadBootImage {
                expected: params.codesize as usize,
                actual: code.len(),
            });
        }
        params.parameter_block()?;
        Ok(Self { params, code })
    }

    pub fn params(&self) -> &BootParams {
        &self.params
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }
}

/// The check programs available for each word size. A missing program only
/// matters once a node of that word size has to be booted.
#[derive(Clone, Debug, Default)]
pub struct BootImages {
    bits16: Option<BootProgram>,
    bits32: Option<BootProgram>,
}

impl BootImages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the program for `word_size`, checked against its parameter table.
    pub fn with_image(mut self, word_size: WordSize, code: Vec<u8>) -> Result<Self, Error> {
        let program = BootProgram::new(BootParams::for_word_size(word_size), code)?;
        match word_size {
            WordSize::Bits16 => self.bits16 = Some(program),
            WordSize::Bits32 => self.bits32 = Some(program),
        }
        Ok(self)
    }

    pub fn for_word_size(&self, word_size: WordSize) -> Option<&BootProgram> {
        match word_size {
            WordSize::Bits16 => self.bits16.as_ref(),
            WordSize::Bits32 => self.bits32.as_ref(),
        }
    }
}

/// Loads `program` onto `node`. Any failure is tagged with the node and the
/// phase it happened in.
pub fn load<L: Link + ?Sized>(
    link: &mut L,
    topology: &mut Topology,
    node: NodeId,
    program: &BootProgram,
    settle: Duration,
) -> Result<(), Error> {
    let span = debug_span!("boot", node = %node);
    let _guard = span.enter();

    let framed = !topology.node(node).is_root();
    if framed {
        let route = topology.compute_route(node);
        wire::send_route(link, &route, TAG_BOOT).at(node, Phase::PreBoot)?;
    }

    debug!("loading {} bytes of bootcode", BOOTCODE.len());
    wire::write_payload(link, &BOOTCODE, framed).at(node, Phase::Bootcode)?;
    link.wait(settle);

    let block = program.params().parameter_block().at(node, Phase::Parameters)?;
    debug!("loading parameters {:?}", program.params());
    wire::write_payload(link, &block, framed).at(node, Phase::Parameters)?;

    debug!("loading {} bytes of program", program.code().len());
    for segment in wire::segments(program.code()) {
        wire::write_payload(link, segment, framed).at(node, Phase::Program)?;
    }
    link.wait(settle);

    topology.node_mut(node).booted = true;
    Ok(())
}
