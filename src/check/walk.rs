//! Drives a complete check of the network: resets, root type detection and
//! then boot, speed test, stats and probing of every reachable node.

use std::{collections::VecDeque, time::Duration};

use tracing::{debug, debug_span, info, warn};
use typed_builder::TypedBuilder;

use super::{
    boot::{self, BootImages},
    error::{Context, Error, Phase},
    findtype,
    stats,
    topology::{NodeId, Topology},
    wire::{self, SSRESETHI, SSRESETLO},
};
use crate::link::{Link, SETTLE};

/// The root is always the first node found.
pub const ROOT: NodeId = NodeId(0);

#[derive(TypedBuilder, Clone, Debug)]
pub struct Config {
    /// Pulse the root's reset line before probing.
    #[builder(default = true)]
    pub root_reset: bool,
    /// Reset the subsystem port of the root.
    #[builder(default = false)]
    pub subsystem_reset: bool,
    #[builder(default = SETTLE)]
    pub settle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Owns the link for the duration of a check. The link is closed exactly
/// once when the walk ends, whether or not it succeeded.
pub struct Walker<'a, L: Link + ?Sized> {
    link: &'a mut L,
    config: Config,
    images: &'a BootImages,
}

impl<'a, L: Link + ?Sized> Walker<'a, L> {
    pub fn new(link: &'a mut L, config: Config, images: &'a BootImages) -> Self {
        Self {
            link,
            config,
            images,
        }
    }

    pub fn run(mut self) -> Result<Topology, Error> {
        match self.walk() {
            Ok(topology) => {
                if let Err(close) = self.link.close() {
                    warn!("closing link after check: {}", close);
                }
                Ok(topology)
            }
            Err(e) => {
                if let Err(close) = self.link.close() {
                    warn!("closing link after failure: {}", close);
                }
                Err(e)
            }
        }
    }

    fn walk(&mut self) -> Result<Topology, Error> {
        if self.config.root_reset {
            debug!("resetting root transputer");
            self.link.reset().at(ROOT, Phase::RootReset)?;
        }
        if self.config.subsystem_reset {
            self.subsystem_reset()?;
        }

        let root_type = findtype::detect_root_type(&mut *self.link, self.config.settle)
            .at(ROOT, Phase::FindType)?;
        info!("root transputer is a {}", root_type);

        let mut topology = Topology::new();
        let root = topology.add_root(root_type);
        let mut pending = VecDeque::from([root]);
        while let Some(id) = pending.pop_front() {
            let span = debug_span!("node", id = %id);
            let _guard = span.enter();

            if !self.visit(&mut topology, id)? {
                continue;
            }

            let free: Vec<u8> = topology.node(id).free_links().collect();
            for port in free {
                let found = findtype::probe_link(
                    &mut *self.link,
                    &topology,
                    id,
                    port,
                    self.config.settle,
                )
                .at(id, Phase::Probe(port))?;
                if let Some(node_type) = found {
                    let child = topology
                        .add_child(id, port, node_type)
                        .at(id, Phase::Probe(port))?;
                    info!("found {} {} on link {} of node {}", node_type, child, port, id);
                    pending.push_back(child);
                }
            }
        }
        Ok(topology)
    }

    /// Boots, speed tests and collects stats of one node. Returns false for
    /// nodes that cannot be booted.
    fn visit(&mut self, topology: &mut Topology, id: NodeId) -> Result<bool, Error> {
        let node_type = topology.node(id).node_type;
        let Some(word_size) = node_type.word_size() else {
            debug!("{} {} cannot be booted", node_type, id);
            return Ok(false);
        };
        let program = self
            .images
            .for_word_size(word_size)
            .ok_or(Error::MissingBootImage(word_size))
            .at(id, Phase::Bootcode)?;
        boot::load(&mut *self.link, topology, id, program, self.config.settle)?;
        stats::measure_link_speed(&mut *self.link, topology, id).at(id, Phase::LinkSpeed)?;
        stats::get_stats(&mut *self.link, topology, id).at(id, Phase::Stats)?;
        let node = topology.node(id);
        info!(
            "node {} is a {} at {} MHz, link {:.0} Hz, booted via link {:?}",
            id, node.node_type, node.processor_speed, node.link_speed, node.boot_link
        );
        Ok(true)
    }

    fn subsystem_reset(&mut self) -> Result<(), Error> {
        debug!("resetting root subsystem");
        for (pulse, pattern) in [SSRESETLO, SSRESETHI, SSRESETLO].iter().enumerate() {
            wire::write_all(&mut *self.link, pattern)
                .at(ROOT, Phase::SubsystemReset(pulse as u8 + 1))?;
            self.link.wait(self.config.settle);
        }
        Ok(())
    }
}
