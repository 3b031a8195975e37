//! The tree of discovered transputers.
//!
//! Nodes live in an arena owned by [`Topology`] and refer to each other by
//! [`NodeId`]. A node's `route` is the link index on its parent it hangs
//! off; the full route from the root is rebuilt by walking parents.

use std::fmt;

use super::error::Error;

/// Links per transputer.
pub const LINKS: usize = 4;

/// Type code a 16-bit part reports when it is a T212 family member.
pub const TYPE_CODE_T212: u16 = 0x0212;
/// Type code of the T414 family.
pub const TYPE_CODE_T414: u16 = 0x0414;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NodeType {
    #[default]
    Unknown,
    /// C004 link switch.
    C4,
    T16,
    T212,
    T414,
    T32,
}

/// Word size of a bootable transputer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WordSize {
    Bits16,
    Bits32,
}

impl NodeType {
    /// `None` for parts that cannot run the check program.
    pub fn word_size(self) -> Option<WordSize> {
        match self {
            Self::T16 | Self::T212 => Some(WordSize::Bits16),
            Self::T32 | Self::T414 => Some(WordSize::Bits32),
            Self::Unknown | Self::C4 => None,
        }
    }

    /// Refines a type guessed from the probe reply with the type code the
    /// node reports in its stats record.
    pub fn refine(self, code: u16) -> Self {
        match self.word_size() {
            Some(WordSize::Bits16) if code == TYPE_CODE_T414 => Self::T212,
            Some(WordSize::Bits16) => self,
            Some(WordSize::Bits32) if code == TYPE_CODE_T414 => Self::T414,
            Some(WordSize::Bits32) => Self::T32,
            None => self,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "?",
            Self::C4 => "C004",
            Self::T16 => "T16",
            Self::T212 => "T212",
            Self::T414 => "T414",
            Self::T32 => "T32",
        };
        f.pad(name)
    }
}

/// Who uses a link of a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Free,
    /// The root's connection to the host adaptor.
    Host,
    Parent,
    Child(NodeId),
}

/// What the far end of a link is connected through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Peer {
    Host,
    /// Link index on the peer node.
    Link(u8),
}

#[derive(Clone, Debug, Default)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    /// Raw type code from the stats record.
    pub type_code: Option<u16>,
    /// Link this node was booted through. Assigned once, from its stats.
    pub boot_link: Option<u8>,
    pub links: [LinkState; LINKS],
    pub link_no: [Option<Peer>; LINKS],
    /// Link index on the parent this node was reached through.
    pub route: Option<u8>,
    pub route_len: usize,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Whether the check program has been loaded.
    pub booted: bool,
    pub processor_speed: u8,
    /// Derived link frequency in Hz.
    pub link_speed: f64,
    /// Raw stats record.
    pub info: Vec<u8>,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Links no parent, host or child occupies.
    pub fn free_links(&self) -> impl Iterator<Item = u8> + '_ {
        self.links
            .iter()
            .enumerate()
            .filter(|(_, state)| **state == LinkState::Free)
            .map(|(i, _)| i as u8)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Topology {
    nodes: Vec<Node>,
}

fn check_link(link: u8) -> Result<usize, Error> {
    if link as usize >= LINKS {
        return Err(Error::ProtocolDesync(format!(
            "link index {} out of range",
            link
        )));
    }
    Ok(link as usize)
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the node attached to the host adaptor. Only one root may exist.
    pub fn add_root(&mut self, node_type: NodeType) -> NodeId {
        debug_assert!(self.nodes.is_empty());
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            node_type,
            ..Node::default()
        });
        id
    }

    /// Adds a node found on `lastlink` of `parent`.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        lastlink: u8,
        node_type: NodeType,
    ) -> Result<NodeId, Error> {
        let id = NodeId(self.nodes.len());
        let route_len = self.node(parent).route_len + 1;
        self.nodes.push(Node {
            id,
            node_type,
            route_len,
            parent: Some(parent),
            ..Node::default()
        });
        if let Err(e) = self.set_route(id, lastlink) {
            self.nodes.pop();
            return Err(e);
        }
        self.node_mut(parent).children.push(id);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Link indices from the root down to `id`. Empty for the root.
    pub fn compute_route(&self, id: NodeId) -> Vec<u8> {
        let mut route = Vec::with_capacity(self.node(id).route_len);
        let mut node = self.node(id);
        while let (Some(entry), Some(parent)) = (node.route, node.parent) {
            route.push(entry);
            node = self.node(parent);
        }
        route.reverse();
        route
    }

    /// Route to whatever sits on `link` of `id`.
    pub fn route_via(&self, id: NodeId, link: u8) -> Vec<u8> {
        let mut route = self.compute_route(id);
        route.push(link);
        route
    }

    /// Records that `id` was reached through `lastlink` of its parent and
    /// claims that link on the parent.
    pub fn set_route(&mut self, id: NodeId, lastlink: u8) -> Result<(), Error> {
        let index = check_link(lastlink)?;
        let parent = self.node(id).parent.ok_or_else(|| {
            Error::ProtocolDesync(format!("node {} has no parent to route through", id))
        })?;
        if self.node(parent).links[index] != LinkState::Free {
            return Err(Error::ProtocolDesync(format!(
                "link {} of node {} is already in use",
                lastlink, parent
            )));
        }
        self.node_mut(id).route = Some(lastlink);
        self.node_mut(parent).links[index] = LinkState::Child(id);
        if let Some(boot_link) = self.node(id).boot_link {
            self.node_mut(parent).link_no[index] = Some(Peer::Link(boot_link));
        }
        Ok(())
    }

    /// Assigns the link `id` was booted through and mirrors the connection on
    /// both ends.
    pub fn set_boot_link(&mut self, id: NodeId, boot_link: u8) -> Result<(), Error> {
        let index = check_link(boot_link)?;
        if let Some(existing) = self.node(id).boot_link {
            return Err(Error::ProtocolDesync(format!(
                "node {} already booted through link {}",
                id, existing
            )));
        }
        if self.node(id).links[index] != LinkState::Free {
            return Err(Error::ProtocolDesync(format!(
                "node {} reports boot link {} which is already in use",
                id, boot_link
            )));
        }
        let node = self.node_mut(id);
        node.boot_link = Some(boot_link);
        match (node.parent, node.route) {
            (Some(parent), Some(lastlink)) => {
                node.links[index] = LinkState::Parent;
                node.link_no[index] = Some(Peer::Link(lastlink));
                self.node_mut(parent).link_no[lastlink as usize] =
                    Some(Peer::Link(boot_link));
            }
            _ => {
                node.links[index] = LinkState::Host;
                node.link_no[index] = Some(Peer::Host);
            }
        }
        Ok(())
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>3} {:>5} {:>4} {:>8} {:>4} [ {:^6} {:^6} {:^6} {:^6} ]",
            "#", "Part", "MHz", "Link Hz", "Boot", "Link0", "Link1", "Link2", "Link3"
        )?;
        for node in &self.nodes {
            let boot = match node.boot_link {
                Some(link) => link.to_string(),
                None => "-".into(),
            };
            write!(
                f,
                "{:>3} {:>5} {:>4} {:>8.0} {:>4} [",
                node.id, node.node_type, node.processor_speed, node.link_speed, boot
            )?;
            for (state, peer) in node.links.iter().zip(node.link_no.iter()) {
                let cell = match (state, peer) {
                    (LinkState::Host, _) => "H".to_string(),
                    (LinkState::Parent, Some(Peer::Link(no))) => {
                        let parent = node.parent.map(|p| p.0).unwrap_or_default();
                        format!("{}:{}", parent, no)
                    }
                    (LinkState::Child(child), Some(Peer::Link(no))) => {
                        format!("{}:{}", child, no)
                    }
                    (LinkState::Child(child), _) => format!("{}:?", child),
                    _ => "...".to_string(),
                };
                write!(f, " {:^6}", cell)?;
            }
            writeln!(f, " ]")?;
        }
        Ok(())
    }
}
