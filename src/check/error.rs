use std::fmt;

use crate::link::{self, LinkStatus};

use super::topology::{NodeId, WordSize};

/// Step of the walk a failure happened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    RootReset,
    /// Subsystem reset pulse, numbered from 1.
    SubsystemReset(u8),
    FindType,
    PreBoot,
    Bootcode,
    Parameters,
    Program,
    LinkSpeed,
    Stats,
    /// Probe for a peer on the given link.
    Probe(u8),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootReset => write!(f, "root reset"),
            Self::SubsystemReset(pulse) => {
                write!(f, "subsystem reset pulse {}", pulse)
            }
            Self::FindType => write!(f, "type detection"),
            Self::PreBoot => write!(f, "pre-boot routing"),
            Self::Bootcode => write!(f, "bootcode load"),
            Self::Parameters => write!(f, "parameter load"),
            Self::Program => write!(f, "program load"),
            Self::LinkSpeed => write!(f, "link speed test"),
            Self::Stats => write!(f, "stats collection"),
            Self::Probe(link) => write!(f, "probe of link {}", link),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Channel(#[from] link::Error),
    #[error("link reported {0}")]
    Status(LinkStatus),
    #[error("short write: {written} of {expected} bytes accepted")]
    ShortWrite { expected: usize, written: usize },
    #[error("timed out: {received} of {expected} bytes received")]
    ProtocolTimeout { expected: usize, received: usize },
    #[error("protocol out of sync: {0}")]
    ProtocolDesync(String),
    #[error("frame length {declared} is invalid, at most {max} bytes expected")]
    FrameLengthInvalid { declared: usize, max: usize },
    #[error("boot image is {actual} bytes, parameter table says {expected}")]
    BadBootImage { expected: usize, actual: usize },
    #[error("no boot program for {0:?} transputers")]
    MissingBootImage(WordSize),
    #[error("parameter {value:#x} does not fit in {bytes_per_word} bytes")]
    ParameterOverflow { value: u32, bytes_per_word: usize },
    #[error("node {node}: {phase} failed: {source}")]
    At {
        node: NodeId,
        phase: Phase,
        #[source]
        source: Box<Error>,
    },
}

impl From<LinkStatus> for Error {
    fn from(status: LinkStatus) -> Self {
        match status {
            LinkStatus::NoSync => {
                Self::ProtocolDesync(format!("link reported {}", status))
            }
            other => Self::Status(other),
        }
    }
}

impl Error {
    /// Innermost error, skipping node and phase tags.
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::At { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Node and phase the failure was first tagged with.
    pub fn location(&self) -> Option<(NodeId, Phase)> {
        match self {
            Self::At { node, phase, source } => {
                source.location().or(Some((*node, *phase)))
            }
            _ => None,
        }
    }
}

/// Tags a failure with the node and phase it happened in.
pub trait Context<T> {
    fn at(self, node: NodeId, phase: Phase) -> Result<T, Error>;
}

impl<T, E: Into<Error>> Context<T> for Result<T, E> {
    fn at(self, node: NodeId, phase: Phase) -> Result<T, Error> {
        self.map_err(|e| Error::At {
            node,
            phase,
            source: Box::new(e.into()),
        })
    }
}

/// Fails unless the link accepted all `expected` bytes.
pub(crate) fn expect_written(expected: usize, written: usize) -> Result<(), Error> {
    if written != expected {
        return Err(Error::ShortWrite { expected, written });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nosync_is_a_desync() {
        assert!(matches!(
            Error::from(LinkStatus::NoSync),
            Error::ProtocolDesync(_)
        ));
        assert!(matches!(
            Error::from(LinkStatus::Busy),
            Error::Status(LinkStatus::Busy)
        ));
    }

    #[test]
    fn innermost_tag_wins() {
        let inner: Result<(), Error> = Err(Error::ShortWrite {
            expected: 3,
            written: 1,
        });
        let err = inner
            .at(NodeId(2), Phase::PreBoot)
            .at(NodeId(2), Phase::Program)
            .unwrap_err();
        assert_eq!(err.location(), Some((NodeId(2), Phase::PreBoot)));
        assert!(matches!(
            err.root_cause(),
            Error::ShortWrite {
                expected: 3,
                written: 1
            }
        ));
        assert_eq!(
            err.to_string(),
            "node 2: program load failed: node 2: pre-boot routing failed: \
             short write: 1 of 3 bytes accepted"
        );
    }
}
