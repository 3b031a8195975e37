//! Byte-stream access to a transputer link adaptor.
//!
//! [`Link`] is the only seam between the discovery engine and the hardware.
//! [`LinkDevice`] drives the Linux `link` character device (INMOS B004/B008
//! compatible boards); tests drive a scripted link instead.

use std::{fmt, io, thread, time::Duration};

mod device;
#[cfg(test)]
pub(crate) mod script;

pub use device::LinkDevice;

/// Default link device node.
pub const DEFAULT_LINK: &str = "/dev/link0";

/// Default pacing delay between protocol phases.
pub const SETTLE: Duration = Duration::from_millis(10);

/// Synchronous, blocking access to one link.
pub trait Link {
    /// Reads at most `max_count` bytes. Fewer bytes, or none at all, is not an
    /// error; a link level condition is reported as a [`LinkStatus`].
    fn read(&mut self, max_count: usize) -> Result<Vec<u8>, LinkStatus>;

    /// Writes `bytes`, returning how many the link accepted.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, Error>;

    /// Pulses the hardware reset line of the root transputer.
    fn reset(&mut self) -> Result<(), Error>;

    fn close(&mut self) -> Result<(), Error>;

    /// Lets the far side settle.
    fn wait(&mut self, duration: Duration) {
        thread::sleep(duration);
    }

    /// Writes the first `count` bytes of `bytes`, truncating `count` to the
    /// buffer length.
    fn write_count(&mut self, bytes: &[u8], count: usize) -> Result<usize, Error> {
        let count = count.min(bytes.len());
        self.write(&bytes[..count])
    }
}

/// Link status codes as reported by the INMOS `linkio` interface.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Bad = -1,
    Cant = -2,
    Soft = -3,
    NoData = -4,
    NoSync = -5,
    Busy = -6,
    NoLink = -7,
    Syntax = -8,
}

impl LinkStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for LinkStatus {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            -1 => Self::Bad,
            -2 => Self::Cant,
            -3 => Self::Soft,
            -4 => Self::NoData,
            -5 => Self::NoSync,
            -6 => Self::Busy,
            -7 => Self::NoLink,
            -8 => Self::Syntax,
            other => return Err(other),
        })
    }
}

impl From<&io::Error> for LinkStatus {
    fn from(e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted => Self::NoData,
            _ => Self::Bad,
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bad => "bad link",
            Self::Cant => "cannot access link",
            Self::Soft => "soft link error",
            Self::NoData => "no data",
            Self::NoSync => "out of sync",
            Self::Busy => "link busy",
            Self::NoLink => "no link",
            Self::Syntax => "syntax error",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

/// Failures of the link device itself, as opposed to protocol failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to open link device {path}: {source}")]
    Open { path: String, source: io::Error },
    #[error("unable to reset link device: {0}")]
    Reset(io::Error),
    #[error("link device is not open")]
    NotOpen,
    #[error("link i/o failed: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip_through_i32() {
        for code in -8..=-1 {
            let status = LinkStatus::try_from(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(LinkStatus::try_from(0), Err(0));
        assert_eq!(LinkStatus::try_from(-9), Err(-9));
    }

    #[test]
    fn io_timeouts_mean_no_data() {
        let timeout = io::Error::from(io::ErrorKind::TimedOut);
        let broken = io::Error::from(io::ErrorKind::BrokenPipe);
        assert_eq!(LinkStatus::from(&timeout), LinkStatus::NoData);
        assert_eq!(LinkStatus::from(&broken), LinkStatus::Bad);
    }

    #[test]
    fn write_count_truncates_to_buffer() {
        let mut link = script::ScriptedLink::new();
        assert_eq!(link.write_count(&[1, 2, 3], 10).unwrap(), 3);
        assert_eq!(link.write_count(&[4, 5, 6], 2).unwrap(), 2);
        assert_eq!(link.writes(), &[vec![1, 2, 3], vec![4, 5]]);
    }
}
