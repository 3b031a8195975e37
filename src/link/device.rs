use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    os::unix::io::AsRawFd,
};

use tracing::{debug, trace, warn};

use super::{Error, Link, LinkStatus};
use crate::hex::HexDisplayExt;

/// `ioctl` request that pulses the reset line of the root transputer.
const LINKRESET: u64 = 0x0012;

/// The `link` character device exported by the INMOS link kernel driver.
pub struct LinkDevice {
    path: String,
    file: Option<File>,
}

impl LinkDevice {
    pub fn open(path: &str) -> Result<Self, Error> {
        debug!("opening {}", path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| Error::Open {
                path: path.to_owned(),
                source,
            })?;
        debug!("opened {}", path);
        Ok(Self {
            path: path.to_owned(),
            file: Some(file),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn file(&mut self) -> Result<&mut File, Error> {
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => {
                warn!("link device {} is not open", self.path);
                Err(Error::NotOpen)
            }
        }
    }
}

impl Link for LinkDevice {
    fn read(&mut self, max_count: usize) -> Result<Vec<u8>, LinkStatus> {
        let path = self.path.clone();
        let file = self.file().map_err(|_| LinkStatus::NoLink)?;
        trace!("reading {} bytes from {}", max_count, path);
        let mut buf = vec![0u8; max_count];
        match file.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                trace!("read {}", buf.hex());
                Ok(buf)
            }
            Err(e) => {
                let status = LinkStatus::from(&e);
                trace!("read from {} failed: {} ({})", path, e, status);
                Err(status)
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        trace!("writing {} bytes to {}: {}", bytes.len(), self.path, bytes.hex());
        let written = self.file()?.write(bytes)?;
        Ok(written)
    }

    fn reset(&mut self) -> Result<(), Error> {
        debug!("resetting {}", self.path);
        let fd = self.file()?.as_raw_fd();
        let ret = unsafe { libc::ioctl(fd, LINKRESET as _) };
        if ret < 0 {
            return Err(Error::Reset(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        match self.file.take() {
            Some(file) => {
                debug!("closing {}", self.path);
                drop(file);
                debug!("closed {}", self.path);
            }
            None => warn!("link device {} is not open", self.path),
        }
        Ok(())
    }
}
