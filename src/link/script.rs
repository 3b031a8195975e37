//! In-memory link for tests: replays scripted replies and records traffic.

use std::{collections::VecDeque, time::Duration};

use super::{Error, Link, LinkStatus};

#[derive(Default)]
pub(crate) struct ScriptedLink {
    replies: VecDeque<Result<Vec<u8>, LinkStatus>>,
    writes: Vec<Vec<u8>>,
    short_write: Option<(usize, usize)>,
    fail_reset: bool,
    fail_close: bool,
    reads: usize,
    resets: usize,
    closes: usize,
    waited: Duration,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes handed out across as many reads as the reader needs.
    pub fn reply(mut self, bytes: &[u8]) -> Self {
        self.replies.push_back(Ok(bytes.to_vec()));
        self
    }

    /// Queues an iserver frame carrying `payload`.
    pub fn frame(self, payload: &[u8]) -> Self {
        let mut bytes = (payload.len() as u16).to_le_bytes().to_vec();
        bytes.extend_from_slice(payload);
        self.reply(&bytes)
    }

    pub fn status(mut self, status: LinkStatus) -> Self {
        self.replies.push_back(Err(status));
        self
    }

    /// Makes the `index`th write (zero based) accept only `count` bytes.
    pub fn short_write_at(mut self, index: usize, count: usize) -> Self {
        self.short_write = Some((index, count));
        self
    }

    pub fn failing_reset(mut self) -> Self {
        self.fail_reset = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    pub fn closes(&self) -> usize {
        self.closes
    }

    pub fn waited(&self) -> Duration {
        self.waited
    }

    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }
}

impl Link for ScriptedLink {
    fn read(&mut self, max_count: usize) -> Result<Vec<u8>, LinkStatus> {
        self.reads += 1;
        match self.replies.pop_front() {
            Some(Ok(mut bytes)) => {
                if bytes.len() > max_count {
                    let rest = bytes.split_off(max_count);
                    self.replies.push_front(Ok(rest));
                }
                Ok(bytes)
            }
            Some(Err(status)) => Err(status),
            None => Ok(Vec::new()),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        let index = self.writes.len();
        self.writes.push(bytes.to_vec());
        match self.short_write {
            Some((at, count)) if at == index => Ok(count.min(bytes.len())),
            _ => Ok(bytes.len()),
        }
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.resets += 1;
        if self.fail_reset {
            return Err(Error::Reset(std::io::Error::from(
                std::io::ErrorKind::Unsupported,
            )));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.closes += 1;
        if self.fail_close {
            return Err(Error::NotOpen);
        }
        Ok(())
    }

    fn wait(&mut self, duration: Duration) {
        self.waited += duration;
    }
}
