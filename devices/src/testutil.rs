//! Scripted device link for driver unit tests.

use std::collections::VecDeque;
use std::time::Duration;

use relay::codec;

use crate::error::DeviceResult;
use crate::link::DeviceLink;

/// A [`DeviceLink`] that records what drivers send and plays back scripted
/// replies. `recv` never waits: an empty script behaves like a timeout.
pub(crate) struct ScriptedLink {
    /// Everything sent, after the link's CR handling.
    pub sent: Vec<String>,
    replies: VecDeque<String>,
}

impl ScriptedLink {
    pub fn new() -> ScriptedLink {
        ScriptedLink {
            sent: Vec::new(),
            replies: VecDeque::new(),
        }
    }

    /// Queue a reply for a later `recv`.
    pub fn reply(mut self, line: &str) -> ScriptedLink {
        self.replies.push_back(line.to_string());
        self
    }
}

impl DeviceLink for ScriptedLink {
    fn send(&mut self, command: &str) -> DeviceResult<()> {
        self.sent.push(codec::ensure_cr(command));
        Ok(())
    }

    fn send_verbatim(&mut self, data: &str) -> DeviceResult<()> {
        self.sent.push(data.to_string());
        Ok(())
    }

    fn recv(&mut self, _timeout: Duration) -> Option<String> {
        self.replies.pop_front()
    }
}
