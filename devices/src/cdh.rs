//! The satellite's C&DH operating-system board.
//!
//! The board answers `$`-delimited query strings over its debug serial
//! port. Only the hello/liveness query is wired up so far.

use std::time::Duration;

use crate::error::DeviceResult;
use crate::link::DeviceLink;

/// Liveness query the board echoes an acknowledgement for.
pub const HELLO_QUERY: &str = "!QUERY,HELLO,A0$";

/// Driver for the C&DH board behind a [`DeviceLink`].
pub struct CdhBoard<L: DeviceLink> {
    link: L,
}

impl<L: DeviceLink> CdhBoard<L> {
    pub fn new(link: L) -> CdhBoard<L> {
        CdhBoard { link }
    }

    /// Send the hello/liveness query.
    pub fn send_hello(&mut self) -> DeviceResult<()> {
        self.link.send(HELLO_QUERY)
    }

    /// Wait for the board's next reply.
    pub fn recv(&mut self, timeout: Duration) -> Option<String> {
        self.link.recv(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedLink;

    #[test]
    fn test_hello_query() {
        let link = ScriptedLink::new().reply("!ACK,HELLO,A0");
        let mut board = CdhBoard::new(link);

        board.send_hello().unwrap();
        assert_eq!(board.link.sent, vec!["!QUERY,HELLO,A0$\r"]);
        assert_eq!(
            board.recv(Duration::from_secs(1)).as_deref(),
            Some("!ACK,HELLO,A0")
        );
    }
}
