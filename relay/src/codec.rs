//! Wire framing between relay clients and the relay server.
//!
//! A frame is a single line of text: the first character is the target serial
//! port digit (`0`-`9`), the remainder is the payload, and the line is
//! terminated by `\n`. On the return path (server to client) the payload is
//! sent bare, without a port prefix, since a session already knows which port
//! it last wrote to.
//!
//! On the server-to-device leg every payload is carriage-return terminated:
//! both the Yaesu GS-232A rotator protocol and the radio terminal protocol
//! require a `\r` terminator. [`ensure_cr`] appends one if not already
//! present, and never doubles it.

use crate::error::{RelayError, RelayResult};

/// One decoded client frame: the target serial port and the payload for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Target serial port digit, always in `0..=9`.
    pub target_port: u8,
    /// Payload with the line terminator stripped.
    pub payload: String,
}

/// Encode a frame for the client-to-server leg.
///
/// Produces `"<port-digit><payload>\n"`. Fails if `target_port` is not a
/// single digit.
pub fn encode(target_port: u8, payload: &str) -> RelayResult<String> {
    if target_port > 9 {
        return Err(RelayError::Frame(format!(
            "port {target_port} is not a single digit"
        )));
    }

    Ok(format!("{target_port}{payload}\n"))
}

/// Decode one line received from a client into a [`RawFrame`].
///
/// The first character must be a decimal digit naming the target port; the
/// remainder, with a trailing `\r\n` or `\n` stripped, is the payload.
pub fn decode(line: &str) -> RelayResult<RawFrame> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    let mut chars = line.chars();
    let port = match chars.next() {
        Some(c @ '0'..='9') => c as u8 - b'0',
        Some(c) => {
            return Err(RelayError::Frame(format!(
                "message without serial destination (leading {c:?})"
            )))
        }
        None => return Err(RelayError::Frame("empty message".to_string())),
    };

    Ok(RawFrame {
        target_port: port,
        payload: chars.as_str().to_string(),
    })
}

/// Ensure a payload carries a single trailing carriage return.
///
/// Used on the server-to-device leg; the `\r` is added if missing and never
/// doubled.
pub fn ensure_cr(payload: &str) -> String {
    if payload.ends_with('\r') {
        payload.to_string()
    } else {
        format!("{payload}\r")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_every_port() {
        for port in 0..=9u8 {
            let line = encode(port, "W087 045").unwrap();
            let frame = decode(&line).unwrap();
            assert_eq!(frame.target_port, port);
            assert_eq!(frame.payload, "W087 045");
        }
    }

    #[test]
    fn test_encode_rejects_multi_digit_port() {
        assert!(encode(10, "payload").is_err());
    }

    #[test]
    fn test_decode_strips_crlf() {
        let frame = decode("3C2\r\n").unwrap();
        assert_eq!(frame.target_port, 3);
        assert_eq!(frame.payload, "C2");

        let frame = decode("3C2\n").unwrap();
        assert_eq!(frame.payload, "C2");
    }

    #[test]
    fn test_decode_empty_payload() {
        let frame = decode("7\n").unwrap();
        assert_eq!(frame.target_port, 7);
        assert_eq!(frame.payload, "");
    }

    #[test]
    fn test_decode_rejects_non_digit_destination() {
        assert!(decode("xW087 045\n").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn test_ensure_cr_appends_once() {
        assert_eq!(ensure_cr("W087 045"), "W087 045\r");
        assert_eq!(ensure_cr("W087 045\r"), "W087 045\r");
        assert_eq!(ensure_cr(""), "\r");
    }
}
