//! Line framing for the ASCII instrument protocol.
//!
//! Both instruments speak the same wire format: one ASCII command per frame,
//! terminated by `"\r\n"`. A query is answered synchronously by one frame with
//! the same terminator.
//!
//! Framing is a pure function pair so it can be exercised without a device:
//!
//! ```
//! use labserial::protocol::LineFramer;
//!
//! let framer = LineFramer::crlf();
//! let frame = framer.encode("v1000").unwrap();
//! assert_eq!(frame, b"v1000\r\n");
//! assert_eq!(framer.decode(&frame).unwrap(), "v1000");
//! ```

use crate::error::{AppResult, DeviceError};

/// Terminator used by both the high-voltage controller and the load cell.
pub const CRLF: &str = "\r\n";

/// Delimiter framer: appends the terminator on encode, strips it on decode.
///
/// No escaping is performed, so a command containing the terminator cannot be
/// framed and is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineFramer {
    delimiter: &'static str,
}

impl LineFramer {
    /// Create a framer for an arbitrary non-empty terminator.
    pub const fn new(delimiter: &'static str) -> Self {
        Self { delimiter }
    }

    /// Framer for `"\r\n"` terminated lines.
    pub const fn crlf() -> Self {
        Self::new(CRLF)
    }

    /// Frame terminator as text.
    pub fn delimiter(&self) -> &'static str {
        self.delimiter
    }

    /// Terminator bytes, used by the reader to detect the end of a frame.
    pub fn delimiter_bytes(&self) -> &'static [u8] {
        self.delimiter.as_bytes()
    }

    /// Turn a command into a wire frame.
    pub fn encode(&self, command: &str) -> AppResult<Vec<u8>> {
        if command.contains(self.delimiter) {
            return Err(DeviceError::InvalidCommand(command.to_string()));
        }
        let mut frame = Vec::with_capacity(command.len() + self.delimiter.len());
        frame.extend_from_slice(command.as_bytes());
        frame.extend_from_slice(self.delimiter.as_bytes());
        Ok(frame)
    }

    /// Turn a received frame back into a response string.
    ///
    /// Exactly the terminator length is stripped; surrounding whitespace inside
    /// the payload is preserved.
    pub fn decode(&self, raw_line: &[u8]) -> AppResult<String> {
        let payload = raw_line
            .strip_suffix(self.delimiter_bytes())
            .ok_or_else(|| {
                DeviceError::InvalidResponse(format!(
                    "frame {:?} does not end with {:?}",
                    String::from_utf8_lossy(raw_line),
                    self.delimiter
                ))
            })?;
        String::from_utf8(payload.to_vec())
            .map_err(|e| DeviceError::InvalidResponse(format!("response is not UTF-8: {}", e)))
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::crlf()
    }
}

/// Encode with the shared `"\r\n"` terminator.
pub fn encode(command: &str) -> AppResult<Vec<u8>> {
    LineFramer::crlf().encode(command)
}

/// Decode with the shared `"\r\n"` terminator.
pub fn decode(raw_line: &[u8]) -> AppResult<String> {
    LineFramer::crlf().decode(raw_line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_crlf() {
        assert_eq!(encode("a").unwrap(), b"a\r\n".to_vec());
        assert_eq!(encode("").unwrap(), b"\r\n".to_vec());
    }

    #[test]
    fn test_decode_strips_only_the_terminator() {
        assert_eq!(decode(b" 12.5 \r\n").unwrap(), " 12.5 ");
        assert_eq!(decode(b"\r\n").unwrap(), "");
        // A lone '\r' before the terminator belongs to the payload
        assert_eq!(decode(b"ok\r\r\n").unwrap(), "ok\r");
    }

    #[test]
    fn test_round_trip_preserves_command() {
        for command in ["v1000", "f50 v200", "STOP", "µA?", "  padded  "] {
            assert_eq!(decode(&encode(command).unwrap()).unwrap(), command);
        }
    }

    #[test]
    fn test_embedded_delimiter_is_rejected() {
        let err = encode("v100\r\nv200").unwrap_err();
        assert!(matches!(err, DeviceError::InvalidCommand(_)));
        // Half a delimiter is not a frame boundary
        assert!(encode("v100\n").is_ok());
    }

    #[test]
    fn test_decode_requires_terminator() {
        assert!(matches!(
            decode(b"12.5"),
            Err(DeviceError::InvalidResponse(_))
        ));
        assert!(matches!(
            decode(b"12.5\n"),
            Err(DeviceError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let err = decode(&[0xff, 0xfe, b'\r', b'\n']).unwrap_err();
        assert!(err.to_string().contains("not UTF-8"));
    }

    #[test]
    fn test_custom_delimiter() {
        let framer = LineFramer::new("\n");
        assert_eq!(framer.encode("ID?").unwrap(), b"ID?\n".to_vec());
        assert_eq!(framer.decode(b"ESP300\n").unwrap(), "ESP300");
    }
}
