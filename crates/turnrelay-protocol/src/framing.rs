//! Newline-delimited record framing over TCP.
//!
//! TCP is a byte stream: one `read` may return half a record, or three
//! records at once. Every record on the wire is therefore terminated by
//! `\n` (a preceding `\r` is tolerated and stripped), and each connection
//! owns a [`LineFramer`] that accumulates bytes until complete records can
//! be handed to the codec.
//!
//! [`DEFAULT_MAX_RECORD_LEN`] bounds how much a peer can make the relay
//! buffer before sending a newline.

use crate::ProtocolError;

/// Longest accepted record, in bytes, excluding the newline.
pub const DEFAULT_MAX_RECORD_LEN: usize = 1024;

const DELIMITER: u8 = b'\n';

/// Appends the record delimiter, producing bytes ready for the socket.
pub fn frame(record: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(record.len() + 1);
    out.extend_from_slice(record);
    out.push(DELIMITER);
    out
}

/// Reassembles newline-terminated records from arbitrary read chunks.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_len: usize,
    /// Bytes before this offset are known not to contain a delimiter.
    scanned: usize,
    /// Set while skipping the tail of an oversized record.
    discarding: bool,
}

impl LineFramer {
    /// Creates a framer that rejects records longer than `max_len` bytes.
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
            scanned: 0,
            discarding: false,
        }
    }

    /// Appends bytes read from the socket.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the next complete record, without its delimiter.
    ///
    /// `None` means more bytes are needed. An oversized record yields one
    /// `Err(FrameTooLong)` once its terminating newline shows up; the bytes
    /// in between are dropped without being buffered. The limit applies to
    /// the record after a trailing `\r` is stripped. Empty lines are
    /// skipped.
    pub fn next_record(&mut self) -> Option<Result<Vec<u8>, ProtocolError>> {
        loop {
            let Some(offset) = self.buf[self.scanned..]
                .iter()
                .position(|&b| b == DELIMITER)
            else {
                // One byte of slack for a `\r` still waiting for its `\n`.
                if self.discarding || self.buf.len() > self.max_len.saturating_add(1) {
                    self.buf.clear();
                    self.scanned = 0;
                    self.discarding = true;
                } else {
                    self.scanned = self.buf.len();
                }
                return None;
            };

            let end = self.scanned + offset;
            let mut record: Vec<u8> = self.buf.drain(..=end).collect();
            self.scanned = 0;
            record.pop();

            let discarded = std::mem::take(&mut self.discarding);
            if record.last() == Some(&b'\r') {
                record.pop();
            }
            if discarded || record.len() > self.max_len {
                return Some(Err(ProtocolError::FrameTooLong {
                    limit: self.max_len,
                }));
            }
            if record.is_empty() {
                continue;
            }
            return Some(Ok(record));
        }
    }

    /// Number of bytes waiting for a delimiter.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORD_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(framer: &mut LineFramer) -> Vec<Result<Vec<u8>, ProtocolError>> {
        std::iter::from_fn(|| framer.next_record()).collect()
    }

    #[test]
    fn test_next_record_waits_for_delimiter() {
        let mut framer = LineFramer::default();
        framer.push(b"BEG");
        assert!(framer.next_record().is_none());
        framer.push(b"IN\n");
        assert_eq!(framer.next_record(), Some(Ok(b"BEGIN".to_vec())));
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_next_record_splits_coalesced_reads() {
        let mut framer = LineFramer::default();
        framer.push(b"BEGIN\n1:e2e4\n1:EN");

        assert_eq!(
            drain(&mut framer),
            vec![Ok(b"BEGIN".to_vec()), Ok(b"1:e2e4".to_vec())]
        );
        assert_eq!(framer.buffered(), 4);

        framer.push(b"D\n");
        assert_eq!(framer.next_record(), Some(Ok(b"1:END".to_vec())));
    }

    #[test]
    fn test_next_record_strips_carriage_return_and_skips_blank_lines() {
        let mut framer = LineFramer::default();
        framer.push(b"\r\n\n2:RECONNECT\r\n");
        assert_eq!(drain(&mut framer), vec![Ok(b"2:RECONNECT".to_vec())]);
    }

    #[test]
    fn test_next_record_rejects_oversized_record_once() {
        let mut framer = LineFramer::new(8);
        framer.push(b"1:aaaaaaaaaa");
        assert!(framer.next_record().is_none());
        // The tail is dropped, not buffered.
        framer.push(b"bbbbbbbbbbbbbbbb");
        assert!(framer.next_record().is_none());
        assert_eq!(framer.buffered(), 0);

        framer.push(b"cc\n1:e2e4\n");
        assert_eq!(
            drain(&mut framer),
            vec![
                Err(ProtocolError::FrameTooLong { limit: 8 }),
                Ok(b"1:e2e4".to_vec()),
            ]
        );
    }

    #[test]
    fn test_next_record_rejects_long_record_arriving_in_one_chunk() {
        let mut framer = LineFramer::new(4);
        framer.push(b"123456\nBEGIN\n");
        let records = drain(&mut framer);
        assert_eq!(records[0], Err(ProtocolError::FrameTooLong { limit: 4 }));
        // BEGIN is 5 bytes, also over the limit.
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_next_record_crlf_record_at_limit_is_accepted() {
        let mut framer = LineFramer::new(4);
        framer.push(b"abcd\r\n");
        assert_eq!(drain(&mut framer), vec![Ok(b"abcd".to_vec())]);

        // Same record with the newline in a later read.
        framer.push(b"abcd\r");
        assert!(framer.next_record().is_none());
        framer.push(b"\n");
        assert_eq!(drain(&mut framer), vec![Ok(b"abcd".to_vec())]);
    }

    #[test]
    fn test_next_record_crlf_record_over_limit_is_rejected() {
        let mut framer = LineFramer::new(4);
        framer.push(b"abcde\r\n");
        assert_eq!(
            drain(&mut framer),
            vec![Err(ProtocolError::FrameTooLong { limit: 4 })]
        );

        // Five bytes with no `\r` is over the limit too, even split.
        framer.push(b"abcde");
        assert!(framer.next_record().is_none());
        framer.push(b"\nabcd\n");
        assert_eq!(
            drain(&mut framer),
            vec![
                Err(ProtocolError::FrameTooLong { limit: 4 }),
                Ok(b"abcd".to_vec()),
            ]
        );
    }

    #[test]
    fn test_frame_appends_newline() {
        assert_eq!(frame(b"1:WHITE"), b"1:WHITE\n");
    }
}
