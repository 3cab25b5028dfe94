//! Incremental decoding of one top-level BER/DER element.
//!
//! Input may arrive in arbitrarily small pieces. The decoder keeps an owned
//! buffer of everything fed so far and, after every feed, rescans that
//! buffer from the start. The scan only reads headers and descends only
//! into indefinite-length elements, so no partial-parse state is carried
//! between calls and feeding byte-at-a-time gives the same result as one
//! call with the whole input.

use super::ber::{self, parse_header};
use super::DEFAULT_MAX_DEPTH;
use cmsenv_types::CryptoError;
use zeroize::Zeroize;

/// Default bound on buffered input (16 MiB).
pub const DEFAULT_MAX_STREAM_LEN: usize = 16 * 1024 * 1024;

/// Outcome of a successful feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// The element is incomplete; all of the fed bytes were buffered.
    NeedMoreInput { consumed: usize },
    /// The element is complete. `der` is its DER normalization and
    /// `consumed` counts the bytes of this call that belonged to it.
    Complete { der: Vec<u8>, consumed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Accumulating,
    Complete,
    Failed,
}

enum Scan {
    Incomplete,
    Complete(usize),
}

/// Owned state for decoding one element across several feeds.
#[derive(Debug)]
pub struct StreamDecoder {
    buf: Vec<u8>,
    state: State,
    max_len: usize,
    max_depth: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_STREAM_LEN, DEFAULT_MAX_DEPTH)
    }

    /// Create a decoder that fails once the element would exceed `max_len`
    /// bytes or nest deeper than `max_depth`.
    pub fn with_limits(max_len: usize, max_depth: usize) -> Self {
        Self {
            buf: Vec::new(),
            state: State::Accumulating,
            max_len,
            max_depth,
        }
    }

    /// Bytes buffered so far.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    pub fn is_failed(&self) -> bool {
        self.state == State::Failed
    }

    /// Discard all buffered input and start over.
    pub fn reset(&mut self) {
        self.buf.zeroize();
        self.buf.clear();
        self.state = State::Accumulating;
    }

    /// Feed the next piece of input.
    ///
    /// Any error is terminal: later feeds return `DecoderTerminated` until
    /// [`StreamDecoder::reset`] is called. The same holds after `Complete`.
    pub fn feed(&mut self, input: &[u8]) -> Result<StreamStatus, CryptoError> {
        if self.state != State::Accumulating {
            return Err(CryptoError::DecoderTerminated);
        }
        match self.advance(input) {
            Ok(status) => Ok(status),
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    fn advance(&mut self, input: &[u8]) -> Result<StreamStatus, CryptoError> {
        let before = self.buf.len();
        self.buf.extend_from_slice(input);

        match scan(&self.buf, 0, self.max_depth, Some(self.max_len))? {
            Scan::Incomplete => {
                if self.buf.len() > self.max_len {
                    return Err(CryptoError::InputOverflow);
                }
                Ok(StreamStatus::NeedMoreInput {
                    consumed: input.len(),
                })
            }
            Scan::Complete(end) => {
                if end > self.max_len {
                    return Err(CryptoError::InputOverflow);
                }
                self.buf.truncate(end);
                let (der, used) = ber::ber_to_der(&self.buf, self.max_depth)?;
                if used != end {
                    return Err(CryptoError::DecodeAsn1Fail);
                }
                self.state = State::Complete;
                Ok(StreamStatus::Complete {
                    der,
                    consumed: end - before,
                })
            }
        }
    }

    fn fail(&mut self) {
        self.buf.zeroize();
        self.buf.clear();
        self.state = State::Failed;
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamDecoder {
    fn drop(&mut self) {
        self.buf.zeroize();
    }
}

/// Locate the end of the element starting at `pos`, if it is fully buffered.
fn scan(
    buf: &[u8],
    pos: usize,
    depth: usize,
    max_len: Option<usize>,
) -> Result<Scan, CryptoError> {
    if depth == 0 {
        return Err(CryptoError::Asn1TooDeep);
    }
    let Some(hdr) = parse_header(&buf[pos..])? else {
        return Ok(Scan::Incomplete);
    };
    let body = pos + hdr.header_len;
    match hdr.length {
        Some(len) => {
            let end = body.checked_add(len).ok_or(CryptoError::InputOverflow)?;
            if max_len.is_some_and(|max| end > max) {
                return Err(CryptoError::InputOverflow);
            }
            if end > buf.len() {
                Ok(Scan::Incomplete)
            } else {
                Ok(Scan::Complete(end))
            }
        }
        None => {
            let mut p = body;
            loop {
                match &buf[p..] {
                    [] | [0x00] => return Ok(Scan::Incomplete),
                    [0x00, 0x00, ..] => return Ok(Scan::Complete(p + 2)),
                    [0x00, _, ..] => return Err(CryptoError::DecodeAsn1Fail),
                    _ => match scan(buf, p, depth - 1, None)? {
                        Scan::Incomplete => return Ok(Scan::Incomplete),
                        Scan::Complete(end) => p = end,
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_bytewise(input: &[u8]) -> Result<(Vec<u8>, usize), CryptoError> {
        let mut dec = StreamDecoder::new();
        let mut total = 0;
        for b in input {
            match dec.feed(std::slice::from_ref(b))? {
                StreamStatus::NeedMoreInput { consumed } => total += consumed,
                StreamStatus::Complete { der, consumed } => return Ok((der, total + consumed)),
            }
        }
        Err(CryptoError::DecodeAsn1Fail)
    }

    #[test]
    fn test_single_call_complete() {
        let der = [0x30, 0x03, 0x02, 0x01, 0x07];
        let mut dec = StreamDecoder::new();
        match dec.feed(&der).unwrap() {
            StreamStatus::Complete { der: out, consumed } => {
                assert_eq!(out, der);
                assert_eq!(consumed, 5);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(dec.is_complete());
        assert_eq!(
            dec.feed(&[0x00]).unwrap_err(),
            CryptoError::DecoderTerminated
        );
    }

    #[test]
    fn test_bytewise_matches_single_call() {
        let ber = [
            0x30, 0x80, 0x24, 0x80, 0x04, 0x01, 0xAA, 0x04, 0x01, 0xBB, 0x00, 0x00, 0x02, 0x01,
            0x01, 0x00, 0x00,
        ];
        let (bytewise, consumed) = feed_bytewise(&ber).unwrap();
        let mut dec = StreamDecoder::new();
        let StreamStatus::Complete { der, .. } = dec.feed(&ber).unwrap() else {
            panic!("expected complete");
        };
        assert_eq!(bytewise, der);
        assert_eq!(consumed, ber.len());
        assert_eq!(der, [0x30, 0x07, 0x04, 0x02, 0xAA, 0xBB, 0x02, 0x01, 0x01]);
    }

    #[test]
    fn test_trailing_bytes_not_consumed() {
        let mut dec = StreamDecoder::new();
        let status = dec.feed(&[0x04, 0x01, 0xAA, 0xDE, 0xAD]).unwrap();
        assert_eq!(
            status,
            StreamStatus::Complete {
                der: vec![0x04, 0x01, 0xAA],
                consumed: 3
            }
        );
    }

    #[test]
    fn test_need_more_is_not_failure() {
        let mut dec = StreamDecoder::new();
        assert_eq!(
            dec.feed(&[0x30, 0x82]).unwrap(),
            StreamStatus::NeedMoreInput { consumed: 2 }
        );
        assert!(!dec.is_failed());
        assert_eq!(dec.buffered(), 2);
    }

    #[test]
    fn test_error_is_terminal() {
        let mut dec = StreamDecoder::new();
        // five length octets
        assert_eq!(
            dec.feed(&[0x04, 0x85]).unwrap_err(),
            CryptoError::DecodeAsn1Fail
        );
        assert!(dec.is_failed());
        assert_eq!(
            dec.feed(&[0x00]).unwrap_err(),
            CryptoError::DecoderTerminated
        );
        dec.reset();
        assert!(dec.feed(&[0x05, 0x00]).is_ok());
    }

    #[test]
    fn test_length_limit() {
        let mut dec = StreamDecoder::with_limits(16, DEFAULT_MAX_DEPTH);
        assert_eq!(
            dec.feed(&[0x04, 0x82, 0x01, 0x00]).unwrap_err(),
            CryptoError::InputOverflow
        );
    }

    #[test]
    fn test_malformed_nested_detected_on_completion() {
        // SEQUENCE { 02 05 01 } : inner length overruns the outer body
        let mut dec = StreamDecoder::new();
        assert!(dec.feed(&[0x30, 0x03, 0x02, 0x05, 0x01]).is_err());
        assert!(dec.is_failed());
    }
}
