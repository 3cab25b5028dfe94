//! ASN.1 DER/BER encoding and decoding.

mod ber;
mod decoder;
mod encoder;
mod stream;
mod tag;

pub use ber::ber_to_der;
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use stream::{StreamDecoder, StreamStatus};

use cmsenv_types::CryptoError;

/// Default bound on constructed-element nesting for BER and stream scanning.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// ASN.1 tag constants.
pub mod tags {
    pub const BOOLEAN: u8 = 0x01;
    pub const INTEGER: u8 = 0x02;
    pub const BIT_STRING: u8 = 0x03;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OID: u8 = 0x06;
    pub const UTF8_STRING: u8 = 0x0C;
    pub const SEQUENCE: u8 = 0x30;
    pub const SET: u8 = 0x31;
    pub const UTC_TIME: u8 = 0x17;
    pub const GENERALIZED_TIME: u8 = 0x18;
    pub const CONTEXT_SPECIFIC: u8 = 0x80;
    pub const CONSTRUCTED: u8 = 0x20;
}

/// Represents a parsed ASN.1 tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub class: TagClass,
    pub constructed: bool,
    pub number: u32,
}

/// ASN.1 tag class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

/// A borrowed ASN.1 TLV element.
#[derive(Debug, Clone)]
pub struct Tlv<'a> {
    pub tag: Tag,
    pub value: &'a [u8],
    /// The complete encoding (tag, length and value).
    pub raw: &'a [u8],
}

/// Copy an encoding into a caller buffer.
///
/// With `out == None` only the required length is returned. A short buffer
/// yields `BufferTooSmall` and is left untouched.
pub fn copy_out(der: &[u8], out: Option<&mut [u8]>) -> Result<usize, CryptoError> {
    match out {
        None => Ok(der.len()),
        Some(buf) if buf.len() < der.len() => Err(CryptoError::BufferTooSmall {
            need: der.len(),
            got: buf.len(),
        }),
        Some(buf) => {
            buf[..der.len()].copy_from_slice(der);
            Ok(der.len())
        }
    }
}
