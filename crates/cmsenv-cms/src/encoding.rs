//! Shared ASN.1 encoding helpers for the CMS crate.
//!
//! These functions wrap `cmsenv_utils::asn1::Encoder` to produce DER-encoded
//! ASN.1 primitives for the envelope and recipient-info modules.

use cmsenv_utils::asn1::{tags, Encoder};

/// Encode a SEQUENCE containing `content`.
pub(crate) fn enc_seq(content: &[u8]) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_sequence(content);
    e.finish()
}

/// Encode a SET OF the given element encodings, sorted per DER.
pub(crate) fn enc_set_of<T: AsRef<[u8]>>(elements: &[T]) -> Vec<u8> {
    enc_tagged_set_of(tags::SET, elements)
}

/// Encode a DER SET OF under an arbitrary (usually IMPLICIT) tag.
pub(crate) fn enc_tagged_set_of<T: AsRef<[u8]>>(tag: u8, elements: &[T]) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_set_of(tag, elements);
    e.finish()
}

/// Encode an OCTET STRING.
pub(crate) fn enc_octet(content: &[u8]) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_octet_string(content);
    e.finish()
}

/// Encode an OID from its DER value bytes.
pub(crate) fn enc_oid(oid_bytes: &[u8]) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_oid(oid_bytes);
    e.finish()
}

/// Encode a small non-negative INTEGER.
pub(crate) fn enc_u32(value: u32) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_u32(value);
    e.finish()
}

/// Encode an INTEGER from big-endian bytes.
pub(crate) fn enc_int(value: &[u8]) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_integer(value);
    e.finish()
}

/// Encode a NULL value.
pub(crate) fn enc_null() -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_null();
    e.finish()
}

/// Encode a raw TLV (Tag-Length-Value).
pub(crate) fn enc_tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_tlv(tag, value);
    e.finish()
}

/// Encode an EXPLICIT context-specific tagged value.
pub(crate) fn enc_explicit_ctx(tag_num: u8, content: &[u8]) -> Vec<u8> {
    enc_tlv(
        tags::CONTEXT_SPECIFIC | tags::CONSTRUCTED | tag_num,
        content,
    )
}

/// Encode an IMPLICIT context-specific primitive value.
pub(crate) fn enc_implicit_ctx(tag_num: u8, value: &[u8]) -> Vec<u8> {
    enc_tlv(tags::CONTEXT_SPECIFIC | tag_num, value)
}

/// Encode a GeneralizedTime from a UNIX timestamp.
pub(crate) fn enc_generalized_time(timestamp: i64) -> Vec<u8> {
    let mut e = Encoder::new();
    e.write_generalized_time(timestamp);
    e.finish()
}

/// Replace the identifier octet of a single-byte-tag encoding.
///
/// Used for IMPLICIT tagging of a SEQUENCE-shaped encoding, and to rebuild
/// the `SET OF` encoding of authenticated attributes received under `[1]`.
pub(crate) fn retag(mut der: Vec<u8>, tag: u8) -> Vec<u8> {
    if let Some(first) = der.first_mut() {
        *first = tag;
    }
    der
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_of_is_sorted() {
        let a = enc_octet(&[0x02]);
        let b = enc_octet(&[0x01]);
        assert_eq!(
            enc_set_of(&[a, b]),
            [0x31, 0x06, 0x04, 0x01, 0x01, 0x04, 0x01, 0x02]
        );
    }

    #[test]
    fn test_retag_and_ctx() {
        let seq = enc_seq(&enc_null());
        assert_eq!(retag(seq, 0xA2), [0xA2, 0x02, 0x05, 0x00]);
        assert_eq!(enc_explicit_ctx(1, &enc_u32(3)), [0xA1, 0x03, 0x02, 0x01, 0x03]);
        assert_eq!(enc_implicit_ctx(0, &[0xAB]), [0x80, 0x01, 0xAB]);
    }

    #[test]
    fn test_int_encoding() {
        assert_eq!(enc_int(&[0x00, 0x81]), [0x02, 0x02, 0x00, 0x81]);
        assert_eq!(enc_u32(4), [0x02, 0x01, 0x04]);
    }
}
