//! BER → DER normalization.
//!
//! Indefinite-length constructed encodings (length octet 0x80, closed by an
//! end-of-contents `00 00`) are rewritten with definite lengths, and
//! constructed OCTET STRINGs are flattened into a single primitive OCTET
//! STRING. Non-minimal definite lengths are re-encoded minimally.

use super::encoder::write_length;
use super::{tags, Tag, TagClass};
use cmsenv_types::CryptoError;

/// A parsed TLV header.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub tag: Tag,
    /// Bytes occupied by the tag octets.
    pub tag_len: usize,
    /// Tag and length octets together.
    pub header_len: usize,
    /// `None` for the indefinite form.
    pub length: Option<usize>,
}

/// Parse a BER header at the start of `input`.
///
/// Returns `Ok(None)` if `input` ends before the header does.
pub(crate) fn parse_header(input: &[u8]) -> Result<Option<Header>, CryptoError> {
    let Some((tag, tag_len)) = Tag::try_from_prefix(input)? else {
        return Ok(None);
    };
    let Some(&first) = input.get(tag_len) else {
        return Ok(None);
    };
    if first < 0x80 {
        return Ok(Some(Header {
            tag,
            tag_len,
            header_len: tag_len + 1,
            length: Some(first as usize),
        }));
    }
    if first == 0x80 {
        if !tag.constructed {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        return Ok(Some(Header {
            tag,
            tag_len,
            header_len: tag_len + 1,
            length: None,
        }));
    }
    let num_bytes = (first & 0x7F) as usize;
    if num_bytes > 4 {
        return Err(CryptoError::DecodeAsn1Fail);
    }
    let start = tag_len + 1;
    let Some(bytes) = input.get(start..start + num_bytes) else {
        return Ok(None);
    };
    let length = bytes
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Ok(Some(Header {
        tag,
        tag_len,
        header_len: start + num_bytes,
        length: Some(length),
    }))
}

fn is_end_of_contents(input: &[u8]) -> Result<bool, CryptoError> {
    match input {
        [0x00, 0x00, ..] => Ok(true),
        // Tag 0 is reserved for end-of-contents
        [0x00, _, ..] => Err(CryptoError::DecodeAsn1Fail),
        _ => Ok(false),
    }
}

/// Convert one BER element at the start of `input` to DER.
///
/// Returns the DER encoding and the number of input bytes the element
/// occupied. Trailing bytes after the element are ignored.
pub fn ber_to_der(input: &[u8], max_depth: usize) -> Result<(Vec<u8>, usize), CryptoError> {
    let mut out = Vec::with_capacity(input.len());
    let consumed = convert(input, 0, max_depth, &mut out)?;
    Ok((out, consumed))
}

fn convert(
    input: &[u8],
    depth: usize,
    max_depth: usize,
    out: &mut Vec<u8>,
) -> Result<usize, CryptoError> {
    if depth > max_depth {
        return Err(CryptoError::Asn1TooDeep);
    }
    let hdr = parse_header(input)?.ok_or(CryptoError::DecodeAsn1Fail)?;
    let tag_bytes = &input[..hdr.tag_len];

    if !hdr.tag.constructed {
        let len = hdr.length.ok_or(CryptoError::DecodeAsn1Fail)?;
        let end = hdr
            .header_len
            .checked_add(len)
            .ok_or(CryptoError::DecodeAsn1Fail)?;
        let value = input
            .get(hdr.header_len..end)
            .ok_or(CryptoError::DecodeAsn1Fail)?;
        out.extend_from_slice(tag_bytes);
        write_length(out, value.len());
        out.extend_from_slice(value);
        return Ok(end);
    }

    let flatten = hdr.tag.class == TagClass::Universal
        && hdr.tag.number == tags::OCTET_STRING as u32;

    let mut children = Vec::new();
    let consumed = match hdr.length {
        Some(len) => {
            let end = hdr
                .header_len
                .checked_add(len)
                .ok_or(CryptoError::DecodeAsn1Fail)?;
            let body = input
                .get(hdr.header_len..end)
                .ok_or(CryptoError::DecodeAsn1Fail)?;
            let mut pos = 0;
            while pos < body.len() {
                pos += convert(&body[pos..], depth + 1, max_depth, &mut children)?;
            }
            end
        }
        None => {
            let mut pos = hdr.header_len;
            loop {
                let rest = input.get(pos..).ok_or(CryptoError::DecodeAsn1Fail)?;
                if rest.len() < 2 {
                    return Err(CryptoError::DecodeAsn1Fail);
                }
                if is_end_of_contents(rest)? {
                    break pos + 2;
                }
                pos += convert(rest, depth + 1, max_depth, &mut children)?;
            }
        }
    };

    if flatten {
        let value = flatten_octet_fragments(&children)?;
        out.push(tags::OCTET_STRING);
        write_length(out, value.len());
        out.extend_from_slice(&value);
    } else {
        out.extend_from_slice(tag_bytes);
        write_length(out, children.len());
        out.extend_from_slice(&children);
    }
    Ok(consumed)
}

/// Concatenate the values of already-normalized OCTET STRING fragments.
fn flatten_octet_fragments(der: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut dec = super::Decoder::new(der);
    let mut value = Vec::with_capacity(der.len());
    while !dec.is_empty() {
        value.extend_from_slice(dec.read_octet_string()?);
    }
    Ok(value)
}
