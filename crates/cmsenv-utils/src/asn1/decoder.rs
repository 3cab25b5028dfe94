//! ASN.1 DER decoder.

use super::{tags, Tag, TagClass, Tlv};
use cmsenv_types::CryptoError;

/// A streaming ASN.1 DER decoder over a borrowed slice.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Create a new decoder over the given data.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the remaining undecoded bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Returns true if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Parse the next TLV element.
    pub fn read_tlv(&mut self) -> Result<Tlv<'a>, CryptoError> {
        let start = self.pos;
        let (tag, tag_len) = Tag::from_bytes(&self.data[self.pos..])?;
        self.pos += tag_len;

        let length = self.read_length()?;
        let end = self
            .pos
            .checked_add(length)
            .ok_or(CryptoError::DecodeAsn1Fail)?;
        if end > self.data.len() {
            self.pos = start;
            return Err(CryptoError::DecodeAsn1Fail);
        }

        let value = &self.data[self.pos..end];
        self.pos = end;

        Ok(Tlv {
            tag,
            value,
            raw: &self.data[start..end],
        })
    }

    /// Parse a DER length. Indefinite and non-minimal forms are rejected.
    fn read_length(&mut self) -> Result<usize, CryptoError> {
        let first = *self
            .data
            .get(self.pos)
            .ok_or(CryptoError::DecodeAsn1Fail)?;
        self.pos += 1;

        if first < 0x80 {
            return Ok(first as usize);
        }
        if first == 0x80 {
            // Indefinite length is not valid in DER
            return Err(CryptoError::DecodeAsn1Fail);
        }
        let num_bytes = (first & 0x7F) as usize;
        if num_bytes > 4 || self.pos + num_bytes > self.data.len() {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        let bytes = &self.data[self.pos..self.pos + num_bytes];
        if bytes[0] == 0 {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        let length = bytes
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        if length < 0x80 {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        self.pos += num_bytes;
        Ok(length)
    }

    fn read_universal(&mut self, number: u32, constructed: bool) -> Result<Tlv<'a>, CryptoError> {
        let tlv = self.read_tlv()?;
        if tlv.tag.class != TagClass::Universal
            || tlv.tag.number != number
            || tlv.tag.constructed != constructed
        {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(tlv)
    }

    /// Read an INTEGER and return its bytes (big-endian, may include leading zero).
    pub fn read_integer(&mut self) -> Result<&'a [u8], CryptoError> {
        let tlv = self.read_universal(tags::INTEGER as u32, false)?;
        if tlv.value.is_empty() {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(tlv.value)
    }

    /// Read a non-negative INTEGER that fits in a `u32`.
    pub fn read_u32(&mut self) -> Result<u32, CryptoError> {
        let bytes = self.read_integer()?;
        if bytes[0] & 0x80 != 0 {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        let significant = match bytes {
            [0, rest @ ..] if !rest.is_empty() => rest,
            _ => bytes,
        };
        if significant.len() > 4 {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(significant
            .iter()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32))
    }

    /// Read an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<&'a [u8], CryptoError> {
        Ok(self.read_universal(tags::OCTET_STRING as u32, false)?.value)
    }

    /// Read a BIT STRING and return (unused_bits, data).
    pub fn read_bit_string(&mut self) -> Result<(u8, &'a [u8]), CryptoError> {
        let tlv = self.read_universal(tags::BIT_STRING as u32, false)?;
        match tlv.value.split_first() {
            Some((&unused, data)) if unused < 8 => Ok((unused, data)),
            _ => Err(CryptoError::DecodeAsn1Fail),
        }
    }

    /// Read an OID and return the raw value bytes.
    pub fn read_oid(&mut self) -> Result<&'a [u8], CryptoError> {
        Ok(self.read_universal(tags::OID as u32, false)?.value)
    }

    /// Read a NULL.
    pub fn read_null(&mut self) -> Result<(), CryptoError> {
        let tlv = self.read_universal(tags::NULL as u32, false)?;
        if !tlv.value.is_empty() {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(())
    }

    /// Read a SEQUENCE, returning a sub-decoder over its contents.
    pub fn read_sequence(&mut self) -> Result<Decoder<'a>, CryptoError> {
        Ok(Decoder::new(self.read_universal(0x10, true)?.value))
    }

    /// Read a SET, returning a sub-decoder over its contents.
    pub fn read_set(&mut self) -> Result<Decoder<'a>, CryptoError> {
        Ok(Decoder::new(self.read_universal(0x11, true)?.value))
    }

    /// Peek at the next tag without consuming it.
    pub fn peek_tag(&self) -> Result<Tag, CryptoError> {
        if self.is_empty() {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        let (tag, _) = Tag::from_bytes(&self.data[self.pos..])?;
        Ok(tag)
    }

    /// Read a context-specific tagged value with the expected tag number.
    pub fn read_context_specific(
        &mut self,
        tag_num: u32,
        constructed: bool,
    ) -> Result<Tlv<'a>, CryptoError> {
        let tlv = self.read_tlv()?;
        if tlv.tag.class != TagClass::ContextSpecific
            || tlv.tag.number != tag_num
            || tlv.tag.constructed != constructed
        {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        Ok(tlv)
    }

    /// Try to read a context-specific tagged value. Returns `None` if
    /// the next tag does not match, without consuming any bytes.
    pub fn try_read_context_specific(
        &mut self,
        tag_num: u32,
        constructed: bool,
    ) -> Result<Option<Tlv<'a>>, CryptoError> {
        if self.is_empty() {
            return Ok(None);
        }
        let tag = self.peek_tag()?;
        if tag.class == TagClass::ContextSpecific
            && tag.number == tag_num
            && tag.constructed == constructed
        {
            Ok(Some(self.read_tlv()?))
        } else {
            Ok(None)
        }
    }

    /// Read a context-specific tag of either form (BER allows an IMPLICIT
    /// OCTET STRING to be split into constructed fragments).
    pub fn try_read_context_any(&mut self, tag_num: u32) -> Result<Option<Tlv<'a>>, CryptoError> {
        if self.is_empty() {
            return Ok(None);
        }
        let tag = self.peek_tag()?;
        if tag.class == TagClass::ContextSpecific && tag.number == tag_num {
            Ok(Some(self.read_tlv()?))
        } else {
            Ok(None)
        }
    }

    /// Read a Time value (UTCTime or GeneralizedTime) as a UNIX timestamp.
    pub fn read_time(&mut self) -> Result<i64, CryptoError> {
        let tlv = self.read_tlv()?;
        if tlv.tag.class != TagClass::Universal {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        let s = core::str::from_utf8(tlv.value).map_err(|_| CryptoError::DecodeAsn1Fail)?;
        match tlv.tag.number {
            // UTCTime: YYMMDDHHMMSSZ
            0x17 => parse_utc_time(s),
            // GeneralizedTime: YYYYMMDDHHMMSSZ
            0x18 => parse_generalized_time(s),
            _ => Err(CryptoError::DecodeAsn1Fail),
        }
    }
}

fn digits(s: &str, range: core::ops::Range<usize>) -> Result<u32, CryptoError> {
    let part = s.get(range).ok_or(CryptoError::DecodeAsn1Fail)?;
    if !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CryptoError::DecodeAsn1Fail);
    }
    part.parse().map_err(|_| CryptoError::DecodeAsn1Fail)
}

/// Parse UTCTime string "YYMMDDHHMMSSZ" to UNIX timestamp.
/// RFC 5280: 00-49 → 2000-2049, 50-99 → 1950-1999.
fn parse_utc_time(s: &str) -> Result<i64, CryptoError> {
    let s = s.strip_suffix('Z').ok_or(CryptoError::DecodeAsn1Fail)?;
    if s.len() != 12 {
        return Err(CryptoError::DecodeAsn1Fail);
    }
    let yy = digits(s, 0..2)?;
    let year = if yy < 50 { 2000 + yy } else { 1900 + yy };
    datetime_to_unix(
        year,
        digits(s, 2..4)?,
        digits(s, 4..6)?,
        digits(s, 6..8)?,
        digits(s, 8..10)?,
        digits(s, 10..12)?,
    )
}

/// Parse GeneralizedTime string "YYYYMMDDHHMMSSZ" to UNIX timestamp.
fn parse_generalized_time(s: &str) -> Result<i64, CryptoError> {
    let s = s.strip_suffix('Z').ok_or(CryptoError::DecodeAsn1Fail)?;
    if s.len() != 14 {
        return Err(CryptoError::DecodeAsn1Fail);
    }
    datetime_to_unix(
        digits(s, 0..4)?,
        digits(s, 4..6)?,
        digits(s, 6..8)?,
        digits(s, 8..10)?,
        digits(s, 10..12)?,
        digits(s, 12..14)?,
    )
}

/// Convert a date-time to a UNIX timestamp (seconds since 1970-01-01 00:00:00 UTC).
fn datetime_to_unix(
    year: u32,
    month: u32,
    day: u32,
    hour: u32,
    min: u32,
    sec: u32,
) -> Result<i64, CryptoError> {
    if year == 0
        || !(1..=12).contains(&month)
        || !(1..=31).contains(&day)
        || hour > 23
        || min > 59
        || sec > 59
    {
        return Err(CryptoError::DecodeAsn1Fail);
    }
    // Days from year 0 to the start of the given year (Gregorian)
    let (y, m) = if month <= 2 {
        (year as i64 - 1, month as i64 + 9)
    } else {
        (year as i64, month as i64 - 3)
    };
    let days = 365 * y + y / 4 - y / 100 + y / 400 + (m * 306 + 5) / 10 + (day as i64 - 1)
        - 719468; // offset so epoch = 1970-01-01
    Ok(days * 86400 + hour as i64 * 3600 + min as i64 * 60 + sec as i64)
}
