//! ASN.1 tag parsing and encoding.

use super::{Tag, TagClass};
use cmsenv_types::CryptoError;

impl Tag {
    /// Parse a tag from the first bytes of `input`.
    /// Returns the tag and number of bytes consumed.
    pub fn from_bytes(input: &[u8]) -> Result<(Self, usize), CryptoError> {
        Self::try_from_prefix(input)?.ok_or(CryptoError::DecodeAsn1Fail)
    }

    /// Like [`Tag::from_bytes`], but returns `Ok(None)` when `input` ends
    /// before the tag does.
    pub fn try_from_prefix(input: &[u8]) -> Result<Option<(Self, usize)>, CryptoError> {
        let Some(&first) = input.first() else {
            return Ok(None);
        };
        let class = match first >> 6 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        };
        let constructed = (first & 0x20) != 0;

        let low_bits = first & 0x1F;
        if low_bits < 0x1F {
            return Ok(Some((
                Tag {
                    class,
                    constructed,
                    number: low_bits as u32,
                },
                1,
            )));
        }

        // Long form tag number
        let mut number: u32 = 0;
        let mut i = 1;
        loop {
            let Some(&byte) = input.get(i) else {
                return Ok(None);
            };
            if i == 1 && byte == 0x80 {
                // Leading zero septet
                return Err(CryptoError::DecodeAsn1Fail);
            }
            if number > (u32::MAX >> 7) {
                return Err(CryptoError::DecodeAsn1Fail);
            }
            number = (number << 7) | (byte & 0x7F) as u32;
            i += 1;
            if (byte & 0x80) == 0 {
                break;
            }
        }
        Ok(Some((
            Tag {
                class,
                constructed,
                number,
            },
            i,
        )))
    }

    /// Encode this tag to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let class_bits = match self.class {
            TagClass::Universal => 0x00,
            TagClass::Application => 0x40,
            TagClass::ContextSpecific => 0x80,
            TagClass::Private => 0xC0,
        };
        let constructed_bit = if self.constructed { 0x20 } else { 0x00 };

        if self.number < 0x1F {
            return vec![class_bits | constructed_bit | (self.number as u8)];
        }
        let mut result = vec![class_bits | constructed_bit | 0x1F];
        let mut septets = Vec::new();
        let mut num = self.number;
        while num > 0 {
            septets.push((num & 0x7F) as u8);
            num >>= 7;
        }
        let last = septets.len() - 1;
        for (i, b) in septets.iter().rev().enumerate() {
            result.push(if i < last { b | 0x80 } else { *b });
        }
        result
    }

    /// Single-byte form of a low-numbered tag, as used by the tag constants.
    pub fn to_byte(&self) -> Option<u8> {
        match self.to_bytes().as_slice() {
            [b] => Some(*b),
            _ => None,
        }
    }
}
