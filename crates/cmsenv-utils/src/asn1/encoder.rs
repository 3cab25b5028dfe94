//! ASN.1 DER encoder.

use super::tags;

/// A builder for constructing DER-encoded ASN.1 data.
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Consume the encoder and return the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write a raw TLV with the given tag byte and value.
    pub fn write_tlv(&mut self, tag: u8, value: &[u8]) -> &mut Self {
        self.buf.push(tag);
        write_length(&mut self.buf, value.len());
        self.buf.extend_from_slice(value);
        self
    }

    /// Write an INTEGER value.
    pub fn write_integer(&mut self, value: &[u8]) -> &mut Self {
        // Strip redundant leading zeros, keep the value positive.
        let mut v = value;
        while v.len() > 1 && v[0] == 0 && v[1] & 0x80 == 0 {
            v = &v[1..];
        }
        if v.is_empty() {
            return self.write_tlv(tags::INTEGER, &[0]);
        }
        if v[0] & 0x80 != 0 {
            let mut padded = Vec::with_capacity(v.len() + 1);
            padded.push(0x00);
            padded.extend_from_slice(v);
            self.write_tlv(tags::INTEGER, &padded)
        } else {
            self.write_tlv(tags::INTEGER, v)
        }
    }

    /// Write a small non-negative INTEGER.
    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.write_integer(&value.to_be_bytes())
    }

    /// Write an OCTET STRING.
    pub fn write_octet_string(&mut self, value: &[u8]) -> &mut Self {
        self.write_tlv(tags::OCTET_STRING, value)
    }

    /// Write a BIT STRING with the given unused_bits count.
    pub fn write_bit_string(&mut self, unused_bits: u8, value: &[u8]) -> &mut Self {
        let mut content = Vec::with_capacity(value.len() + 1);
        content.push(unused_bits);
        content.extend_from_slice(value);
        self.write_tlv(tags::BIT_STRING, &content)
    }

    /// Write an OID from raw encoded bytes.
    pub fn write_oid(&mut self, oid_bytes: &[u8]) -> &mut Self {
        self.write_tlv(tags::OID, oid_bytes)
    }

    /// Write a NULL.
    pub fn write_null(&mut self) -> &mut Self {
        self.buf.push(tags::NULL);
        self.buf.push(0x00);
        self
    }

    /// Write a SEQUENCE wrapping the given contents.
    pub fn write_sequence(&mut self, contents: &[u8]) -> &mut Self {
        self.write_tlv(tags::SEQUENCE, contents)
    }

    /// Write a SET wrapping the given contents.
    pub fn write_set(&mut self, contents: &[u8]) -> &mut Self {
        self.write_tlv(tags::SET, contents)
    }

    /// Write a DER SET OF: elements are sorted by their encodings
    /// (X.690 §11.6) under the given tag byte.
    pub fn write_set_of<T: AsRef<[u8]>>(&mut self, tag: u8, elements: &[T]) -> &mut Self {
        let mut sorted: Vec<&[u8]> = elements.iter().map(|e| e.as_ref()).collect();
        sorted.sort_unstable();
        let contents: Vec<u8> = sorted.concat();
        self.write_tlv(tag, &contents)
    }

    /// Write raw bytes directly (already DER-encoded).
    pub fn write_raw(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Write a UTF8String (tag 0x0C).
    pub fn write_utf8_string(&mut self, s: &str) -> &mut Self {
        self.write_tlv(tags::UTF8_STRING, s.as_bytes())
    }

    /// Write a context-specific tagged value.
    pub fn write_context_specific(
        &mut self,
        tag_num: u8,
        constructed: bool,
        content: &[u8],
    ) -> &mut Self {
        let tag = tags::CONTEXT_SPECIFIC
            | (if constructed { tags::CONSTRUCTED } else { 0 })
            | (tag_num & 0x1F);
        self.write_tlv(tag, content)
    }

    /// Write a GeneralizedTime (tag 0x18) from a UNIX timestamp.
    /// Format: YYYYMMDDHHmmSSZ.
    pub fn write_generalized_time(&mut self, timestamp: i64) -> &mut Self {
        let s = unix_to_generalized_time(timestamp);
        self.write_tlv(tags::GENERALIZED_TIME, s.as_bytes())
    }
}

/// Append a minimal DER length encoding.
pub(crate) fn write_length(buf: &mut Vec<u8>, length: usize) {
    if length < 0x80 {
        buf.push(length as u8);
        return;
    }
    let bytes = (length as u64).to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    buf.push(0x80 | (bytes.len() - skip) as u8);
    buf.extend_from_slice(&bytes[skip..]);
}

/// Convert a UNIX timestamp to date-time components.
fn unix_to_datetime(timestamp: i64) -> (i64, u32, u32, u32, u32, u32) {
    let days = timestamp.div_euclid(86400);
    let day_secs = timestamp.rem_euclid(86400) as u32;
    let hour = day_secs / 3600;
    let minute = (day_secs % 3600) / 60;
    let second = day_secs % 60;

    // Civil date from days since epoch (algorithm from Howard Hinnant)
    let z = days + 719468;
    let era = z.div_euclid(146097);
    let doe = z.rem_euclid(146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if m <= 2 { y + 1 } else { y };

    (year, m, d, hour, minute, second)
}

/// Format a UNIX timestamp as GeneralizedTime string "YYYYMMDDHHmmSSZ".
fn unix_to_generalized_time(timestamp: i64) -> String {
    let (year, month, day, hour, minute, second) = unix_to_datetime(timestamp);
    format!("{year:04}{month:02}{day:02}{hour:02}{minute:02}{second:02}Z")
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::Decoder;

    #[test]
    fn test_minimal_lengths() {
        let mut buf = Vec::new();
        write_length(&mut buf, 0x7F);
        assert_eq!(buf, [0x7F]);
        buf.clear();
        write_length(&mut buf, 0x80);
        assert_eq!(buf, [0x81, 0x80]);
        buf.clear();
        write_length(&mut buf, 0x1234);
        assert_eq!(buf, [0x82, 0x12, 0x34]);
        buf.clear();
        write_length(&mut buf, 0x01_0000);
        assert_eq!(buf, [0x83, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_write_integer_normalizes() {
        let mut enc = Encoder::new();
        enc.write_integer(&[0x00, 0x00, 0x05]);
        enc.write_integer(&[0x80]);
        enc.write_u32(0);
        enc.write_u32(300);
        assert_eq!(
            enc.finish(),
            [0x02, 1, 0x05, 0x02, 2, 0x00, 0x80, 0x02, 1, 0x00, 0x02, 2, 0x01, 0x2C]
        );
    }

    #[test]
    fn test_write_set_of_sorts() {
        let a = [0x04, 0x01, 0x02];
        let b = [0x04, 0x01, 0x01];
        let mut enc = Encoder::new();
        enc.write_set_of(tags::SET, &[a.to_vec(), b.to_vec()]);
        assert_eq!(enc.finish(), [0x31, 6, 0x04, 1, 0x01, 0x04, 1, 0x02]);
    }

    #[test]
    fn test_write_context_specific() {
        let mut inner = Encoder::new();
        inner.write_integer(&[0x02]);
        let inner_der = inner.finish();
        let mut enc = Encoder::new();
        enc.write_context_specific(0, true, &inner_der);
        assert_eq!(enc.finish(), &[0xA0, 3, 0x02, 1, 0x02]);
    }

    #[test]
    fn test_generalized_time_roundtrip() {
        let ts = 2_539_296_000i64; // 2050-06-20 00:00:00 UTC
        let mut enc = Encoder::new();
        enc.write_generalized_time(ts);
        let der = enc.finish();
        assert_eq!(&der[2..], b"20500620000000Z");
        assert_eq!(Decoder::new(&der).read_time().unwrap(), ts);
    }

    #[test]
    fn test_unix_to_datetime() {
        assert_eq!(unix_to_datetime(0), (1970, 1, 1, 0, 0, 0));
        assert_eq!(unix_to_datetime(1_763_164_800), (2025, 11, 15, 0, 0, 0));
    }
}
