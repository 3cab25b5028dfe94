//! OID (Object Identifier) management.

use cmsenv_types::*;

/// A parsed OID represented as a sequence of arc values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    arcs: Vec<u32>,
}

impl Oid {
    /// Create an OID from a slice of arc values.
    pub fn new(arcs: &[u32]) -> Self {
        Self {
            arcs: arcs.to_vec(),
        }
    }

    /// Return the arc values.
    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    /// Encode this OID to DER bytes (just the value, no tag/length).
    pub fn to_der_value(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let [first, second, rest @ ..] = self.arcs.as_slice() {
            encode_arc(&mut buf, first * 40 + second);
            for &arc in rest {
                encode_arc(&mut buf, arc);
            }
        }
        buf
    }

    /// Parse an OID from DER value bytes.
    pub fn from_der_value(data: &[u8]) -> Result<Self, CryptoError> {
        if data.is_empty() {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        let (first, mut i) = decode_arc(data)?;
        let mut arcs = match first {
            0..=39 => vec![0, first],
            40..=79 => vec![1, first - 40],
            _ => vec![2, first - 80],
        };
        while i < data.len() {
            let (arc, consumed) = decode_arc(&data[i..])?;
            arcs.push(arc);
            i += consumed;
        }
        Ok(Self { arcs })
    }

    /// Return the dotted-string representation (e.g., "1.2.840.113549.1.7.3").
    pub fn to_dot_string(&self) -> String {
        self.arcs
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_dot_string())
    }
}

fn encode_arc(buf: &mut Vec<u8>, mut value: u32) {
    if value < 0x80 {
        buf.push(value as u8);
        return;
    }
    let mut bytes = Vec::new();
    while value > 0 {
        bytes.push((value & 0x7F) as u8);
        value >>= 7;
    }
    bytes.reverse();
    let last = bytes.len() - 1;
    for (i, b) in bytes.iter().enumerate() {
        buf.push(if i < last { b | 0x80 } else { *b });
    }
}

fn decode_arc(data: &[u8]) -> Result<(u32, usize), CryptoError> {
    // A leading 0x80 would be a non-minimal subidentifier
    if data.first() == Some(&0x80) {
        return Err(CryptoError::DecodeAsn1Fail);
    }
    let mut value: u32 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if value > (u32::MAX >> 7) {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        value = (value << 7) | (byte & 0x7F) as u32;
        if (byte & 0x80) == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(CryptoError::DecodeAsn1Fail)
}

// Well-known OIDs
pub mod known {
    use super::Oid;

    // Content types
    pub fn pkcs7_data() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 7, 1])
    }
    pub fn pkcs7_signed_data() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 7, 2])
    }
    pub fn pkcs7_enveloped_data() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 7, 3])
    }
    pub fn auth_enveloped_data() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 9, 16, 1, 23])
    }
    pub fn compressed_data() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 9, 16, 1, 9])
    }

    // S/MIME algorithms
    pub fn zlib_compress() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 9, 16, 3, 8])
    }
    pub fn pwri_kek() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 9, 16, 3, 9])
    }

    // Attributes
    pub fn content_type_attr() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 9, 3])
    }
    pub fn common_name() -> Oid {
        Oid::new(&[2, 5, 4, 3])
    }

    // AES
    pub fn aes128_cbc() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 1, 2])
    }
    pub fn aes192_cbc() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 1, 22])
    }
    pub fn aes256_cbc() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 1, 42])
    }
    pub fn aes128_gcm() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 1, 6])
    }
    pub fn aes192_gcm() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 1, 26])
    }
    pub fn aes256_gcm() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 1, 46])
    }
    pub fn aes128_wrap() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 1, 5])
    }
    pub fn aes192_wrap() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 1, 25])
    }
    pub fn aes256_wrap() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 1, 45])
    }

    // RSA
    pub fn rsa_encryption() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 1, 1])
    }
    pub fn rsaes_oaep() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 1, 7])
    }
    pub fn mgf1() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 1, 8])
    }
    pub fn p_specified() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 1, 9])
    }

    // Hash
    pub fn sha1() -> Oid {
        Oid::new(&[1, 3, 14, 3, 2, 26])
    }
    pub fn sha224() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 2, 4])
    }
    pub fn sha256() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 2, 1])
    }
    pub fn sha384() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 2, 2])
    }
    pub fn sha512() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 2, 3])
    }

    // PBKDF2 and its PRFs
    pub fn pbkdf2() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 5, 12])
    }
    pub fn hmac_with_sha1() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 2, 7])
    }
    pub fn hmac_with_sha224() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 2, 8])
    }
    pub fn hmac_with_sha256() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 2, 9])
    }
    pub fn hmac_with_sha384() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 2, 10])
    }
    pub fn hmac_with_sha512() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 2, 11])
    }

    // EC
    pub fn ec_public_key() -> Oid {
        Oid::new(&[1, 2, 840, 10045, 2, 1])
    }
    pub fn prime256v1() -> Oid {
        Oid::new(&[1, 2, 840, 10045, 3, 1, 7])
    }
    pub fn secp384r1() -> Oid {
        Oid::new(&[1, 3, 132, 0, 34])
    }

    // ECDH key agreement with X9.63 KDF
    pub fn dh_single_pass_std_dh_sha1kdf() -> Oid {
        Oid::new(&[1, 3, 133, 16, 840, 63, 0, 2])
    }
    pub fn dh_single_pass_std_dh_sha224kdf() -> Oid {
        Oid::new(&[1, 3, 132, 1, 11, 0])
    }
    pub fn dh_single_pass_std_dh_sha256kdf() -> Oid {
        Oid::new(&[1, 3, 132, 1, 11, 1])
    }
    pub fn dh_single_pass_std_dh_sha384kdf() -> Oid {
        Oid::new(&[1, 3, 132, 1, 11, 2])
    }
    pub fn dh_single_pass_std_dh_sha512kdf() -> Oid {
        Oid::new(&[1, 3, 132, 1, 11, 3])
    }
    pub fn dh_single_pass_cofactor_dh_sha1kdf() -> Oid {
        Oid::new(&[1, 3, 133, 16, 840, 63, 0, 3])
    }
    pub fn dh_single_pass_cofactor_dh_sha224kdf() -> Oid {
        Oid::new(&[1, 3, 132, 1, 14, 0])
    }
    pub fn dh_single_pass_cofactor_dh_sha256kdf() -> Oid {
        Oid::new(&[1, 3, 132, 1, 14, 1])
    }
    pub fn dh_single_pass_cofactor_dh_sha384kdf() -> Oid {
        Oid::new(&[1, 3, 132, 1, 14, 2])
    }
    pub fn dh_single_pass_cofactor_dh_sha512kdf() -> Oid {
        Oid::new(&[1, 3, 132, 1, 14, 3])
    }
}
