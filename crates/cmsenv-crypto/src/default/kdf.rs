//! Digests and PBKDF2.

use cmsenv_types::{CryptoError, HashAlgId};
use sha2::Digest;

pub(crate) fn digest(hash: HashAlgId, data: &[u8]) -> Vec<u8> {
    match hash {
        HashAlgId::Sha1 => sha1::Sha1::digest(data).to_vec(),
        HashAlgId::Sha224 => sha2::Sha224::digest(data).to_vec(),
        HashAlgId::Sha256 => sha2::Sha256::digest(data).to_vec(),
        HashAlgId::Sha384 => sha2::Sha384::digest(data).to_vec(),
        HashAlgId::Sha512 => sha2::Sha512::digest(data).to_vec(),
    }
}

pub(crate) fn pbkdf2_hmac(
    prf: HashAlgId,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    out: &mut [u8],
) -> Result<(), CryptoError> {
    if iterations == 0 || out.is_empty() {
        return Err(CryptoError::InvalidArg);
    }
    match prf {
        HashAlgId::Sha1 => pbkdf2::pbkdf2_hmac::<sha1::Sha1>(password, salt, iterations, out),
        HashAlgId::Sha224 => pbkdf2::pbkdf2_hmac::<sha2::Sha224>(password, salt, iterations, out),
        HashAlgId::Sha256 => pbkdf2::pbkdf2_hmac::<sha2::Sha256>(password, salt, iterations, out),
        HashAlgId::Sha384 => pbkdf2::pbkdf2_hmac::<sha2::Sha384>(password, salt, iterations, out),
        HashAlgId::Sha512 => pbkdf2::pbkdf2_hmac::<sha2::Sha512>(password, salt, iterations, out),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_sha256_abc() {
        assert_eq!(
            digest(HashAlgId::Sha256, b"abc"),
            hex("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(digest(HashAlgId::Sha384, b"").len(), 48);
    }

    #[test]
    fn test_pbkdf2_rfc6070() {
        let mut out = [0u8; 20];
        pbkdf2_hmac(HashAlgId::Sha1, b"password", b"salt", 1, &mut out).unwrap();
        assert_eq!(out.to_vec(), hex("0c60c80f961f0e71f3a9b524af6012062fe037a6"));
    }

    #[test]
    fn test_pbkdf2_sha256() {
        let mut out = [0u8; 32];
        pbkdf2_hmac(HashAlgId::Sha256, b"password", b"salt", 1, &mut out).unwrap();
        assert_eq!(
            out.to_vec(),
            hex("120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b")
        );
    }

    #[test]
    fn test_pbkdf2_zero_iterations() {
        let mut out = [0u8; 16];
        assert_eq!(
            pbkdf2_hmac(HashAlgId::Sha256, b"pw", b"salt", 0, &mut out).unwrap_err(),
            CryptoError::InvalidArg
        );
    }
}
