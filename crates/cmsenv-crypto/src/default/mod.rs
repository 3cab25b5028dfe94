//! [`CryptoProvider`] backed by the RustCrypto crates.

mod cipher;
mod kdf;
mod pk;

use crate::provider::CryptoProvider;
use cmsenv_types::{BlockCipherId, CryptoError, EccCurveId, HashAlgId, RsaPadding};
use zeroize::Zeroizing;

/// The provider used unless the caller injects its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProvider;

impl DefaultProvider {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for DefaultProvider {
    fn fill_random(&self, buf: &mut [u8]) -> Result<(), CryptoError> {
        getrandom::getrandom(buf).map_err(|_| CryptoError::RandomFail)
    }

    fn cbc_encrypt(
        &self,
        cipher: BlockCipherId,
        key: &[u8],
        iv: &[u8],
        data: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        cipher::cbc_encrypt(cipher, key, iv, data)
    }

    fn cbc_decrypt(
        &self,
        cipher: BlockCipherId,
        key: &[u8],
        iv: &[u8],
        data: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        cipher::cbc_decrypt(cipher, key, iv, data)
    }

    fn aead_seal(
        &self,
        cipher: BlockCipherId,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
        tag_len: usize,
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        cipher::gcm_seal(cipher, key, nonce, aad, plaintext, tag_len)
    }

    fn aead_open(
        &self,
        cipher: BlockCipherId,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        cipher::gcm_open(cipher, key, nonce, aad, ciphertext, tag)
    }

    fn key_wrap(&self, kek: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        cipher::key_wrap(kek, key)
    }

    fn key_unwrap(&self, kek: &[u8], wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        cipher::key_unwrap(kek, wrapped)
    }

    fn digest(&self, hash: HashAlgId, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(kdf::digest(hash, data))
    }

    fn pbkdf2_hmac(
        &self,
        prf: HashAlgId,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        out: &mut [u8],
    ) -> Result<(), CryptoError> {
        kdf::pbkdf2_hmac(prf, password, salt, iterations, out)
    }

    fn rsa_encrypt(
        &self,
        public_key_der: &[u8],
        padding: RsaPadding,
        data: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        pk::rsa_encrypt(public_key_der, padding, data)
    }

    fn rsa_decrypt(
        &self,
        private_key_der: &[u8],
        padding: RsaPadding,
        data: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        pk::rsa_decrypt(private_key_der, padding, data)
    }

    fn ec_generate(
        &self,
        curve: EccCurveId,
    ) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), CryptoError> {
        pk::ec_generate(curve)
    }

    fn ecdh(
        &self,
        curve: EccCurveId,
        private: &[u8],
        peer_public: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        pk::ecdh(curve, private, peer_public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_random() {
        let p = DefaultProvider::new();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        p.fill_random(&mut a).unwrap();
        p.fill_random(&mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_x963_kdf_first_block() {
        let p = DefaultProvider::new();
        let z = [0x11u8; 32];
        let info = b"shared-info";
        let mut out = [0u8; 32];
        p.x963_kdf(HashAlgId::Sha256, &z, info, &mut out).unwrap();

        let mut input = z.to_vec();
        input.extend_from_slice(&1u32.to_be_bytes());
        input.extend_from_slice(info);
        assert_eq!(out.to_vec(), p.digest(HashAlgId::Sha256, &input).unwrap());
    }

    #[test]
    fn test_x963_kdf_prefix_stable() {
        let p = DefaultProvider::new();
        let z = [0x22u8; 48];
        let mut short = [0u8; 24];
        let mut long = [0u8; 80];
        p.x963_kdf(HashAlgId::Sha384, &z, &[], &mut short).unwrap();
        p.x963_kdf(HashAlgId::Sha384, &z, &[], &mut long).unwrap();
        assert_eq!(short, long[..24]);
    }

    #[test]
    fn test_provider_is_object_safe() {
        let p: std::sync::Arc<dyn CryptoProvider> = std::sync::Arc::new(DefaultProvider);
        assert_eq!(p.digest(HashAlgId::Sha1, b"").unwrap().len(), 20);
    }
}
