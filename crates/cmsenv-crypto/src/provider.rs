//! Trait-based provider boundary for the primitives the engine consumes.
//!
//! The engine never touches a cipher, hash or public-key implementation
//! directly. Everything goes through [`CryptoProvider`], which is injected
//! as `Arc<dyn CryptoProvider>` so tests and embedders can swap it.

use cmsenv_types::{BlockCipherId, CryptoError, EccCurveId, HashAlgId, RsaPadding};
use zeroize::Zeroizing;

/// Cryptographic primitives required by the enveloped-data engine.
pub trait CryptoProvider: Send + Sync {
    /// Fill `buf` from a cryptographically secure source.
    fn fill_random(&self, buf: &mut [u8]) -> Result<(), CryptoError>;

    /// Raw CBC encryption. `data` must be block aligned; no padding is added.
    fn cbc_encrypt(
        &self,
        cipher: BlockCipherId,
        key: &[u8],
        iv: &[u8],
        data: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Raw CBC decryption. `data` must be block aligned; no padding is removed.
    fn cbc_decrypt(
        &self,
        cipher: BlockCipherId,
        key: &[u8],
        iv: &[u8],
        data: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// GCM encryption. Returns `(ciphertext, tag)` with a `tag_len`-byte tag.
    fn aead_seal(
        &self,
        cipher: BlockCipherId,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
        tag_len: usize,
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError>;

    /// GCM decryption. The tag is verified before any plaintext is returned.
    fn aead_open(
        &self,
        cipher: BlockCipherId,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError>;

    /// AES key wrap (RFC 3394). The AES variant follows the KEK length.
    fn key_wrap(&self, kek: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// AES key unwrap (RFC 3394) with integrity check.
    fn key_unwrap(&self, kek: &[u8], wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError>;

    /// One-shot message digest.
    fn digest(&self, hash: HashAlgId, data: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// PBKDF2 with HMAC-`prf`, filling `out`.
    fn pbkdf2_hmac(
        &self,
        prf: HashAlgId,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        out: &mut [u8],
    ) -> Result<(), CryptoError>;

    /// ANSI X9.63 KDF: `Hash(Z || counter || SharedInfo)` blocks with a
    /// 32-bit big-endian counter starting at 1, truncated to `out.len()`.
    fn x963_kdf(
        &self,
        hash: HashAlgId,
        z: &[u8],
        shared_info: &[u8],
        out: &mut [u8],
    ) -> Result<(), CryptoError> {
        let hlen = hash.output_size();
        if out.len() as u64 >= hlen as u64 * u32::MAX as u64 {
            return Err(CryptoError::KdfDkLenOverflow);
        }
        let mut input = Zeroizing::new(Vec::with_capacity(z.len() + 4 + shared_info.len()));
        for (i, chunk) in out.chunks_mut(hlen).enumerate() {
            let counter = (i as u32) + 1;
            input.clear();
            input.extend_from_slice(z);
            input.extend_from_slice(&counter.to_be_bytes());
            input.extend_from_slice(shared_info);
            let block = Zeroizing::new(self.digest(hash, &input)?);
            chunk.copy_from_slice(&block[..chunk.len()]);
        }
        Ok(())
    }

    /// RSA encryption to a SubjectPublicKeyInfo (DER).
    fn rsa_encrypt(
        &self,
        public_key_der: &[u8],
        padding: RsaPadding,
        data: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// RSA decryption with a PKCS#8 PrivateKeyInfo (DER).
    fn rsa_decrypt(
        &self,
        private_key_der: &[u8],
        padding: RsaPadding,
        data: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError>;

    /// Generate an ephemeral key pair.
    ///
    /// Returns `(private scalar, uncompressed SEC1 public point)`.
    fn ec_generate(&self, curve: EccCurveId)
        -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), CryptoError>;

    /// ECDH: the x-coordinate of `private * peer_public`.
    fn ecdh(
        &self,
        curve: EccCurveId,
        private: &[u8],
        peer_public: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
}
