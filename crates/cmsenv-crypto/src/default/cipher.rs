//! AES-CBC, AES-GCM and AES key wrap.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::consts::{U12, U13, U14, U15, U16};
use aes_gcm::aead::generic_array::typenum::Unsigned;
use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit};
use aes_gcm::AesGcm;
use aes_kw::{KekAes128, KekAes192, KekAes256};
use cmsenv_types::{BlockCipherId, CryptoError, KeyWrapAlg};
use zeroize::Zeroizing;

const BLOCK: usize = BlockCipherId::BLOCK_SIZE;

fn check_key(cipher: BlockCipherId, key: &[u8]) -> Result<(), CryptoError> {
    if key.len() != cipher.key_len() {
        return Err(CryptoError::InvalidKeyLength {
            expected: cipher.key_len(),
            got: key.len(),
        });
    }
    Ok(())
}

fn check_cbc_args(
    cipher: BlockCipherId,
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<(), CryptoError> {
    check_key(cipher, key)?;
    if iv.len() != BLOCK {
        return Err(CryptoError::InvalidIvLength);
    }
    if data.len() % BLOCK != 0 {
        return Err(CryptoError::NotBlockAligned);
    }
    Ok(())
}

pub(crate) fn cbc_encrypt(
    cipher: BlockCipherId,
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    check_cbc_args(cipher, key, iv, data)?;
    let out = match cipher {
        BlockCipherId::Aes128 => cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidArg)?
            .encrypt_padded_vec_mut::<NoPadding>(data),
        BlockCipherId::Aes192 => cbc::Encryptor::<aes::Aes192>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidArg)?
            .encrypt_padded_vec_mut::<NoPadding>(data),
        BlockCipherId::Aes256 => cbc::Encryptor::<aes::Aes256>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidArg)?
            .encrypt_padded_vec_mut::<NoPadding>(data),
    };
    Ok(out)
}

pub(crate) fn cbc_decrypt(
    cipher: BlockCipherId,
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    check_cbc_args(cipher, key, iv, data)?;
    let out = match cipher {
        BlockCipherId::Aes128 => cbc::Decryptor::<aes::Aes128>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidArg)?
            .decrypt_padded_vec_mut::<NoPadding>(data),
        BlockCipherId::Aes192 => cbc::Decryptor::<aes::Aes192>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidArg)?
            .decrypt_padded_vec_mut::<NoPadding>(data),
        BlockCipherId::Aes256 => cbc::Decryptor::<aes::Aes256>::new_from_slices(key, iv)
            .map_err(|_| CryptoError::InvalidArg)?
            .decrypt_padded_vec_mut::<NoPadding>(data),
    };
    out.map_err(|_| CryptoError::NotBlockAligned)
}

// ── GCM ──────────────────────────────────────────────────────────────

// The tag length is a type parameter of `AesGcm`, so every supported
// length (12..=16 bytes) gets its own instantiation.
macro_rules! gcm_for_tag {
    ($aes:ty, $tag_len:expr, $f:ident ( $($arg:expr),* )) => {
        match $tag_len {
            12 => $f::<AesGcm<$aes, U12, U12>>($($arg),*),
            13 => $f::<AesGcm<$aes, U12, U13>>($($arg),*),
            14 => $f::<AesGcm<$aes, U12, U14>>($($arg),*),
            15 => $f::<AesGcm<$aes, U12, U15>>($($arg),*),
            16 => $f::<AesGcm<$aes, U12, U16>>($($arg),*),
            _ => Err(CryptoError::InvalidTagLength),
        }
    };
}

macro_rules! gcm_dispatch {
    ($cipher:expr, $tag_len:expr, $f:ident ( $($arg:expr),* )) => {
        match $cipher {
            BlockCipherId::Aes128 => gcm_for_tag!(aes::Aes128, $tag_len, $f($($arg),*)),
            BlockCipherId::Aes192 => gcm_for_tag!(aes::Aes192, $tag_len, $f($($arg),*)),
            BlockCipherId::Aes256 => gcm_for_tag!(aes::Aes256, $tag_len, $f($($arg),*)),
        }
    };
}

fn seal_with<C: AeadInPlace + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    if nonce.len() != <C as AeadCore>::NonceSize::USIZE {
        return Err(CryptoError::InvalidIvLength);
    }
    let aead = C::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    let mut buf = plaintext.to_vec();
    let tag = aead
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, &mut buf)
        .map_err(|_| CryptoError::InputOverflow)?;
    Ok((buf, tag.to_vec()))
}

fn open_with<C: AeadInPlace + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if nonce.len() != <C as AeadCore>::NonceSize::USIZE {
        return Err(CryptoError::InvalidIvLength);
    }
    let aead = C::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    let mut buf = Zeroizing::new(ciphertext.to_vec());
    aead.decrypt_in_place_detached(
        GenericArray::from_slice(nonce),
        aad,
        buf.as_mut_slice(),
        GenericArray::from_slice(tag),
    )
    .map_err(|_| CryptoError::AeadTagVerifyFail)?;
    Ok(buf)
}

pub(crate) fn gcm_seal(
    cipher: BlockCipherId,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
    tag_len: usize,
) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    check_key(cipher, key)?;
    gcm_dispatch!(cipher, tag_len, seal_with(key, nonce, aad, plaintext))
}

pub(crate) fn gcm_open(
    cipher: BlockCipherId,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    check_key(cipher, key)?;
    gcm_dispatch!(cipher, tag.len(), open_with(key, nonce, aad, ciphertext, tag))
}

// ── Key wrap ─────────────────────────────────────────────────────────

fn check_wrap_kek(kek: &[u8]) -> Result<KeyWrapAlg, CryptoError> {
    KeyWrapAlg::for_kek_len(kek.len()).ok_or(CryptoError::InvalidKeyLength {
        expected: 16,
        got: kek.len(),
    })
}

pub(crate) fn key_wrap(kek: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() < 16 || key.len() % 8 != 0 {
        return Err(CryptoError::InvalidArg);
    }
    let wrapped = match check_wrap_kek(kek)? {
        KeyWrapAlg::Aes128Wrap => KekAes128::new(GenericArray::from_slice(kek)).wrap_vec(key),
        KeyWrapAlg::Aes192Wrap => KekAes192::new(GenericArray::from_slice(kek)).wrap_vec(key),
        KeyWrapAlg::Aes256Wrap => KekAes256::new(GenericArray::from_slice(kek)).wrap_vec(key),
    };
    wrapped.map_err(|_| CryptoError::KeyWrapFail)
}

pub(crate) fn key_unwrap(kek: &[u8], wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if wrapped.len() < 24 || wrapped.len() % 8 != 0 {
        return Err(CryptoError::KeyWrapFail);
    }
    let key = match check_wrap_kek(kek)? {
        KeyWrapAlg::Aes128Wrap => KekAes128::new(GenericArray::from_slice(kek)).unwrap_vec(wrapped),
        KeyWrapAlg::Aes192Wrap => KekAes192::new(GenericArray::from_slice(kek)).unwrap_vec(wrapped),
        KeyWrapAlg::Aes256Wrap => KekAes256::new(GenericArray::from_slice(kek)).unwrap_vec(wrapped),
    };
    key.map(Zeroizing::new).map_err(|_| CryptoError::KeyWrapFail)
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
    fn test_cbc_aes128_sp800_38a() {
        let key = hex("2b7e151628aed2a6abf7158809cf4f3c");
        let iv = hex("000102030405060708090a0b0c0d0e0f");
        let pt = hex("6bc1bee22e409f96e93d7e117393172a");
        let ct = cbc_encrypt(BlockCipherId::Aes128, &key, &iv, &pt).unwrap();
        assert_eq!(ct, hex("7649abac8119b246cee98e9b12e9197d"));
        let back = cbc_decrypt(BlockCipherId::Aes128, &key, &iv, &ct).unwrap();
        assert_eq!(back, pt);
    }

    #[test]
    fn test_cbc_rejects_bad_args() {
        let key = [0u8; 16];
        let iv = [0u8; 16];
        assert_eq!(
            cbc_encrypt(BlockCipherId::Aes128, &key, &iv, &[0u8; 15]).unwrap_err(),
            CryptoError::NotBlockAligned
        );
        assert_eq!(
            cbc_encrypt(BlockCipherId::Aes128, &key, &iv[..8], &[0u8; 16]).unwrap_err(),
            CryptoError::InvalidIvLength
        );
        assert_eq!(
            cbc_encrypt(BlockCipherId::Aes256, &key, &iv, &[0u8; 16]).unwrap_err(),
            CryptoError::InvalidKeyLength {
                expected: 32,
                got: 16
            }
        );
    }

    #[test]
    fn test_gcm_zero_key_vectors() {
        // GCM spec test cases 1 and 2
        let key = [0u8; 16];
        let nonce = [0u8; 12];
        let (ct, tag) = gcm_seal(BlockCipherId::Aes128, &key, &nonce, &[], &[], 16).unwrap();
        assert!(ct.is_empty());
        assert_eq!(tag, hex("58e2fccefa7e3061367f1d57a4e7455a"));

        let (ct, tag) =
            gcm_seal(BlockCipherId::Aes128, &key, &nonce, &[], &[0u8; 16], 16).unwrap();
        assert_eq!(ct, hex("0388dace60b6a392f328c2b971b2fe78"));
        assert_eq!(tag, hex("ab6e47d42cec13bdf53a67b21257bddf"));
        let pt = gcm_open(BlockCipherId::Aes128, &key, &nonce, &[], &ct, &tag).unwrap();
        assert_eq!(pt.as_slice(), &[0u8; 16]);
    }

    #[test]
    fn test_gcm_truncated_tag_and_tamper() {
        let key = [7u8; 32];
        let nonce = [1u8; 12];
        let (ct, tag) =
            gcm_seal(BlockCipherId::Aes256, &key, &nonce, b"aad", b"hello", 12).unwrap();
        assert_eq!(tag.len(), 12);
        assert!(gcm_open(BlockCipherId::Aes256, &key, &nonce, b"aad", &ct, &tag).is_ok());
        assert_eq!(
            gcm_open(BlockCipherId::Aes256, &key, &nonce, b"aaD", &ct, &tag).unwrap_err(),
            CryptoError::AeadTagVerifyFail
        );
        assert_eq!(
            gcm_seal(BlockCipherId::Aes256, &key, &nonce, &[], &[], 11).unwrap_err(),
            CryptoError::InvalidTagLength
        );
    }

    #[test]
    fn test_key_wrap_rfc3394() {
        let kek = hex("000102030405060708090A0B0C0D0E0F");
        let key = hex("00112233445566778899AABBCCDDEEFF");
        let wrapped = key_wrap(&kek, &key).unwrap();
        assert_eq!(
            wrapped,
            hex("1FA68B0A8112B447AEF34BD8FB5A7B829D3E862371D2CFE5")
        );
        assert_eq!(key_unwrap(&kek, &wrapped).unwrap().as_slice(), &key[..]);
    }

    #[test]
    fn test_key_unwrap_integrity() {
        let kek = [0x42u8; 24];
        let mut wrapped = key_wrap(&kek, &[9u8; 32]).unwrap();
        wrapped[5] ^= 1;
        assert_eq!(
            key_unwrap(&kek, &wrapped).unwrap_err(),
            CryptoError::KeyWrapFail
        );
        assert!(key_wrap(&[0u8; 20], &[0u8; 16]).is_err());
    }
}
