//! Content encryption: AES-CBC with PKCS#7 padding and AES-GCM.
//!
//! CBC parameters are the IV as an OCTET STRING. GCM parameters follow
//! RFC 5084: `GCMParameters { aes-nonce OCTET STRING, aes-ICVlen INTEGER
//! DEFAULT 12 }`.

use cmsenv_crypto::CryptoProvider;
use cmsenv_types::{CmsError, ContentEncryptionAlg};
use cmsenv_utils::asn1::Decoder;
use subtle::{Choice, ConstantTimeEq};
use zeroize::{Zeroize, Zeroizing};

use super::{cerr, AlgorithmIdentifier};
use crate::config::GCM_NONCE_LEN;
use crate::encoding::{enc_octet, enc_seq, enc_u32};
use crate::oid_mapping::{content_alg_oid, oid_to_content_alg};

/// GCM tag length assumed when `aes-ICVlen` is absent.
const GCM_DEFAULT_ICV_LEN: usize = 12;

/// Result of encrypting a payload under a fresh CEK.
pub struct ContentCipherOutput {
    pub alg: ContentEncryptionAlg,
    pub cek: Zeroizing<Vec<u8>>,
    /// Content-encryption AlgorithmIdentifier with IV or GCM parameters.
    pub algorithm: AlgorithmIdentifier,
    pub ciphertext: Vec<u8>,
    /// GCM authentication tag; `None` for CBC.
    pub tag: Option<Vec<u8>>,
}

impl std::fmt::Debug for ContentCipherOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCipherOutput")
            .field("alg", &self.alg)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Draw a random CEK of the algorithm's key length.
pub fn generate_cek(
    provider: &dyn CryptoProvider,
    alg: ContentEncryptionAlg,
) -> Result<Zeroizing<Vec<u8>>, CmsError> {
    let mut cek = Zeroizing::new(vec![0u8; alg.key_len()]);
    provider.fill_random(&mut cek)?;
    Ok(cek)
}

/// Encrypt `plaintext` under a freshly generated CEK and IV/nonce.
///
/// `aad` is only used by GCM. `tag_len` is the GCM tag length in bytes.
pub fn encrypt(
    provider: &dyn CryptoProvider,
    plaintext: &[u8],
    alg: ContentEncryptionAlg,
    aad: Option<&[u8]>,
    tag_len: usize,
) -> Result<ContentCipherOutput, CmsError> {
    let cek = generate_cek(provider, alg)?;
    encrypt_with_key(provider, cek, plaintext, alg, aad, tag_len)
}

/// Encrypt `plaintext` under a caller-supplied CEK with a fresh IV/nonce.
pub fn encrypt_with_key(
    provider: &dyn CryptoProvider,
    cek: Zeroizing<Vec<u8>>,
    plaintext: &[u8],
    alg: ContentEncryptionAlg,
    aad: Option<&[u8]>,
    tag_len: usize,
) -> Result<ContentCipherOutput, CmsError> {
    check_key_len(alg, &cek)?;
    let oid = content_alg_oid(alg);

    if alg.is_aead() {
        if !(12..=16).contains(&tag_len) {
            return Err(CmsError::InvalidArg(format!(
                "gcm tag length {tag_len} outside 12..=16"
            )));
        }
        let mut nonce = [0u8; GCM_NONCE_LEN];
        provider.fill_random(&mut nonce)?;
        let (ciphertext, tag) = provider.aead_seal(
            alg.cipher(),
            &cek,
            &nonce,
            aad.unwrap_or_default(),
            plaintext,
            tag_len,
        )?;
        Ok(ContentCipherOutput {
            alg,
            cek,
            algorithm: AlgorithmIdentifier::new(&oid, Some(encode_gcm_params(&nonce, tag_len))),
            ciphertext,
            tag: Some(tag),
        })
    } else {
        let mut iv = [0u8; 16];
        provider.fill_random(&mut iv)?;
        let mut padded = Zeroizing::new(pkcs7_pad(plaintext, alg.block_size()));
        let ciphertext = provider.cbc_encrypt(alg.cipher(), &cek, &iv, &padded)?;
        padded.zeroize();
        Ok(ContentCipherOutput {
            alg,
            cek,
            algorithm: AlgorithmIdentifier::new(&oid, Some(enc_octet(&iv))),
            ciphertext,
            tag: None,
        })
    }
}

/// Resolve a content-encryption AlgorithmIdentifier to a supported algorithm.
pub fn content_alg_of(algorithm: &AlgorithmIdentifier) -> Result<ContentEncryptionAlg, CmsError> {
    let oid = algorithm.oid()?;
    oid_to_content_alg(&oid).ok_or_else(|| {
        CmsError::UnsupportedAlgorithm(format!("content encryption algorithm {oid}"))
    })
}

/// Decrypt content.
///
/// For GCM the tag is verified before anything is returned; a mismatch is
/// `AuthFailure`. For CBC the padding is checked and stripped; a bad pad is
/// `BadPadding`. The recovered plaintext is zeroized on every error path.
pub fn decrypt(
    provider: &dyn CryptoProvider,
    ciphertext: &[u8],
    algorithm: &AlgorithmIdentifier,
    key: &[u8],
    tag: Option<&[u8]>,
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, CmsError> {
    let alg = content_alg_of(algorithm)?;
    check_key_len(alg, key)?;
    let params = algorithm
        .params
        .as_deref()
        .ok_or_else(|| cerr("content encryption algorithm: missing parameters"))?;

    if alg.is_aead() {
        let (nonce, icv_len) = parse_gcm_params(params)?;
        let tag = tag.ok_or_else(|| cerr("AEAD content without authentication tag"))?;
        if tag.len() != icv_len {
            return Err(cerr(&format!(
                "mac length {} does not match aes-ICVlen {icv_len}",
                tag.len()
            )));
        }
        let mut plaintext = provider.aead_open(
            alg.cipher(),
            key,
            &nonce,
            aad.unwrap_or_default(),
            ciphertext,
            tag,
        )?;
        Ok(std::mem::take(&mut *plaintext))
    } else {
        let iv = parse_cbc_params(params)?;
        if ciphertext.is_empty() || ciphertext.len() % alg.block_size() != 0 {
            return Err(cerr(&format!(
                "CBC ciphertext length {} is not a positive multiple of the block size",
                ciphertext.len()
            )));
        }
        let padded = provider.cbc_decrypt(alg.cipher(), key, &iv, ciphertext)?;
        pkcs7_unpad(padded, alg.block_size())
    }
}

fn check_key_len(alg: ContentEncryptionAlg, key: &[u8]) -> Result<(), CmsError> {
    if key.len() != alg.key_len() {
        return Err(CmsError::InvalidArg(format!(
            "{} needs a {}-byte key, got {}",
            alg.as_str(),
            alg.key_len(),
            key.len()
        )));
    }
    Ok(())
}

// ── Parameters ───────────────────────────────────────────────────────

fn encode_gcm_params(nonce: &[u8], icv_len: usize) -> Vec<u8> {
    let mut inner = enc_octet(nonce);
    // DEFAULT values are omitted in DER
    if icv_len != GCM_DEFAULT_ICV_LEN {
        inner.extend_from_slice(&enc_u32(icv_len as u32));
    }
    enc_seq(&inner)
}

fn parse_gcm_params(params: &[u8]) -> Result<(Vec<u8>, usize), CmsError> {
    let mut dec = Decoder::new(params);
    let mut seq = dec
        .read_sequence()
        .map_err(|e| cerr(&format!("GCMParameters: {e}")))?;
    let nonce = seq
        .read_octet_string()
        .map_err(|e| cerr(&format!("GCM nonce: {e}")))?;
    if nonce.len() != GCM_NONCE_LEN {
        return Err(CmsError::UnsupportedAlgorithm(format!(
            "GCM nonce length {}",
            nonce.len()
        )));
    }
    let icv_len = if seq.is_empty() {
        GCM_DEFAULT_ICV_LEN
    } else {
        seq.read_u32()
            .map_err(|e| cerr(&format!("GCM ICV length: {e}")))? as usize
    };
    if !(12..=16).contains(&icv_len) {
        return Err(CmsError::UnsupportedAlgorithm(format!("GCM ICV length {icv_len}")));
    }
    Ok((nonce.to_vec(), icv_len))
}

fn parse_cbc_params(params: &[u8]) -> Result<Vec<u8>, CmsError> {
    let mut dec = Decoder::new(params);
    let iv = dec
        .read_octet_string()
        .map_err(|e| cerr(&format!("CBC IV: {e}")))?;
    if iv.len() != 16 {
        return Err(cerr(&format!("CBC IV length {}", iv.len())));
    }
    Ok(iv.to_vec())
}

// ── PKCS#7 padding ───────────────────────────────────────────────────

fn pkcs7_pad(data: &[u8], block: usize) -> Vec<u8> {
    let pad_len = block - (data.len() % block);
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.resize(data.len() + pad_len, pad_len as u8);
    out
}

/// Strip PKCS#7 padding. The check runs in constant time over the final block.
fn pkcs7_unpad(mut data: Vec<u8>, block: usize) -> Result<Vec<u8>, CmsError> {
    if data.len() < block {
        data.zeroize();
        return Err(CmsError::BadPadding);
    }
    let last = data[data.len() - 1];
    let pad = last as usize;
    let tail = &data[data.len() - block..];

    let mut valid = Choice::from((pad >= 1) as u8) & Choice::from((pad <= block) as u8);
    for (i, b) in tail.iter().enumerate() {
        let in_pad = Choice::from((block - i <= pad) as u8);
        valid &= !in_pad | b.ct_eq(&last);
    }
    if !bool::from(valid) {
        data.zeroize();
        return Err(CmsError::BadPadding);
    }
    data.truncate(data.len() - pad);
    Ok(data)
}
