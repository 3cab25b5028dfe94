//! Password recipients (RFC 5652 §6.2.4) with PBKDF2 key derivation and the
//! RFC 3211 two-pass CBC key wrap.

use cmsenv_crypto::CryptoProvider;
use cmsenv_types::{BlockCipherId, CmsError, ContentEncryptionAlg, HashAlgId};
use cmsenv_utils::asn1::{tags, Decoder};
use cmsenv_utils::oid::known;
use subtle::{Choice, ConstantTimeEq};
use zeroize::{Zeroize, Zeroizing};

use crate::cms::content::content_alg_of;
use crate::cms::{cerr, read_version, AlgorithmIdentifier};
use crate::encoding::{enc_null, enc_octet, enc_seq, enc_tlv, enc_u32};
use crate::oid_mapping::{content_alg_oid, hmac_prf_oid, oid_to_hmac_prf};

const BLOCK: usize = BlockCipherId::BLOCK_SIZE;

/// PBKDF2 settings used when wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pbkdf2Params {
    pub iterations: u32,
    pub salt_len: usize,
    pub prf: HashAlgId,
}

/// `PasswordRecipientInfo`, always version 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordRecipientInfo {
    pub version: u32,
    /// `[0] keyDerivationAlgorithm`: PBKDF2 with its parameters.
    pub key_derivation_algorithm: Option<AlgorithmIdentifier>,
    /// id-alg-PWRI-KEK with the inner AES-CBC AlgorithmIdentifier.
    pub key_encryption_algorithm: AlgorithmIdentifier,
    pub encrypted_key: Vec<u8>,
}

impl PasswordRecipientInfo {
    /// Derive a KEK from `password` and wrap `cek` with it. The KEK cipher is
    /// AES-CBC of the same key size as `content_alg`.
    pub fn wrap(
        provider: &dyn CryptoProvider,
        cek: &[u8],
        password: &[u8],
        content_alg: ContentEncryptionAlg,
        params: Pbkdf2Params,
    ) -> Result<Self, CmsError> {
        if password.is_empty() {
            return Err(CmsError::InvalidArg("empty password".into()));
        }
        let kek_cipher = cbc_variant(content_alg);
        let kek_len = kek_cipher.key_len();

        let mut salt = vec![0u8; params.salt_len];
        provider.fill_random(&mut salt)?;
        let mut kek = Zeroizing::new(vec![0u8; kek_len]);
        provider.pbkdf2_hmac(params.prf, password, &salt, params.iterations, &mut kek)?;

        let mut iv = [0u8; BLOCK];
        provider.fill_random(&mut iv)?;
        let encrypted_key = kek_wrap(provider, kek_cipher.cipher(), &kek, &iv, cek)?;
        let kdf = pbkdf2_algorithm(&salt, params.iterations, kek_len, params.prf);
        let kek_alg = AlgorithmIdentifier::new(&content_alg_oid(kek_cipher), Some(enc_octet(&iv)));

        Ok(Self {
            version: 0,
            key_derivation_algorithm: Some(kdf),
            key_encryption_algorithm: AlgorithmIdentifier::new(
                &known::pwri_kek(),
                Some(kek_alg.encode()),
            ),
            encrypted_key,
        })
    }

    /// Re-derive the KEK from `password` and unwrap the CEK. An
    /// `iterationCount` above `max_iterations` is refused before any
    /// derivation runs.
    pub fn unwrap(
        &self,
        provider: &dyn CryptoProvider,
        password: &[u8],
        max_iterations: u32,
    ) -> Result<Zeroizing<Vec<u8>>, CmsError> {
        if !self.key_encryption_algorithm.is(&known::pwri_kek()) {
            return Err(CmsError::UnsupportedAlgorithm(format!(
                "password key encryption {}",
                self.key_encryption_algorithm.oid()?
            )));
        }
        let inner = self
            .key_encryption_algorithm
            .params
            .as_deref()
            .ok_or_else(|| cerr("PWRI-KEK without parameters"))?;
        let inner = AlgorithmIdentifier::parse(&mut Decoder::new(inner))?;
        let kek_cipher = content_alg_of(&inner)?;
        if kek_cipher.is_aead() {
            return Err(CmsError::UnsupportedAlgorithm(format!(
                "PWRI-KEK cipher {}",
                kek_cipher.as_str()
            )));
        }
        let iv = inner
            .params
            .as_deref()
            .ok_or_else(|| cerr("PWRI-KEK cipher without IV"))
            .and_then(|p| {
                Decoder::new(p)
                    .read_octet_string()
                    .map(<[u8]>::to_vec)
                    .map_err(|e| cerr(&format!("PWRI-KEK IV: {e}")))
            })?;
        if iv.len() != BLOCK {
            return Err(cerr("PWRI-KEK IV length"));
        }

        let kdf = self
            .key_derivation_algorithm
            .as_ref()
            .ok_or_else(|| {
                CmsError::UnsupportedAlgorithm("PWRI without keyDerivationAlgorithm".into())
            })?;
        let pbkdf2 = parse_pbkdf2(kdf)?;
        if pbkdf2.iterations > max_iterations {
            return Err(CmsError::UnsupportedAlgorithm(format!(
                "PBKDF2 iterationCount {} exceeds limit {max_iterations}",
                pbkdf2.iterations
            )));
        }
        let kek_len = kek_cipher.key_len();
        if let Some(declared) = pbkdf2.key_len {
            if declared != kek_len {
                return Err(cerr(&format!(
                    "PBKDF2 keyLength {declared} does not match {}",
                    kek_cipher.as_str()
                )));
            }
        }

        let mut kek = Zeroizing::new(vec![0u8; kek_len]);
        provider.pbkdf2_hmac(pbkdf2.prf, password, &pbkdf2.salt, pbkdf2.iterations, &mut kek)?;
        kek_unwrap(provider, kek_cipher.cipher(), &kek, &iv, &self.encrypted_key)
    }

    pub(crate) fn encode_fields(&self) -> Vec<u8> {
        let mut inner = enc_u32(self.version);
        if let Some(kdf) = &self.key_derivation_algorithm {
            // [0] IMPLICIT AlgorithmIdentifier
            inner.extend_from_slice(&enc_tlv(
                tags::CONTEXT_SPECIFIC | tags::CONSTRUCTED,
                &kdf.encode_fields(),
            ));
        }
        inner.extend_from_slice(&self.key_encryption_algorithm.encode());
        inner.extend_from_slice(&enc_octet(&self.encrypted_key));
        inner
    }

    pub(crate) fn parse_fields(mut dec: Decoder) -> Result<Self, CmsError> {
        let version = read_version(&mut dec, "PWRI")?;
        if version != 0 {
            return Err(CmsError::UnsupportedVersion(version));
        }
        let key_derivation_algorithm = dec
            .try_read_context_specific(0, true)
            .map_err(|e| cerr(&format!("PWRI [0]: {e}")))?
            .map(|tlv| AlgorithmIdentifier::parse_fields(Decoder::new(tlv.value)))
            .transpose()?;
        let key_encryption_algorithm = AlgorithmIdentifier::parse(&mut dec)?;
        let encrypted_key = dec
            .read_octet_string()
            .map_err(|e| cerr(&format!("PWRI encryptedKey: {e}")))?
            .to_vec();
        if !dec.is_empty() {
            return Err(cerr("PWRI: trailing data"));
        }
        Ok(Self {
            version,
            key_derivation_algorithm,
            key_encryption_algorithm,
            encrypted_key,
        })
    }
}

fn cbc_variant(alg: ContentEncryptionAlg) -> ContentEncryptionAlg {
    match alg {
        ContentEncryptionAlg::Aes128Cbc | ContentEncryptionAlg::Aes128Gcm => {
            ContentEncryptionAlg::Aes128Cbc
        }
        ContentEncryptionAlg::Aes192Cbc | ContentEncryptionAlg::Aes192Gcm => {
            ContentEncryptionAlg::Aes192Cbc
        }
        ContentEncryptionAlg::Aes256Cbc | ContentEncryptionAlg::Aes256Gcm => {
            ContentEncryptionAlg::Aes256Cbc
        }
    }
}

// ── PBKDF2 parameters ────────────────────────────────────────────────

struct ParsedPbkdf2 {
    salt: Vec<u8>,
    iterations: u32,
    key_len: Option<usize>,
    prf: HashAlgId,
}

fn pbkdf2_algorithm(
    salt: &[u8],
    iterations: u32,
    key_len: usize,
    prf: HashAlgId,
) -> AlgorithmIdentifier {
    let mut inner = enc_octet(salt);
    inner.extend_from_slice(&enc_u32(iterations));
    inner.extend_from_slice(&enc_u32(key_len as u32));
    // hmacWithSHA1 is the DEFAULT prf
    if prf != HashAlgId::Sha1 {
        let prf_alg = AlgorithmIdentifier::new(&hmac_prf_oid(prf), Some(enc_null()));
        inner.extend_from_slice(&prf_alg.encode());
    }
    AlgorithmIdentifier::new(&known::pbkdf2(), Some(enc_seq(&inner)))
}

fn parse_pbkdf2(alg: &AlgorithmIdentifier) -> Result<ParsedPbkdf2, CmsError> {
    if !alg.is(&known::pbkdf2()) {
        return Err(CmsError::UnsupportedAlgorithm(format!(
            "key derivation {}",
            alg.oid()?
        )));
    }
    let params = alg
        .params
        .as_deref()
        .ok_or_else(|| cerr("PBKDF2 without parameters"))?;
    let mut dec = Decoder::new(params);
    let mut seq = dec
        .read_sequence()
        .map_err(|e| cerr(&format!("PBKDF2-params: {e}")))?;
    let salt = seq
        .read_octet_string()
        .map_err(|e| cerr(&format!("PBKDF2 salt: {e}")))?
        .to_vec();
    let iterations = seq
        .read_u32()
        .map_err(|e| cerr(&format!("PBKDF2 iterationCount: {e}")))?;
    if iterations == 0 {
        return Err(cerr("PBKDF2 iterationCount is zero"));
    }
    let mut key_len = None;
    let mut prf = HashAlgId::Sha1;
    if !seq.is_empty()
        && seq
            .peek_tag()
            .map_err(|e| cerr(&format!("PBKDF2-params: {e}")))?
            .number
            == u32::from(tags::INTEGER)
    {
        key_len = Some(
            seq.read_u32()
                .map_err(|e| cerr(&format!("PBKDF2 keyLength: {e}")))? as usize,
        );
    }
    if !seq.is_empty() {
        let prf_alg = AlgorithmIdentifier::parse(&mut seq)?;
        let oid = prf_alg.oid()?;
        prf = oid_to_hmac_prf(&oid)
            .ok_or_else(|| CmsError::UnsupportedAlgorithm(format!("PBKDF2 prf {oid}")))?;
    }
    if !seq.is_empty() {
        return Err(cerr("PBKDF2-params: trailing data"));
    }
    Ok(ParsedPbkdf2 {
        salt,
        iterations,
        key_len,
        prf,
    })
}

// ── RFC 3211 key wrap ────────────────────────────────────────────────

/// Format `LEN || check(3) || CEK || padding` to a multiple of the block
/// size and at least two blocks, then CBC-encrypt it twice.
fn kek_wrap(
    provider: &dyn CryptoProvider,
    cipher: BlockCipherId,
    kek: &[u8],
    iv: &[u8],
    cek: &[u8],
) -> Result<Vec<u8>, CmsError> {
    if cek.len() < 3 || cek.len() > 255 {
        return Err(CmsError::InvalidArg(format!(
            "CEK length {} cannot be password-wrapped",
            cek.len()
        )));
    }
    let formatted_len = (4 + cek.len()).div_ceil(BLOCK).max(2) * BLOCK;
    let mut block = Zeroizing::new(vec![0u8; formatted_len]);
    block[0] = cek.len() as u8;
    block[1] = !cek[0];
    block[2] = !cek[1];
    block[3] = !cek[2];
    block[4..4 + cek.len()].copy_from_slice(cek);
    provider.fill_random(&mut block[4 + cek.len()..])?;

    let first = provider.cbc_encrypt(cipher, kek, iv, &block)?;
    let chain_iv = &first[first.len() - BLOCK..];
    Ok(provider.cbc_encrypt(cipher, kek, chain_iv, &first)?)
}

/// Undo the two CBC passes and validate the length byte and check value.
fn kek_unwrap(
    provider: &dyn CryptoProvider,
    cipher: BlockCipherId,
    kek: &[u8],
    iv: &[u8],
    wrapped: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CmsError> {
    let n = wrapped.len();
    if n < 2 * BLOCK || n % BLOCK != 0 {
        return Err(CmsError::Unwrap(format!("password-wrapped key length {n}")));
    }

    // Last block first, chained on the block before it; its plaintext is the
    // IV of the outer pass over the remaining blocks.
    let last = provider.cbc_decrypt(
        cipher,
        kek,
        &wrapped[n - 2 * BLOCK..n - BLOCK],
        &wrapped[n - BLOCK..],
    )?;
    let mut inner =
        Zeroizing::new(provider.cbc_decrypt(cipher, kek, &last, &wrapped[..n - BLOCK])?);
    inner.extend_from_slice(&last);

    let mut formatted = Zeroizing::new(provider.cbc_decrypt(cipher, kek, iv, &inner)?);

    let key_len = formatted[0] as usize;
    let mut ok = Choice::from((key_len >= 3) as u8) & Choice::from((key_len + 4 <= n) as u8);
    for i in 0..3 {
        let check = formatted[1 + i] ^ formatted.get(4 + i).copied().unwrap_or(0);
        ok &= check.ct_eq(&0xFF);
    }
    if !bool::from(ok) {
        formatted.zeroize();
        return Err(CmsError::Unwrap("password check value mismatch".into()));
    }
    Ok(Zeroizing::new(formatted[4..4 + key_len].to_vec()))
}
