//! Key transport recipients (RFC 5652 §6.2.1) with RSA PKCS#1 v1.5 or
//! RSAES-OAEP (RFC 4055).

use cmsenv_crypto::CryptoProvider;
use cmsenv_types::{CmsError, HashAlgId, RsaPadding};
use cmsenv_utils::asn1::Decoder;
use cmsenv_utils::oid::known;
use zeroize::Zeroizing;

use crate::cms::{cerr, read_version, AlgorithmIdentifier, RecipientId};
use crate::encoding::{enc_explicit_ctx, enc_implicit_ctx, enc_null, enc_octet, enc_seq, enc_u32};
use crate::oid_mapping::{hash_oid, oid_to_hash};

/// `KeyTransRecipientInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTransRecipientInfo {
    /// 0 for IssuerAndSerialNumber, 2 for SubjectKeyIdentifier.
    pub version: u32,
    pub rid: RecipientId,
    pub key_encryption_algorithm: AlgorithmIdentifier,
    pub encrypted_key: Vec<u8>,
}

impl KeyTransRecipientInfo {
    /// Encrypt `cek` to the RSA public key (SubjectPublicKeyInfo DER).
    pub fn wrap(
        provider: &dyn CryptoProvider,
        cek: &[u8],
        rid: &RecipientId,
        public_key: &[u8],
        padding: RsaPadding,
    ) -> Result<Self, CmsError> {
        let encrypted_key = provider.rsa_encrypt(public_key, padding, cek)?;
        let version = match rid {
            RecipientId::IssuerAndSerial { .. } => 0,
            RecipientId::SubjectKeyId(_) => 2,
        };
        Ok(Self {
            version,
            rid: rid.clone(),
            key_encryption_algorithm: rsa_algorithm(padding),
            encrypted_key,
        })
    }

    /// Decrypt the CEK with a PKCS#8 RSA private key.
    pub fn unwrap(
        &self,
        provider: &dyn CryptoProvider,
        private_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CmsError> {
        let padding = padding_of(&self.key_encryption_algorithm)?;
        provider
            .rsa_decrypt(private_key, padding, &self.encrypted_key)
            .map_err(|e| CmsError::Unwrap(format!("key transport: {e}")))
    }

    /// RSA padding named by the key-encryption algorithm.
    pub fn padding(&self) -> Result<RsaPadding, CmsError> {
        padding_of(&self.key_encryption_algorithm)
    }

    pub(crate) fn encode_fields(&self) -> Vec<u8> {
        let mut inner = enc_u32(self.version);
        match &self.rid {
            RecipientId::IssuerAndSerial { issuer, serial } => {
                inner.extend_from_slice(&RecipientId::encode_issuer_and_serial(issuer, serial));
            }
            RecipientId::SubjectKeyId(ski) => {
                inner.extend_from_slice(&enc_implicit_ctx(0, ski));
            }
        }
        inner.extend_from_slice(&self.key_encryption_algorithm.encode());
        inner.extend_from_slice(&enc_octet(&self.encrypted_key));
        inner
    }

    pub(crate) fn parse_fields(mut seq: Decoder) -> Result<Self, CmsError> {
        let version = read_version(&mut seq, "KTRI")?;
        if version != 0 && version != 2 {
            return Err(CmsError::UnsupportedVersion(version));
        }
        let rid = parse_rid(&mut seq)?;
        let key_encryption_algorithm = AlgorithmIdentifier::parse(&mut seq)?;
        let encrypted_key = seq
            .read_octet_string()
            .map_err(|e| cerr(&format!("KTRI encryptedKey: {e}")))?
            .to_vec();
        if !seq.is_empty() {
            return Err(cerr("KTRI: trailing data"));
        }
        Ok(Self {
            version,
            rid,
            key_encryption_algorithm,
            encrypted_key,
        })
    }
}

/// `RecipientIdentifier ::= CHOICE { issuerAndSerialNumber, [0] SubjectKeyIdentifier }`.
pub(crate) fn parse_rid(dec: &mut Decoder) -> Result<RecipientId, CmsError> {
    if let Some(ski) = dec
        .try_read_context_specific(0, false)
        .map_err(|e| cerr(&format!("rid [0]: {e}")))?
    {
        return Ok(RecipientId::SubjectKeyId(ski.value.to_vec()));
    }
    let seq = dec
        .read_sequence()
        .map_err(|e| cerr(&format!("rid: {e}")))?;
    RecipientId::parse_issuer_and_serial(seq)
}

// ── RSA algorithm identifiers ────────────────────────────────────────

fn rsa_algorithm(padding: RsaPadding) -> AlgorithmIdentifier {
    match padding {
        RsaPadding::Pkcs1v15 => {
            AlgorithmIdentifier::new(&known::rsa_encryption(), Some(enc_null()))
        }
        RsaPadding::Oaep(hash) => {
            AlgorithmIdentifier::new(&known::rsaes_oaep(), Some(encode_oaep_params(hash)))
        }
    }
}

/// RSAES-OAEP-params. SHA-1 with MGF1-SHA-1 and an empty label is the
/// DEFAULT and encodes as an empty SEQUENCE.
fn encode_oaep_params(hash: HashAlgId) -> Vec<u8> {
    if hash == HashAlgId::Sha1 {
        return enc_seq(&[]);
    }
    let hash_alg = AlgorithmIdentifier::new(&hash_oid(hash), Some(enc_null())).encode();
    let mgf = AlgorithmIdentifier::new(&known::mgf1(), Some(hash_alg.clone())).encode();
    let mut inner = enc_explicit_ctx(0, &hash_alg);
    inner.extend_from_slice(&enc_explicit_ctx(1, &mgf));
    enc_seq(&inner)
}

fn padding_of(alg: &AlgorithmIdentifier) -> Result<RsaPadding, CmsError> {
    if alg.is(&known::rsa_encryption()) {
        return Ok(RsaPadding::Pkcs1v15);
    }
    if alg.is(&known::rsaes_oaep()) {
        return parse_oaep_params(alg.params.as_deref()).map(RsaPadding::Oaep);
    }
    Err(CmsError::UnsupportedAlgorithm(format!(
        "key transport algorithm {}",
        alg.oid()?
    )))
}

fn parse_oaep_params(params: Option<&[u8]>) -> Result<HashAlgId, CmsError> {
    let Some(params) = params else {
        return Ok(HashAlgId::Sha1);
    };
    let mut dec = Decoder::new(params);
    let mut seq = dec
        .read_sequence()
        .map_err(|e| cerr(&format!("RSAES-OAEP-params: {e}")))?;

    let mut hash = HashAlgId::Sha1;
    if let Some(tlv) = seq
        .try_read_context_specific(0, true)
        .map_err(|e| cerr(&format!("OAEP hashFunc: {e}")))?
    {
        hash = hash_of(&mut Decoder::new(tlv.value))?;
    }

    let mut mgf_hash = HashAlgId::Sha1;
    if let Some(tlv) = seq
        .try_read_context_specific(1, true)
        .map_err(|e| cerr(&format!("OAEP maskGenFunc: {e}")))?
    {
        let mgf = AlgorithmIdentifier::parse(&mut Decoder::new(tlv.value))?;
        if !mgf.is(&known::mgf1()) {
            return Err(CmsError::UnsupportedAlgorithm(format!(
                "OAEP mask generation {}",
                mgf.oid()?
            )));
        }
        let inner = mgf
            .params
            .as_deref()
            .ok_or_else(|| cerr("MGF1 without hash parameter"))?;
        mgf_hash = hash_of(&mut Decoder::new(inner))?;
    }
    if mgf_hash != hash {
        return Err(CmsError::UnsupportedAlgorithm(
            "OAEP with differing hash and MGF1 hash".into(),
        ));
    }

    if let Some(tlv) = seq
        .try_read_context_specific(2, true)
        .map_err(|e| cerr(&format!("OAEP pSourceFunc: {e}")))?
    {
        let psource = AlgorithmIdentifier::parse(&mut Decoder::new(tlv.value))?;
        let label_empty = match psource.params.as_deref() {
            None => true,
            Some(p) => {
                let mut d = Decoder::new(p);
                d.read_octet_string()
                    .map_err(|e| cerr(&format!("OAEP label: {e}")))?
                    .is_empty()
            }
        };
        if !psource.is(&known::p_specified()) || !label_empty {
            return Err(CmsError::UnsupportedAlgorithm("OAEP with a non-empty label".into()));
        }
    }
    if !seq.is_empty() {
        return Err(cerr("RSAES-OAEP-params: trailing data"));
    }
    Ok(hash)
}

fn hash_of(dec: &mut Decoder) -> Result<HashAlgId, CmsError> {
    let alg = AlgorithmIdentifier::parse(dec)?;
    if alg.non_null_params().is_some() {
        return Err(cerr("hash AlgorithmIdentifier with parameters"));
    }
    let oid = alg.oid()?;
    oid_to_hash(&oid).ok_or_else(|| CmsError::UnsupportedAlgorithm(format!("hash {oid}")))
}
