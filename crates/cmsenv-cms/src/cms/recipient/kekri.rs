//! Pre-shared key-encryption-key recipients (RFC 5652 §6.2.3).

use cmsenv_crypto::CryptoProvider;
use cmsenv_types::{CmsError, KeyWrapAlg};
use cmsenv_utils::asn1::{tags, Decoder};
use cmsenv_utils::oid::Oid;
use zeroize::Zeroizing;

use crate::cms::{cerr, read_version, AlgorithmIdentifier};
use crate::encoding::{enc_generalized_time, enc_octet, enc_oid, enc_seq, enc_u32};
use crate::oid_mapping::{key_wrap_oid, oid_to_key_wrap};

/// `OtherKeyAttribute { keyAttrId, keyAttr ANY OPTIONAL }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherKeyAttribute {
    pub key_attr_id: Oid,
    /// DER of the attribute value, if present.
    pub key_attr: Option<Vec<u8>>,
}

impl OtherKeyAttribute {
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut inner = enc_oid(&self.key_attr_id.to_der_value());
        if let Some(attr) = &self.key_attr {
            inner.extend_from_slice(attr);
        }
        enc_seq(&inner)
    }

    pub(crate) fn parse(dec: &mut Decoder) -> Result<Self, CmsError> {
        let mut seq = dec
            .read_sequence()
            .map_err(|e| cerr(&format!("OtherKeyAttribute: {e}")))?;
        let oid = seq
            .read_oid()
            .map_err(|e| cerr(&format!("keyAttrId: {e}")))?;
        let key_attr_id = Oid::from_der_value(oid).map_err(|e| cerr(&format!("keyAttrId: {e}")))?;
        let key_attr = if seq.is_empty() {
            None
        } else {
            let tlv = seq
                .read_tlv()
                .map_err(|e| cerr(&format!("keyAttr: {e}")))?;
            Some(tlv.raw.to_vec())
        };
        if !seq.is_empty() {
            return Err(cerr("OtherKeyAttribute: trailing data"));
        }
        Ok(Self {
            key_attr_id,
            key_attr,
        })
    }
}

/// `KEKIdentifier { keyIdentifier, date OPTIONAL, other OPTIONAL }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KekIdentifier {
    pub key_identifier: Vec<u8>,
    /// UNIX timestamp of the GeneralizedTime `date`.
    pub date: Option<i64>,
    pub other: Option<OtherKeyAttribute>,
}

/// `KEKRecipientInfo`, always version 4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KekRecipientInfo {
    pub version: u32,
    pub kek_id: KekIdentifier,
    pub key_encryption_algorithm: AlgorithmIdentifier,
    pub encrypted_key: Vec<u8>,
}

impl KekRecipientInfo {
    /// AES-wrap `cek` under `kek`. The wrap variant follows the KEK length.
    pub fn wrap(
        provider: &dyn CryptoProvider,
        cek: &[u8],
        kek_id: KekIdentifier,
        kek: &[u8],
    ) -> Result<Self, CmsError> {
        let wrap_alg = KeyWrapAlg::for_kek_len(kek.len()).ok_or_else(|| {
            CmsError::InvalidArg(format!("KEK length {} is not 16, 24 or 32", kek.len()))
        })?;
        let encrypted_key = provider.key_wrap(kek, cek)?;
        Ok(Self {
            version: 4,
            kek_id,
            key_encryption_algorithm: AlgorithmIdentifier::new(&key_wrap_oid(wrap_alg), None),
            encrypted_key,
        })
    }

    pub fn unwrap(
        &self,
        provider: &dyn CryptoProvider,
        kek: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CmsError> {
        let oid = self.key_encryption_algorithm.oid()?;
        let wrap_alg = oid_to_key_wrap(&oid)
            .ok_or_else(|| CmsError::UnsupportedAlgorithm(format!("key wrap {oid}")))?;
        if kek.len() != wrap_alg.kek_len() {
            return Err(CmsError::Unwrap(format!(
                "KEK length {} does not fit {oid}",
                kek.len()
            )));
        }
        provider
            .key_unwrap(kek, &self.encrypted_key)
            .map_err(|e| CmsError::Unwrap(format!("KEK unwrap: {e}")))
    }

    pub(crate) fn encode_fields(&self) -> Vec<u8> {
        let mut kekid = enc_octet(&self.kek_id.key_identifier);
        if let Some(date) = self.kek_id.date {
            kekid.extend_from_slice(&enc_generalized_time(date));
        }
        if let Some(other) = &self.kek_id.other {
            kekid.extend_from_slice(&other.encode());
        }

        let mut inner = enc_u32(self.version);
        inner.extend_from_slice(&enc_seq(&kekid));
        inner.extend_from_slice(&self.key_encryption_algorithm.encode());
        inner.extend_from_slice(&enc_octet(&self.encrypted_key));
        inner
    }

    pub(crate) fn parse_fields(mut dec: Decoder) -> Result<Self, CmsError> {
        let version = read_version(&mut dec, "KEKRI")?;
        if version != 4 {
            return Err(CmsError::UnsupportedVersion(version));
        }

        let mut kekid_seq = dec
            .read_sequence()
            .map_err(|e| cerr(&format!("KEKIdentifier: {e}")))?;
        let key_identifier = kekid_seq
            .read_octet_string()
            .map_err(|e| cerr(&format!("KEKIdentifier keyIdentifier: {e}")))?
            .to_vec();
        let mut date = None;
        if !kekid_seq.is_empty()
            && kekid_seq
                .peek_tag()
                .map_err(|e| cerr(&format!("KEKIdentifier: {e}")))?
                .number
                == u32::from(tags::GENERALIZED_TIME)
        {
            date = Some(
                kekid_seq
                    .read_time()
                    .map_err(|e| cerr(&format!("KEKIdentifier date: {e}")))?,
            );
        }
        let other = if kekid_seq.is_empty() {
            None
        } else {
            Some(OtherKeyAttribute::parse(&mut kekid_seq)?)
        };
        if !kekid_seq.is_empty() {
            return Err(cerr("KEKIdentifier: trailing data"));
        }

        let key_encryption_algorithm = AlgorithmIdentifier::parse(&mut dec)?;
        let encrypted_key = dec
            .read_octet_string()
            .map_err(|e| cerr(&format!("KEKRI encryptedKey: {e}")))?
            .to_vec();
        if !dec.is_empty() {
            return Err(cerr("KEKRI: trailing data"));
        }

        Ok(Self {
            version,
            kek_id: KekIdentifier {
                key_identifier,
                date,
                other,
            },
            key_encryption_algorithm,
            encrypted_key,
        })
    }
}
