//! CMS EnvelopedData (RFC 5652 §6).

use cmsenv_types::{CmsError, ContentEncryptionAlg};
use cmsenv_utils::asn1::{tags, Decoder, TagClass};
use cmsenv_utils::oid::{known, Oid};

use super::content::content_alg_of;
use super::recipient::{parse_recipient_infos, RecipientInfo};
use super::{
    cerr, encode_attributes, parse_attributes, read_version, validate_attributes,
    AlgorithmIdentifier, Attribute, ContentInfo,
};
use crate::encoding::{enc_implicit_ctx, enc_oid, enc_seq, enc_tlv, enc_u32};

/// `EncryptedContentInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContentInfo {
    pub content_type: Oid,
    pub content_encryption_algorithm: AlgorithmIdentifier,
    /// `None` when the content is detached.
    pub encrypted_content: Option<Vec<u8>>,
}

impl EncryptedContentInfo {
    pub fn content_alg(&self) -> Result<ContentEncryptionAlg, CmsError> {
        content_alg_of(&self.content_encryption_algorithm)
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut inner = enc_oid(&self.content_type.to_der_value());
        inner.extend_from_slice(&self.content_encryption_algorithm.encode());
        if let Some(ct) = &self.encrypted_content {
            // [0] IMPLICIT OCTET STRING
            inner.extend_from_slice(&enc_implicit_ctx(0, ct));
        }
        enc_seq(&inner)
    }

    pub(crate) fn parse(dec: &mut Decoder) -> Result<Self, CmsError> {
        let mut seq = dec
            .read_sequence()
            .map_err(|e| cerr(&format!("EncryptedContentInfo: {e}")))?;
        let oid = seq
            .read_oid()
            .map_err(|e| cerr(&format!("EncryptedContentInfo type: {e}")))?;
        let content_type =
            Oid::from_der_value(oid).map_err(|e| cerr(&format!("EncryptedContentInfo type: {e}")))?;
        let content_encryption_algorithm = AlgorithmIdentifier::parse(&mut seq)?;

        let encrypted_content = match seq
            .try_read_context_any(0)
            .map_err(|e| cerr(&format!("encryptedContent [0]: {e}")))?
        {
            None => None,
            Some(tlv) if !tlv.tag.constructed => Some(tlv.value.to_vec()),
            // BER input may carry the OCTET STRING as constructed fragments
            Some(tlv) => {
                let mut frags = Decoder::new(tlv.value);
                let mut out = Vec::with_capacity(tlv.value.len());
                while !frags.is_empty() {
                    out.extend_from_slice(
                        frags
                            .read_octet_string()
                            .map_err(|e| cerr(&format!("encryptedContent fragment: {e}")))?,
                    );
                }
                Some(out)
            }
        };
        if !seq.is_empty() {
            return Err(cerr("EncryptedContentInfo: trailing data"));
        }
        Ok(Self {
            content_type,
            content_encryption_algorithm,
            encrypted_content,
        })
    }
}

/// `RecipientInfos` as a SET in caller order.
pub(crate) fn encode_recipient_infos(recipient_infos: &[RecipientInfo]) -> Vec<u8> {
    let body: Vec<u8> = recipient_infos.iter().flat_map(RecipientInfo::encode).collect();
    enc_tlv(tags::SET, &body)
}

pub(crate) fn check_originator_info(raw: &[u8]) -> Result<(), CmsError> {
    let mut dec = Decoder::new(raw);
    let tlv = dec
        .read_tlv()
        .map_err(|e| CmsError::InvalidArg(format!("originatorInfo: {e}")))?;
    if !dec.is_empty()
        || tlv.tag.class != TagClass::ContextSpecific
        || tlv.tag.number != 0
        || !tlv.tag.constructed
    {
        return Err(CmsError::InvalidArg(
            "originatorInfo must be one [0] constructed element".into(),
        ));
    }
    Ok(())
}

/// CMS EnvelopedData.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopedData {
    pub version: u32,
    /// Full `[0] IMPLICIT OriginatorInfo` encoding, carried opaquely.
    pub originator_info: Option<Vec<u8>>,
    pub recipient_infos: Vec<RecipientInfo>,
    pub encrypted_content_info: EncryptedContentInfo,
    pub unprotected_attrs: Option<Vec<Attribute>>,
}

impl EnvelopedData {
    /// Assemble, computing the version per RFC 5652 §6.1.
    pub fn new(
        originator_info: Option<Vec<u8>>,
        recipient_infos: Vec<RecipientInfo>,
        encrypted_content_info: EncryptedContentInfo,
        unprotected_attrs: Option<Vec<Attribute>>,
    ) -> Result<Self, CmsError> {
        if recipient_infos.is_empty() {
            return Err(CmsError::InvalidArg("at least one recipient is required".into()));
        }
        if let Some(raw) = &originator_info {
            check_originator_info(raw)?;
        }
        let unprotected_attrs = unprotected_attrs.filter(|a| !a.is_empty());
        if let Some(attrs) = &unprotected_attrs {
            validate_attributes(attrs)?;
        }
        if encrypted_content_info.content_alg()?.is_aead() {
            return Err(CmsError::UnsupportedAlgorithm(
                "AEAD content belongs in AuthEnvelopedData".into(),
            ));
        }
        let version = Self::compute_version(
            originator_info.is_some(),
            &recipient_infos,
            unprotected_attrs.is_some(),
        );
        Ok(Self {
            version,
            originator_info,
            recipient_infos,
            encrypted_content_info,
            unprotected_attrs,
        })
    }

    /// 3 if any pwri or ori is present; 0 if there is no originatorInfo, no
    /// unprotectedAttrs and every RecipientInfo is version 0; otherwise 2.
    pub fn compute_version(
        has_originator_info: bool,
        recipient_infos: &[RecipientInfo],
        has_unprotected_attrs: bool,
    ) -> u32 {
        let pwri_or_ori = recipient_infos
            .iter()
            .any(|ri| matches!(ri, RecipientInfo::Password(_) | RecipientInfo::Other(_)));
        if pwri_or_ori {
            3
        } else if !has_originator_info
            && !has_unprotected_attrs
            && recipient_infos.iter().all(|ri| ri.version() == 0)
        {
            0
        } else {
            2
        }
    }

    /// DER of the EnvelopedData SEQUENCE.
    pub fn encode(&self) -> Vec<u8> {
        let mut inner = enc_u32(self.version);
        if let Some(oi) = &self.originator_info {
            inner.extend_from_slice(oi);
        }
        inner.extend_from_slice(&encode_recipient_infos(&self.recipient_infos));
        inner.extend_from_slice(&self.encrypted_content_info.encode());
        if let Some(attrs) = &self.unprotected_attrs {
            inner.extend_from_slice(&encode_attributes(
                attrs,
                tags::CONTEXT_SPECIFIC | tags::CONSTRUCTED | 1,
            ));
        }
        enc_seq(&inner)
    }

    /// DER of the enclosing ContentInfo (id-envelopedData).
    pub fn to_content_info(&self) -> Vec<u8> {
        ContentInfo::new(known::pkcs7_enveloped_data(), self.encode()).encode()
    }

    /// Parse a DER ContentInfo carrying EnvelopedData.
    pub fn from_content_info(der: &[u8]) -> Result<Self, CmsError> {
        let ci = ContentInfo::from_der(der)?;
        if ci.content_type != known::pkcs7_enveloped_data() {
            return Err(cerr(&format!(
                "expected id-envelopedData, got {}",
                ci.content_type
            )));
        }
        Self::parse(&ci.content)
    }

    /// Parse a DER EnvelopedData SEQUENCE.
    pub fn parse(der: &[u8]) -> Result<Self, CmsError> {
        let mut outer = Decoder::new(der);
        let mut seq = outer
            .read_sequence()
            .map_err(|e| cerr(&format!("EnvelopedData: {e}")))?;
        if !outer.is_empty() {
            return Err(cerr("EnvelopedData: trailing data"));
        }

        let version = read_version(&mut seq, "EnvelopedData")?;
        if !matches!(version, 0 | 2 | 3 | 4) {
            return Err(CmsError::UnsupportedVersion(version));
        }

        let originator_info = seq
            .try_read_context_specific(0, true)
            .map_err(|e| cerr(&format!("originatorInfo: {e}")))?
            .map(|tlv| tlv.raw.to_vec());

        let set = seq
            .read_set()
            .map_err(|e| cerr(&format!("RecipientInfos: {e}")))?;
        let recipient_infos = parse_recipient_infos(set)?;

        let encrypted_content_info = EncryptedContentInfo::parse(&mut seq)?;

        let unprotected_attrs = seq
            .try_read_context_specific(1, true)
            .map_err(|e| cerr(&format!("unprotectedAttrs: {e}")))?
            .map(|tlv| parse_attributes(tlv.value))
            .transpose()?;

        if !seq.is_empty() {
            return Err(cerr("EnvelopedData: trailing data"));
        }

        // Certificate contents of originatorInfo can raise the version to 3
        // or 4; nothing else may move it away from the computed value.
        let required = Self::compute_version(
            originator_info.is_some(),
            &recipient_infos,
            unprotected_attrs.is_some(),
        );
        let consistent = if originator_info.is_some() {
            version >= required
        } else {
            version == required
        };
        if !consistent {
            return Err(cerr(&format!(
                "EnvelopedData version {version} does not match its contents (expected {required})"
            )));
        }
        Ok(Self {
            version,
            originator_info,
            recipient_infos,
            encrypted_content_info,
            unprotected_attrs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::recipient::{KekIdentifier, KekRecipientInfo, OtherRecipientInfo};
    use crate::encoding::{enc_null, enc_octet};
    use crate::oid_mapping::content_alg_oid;

    fn eci(alg: ContentEncryptionAlg, content: Option<Vec<u8>>) -> EncryptedContentInfo {
        EncryptedContentInfo {
            content_type: known::pkcs7_data(),
            content_encryption_algorithm: AlgorithmIdentifier::new(
                &content_alg_oid(alg),
                Some(enc_octet(&[0u8; 16])),
            ),
            encrypted_content: content,
        }
    }

    fn kekri() -> RecipientInfo {
        RecipientInfo::Kek(KekRecipientInfo {
            version: 4,
            kek_id: KekIdentifier {
                key_identifier: b"id".to_vec(),
                date: None,
                other: None,
            },
            key_encryption_algorithm: AlgorithmIdentifier::new(&known::aes128_wrap(), None),
            encrypted_key: vec![0xAA; 24],
        })
    }

    #[test]
    fn test_version_rules() {
        let ori = RecipientInfo::Other(OtherRecipientInfo {
            ori_type: Oid::new(&[1, 2, 3]),
            ori_value: enc_null(),
        });
        assert_eq!(EnvelopedData::compute_version(false, &[kekri()], false), 2);
        assert_eq!(EnvelopedData::compute_version(false, &[kekri(), ori], false), 3);
        assert_eq!(EnvelopedData::compute_version(false, &[], false), 0);
        assert_eq!(EnvelopedData::compute_version(true, &[], false), 2);
        assert_eq!(EnvelopedData::compute_version(false, &[], true), 2);
    }

    #[test]
    fn test_enveloped_encode_parse() {
        let attrs = vec![Attribute::new(known::content_type_attr(), vec![enc_null()])];
        let ed = EnvelopedData::new(
            None,
            vec![kekri()],
            eci(ContentEncryptionAlg::Aes128Cbc, Some(vec![0x55; 32])),
            Some(attrs),
        )
        .unwrap();
        assert_eq!(ed.version, 2);
        let der = ed.to_content_info();
        let parsed = EnvelopedData::from_content_info(&der).unwrap();
        assert_eq!(parsed, ed);
    }

    #[test]
    fn test_constructed_encrypted_content() {
        let mut inner = enc_oid(&known::pkcs7_data().to_der_value());
        inner.extend_from_slice(
            &AlgorithmIdentifier::new(&known::aes128_cbc(), Some(enc_octet(&[0u8; 16]))).encode(),
        );
        let mut frags = enc_octet(&[1, 2]);
        frags.extend_from_slice(&enc_octet(&[3]));
        inner.extend_from_slice(&enc_tlv(tags::CONTEXT_SPECIFIC | tags::CONSTRUCTED, &frags));
        let der = enc_seq(&inner);
        let parsed = EncryptedContentInfo::parse(&mut Decoder::new(&der)).unwrap();
        assert_eq!(parsed.encrypted_content, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_detached_content() {
        let content = eci(ContentEncryptionAlg::Aes256Cbc, None);
        let ed = EnvelopedData::new(None, vec![kekri()], content, None).unwrap();
        let parsed = EnvelopedData::parse(&ed.encode()).unwrap();
        assert!(parsed.encrypted_content_info.encrypted_content.is_none());
    }

    #[test]
    fn test_rejects_gcm_and_empty_recipients() {
        assert!(matches!(
            EnvelopedData::new(
                None,
                vec![kekri()],
                eci(ContentEncryptionAlg::Aes128Gcm, None),
                None,
            ),
            Err(CmsError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            EnvelopedData::new(None, vec![], eci(ContentEncryptionAlg::Aes128Cbc, None), None),
            Err(CmsError::InvalidArg(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let content = eci(ContentEncryptionAlg::Aes128Cbc, None);
        let mut ed = EnvelopedData::new(None, vec![kekri()], content, None).unwrap();
        ed.version = 1;
        assert!(matches!(
            EnvelopedData::parse(&ed.encode()),
            Err(CmsError::UnsupportedVersion(1))
        ));
        ed.version = 7;
        assert!(matches!(
            EnvelopedData::parse(&ed.encode()),
            Err(CmsError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_version_must_match_contents() {
        let ori = RecipientInfo::Other(OtherRecipientInfo {
            ori_type: Oid::new(&[1, 2, 3]),
            ori_value: enc_null(),
        });
        let mut ed = EnvelopedData::new(
            None,
            vec![ori],
            eci(ContentEncryptionAlg::Aes128Cbc, Some(vec![0; 16])),
            None,
        )
        .unwrap();
        assert_eq!(ed.version, 3);
        for wrong in [0, 2, 4] {
            ed.version = wrong;
            assert!(matches!(EnvelopedData::parse(&ed.encode()), Err(CmsError::Parse(_))));
        }

        let attrs = vec![Attribute::new(known::content_type_attr(), vec![enc_null()])];
        let mut ed = EnvelopedData::new(
            None,
            vec![kekri()],
            eci(ContentEncryptionAlg::Aes128Cbc, Some(vec![0; 16])),
            Some(attrs),
        )
        .unwrap();
        ed.version = 0;
        assert!(matches!(EnvelopedData::parse(&ed.encode()), Err(CmsError::Parse(_))));

        // originatorInfo may carry certificates that require 3 or 4
        let mut ed = EnvelopedData::new(
            Some(vec![0xA0, 0x00]),
            vec![kekri()],
            eci(ContentEncryptionAlg::Aes128Cbc, Some(vec![0; 16])),
            None,
        )
        .unwrap();
        for accepted in [2, 3, 4] {
            ed.version = accepted;
            assert_eq!(EnvelopedData::parse(&ed.encode()).unwrap().version, accepted);
        }
        ed.version = 0;
        assert!(EnvelopedData::parse(&ed.encode()).is_err());
    }

    #[test]
    fn test_wrong_content_type() {
        let ci = ContentInfo::new(known::pkcs7_data(), enc_octet(b"x")).encode();
        assert!(matches!(
            EnvelopedData::from_content_info(&ci),
            Err(CmsError::Parse(_))
        ));
    }

    #[test]
    fn test_recipient_order_preserved() {
        let a = kekri();
        let mut b = kekri();
        if let RecipientInfo::Kek(k) = &mut b {
            k.kek_id.key_identifier = b"a-sorts-first".to_vec();
            k.encrypted_key = vec![0x00; 24];
        }
        let ed = EnvelopedData::new(
            None,
            vec![a.clone(), b.clone()],
            eci(ContentEncryptionAlg::Aes128Cbc, Some(vec![0; 16])),
            None,
        )
        .unwrap();
        let parsed = EnvelopedData::parse(&ed.encode()).unwrap();
        assert_eq!(parsed.recipient_infos, vec![a, b]);
    }

    #[test]
    fn test_originator_info_carried() {
        let oi = vec![0xA0, 0x00];
        let ed = EnvelopedData::new(
            Some(oi.clone()),
            vec![kekri()],
            eci(ContentEncryptionAlg::Aes128Cbc, Some(vec![0; 16])),
            None,
        )
        .unwrap();
        assert_eq!(ed.version, 2);
        assert_eq!(EnvelopedData::parse(&ed.encode()).unwrap().originator_info, Some(oi));
        assert!(EnvelopedData::new(
            Some(vec![0x30, 0x00]),
            vec![kekri()],
            eci(ContentEncryptionAlg::Aes128Cbc, None),
            None
        )
        .is_err());
    }
}
