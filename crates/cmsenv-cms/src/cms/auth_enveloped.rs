//! CMS AuthEnvelopedData (RFC 5083) with AES-GCM (RFC 5084).
//!
//! The AEAD additional data is the DER of `authAttrs` encoded as a
//! `SET OF` (tag 0x31), not with its `[1]` IMPLICIT tag. On decode the AAD is
//! rebuilt from the received bytes by swapping the identifier octet, never
//! by re-encoding the parsed attributes.

use cmsenv_types::CmsError;
use cmsenv_utils::asn1::{tags, Decoder};
use cmsenv_utils::oid::known;

use super::enveloped::{check_originator_info, encode_recipient_infos, EncryptedContentInfo};
use super::recipient::{parse_recipient_infos, RecipientInfo};
use super::{
    cerr, encode_attributes, parse_attributes, read_version, validate_attributes, Attribute,
    ContentInfo,
};
use crate::encoding::{enc_octet, enc_seq, enc_u32, retag};

const AUTH_ATTRS_TAG: u8 = tags::CONTEXT_SPECIFIC | tags::CONSTRUCTED | 1;
const UNAUTH_ATTRS_TAG: u8 = tags::CONTEXT_SPECIFIC | tags::CONSTRUCTED | 2;

/// DER `SET OF Attribute` used as GCM additional data, or `None` when there
/// are no authenticated attributes.
pub fn auth_attrs_aad(auth_attrs: Option<&[Attribute]>) -> Option<Vec<u8>> {
    auth_attrs
        .filter(|a| !a.is_empty())
        .map(|a| encode_attributes(a, tags::SET))
}

/// The mac is only checked on the AEAD path; anything else is refused.
pub(crate) fn require_aead(eci: &EncryptedContentInfo) -> Result<(), CmsError> {
    let alg = eci.content_alg()?;
    if !alg.is_aead() {
        return Err(CmsError::UnsupportedAlgorithm(format!(
            "AuthEnvelopedData requires an AEAD content algorithm, got {}",
            alg.as_str()
        )));
    }
    Ok(())
}

/// CMS AuthEnvelopedData.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEnvelopedData {
    /// Always 0.
    pub version: u32,
    pub originator_info: Option<Vec<u8>>,
    pub recipient_infos: Vec<RecipientInfo>,
    pub auth_encrypted_content_info: EncryptedContentInfo,
    pub auth_attrs: Option<Vec<Attribute>>,
    /// Received `[1]` encoding with the SET tag restored; the exact AAD.
    pub(crate) auth_attrs_der: Option<Vec<u8>>,
    pub mac: Vec<u8>,
    pub unauth_attrs: Option<Vec<Attribute>>,
}

impl AuthEnvelopedData {
    pub fn new(
        originator_info: Option<Vec<u8>>,
        recipient_infos: Vec<RecipientInfo>,
        auth_encrypted_content_info: EncryptedContentInfo,
        auth_attrs: Option<Vec<Attribute>>,
        mac: Vec<u8>,
        unauth_attrs: Option<Vec<Attribute>>,
    ) -> Result<Self, CmsError> {
        if recipient_infos.is_empty() {
            return Err(CmsError::InvalidArg("at least one recipient is required".into()));
        }
        if let Some(raw) = &originator_info {
            check_originator_info(raw)?;
        }
        require_aead(&auth_encrypted_content_info)?;
        let auth_attrs = auth_attrs.filter(|a| !a.is_empty());
        let unauth_attrs = unauth_attrs.filter(|a| !a.is_empty());
        for attrs in [&auth_attrs, &unauth_attrs].into_iter().flatten() {
            validate_attributes(attrs)?;
        }
        let auth_attrs_der = auth_attrs_aad(auth_attrs.as_deref());
        Ok(Self {
            version: 0,
            originator_info,
            recipient_infos,
            auth_encrypted_content_info,
            auth_attrs,
            auth_attrs_der,
            mac,
            unauth_attrs,
        })
    }

    /// Additional authenticated data for the content cipher.
    pub fn aad(&self) -> Option<&[u8]> {
        self.auth_attrs_der.as_deref()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut inner = enc_u32(self.version);
        if let Some(oi) = &self.originator_info {
            inner.extend_from_slice(oi);
        }
        inner.extend_from_slice(&encode_recipient_infos(&self.recipient_infos));
        inner.extend_from_slice(&self.auth_encrypted_content_info.encode());
        if let Some(aad) = &self.auth_attrs_der {
            inner.extend_from_slice(&retag(aad.clone(), AUTH_ATTRS_TAG));
        }
        inner.extend_from_slice(&enc_octet(&self.mac));
        if let Some(attrs) = &self.unauth_attrs {
            inner.extend_from_slice(&encode_attributes(attrs, UNAUTH_ATTRS_TAG));
        }
        enc_seq(&inner)
    }

    /// DER of the enclosing ContentInfo (id-ct-authEnvelopedData).
    pub fn to_content_info(&self) -> Vec<u8> {
        ContentInfo::new(known::auth_enveloped_data(), self.encode()).encode()
    }

    pub fn from_content_info(der: &[u8]) -> Result<Self, CmsError> {
        let ci = ContentInfo::from_der(der)?;
        if ci.content_type != known::auth_enveloped_data() {
            return Err(cerr(&format!(
                "expected id-ct-authEnvelopedData, got {}",
                ci.content_type
            )));
        }
        Self::parse(&ci.content)
    }

    pub fn parse(der: &[u8]) -> Result<Self, CmsError> {
        let mut outer = Decoder::new(der);
        let mut seq = outer
            .read_sequence()
            .map_err(|e| cerr(&format!("AuthEnvelopedData: {e}")))?;
        if !outer.is_empty() {
            return Err(cerr("AuthEnvelopedData: trailing data"));
        }

        let version = read_version(&mut seq, "AuthEnvelopedData")?;
        if version != 0 {
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
        let auth_encrypted_content_info = EncryptedContentInfo::parse(&mut seq)?;
        require_aead(&auth_encrypted_content_info)?;

        let (auth_attrs, auth_attrs_der) = match seq
            .try_read_context_specific(1, true)
            .map_err(|e| cerr(&format!("authAttrs: {e}")))?
        {
            Some(tlv) => (
                Some(parse_attributes(tlv.value)?),
                Some(retag(tlv.raw.to_vec(), tags::SET)),
            ),
            None => (None, None),
        };

        let mac = seq
            .read_octet_string()
            .map_err(|e| cerr(&format!("mac: {e}")))?
            .to_vec();

        let unauth_attrs = seq
            .try_read_context_specific(2, true)
            .map_err(|e| cerr(&format!("unauthAttrs: {e}")))?
            .map(|tlv| parse_attributes(tlv.value))
            .transpose()?;
        if !seq.is_empty() {
            return Err(cerr("AuthEnvelopedData: trailing data"));
        }

        Ok(Self {
            version,
            originator_info,
            recipient_infos,
            auth_encrypted_content_info,
            auth_attrs,
            auth_attrs_der,
            mac,
            unauth_attrs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::recipient::{KekIdentifier, KekRecipientInfo};
    use crate::cms::AlgorithmIdentifier;
    use crate::encoding::enc_null;
    use cmsenv_utils::oid::Oid;

    fn gcm_eci() -> EncryptedContentInfo {
        let params = enc_seq(&enc_octet(&[0u8; 12]));
        EncryptedContentInfo {
            content_type: known::pkcs7_data(),
            content_encryption_algorithm: AlgorithmIdentifier::new(
                &known::aes128_gcm(),
                Some(params),
            ),
            encrypted_content: Some(vec![1, 2, 3]),
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
    fn test_auth_enveloped_roundtrip_with_attrs() {
        let auth = vec![Attribute::new(Oid::new(&[1, 2, 840, 113549, 1, 9, 5]), vec![enc_null()])];
        let unauth = vec![Attribute::new(Oid::new(&[1, 2, 3, 4]), vec![enc_octet(b"u")])];
        let aed = AuthEnvelopedData::new(
            None,
            vec![kekri()],
            gcm_eci(),
            Some(auth),
            vec![0xEE; 16],
            Some(unauth),
        )
        .unwrap();
        let der = aed.to_content_info();
        let parsed = AuthEnvelopedData::from_content_info(&der).unwrap();
        assert_eq!(parsed, aed);
        assert_eq!(parsed.aad().unwrap()[0], 0x31);
    }

    #[test]
    fn test_aad_is_received_bytes() {
        // Values out of DER order: the AAD must keep them as sent.
        let mut attr = crate::encoding::enc_oid(&Oid::new(&[1, 2, 3]).to_der_value());
        attr.extend_from_slice(&crate::encoding::enc_tlv(
            tags::SET,
            &[0x04, 0x01, 0x09, 0x04, 0x01, 0x01],
        ));
        let tagged = crate::encoding::enc_tlv(AUTH_ATTRS_TAG, &enc_seq(&attr));

        let aed = AuthEnvelopedData::new(None, vec![kekri()], gcm_eci(), None, vec![0; 16], None)
            .unwrap();
        let mut seq = Decoder::new(&aed.encode()).read_sequence().unwrap().remaining().to_vec();
        // [1] goes right before the mac
        let pos = seq.len() - enc_octet(&[0u8; 16]).len();
        seq.splice(pos..pos, tagged.iter().copied());

        let parsed = AuthEnvelopedData::parse(&enc_seq(&seq)).unwrap();
        let expected = retag(tagged, tags::SET);
        assert_eq!(parsed.aad().unwrap(), expected.as_slice());
        assert_eq!(parsed.auth_attrs.unwrap()[0].values.len(), 2);
    }

    #[test]
    fn test_requires_aead() {
        let mut eci = gcm_eci();
        eci.content_encryption_algorithm =
            AlgorithmIdentifier::new(&known::aes128_cbc(), Some(enc_octet(&[0u8; 16])));
        assert!(matches!(
            AuthEnvelopedData::new(None, vec![kekri()], eci, None, vec![], None),
            Err(CmsError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_parse_rejects_cbc_content() {
        let mut aed =
            AuthEnvelopedData::new(None, vec![kekri()], gcm_eci(), None, vec![0; 16], None)
                .unwrap();
        aed.auth_encrypted_content_info.content_encryption_algorithm =
            AlgorithmIdentifier::new(&known::aes128_cbc(), Some(enc_octet(&[0u8; 16])));
        assert!(matches!(
            AuthEnvelopedData::parse(&aed.encode()),
            Err(CmsError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            AuthEnvelopedData::from_content_info(&aed.to_content_info()),
            Err(CmsError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_version_must_be_zero() {
        let mut aed =
            AuthEnvelopedData::new(None, vec![kekri()], gcm_eci(), None, vec![0; 16], None)
                .unwrap();
        aed.version = 2;
        assert!(matches!(
            AuthEnvelopedData::parse(&aed.encode()),
            Err(CmsError::UnsupportedVersion(2))
        ));
    }
}
