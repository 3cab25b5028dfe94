//! Key agreement recipients (RFC 5652 §6.2.2) using ECDH over the NIST
//! curves with the X9.63 KDF and AES key wrap (RFC 5753).

use cmsenv_crypto::CryptoProvider;
use cmsenv_types::{CmsError, EccCurveId, KeyAgreeScheme, KeyWrapAlg};
use cmsenv_utils::asn1::{tags, Decoder};
use cmsenv_utils::oid::known;
use zeroize::Zeroizing;

use super::kekri::OtherKeyAttribute;
use super::ktri::parse_rid;
use crate::cms::{cerr, read_version, AlgorithmIdentifier, RecipientId};
use crate::encoding::{
    enc_explicit_ctx, enc_generalized_time, enc_implicit_ctx, enc_octet, enc_oid, enc_seq, enc_tlv,
    enc_u32,
};
use crate::oid_mapping::{
    curve_oid, key_agree_oid, key_wrap_oid, oid_to_curve_id, oid_to_key_agree, oid_to_key_wrap,
};

/// `OriginatorIdentifierOrKey`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Originator {
    /// Static originator named by certificate; the recipient supplies its
    /// public key out of band.
    Id(RecipientId),
    /// `[1] originatorKey`: ephemeral public point. `curve` is `None` when the
    /// algorithm parameters are absent or NULL.
    Key {
        curve: Option<EccCurveId>,
        public_key: Vec<u8>,
    },
}

/// One `RecipientEncryptedKey`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientEncryptedKey {
    pub rid: RecipientId,
    /// `rKeyId` date, if the identifier was a RecipientKeyIdentifier.
    pub date: Option<i64>,
    pub other: Option<OtherKeyAttribute>,
    pub encrypted_key: Vec<u8>,
}

/// `KeyAgreeRecipientInfo`, always version 3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAgreeRecipientInfo {
    pub version: u32,
    pub originator: Originator,
    pub ukm: Option<Vec<u8>>,
    /// dhSinglePass scheme with the key-wrap AlgorithmIdentifier as parameter.
    pub key_encryption_algorithm: AlgorithmIdentifier,
    pub recipient_encrypted_keys: Vec<RecipientEncryptedKey>,
}

/// Originator key material for wrapping.
#[derive(Clone)]
pub enum OriginatorKey {
    /// Generate a fresh key pair per RecipientInfo.
    Ephemeral,
    /// Static originator key pair identified by `id`.
    Static {
        id: RecipientId,
        private_key: Zeroizing<Vec<u8>>,
    },
}

impl std::fmt::Debug for OriginatorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OriginatorKey::Ephemeral => f.write_str("Ephemeral"),
            OriginatorKey::Static { id, .. } => f
                .debug_struct("Static")
                .field("id", id)
                .finish_non_exhaustive(),
        }
    }
}

/// Parameters of one KARI on the wrapping side.
#[derive(Debug, Clone)]
pub struct KeyAgreeParams {
    pub curve: EccCurveId,
    pub scheme: KeyAgreeScheme,
    pub wrap: KeyWrapAlg,
    pub originator: OriginatorKey,
    pub ukm: Option<Vec<u8>>,
    /// Each recipient's identifier and uncompressed SEC1 public point.
    pub recipients: Vec<(RecipientId, Vec<u8>)>,
}

impl KeyAgreeRecipientInfo {
    pub fn wrap(
        provider: &dyn CryptoProvider,
        cek: &[u8],
        params: &KeyAgreeParams,
    ) -> Result<Self, CmsError> {
        if params.recipients.is_empty() {
            return Err(CmsError::InvalidArg("key agreement without recipients".into()));
        }
        let (private_key, originator) = match &params.originator {
            OriginatorKey::Ephemeral => {
                let (private_key, public_key) = provider.ec_generate(params.curve)?;
                let originator = Originator::Key {
                    curve: Some(params.curve),
                    public_key,
                };
                (private_key, originator)
            }
            OriginatorKey::Static { id, private_key } => {
                (private_key.clone(), Originator::Id(id.clone()))
            }
        };

        let shared_info = shared_info(params.wrap, params.ukm.as_deref());
        let mut recipient_encrypted_keys = Vec::with_capacity(params.recipients.len());
        for (rid, public_key) in &params.recipients {
            let kek = derive_kek(
                provider,
                params.curve,
                params.scheme,
                params.wrap,
                &private_key,
                public_key,
                &shared_info,
            )?;
            recipient_encrypted_keys.push(RecipientEncryptedKey {
                rid: rid.clone(),
                date: None,
                other: None,
                encrypted_key: provider.key_wrap(&kek, cek)?,
            });
        }

        let wrap_alg = AlgorithmIdentifier::new(&key_wrap_oid(params.wrap), None).encode();
        Ok(Self {
            version: 3,
            originator,
            ukm: params.ukm.clone(),
            key_encryption_algorithm: AlgorithmIdentifier::new(
                &key_agree_oid(params.scheme),
                Some(wrap_alg),
            ),
            recipient_encrypted_keys,
        })
    }

    /// Index of the RecipientEncryptedKey addressed to `rid`, if any.
    pub fn position_of(&self, rid: &RecipientId) -> Option<usize> {
        self.recipient_encrypted_keys.iter().position(|rek| rek.rid == *rid)
    }

    /// Unwrap the CEK addressed to `rid` with the recipient's private scalar.
    /// `originator_public` is required when the originator is static.
    pub fn unwrap(
        &self,
        provider: &dyn CryptoProvider,
        rid: &RecipientId,
        curve: EccCurveId,
        private_key: &[u8],
        originator_public: Option<&[u8]>,
    ) -> Result<Zeroizing<Vec<u8>>, CmsError> {
        let index = self
            .position_of(rid)
            .ok_or_else(|| CmsError::Unwrap("no encrypted key for this recipient".into()))?;
        let (scheme, wrap) = self.algorithms()?;

        let peer = match &self.originator {
            Originator::Key {
                curve: declared,
                public_key,
            } => {
                if declared.is_some_and(|c| c != curve) {
                    return Err(CmsError::Unwrap("originator key is on a different curve".into()));
                }
                public_key.as_slice()
            }
            Originator::Id(_) => originator_public.ok_or_else(|| {
                CmsError::Unwrap("static originator public key not supplied".into())
            })?,
        };

        let shared_info = shared_info(wrap, self.ukm.as_deref());
        let kek = derive_kek(provider, curve, scheme, wrap, private_key, peer, &shared_info)?;
        provider
            .key_unwrap(&kek, &self.recipient_encrypted_keys[index].encrypted_key)
            .map_err(|e| CmsError::Unwrap(format!("key agreement unwrap: {e}")))
    }

    /// Key agreement scheme and key wrap named by `keyEncryptionAlgorithm`.
    pub fn algorithms(&self) -> Result<(KeyAgreeScheme, KeyWrapAlg), CmsError> {
        let oid = self.key_encryption_algorithm.oid()?;
        let scheme = oid_to_key_agree(&oid)
            .ok_or_else(|| CmsError::UnsupportedAlgorithm(format!("key agreement {oid}")))?;
        let wrap_params = self
            .key_encryption_algorithm
            .params
            .as_deref()
            .ok_or_else(|| cerr("key agreement algorithm without key wrap parameter"))?;
        let wrap_alg = AlgorithmIdentifier::parse(&mut Decoder::new(wrap_params))?;
        let wrap_oid = wrap_alg.oid()?;
        let wrap = oid_to_key_wrap(&wrap_oid)
            .ok_or_else(|| CmsError::UnsupportedAlgorithm(format!("key wrap {wrap_oid}")))?;
        Ok((scheme, wrap))
    }

    pub(crate) fn encode_fields(&self) -> Vec<u8> {
        let originator = match &self.originator {
            Originator::Id(RecipientId::IssuerAndSerial { issuer, serial }) => {
                RecipientId::encode_issuer_and_serial(issuer, serial)
            }
            Originator::Id(RecipientId::SubjectKeyId(ski)) => enc_implicit_ctx(0, ski),
            Originator::Key { curve, public_key } => {
                let params = curve.map(|c| enc_oid(&curve_oid(c).to_der_value()));
                let mut inner = AlgorithmIdentifier::new(&known::ec_public_key(), params).encode();
                let mut bits = vec![0u8];
                bits.extend_from_slice(public_key);
                inner.extend_from_slice(&enc_tlv(tags::BIT_STRING, &bits));
                // [1] IMPLICIT OriginatorPublicKey
                enc_tlv(tags::CONTEXT_SPECIFIC | tags::CONSTRUCTED | 1, &inner)
            }
        };

        let mut inner = enc_u32(self.version);
        inner.extend_from_slice(&enc_explicit_ctx(0, &originator));
        if let Some(ukm) = &self.ukm {
            inner.extend_from_slice(&enc_explicit_ctx(1, &enc_octet(ukm)));
        }
        inner.extend_from_slice(&self.key_encryption_algorithm.encode());

        let mut reks = Vec::new();
        for rek in &self.recipient_encrypted_keys {
            let rid = match &rek.rid {
                RecipientId::IssuerAndSerial { issuer, serial } => {
                    RecipientId::encode_issuer_and_serial(issuer, serial)
                }
                RecipientId::SubjectKeyId(ski) => {
                    // [0] IMPLICIT RecipientKeyIdentifier
                    let mut rkey = enc_octet(ski);
                    if let Some(date) = rek.date {
                        rkey.extend_from_slice(&enc_generalized_time(date));
                    }
                    if let Some(other) = &rek.other {
                        rkey.extend_from_slice(&other.encode());
                    }
                    enc_tlv(tags::CONTEXT_SPECIFIC | tags::CONSTRUCTED, &rkey)
                }
            };
            let mut rek_inner = rid;
            rek_inner.extend_from_slice(&enc_octet(&rek.encrypted_key));
            reks.extend_from_slice(&enc_seq(&rek_inner));
        }
        inner.extend_from_slice(&enc_seq(&reks));
        inner
    }

    pub(crate) fn parse_fields(mut dec: Decoder) -> Result<Self, CmsError> {
        let version = read_version(&mut dec, "KARI")?;
        if version != 3 {
            return Err(CmsError::UnsupportedVersion(version));
        }

        let orig = dec
            .read_context_specific(0, true)
            .map_err(|e| cerr(&format!("KARI originator: {e}")))?;
        let mut orig_dec = Decoder::new(orig.value);
        let originator = if let Some(key) = orig_dec
            .try_read_context_specific(1, true)
            .map_err(|e| cerr(&format!("originatorKey: {e}")))?
        {
            parse_originator_key(key.value)?
        } else {
            Originator::Id(parse_rid(&mut orig_dec)?)
        };
        if !orig_dec.is_empty() {
            return Err(cerr("KARI originator: trailing data"));
        }

        let ukm = dec
            .try_read_context_specific(1, true)
            .map_err(|e| cerr(&format!("KARI ukm: {e}")))?
            .map(|tlv| {
                Decoder::new(tlv.value)
                    .read_octet_string()
                    .map(<[u8]>::to_vec)
                    .map_err(|e| cerr(&format!("KARI ukm: {e}")))
            })
            .transpose()?;

        let key_encryption_algorithm = AlgorithmIdentifier::parse(&mut dec)?;

        let mut reks_dec = dec
            .read_sequence()
            .map_err(|e| cerr(&format!("RecipientEncryptedKeys: {e}")))?;
        let mut recipient_encrypted_keys = Vec::new();
        while !reks_dec.is_empty() {
            recipient_encrypted_keys.push(parse_rek(&mut reks_dec)?);
        }
        if recipient_encrypted_keys.is_empty() {
            return Err(cerr("KARI: no RecipientEncryptedKeys"));
        }
        if !dec.is_empty() {
            return Err(cerr("KARI: trailing data"));
        }

        Ok(Self {
            version,
            originator,
            ukm,
            key_encryption_algorithm,
            recipient_encrypted_keys,
        })
    }
}

fn parse_originator_key(value: &[u8]) -> Result<Originator, CmsError> {
    let mut dec = Decoder::new(value);
    let alg = AlgorithmIdentifier::parse(&mut dec)?;
    if !alg.is(&known::ec_public_key()) {
        return Err(CmsError::UnsupportedAlgorithm(format!(
            "originator key algorithm {}",
            alg.oid()?
        )));
    }
    let curve = match alg.non_null_params() {
        None => None,
        Some(p) => {
            let oid = Decoder::new(p)
                .read_oid()
                .map_err(|e| cerr(&format!("originator curve: {e}")))?;
            let oid = cmsenv_utils::oid::Oid::from_der_value(oid)
                .map_err(|e| cerr(&format!("originator curve: {e}")))?;
            Some(
                oid_to_curve_id(&oid)
                    .ok_or_else(|| CmsError::UnsupportedAlgorithm(format!("curve {oid}")))?,
            )
        }
    };
    let (unused, point) = dec
        .read_bit_string()
        .map_err(|e| cerr(&format!("originator publicKey: {e}")))?;
    if unused != 0 || !dec.is_empty() {
        return Err(cerr("originator publicKey: malformed"));
    }
    Ok(Originator::Key {
        curve,
        public_key: point.to_vec(),
    })
}

fn parse_rek(dec: &mut Decoder) -> Result<RecipientEncryptedKey, CmsError> {
    let mut seq = dec
        .read_sequence()
        .map_err(|e| cerr(&format!("RecipientEncryptedKey: {e}")))?;
    let (rid, date, other) = if let Some(rkey) = seq
        .try_read_context_specific(0, true)
        .map_err(|e| cerr(&format!("rKeyId: {e}")))?
    {
        let mut rk = Decoder::new(rkey.value);
        let ski = rk
            .read_octet_string()
            .map_err(|e| cerr(&format!("rKeyId subjectKeyIdentifier: {e}")))?;
        let mut date = None;
        if !rk.is_empty()
            && rk
                .peek_tag()
                .map_err(|e| cerr(&format!("rKeyId: {e}")))?
                .number
                == u32::from(tags::GENERALIZED_TIME)
        {
            date = Some(rk.read_time().map_err(|e| cerr(&format!("rKeyId date: {e}")))?);
        }
        let other = if rk.is_empty() {
            None
        } else {
            Some(OtherKeyAttribute::parse(&mut rk)?)
        };
        (RecipientId::SubjectKeyId(ski.to_vec()), date, other)
    } else {
        let ias = seq
            .read_sequence()
            .map_err(|e| cerr(&format!("KARI rid: {e}")))?;
        (RecipientId::parse_issuer_and_serial(ias)?, None, None)
    };
    let encrypted_key = seq
        .read_octet_string()
        .map_err(|e| cerr(&format!("KARI encryptedKey: {e}")))?
        .to_vec();
    if !seq.is_empty() {
        return Err(cerr("RecipientEncryptedKey: trailing data"));
    }
    Ok(RecipientEncryptedKey {
        rid,
        date,
        other,
        encrypted_key,
    })
}

// ── KEK derivation ───────────────────────────────────────────────────

/// DER `ECC-CMS-SharedInfo { keyInfo, [0] entityUInfo, [2] suppPubInfo }`.
fn shared_info(wrap: KeyWrapAlg, ukm: Option<&[u8]>) -> Vec<u8> {
    let mut inner = AlgorithmIdentifier::new(&key_wrap_oid(wrap), None).encode();
    if let Some(ukm) = ukm {
        inner.extend_from_slice(&enc_explicit_ctx(0, &enc_octet(ukm)));
    }
    let key_bits = (wrap.kek_len() as u32 * 8).to_be_bytes();
    inner.extend_from_slice(&enc_explicit_ctx(2, &enc_octet(&key_bits)));
    enc_seq(&inner)
}

fn derive_kek(
    provider: &dyn CryptoProvider,
    curve: EccCurveId,
    scheme: KeyAgreeScheme,
    wrap: KeyWrapAlg,
    private_key: &[u8],
    peer_public: &[u8],
    shared_info: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CmsError> {
    // P-256 and P-384 have cofactor 1, so cofactor DH equals standard DH.
    let z = provider.ecdh(curve, private_key, peer_public)?;
    let mut kek = Zeroizing::new(vec![0u8; wrap.kek_len()]);
    provider.x963_kdf(scheme.kdf_hash(), &z, shared_info, &mut kek)?;
    Ok(kek)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::test_support::name_cn;
    use cmsenv_crypto::DefaultProvider;
    use cmsenv_types::HashAlgId;

    fn params(
        p: &DefaultProvider,
        curve: EccCurveId,
        n: usize,
    ) -> (KeyAgreeParams, Vec<(RecipientId, Zeroizing<Vec<u8>>)>) {
        let mut recipients = Vec::new();
        let mut keys = Vec::new();
        for i in 0..n {
            let (sk, pk) = p.ec_generate(curve).unwrap();
            let rid = RecipientId::subject_key_id(&[i as u8 + 1; 8]);
            recipients.push((rid.clone(), pk));
            keys.push((rid, sk));
        }
        (
            KeyAgreeParams {
                curve,
                scheme: KeyAgreeScheme::StdDh(HashAlgId::Sha256),
                wrap: KeyWrapAlg::Aes128Wrap,
                originator: OriginatorKey::Ephemeral,
                ukm: None,
                recipients,
            },
            keys,
        )
    }

    #[test]
    fn test_kari_ephemeral_multiple_recipients() {
        let p = DefaultProvider::new();
        let (params, keys) = params(&p, EccCurveId::NistP256, 3);
        let cek = [0x77u8; 16];
        let kari = KeyAgreeRecipientInfo::wrap(&p, &cek, &params).unwrap();
        let parsed =
            KeyAgreeRecipientInfo::parse_fields(Decoder::new(&kari.encode_fields())).unwrap();
        assert_eq!(parsed, kari);
        assert_eq!(parsed.recipient_encrypted_keys.len(), 3);
        for (rid, sk) in &keys {
            let got = parsed.unwrap(&p, rid, EccCurveId::NistP256, sk, None).unwrap();
            assert_eq!(*got, cek);
        }
    }

    #[test]
    fn test_kari_p384_cofactor_with_ukm() {
        let p = DefaultProvider::new();
        let (mut params, keys) = params(&p, EccCurveId::NistP384, 1);
        params.scheme = KeyAgreeScheme::CofactorDh(HashAlgId::Sha384);
        params.wrap = KeyWrapAlg::Aes256Wrap;
        params.ukm = Some(b"user keying material".to_vec());
        let cek = [0x01u8; 32];
        let kari = KeyAgreeRecipientInfo::wrap(&p, &cek, &params).unwrap();
        let parsed =
            KeyAgreeRecipientInfo::parse_fields(Decoder::new(&kari.encode_fields())).unwrap();
        assert_eq!(parsed.ukm.as_deref(), Some(&b"user keying material"[..]));
        assert_eq!(
            parsed.algorithms().unwrap(),
            (KeyAgreeScheme::CofactorDh(HashAlgId::Sha384), KeyWrapAlg::Aes256Wrap)
        );
        let (rid, sk) = &keys[0];
        assert_eq!(*parsed.unwrap(&p, rid, EccCurveId::NistP384, sk, None).unwrap(), cek);
    }

    #[test]
    fn test_kari_static_originator() {
        let p = DefaultProvider::new();
        let (orig_sk, orig_pk) = p.ec_generate(EccCurveId::NistP256).unwrap();
        let (mut params, keys) = params(&p, EccCurveId::NistP256, 1);
        let orig_id = RecipientId::issuer_and_serial(&name_cn("Originator"), &[0x05]);
        params.originator = OriginatorKey::Static {
            id: orig_id.clone(),
            private_key: orig_sk,
        };
        let cek = [0x99u8; 24];
        let kari = KeyAgreeRecipientInfo::wrap(&p, &cek, &params).unwrap();
        let parsed =
            KeyAgreeRecipientInfo::parse_fields(Decoder::new(&kari.encode_fields())).unwrap();
        assert_eq!(parsed.originator, Originator::Id(orig_id));

        let (rid, sk) = &keys[0];
        assert!(matches!(
            parsed.unwrap(&p, rid, EccCurveId::NistP256, sk, None),
            Err(CmsError::Unwrap(_))
        ));
        let got = parsed
            .unwrap(&p, rid, EccCurveId::NistP256, sk, Some(&orig_pk))
            .unwrap();
        assert_eq!(*got, cek);
    }

    #[test]
    fn test_kari_unknown_rid_and_wrong_key() {
        let p = DefaultProvider::new();
        let (params, keys) = params(&p, EccCurveId::NistP256, 1);
        let kari = KeyAgreeRecipientInfo::wrap(&p, &[0u8; 16], &params).unwrap();
        let stranger = RecipientId::subject_key_id(b"nobody");
        assert!(kari.position_of(&stranger).is_none());
        let (other_sk, _) = p.ec_generate(EccCurveId::NistP256).unwrap();
        assert!(matches!(
            kari.unwrap(&p, &keys[0].0, EccCurveId::NistP256, &other_sk, None),
            Err(CmsError::Unwrap(_))
        ));
    }

    #[test]
    fn test_originator_key_without_curve_params() {
        let p = DefaultProvider::new();
        let (_, pk) = p.ec_generate(EccCurveId::NistP256).unwrap();
        let mut inner = AlgorithmIdentifier::new(&known::ec_public_key(), None).encode();
        let mut bits = vec![0u8];
        bits.extend_from_slice(&pk);
        inner.extend_from_slice(&enc_tlv(tags::BIT_STRING, &bits));
        let orig = parse_originator_key(&inner).unwrap();
        assert_eq!(
            orig,
            Originator::Key {
                curve: None,
                public_key: pk
            }
        );
    }

    #[test]
    fn test_shared_info_layout() {
        let si = shared_info(KeyWrapAlg::Aes128Wrap, None);
        // SEQUENCE { AlgId(aes128-wrap), [2] { OCTET STRING 00000080 } }
        assert_eq!(&si[si.len() - 8..], &[0xA2, 0x06, 0x04, 0x04, 0x00, 0x00, 0x00, 0x80]);
        let with_ukm = shared_info(KeyWrapAlg::Aes128Wrap, Some(&[1, 2]));
        assert!(with_ukm.windows(6).any(|w| w == [0xA0, 0x04, 0x04, 0x02, 0x01, 0x02]));
    }
}
