//! RecipientInfo strategies and CEK recovery.
//!
//! Each variant of [`RecipientInfo`] protects the same content-encryption
//! key for one recipient (or one group, for key agreement). Wrapping takes a
//! [`RecipientSpec`]; unwrapping walks the received RecipientInfos against
//! the caller's [`DecryptionKey`]s.

pub mod kari;
pub mod kekri;
pub mod ktri;
pub mod ori;
pub mod pwri;

pub use kari::{
    KeyAgreeParams, KeyAgreeRecipientInfo, Originator, OriginatorKey, RecipientEncryptedKey,
};
pub use kekri::{KekIdentifier, KekRecipientInfo, OtherKeyAttribute};
pub use ktri::KeyTransRecipientInfo;
pub use ori::{OtherRecipientHandler, OtherRecipientInfo};
pub use pwri::{PasswordRecipientInfo, Pbkdf2Params};

use cmsenv_crypto::CryptoProvider;
use cmsenv_types::{CmsError, ContentEncryptionAlg, EccCurveId, RsaPadding};
use cmsenv_utils::asn1::{tags, Decoder, TagClass};
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

use super::{cerr, RecipientId};
use crate::config::EngineConfig;
use crate::encoding::{enc_seq, enc_tlv};

/// `RecipientInfo ::= CHOICE { ktri, [1] kari, [2] kekri, [3] pwri, [4] ori }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientInfo {
    KeyTransport(KeyTransRecipientInfo),
    KeyAgreement(KeyAgreeRecipientInfo),
    Kek(KekRecipientInfo),
    Password(PasswordRecipientInfo),
    Other(OtherRecipientInfo),
}

impl RecipientInfo {
    /// CMSVersion of this RecipientInfo. ORI carries none and reports 0.
    pub fn version(&self) -> u32 {
        match self {
            RecipientInfo::KeyTransport(ri) => ri.version,
            RecipientInfo::KeyAgreement(ri) => ri.version,
            RecipientInfo::Kek(ri) => ri.version,
            RecipientInfo::Password(ri) => ri.version,
            RecipientInfo::Other(_) => 0,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RecipientInfo::KeyTransport(_) => "ktri",
            RecipientInfo::KeyAgreement(_) => "kari",
            RecipientInfo::Kek(_) => "kekri",
            RecipientInfo::Password(_) => "pwri",
            RecipientInfo::Other(_) => "ori",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let ctx = |n: u8, fields: Vec<u8>| {
            enc_tlv(tags::CONTEXT_SPECIFIC | tags::CONSTRUCTED | n, &fields)
        };
        match self {
            RecipientInfo::KeyTransport(ri) => enc_seq(&ri.encode_fields()),
            RecipientInfo::KeyAgreement(ri) => ctx(1, ri.encode_fields()),
            RecipientInfo::Kek(ri) => ctx(2, ri.encode_fields()),
            RecipientInfo::Password(ri) => ctx(3, ri.encode_fields()),
            RecipientInfo::Other(ri) => ctx(4, ri.encode_fields()),
        }
    }

    pub(crate) fn parse(dec: &mut Decoder) -> Result<Self, CmsError> {
        let tlv = dec
            .read_tlv()
            .map_err(|e| cerr(&format!("RecipientInfo: {e}")))?;
        let fields = Decoder::new(tlv.value);
        if !tlv.tag.constructed {
            return Err(cerr("RecipientInfo: primitive encoding"));
        }
        match (tlv.tag.class, tlv.tag.number) {
            (TagClass::Universal, 0x10) => {
                KeyTransRecipientInfo::parse_fields(fields).map(RecipientInfo::KeyTransport)
            }
            (TagClass::ContextSpecific, 1) => {
                KeyAgreeRecipientInfo::parse_fields(fields).map(RecipientInfo::KeyAgreement)
            }
            (TagClass::ContextSpecific, 2) => {
                KekRecipientInfo::parse_fields(fields).map(RecipientInfo::Kek)
            }
            (TagClass::ContextSpecific, 3) => {
                PasswordRecipientInfo::parse_fields(fields).map(RecipientInfo::Password)
            }
            (TagClass::ContextSpecific, 4) => {
                OtherRecipientInfo::parse_fields(fields).map(RecipientInfo::Other)
            }
            (class, number) => Err(cerr(&format!(
                "RecipientInfo: unknown choice {class:?} [{number}]"
            ))),
        }
    }
}

/// Parse the contents of `RecipientInfos ::= SET SIZE (1..MAX) OF RecipientInfo`.
pub(crate) fn parse_recipient_infos(mut set: Decoder) -> Result<Vec<RecipientInfo>, CmsError> {
    let mut out = Vec::new();
    while !set.is_empty() {
        out.push(RecipientInfo::parse(&mut set)?);
    }
    if out.is_empty() {
        return Err(cerr("RecipientInfos: empty set"));
    }
    Ok(out)
}

// ── Wrapping ─────────────────────────────────────────────────────────

/// What a sender needs to build one RecipientInfo.
#[derive(Clone)]
pub enum RecipientSpec {
    /// RSA key transport to a SubjectPublicKeyInfo (DER).
    KeyTransport {
        rid: RecipientId,
        public_key: Vec<u8>,
        padding: RsaPadding,
    },
    KeyAgreement(KeyAgreeParams),
    /// Pre-shared KEK of 16, 24 or 32 bytes.
    Kek {
        kek_id: KekIdentifier,
        kek: Zeroizing<Vec<u8>>,
    },
    Password {
        password: Zeroizing<Vec<u8>>,
    },
    /// Delegated to the engine's [`OtherRecipientHandler`].
    Other,
}

impl RecipientSpec {
    pub fn key_transport(rid: RecipientId, public_key: &[u8], padding: RsaPadding) -> Self {
        RecipientSpec::KeyTransport {
            rid,
            public_key: public_key.to_vec(),
            padding,
        }
    }

    pub fn kek(key_id: &[u8], kek: &[u8]) -> Self {
        RecipientSpec::Kek {
            kek_id: KekIdentifier {
                key_identifier: key_id.to_vec(),
                date: None,
                other: None,
            },
            kek: Zeroizing::new(kek.to_vec()),
        }
    }

    pub fn password(password: &[u8]) -> Self {
        RecipientSpec::Password {
            password: Zeroizing::new(password.to_vec()),
        }
    }
}

impl std::fmt::Debug for RecipientSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientSpec::KeyTransport { rid, padding, .. } => f
                .debug_struct("KeyTransport")
                .field("rid", rid)
                .field("padding", padding)
                .finish_non_exhaustive(),
            RecipientSpec::KeyAgreement(p) => f.debug_tuple("KeyAgreement").field(p).finish(),
            RecipientSpec::Kek { kek_id, .. } => f
                .debug_struct("Kek")
                .field("kek_id", kek_id)
                .finish_non_exhaustive(),
            RecipientSpec::Password { .. } => f.write_str("Password"),
            RecipientSpec::Other => f.write_str("Other"),
        }
    }
}

/// Build the RecipientInfo for `spec` protecting `cek`.
pub(crate) fn wrap_recipient(
    provider: &dyn CryptoProvider,
    handler: Option<&dyn OtherRecipientHandler>,
    config: &EngineConfig,
    spec: &RecipientSpec,
    cek: &[u8],
    content_alg: ContentEncryptionAlg,
) -> Result<RecipientInfo, CmsError> {
    if cek.len() != content_alg.key_len() {
        return Err(CmsError::InvalidArg(format!(
            "CEK length {} does not match {}",
            cek.len(),
            content_alg.as_str()
        )));
    }
    let ri = match spec {
        RecipientSpec::KeyTransport {
            rid,
            public_key,
            padding,
        } => RecipientInfo::KeyTransport(KeyTransRecipientInfo::wrap(
            provider, cek, rid, public_key, *padding,
        )?),
        RecipientSpec::KeyAgreement(params) => {
            RecipientInfo::KeyAgreement(KeyAgreeRecipientInfo::wrap(provider, cek, params)?)
        }
        RecipientSpec::Kek { kek_id, kek } => {
            RecipientInfo::Kek(KekRecipientInfo::wrap(provider, cek, kek_id.clone(), kek)?)
        }
        RecipientSpec::Password { password } => {
            let params = Pbkdf2Params {
                iterations: config.pbkdf2_iterations,
                salt_len: config.pbkdf2_salt_len,
                prf: config.pbkdf2_prf,
            };
            RecipientInfo::Password(PasswordRecipientInfo::wrap(
                provider,
                cek,
                password,
                content_alg,
                params,
            )?)
        }
        RecipientSpec::Other => {
            let handler = handler.ok_or_else(|| {
                CmsError::InvalidArg("no other-recipient handler registered".into())
            })?;
            RecipientInfo::Other(OtherRecipientInfo::wrap(handler, cek)?)
        }
    };
    trace!(kind = ri.kind(), "wrapped content-encryption key");
    Ok(ri)
}

// ── Unwrapping ───────────────────────────────────────────────────────

/// Local key material a recipient can try against received RecipientInfos.
pub enum DecryptionKey {
    /// RSA private key (PKCS#8 DER) for the certificate named by `rid`.
    KeyTransport {
        rid: RecipientId,
        private_key: Zeroizing<Vec<u8>>,
    },
    /// EC private scalar for the certificate named by `rid`.
    /// `originator_public` is needed only for static originators.
    KeyAgreement {
        rid: RecipientId,
        curve: EccCurveId,
        private_key: Zeroizing<Vec<u8>>,
        originator_public: Option<Vec<u8>>,
    },
    Kek {
        key_id: Vec<u8>,
        kek: Zeroizing<Vec<u8>>,
    },
    Password {
        password: Zeroizing<Vec<u8>>,
    },
    /// Try the engine's [`OtherRecipientHandler`] on every ORI.
    Other,
}

impl DecryptionKey {
    pub fn key_transport(rid: RecipientId, private_key: &[u8]) -> Self {
        DecryptionKey::KeyTransport {
            rid,
            private_key: Zeroizing::new(private_key.to_vec()),
        }
    }

    pub fn key_agreement(rid: RecipientId, curve: EccCurveId, private_key: &[u8]) -> Self {
        DecryptionKey::KeyAgreement {
            rid,
            curve,
            private_key: Zeroizing::new(private_key.to_vec()),
            originator_public: None,
        }
    }

    pub fn kek(key_id: &[u8], kek: &[u8]) -> Self {
        DecryptionKey::Kek {
            key_id: key_id.to_vec(),
            kek: Zeroizing::new(kek.to_vec()),
        }
    }

    pub fn password(password: &[u8]) -> Self {
        DecryptionKey::Password {
            password: Zeroizing::new(password.to_vec()),
        }
    }
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecryptionKey::KeyTransport { rid, .. } => f
                .debug_struct("KeyTransport")
                .field("rid", rid)
                .finish_non_exhaustive(),
            DecryptionKey::KeyAgreement { rid, curve, .. } => f
                .debug_struct("KeyAgreement")
                .field("rid", rid)
                .field("curve", curve)
                .finish_non_exhaustive(),
            DecryptionKey::Kek { key_id, .. } => f
                .debug_struct("Kek")
                .field("key_id", key_id)
                .finish_non_exhaustive(),
            DecryptionKey::Password { .. } => f.write_str("Password"),
            DecryptionKey::Other => f.write_str("Other"),
        }
    }
}

/// Try `key` against `ri`. `None` means the key does not address this
/// RecipientInfo at all.
fn attempt(
    provider: &dyn CryptoProvider,
    handler: Option<&dyn OtherRecipientHandler>,
    config: &EngineConfig,
    ri: &RecipientInfo,
    key: &DecryptionKey,
) -> Option<Result<Zeroizing<Vec<u8>>, CmsError>> {
    match (ri, key) {
        (RecipientInfo::KeyTransport(ktri), DecryptionKey::KeyTransport { rid, private_key }) => {
            (ktri.rid == *rid).then(|| ktri.unwrap(provider, private_key))
        }
        (
            RecipientInfo::KeyAgreement(kari),
            DecryptionKey::KeyAgreement {
                rid,
                curve,
                private_key,
                originator_public,
            },
        ) => kari.position_of(rid).map(|_| {
            kari.unwrap(provider, rid, *curve, private_key, originator_public.as_deref())
        }),
        (RecipientInfo::Kek(kekri), DecryptionKey::Kek { key_id, kek }) => {
            (kekri.kek_id.key_identifier == *key_id).then(|| kekri.unwrap(provider, kek))
        }
        (RecipientInfo::Password(pwri), DecryptionKey::Password { password }) => {
            Some(pwri.unwrap(provider, password, config.max_pbkdf2_iterations))
        }
        (RecipientInfo::Other(ori), DecryptionKey::Other) => handler.map(|h| ori.unwrap(h)),
        _ => None,
    }
}

/// Recover the CEK from the first RecipientInfo, in encoded order, that one
/// of `keys` unlocks to a key of the right length for `content_alg`.
///
/// Individual failures are logged and skipped; if nothing succeeds the
/// result is `NoRecipientFound`.
pub(crate) fn recover_cek(
    provider: &dyn CryptoProvider,
    handler: Option<&dyn OtherRecipientHandler>,
    config: &EngineConfig,
    recipient_infos: &[RecipientInfo],
    keys: &[DecryptionKey],
    content_alg: ContentEncryptionAlg,
) -> Result<Zeroizing<Vec<u8>>, CmsError> {
    for (index, ri) in recipient_infos.iter().enumerate() {
        for key in keys {
            let Some(result) = attempt(provider, handler, config, ri, key) else {
                continue;
            };
            trace!(index, kind = ri.kind(), "recipient attempt");
            match result {
                Ok(cek) if cek.len() == content_alg.key_len() => {
                    debug!(index, kind = ri.kind(), "recipient unlocked content-encryption key");
                    return Ok(cek);
                }
                Ok(cek) => {
                    warn!(
                        index,
                        kind = ri.kind(),
                        got = cek.len(),
                        expected = content_alg.key_len(),
                        "unwrapped key has the wrong length"
                    );
                }
                Err(e) => {
                    warn!(index, kind = ri.kind(), error = %e, "recipient unwrap failed");
                }
            }
        }
    }
    debug!(
        recipients = recipient_infos.len(),
        keys = keys.len(),
        "no recipient matched"
    );
    Err(CmsError::NoRecipientFound)
}
