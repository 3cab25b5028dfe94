//! The enveloping engine: content cipher, recipient wrapping and envelope
//! (de)assembly behind one handle.

use std::sync::Arc;

use cmsenv_crypto::CryptoProvider;
use cmsenv_types::{CmsError, ContentEncryptionAlg};
use cmsenv_utils::asn1::copy_out;
use cmsenv_utils::oid::{known, Oid};
use tracing::debug;
use zeroize::Zeroizing;

use super::auth_enveloped::{auth_attrs_aad, require_aead, AuthEnvelopedData};
use super::content::{self, ContentCipherOutput};
use super::enveloped::{EncryptedContentInfo, EnvelopedData};
use super::recipient::{self, DecryptionKey, OtherRecipientHandler, RecipientInfo, RecipientSpec};
use super::{cerr, normalize_input, validate_attributes, Attribute, ContentInfo};
use crate::config::EngineConfig;

/// A parsed envelope of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Enveloped(EnvelopedData),
    AuthEnveloped(AuthEnvelopedData),
}

impl Envelope {
    pub fn recipient_infos(&self) -> &[RecipientInfo] {
        match self {
            Envelope::Enveloped(ed) => &ed.recipient_infos,
            Envelope::AuthEnveloped(aed) => &aed.recipient_infos,
        }
    }

    pub fn encrypted_content_info(&self) -> &EncryptedContentInfo {
        match self {
            Envelope::Enveloped(ed) => &ed.encrypted_content_info,
            Envelope::AuthEnveloped(aed) => &aed.auth_encrypted_content_info,
        }
    }

    pub fn content_alg(&self) -> Result<ContentEncryptionAlg, CmsError> {
        self.encrypted_content_info().content_alg()
    }
}

/// Multi-recipient CMS enveloping engine.
///
/// Holds no per-call state; one engine may be shared across threads.
#[derive(Clone)]
pub struct CmsEngine {
    provider: Arc<dyn CryptoProvider>,
    handler: Option<Arc<dyn OtherRecipientHandler>>,
    config: EngineConfig,
}

impl std::fmt::Debug for CmsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmsEngine")
            .field("config", &self.config)
            .field("has_ori_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

impl CmsEngine {
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self::with_config(provider, EngineConfig::default())
    }

    pub fn with_config(provider: Arc<dyn CryptoProvider>, config: EngineConfig) -> Self {
        Self {
            provider,
            handler: None,
            config,
        }
    }

    /// Register the handler used for `OtherRecipientInfo` in both directions.
    pub fn with_handler(mut self, handler: Arc<dyn OtherRecipientHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider(&self) -> &dyn CryptoProvider {
        self.provider.as_ref()
    }

    fn handler(&self) -> Option<&dyn OtherRecipientHandler> {
        self.handler.as_deref()
    }

    // ── Encode ───────────────────────────────────────────────────────

    /// Encrypt `plaintext` under a fresh CEK. `aad` is only used for GCM.
    pub fn encrypt_content(
        &self,
        plaintext: &[u8],
        alg: ContentEncryptionAlg,
        aad: Option<&[u8]>,
    ) -> Result<ContentCipherOutput, CmsError> {
        content::encrypt(self.provider(), plaintext, alg, aad, self.config.gcm_tag_len)
    }

    /// Protect `cek` for one recipient.
    pub fn wrap_recipient(
        &self,
        spec: &RecipientSpec,
        cek: &[u8],
        content_alg: ContentEncryptionAlg,
    ) -> Result<RecipientInfo, CmsError> {
        recipient::wrap_recipient(
            self.provider(),
            self.handler(),
            &self.config,
            spec,
            cek,
            content_alg,
        )
    }

    /// Serialize an EnvelopedData ContentInfo from wrapped recipients and
    /// CBC content.
    pub fn assemble(
        &self,
        recipient_infos: Vec<RecipientInfo>,
        output: &ContentCipherOutput,
        unprotected_attrs: Option<Vec<Attribute>>,
    ) -> Result<Vec<u8>, CmsError> {
        let ed = EnvelopedData::new(
            None,
            recipient_infos,
            encrypted_content_info(&self.config.content_type, output),
            unprotected_attrs,
        )?;
        debug!(
            version = ed.version,
            recipients = ed.recipient_infos.len(),
            alg = output.alg.as_str(),
            "assembled EnvelopedData"
        );
        Ok(ed.to_content_info())
    }

    /// Serialize an AuthEnvelopedData ContentInfo.
    ///
    /// `output` must have been produced with the AAD of the same
    /// `auth_attrs` (see [`auth_attrs_aad`]).
    pub fn assemble_auth(
        &self,
        recipient_infos: Vec<RecipientInfo>,
        output: &ContentCipherOutput,
        auth_attrs: Option<Vec<Attribute>>,
        unauth_attrs: Option<Vec<Attribute>>,
    ) -> Result<Vec<u8>, CmsError> {
        let mac = output
            .tag
            .clone()
            .ok_or_else(|| CmsError::InvalidArg("content cipher output has no tag".into()))?;
        let aed = AuthEnvelopedData::new(
            None,
            recipient_infos,
            encrypted_content_info(&self.config.content_type, output),
            auth_attrs,
            mac,
            unauth_attrs,
        )?;
        debug!(
            recipients = aed.recipient_infos.len(),
            alg = output.alg.as_str(),
            auth_attrs = aed.auth_attrs.as_ref().map_or(0, Vec::len),
            "assembled AuthEnvelopedData"
        );
        Ok(aed.to_content_info())
    }

    fn wrap_all(
        &self,
        recipients: &[RecipientSpec],
        output: &ContentCipherOutput,
    ) -> Result<Vec<RecipientInfo>, CmsError> {
        if recipients.is_empty() {
            return Err(CmsError::InvalidArg("at least one recipient is required".into()));
        }
        recipients
            .iter()
            .map(|spec| self.wrap_recipient(spec, &output.cek, output.alg))
            .collect()
    }

    /// Encrypt and envelope `plaintext` for every recipient in one call.
    pub fn envelope(
        &self,
        plaintext: &[u8],
        alg: ContentEncryptionAlg,
        recipients: &[RecipientSpec],
        unprotected_attrs: Option<Vec<Attribute>>,
    ) -> Result<Vec<u8>, CmsError> {
        if alg.is_aead() {
            return Err(CmsError::UnsupportedAlgorithm(format!(
                "{} belongs in AuthEnvelopedData",
                alg.as_str()
            )));
        }
        let output = self.encrypt_content(plaintext, alg, None)?;
        let recipient_infos = self.wrap_all(recipients, &output)?;
        self.assemble(recipient_infos, &output, unprotected_attrs)
    }

    /// One-shot AuthEnvelopedData; the tag covers `auth_attrs`.
    pub fn envelope_auth(
        &self,
        plaintext: &[u8],
        alg: ContentEncryptionAlg,
        recipients: &[RecipientSpec],
        auth_attrs: Option<Vec<Attribute>>,
        unauth_attrs: Option<Vec<Attribute>>,
    ) -> Result<Vec<u8>, CmsError> {
        if !alg.is_aead() {
            return Err(CmsError::UnsupportedAlgorithm(format!(
                "{} cannot authenticate content",
                alg.as_str()
            )));
        }
        if let Some(attrs) = &auth_attrs {
            validate_attributes(attrs)?;
        }
        let aad = auth_attrs_aad(auth_attrs.as_deref());
        let output = self.encrypt_content(plaintext, alg, aad.as_deref())?;
        let recipient_infos = self.wrap_all(recipients, &output)?;
        self.assemble_auth(recipient_infos, &output, auth_attrs, unauth_attrs)
    }

    /// [`envelope`](Self::envelope) into a caller buffer.
    ///
    /// With `out == None` the required length is returned. A short buffer
    /// is a `Length` error and is left untouched.
    pub fn envelope_into(
        &self,
        plaintext: &[u8],
        alg: ContentEncryptionAlg,
        recipients: &[RecipientSpec],
        unprotected_attrs: Option<Vec<Attribute>>,
        out: Option<&mut [u8]>,
    ) -> Result<usize, CmsError> {
        let der = self.envelope(plaintext, alg, recipients, unprotected_attrs)?;
        Ok(copy_out(&der, out)?)
    }

    pub fn envelope_auth_into(
        &self,
        plaintext: &[u8],
        alg: ContentEncryptionAlg,
        recipients: &[RecipientSpec],
        auth_attrs: Option<Vec<Attribute>>,
        unauth_attrs: Option<Vec<Attribute>>,
        out: Option<&mut [u8]>,
    ) -> Result<usize, CmsError> {
        let der = self.envelope_auth(plaintext, alg, recipients, auth_attrs, unauth_attrs)?;
        Ok(copy_out(&der, out)?)
    }

    /// Envelope `plaintext` labelled as `content_type`: EnvelopedData for
    /// CBC algorithms, AuthEnvelopedData for GCM.
    pub fn seal(
        &self,
        plaintext: &[u8],
        content_type: &Oid,
        alg: ContentEncryptionAlg,
        recipients: &[RecipientSpec],
    ) -> Result<Vec<u8>, CmsError> {
        let output = self.encrypt_content(plaintext, alg, None)?;
        let recipient_infos = self.wrap_all(recipients, &output)?;
        let eci = encrypted_content_info(content_type, &output);
        let der = match &output.tag {
            Some(tag) => {
                AuthEnvelopedData::new(None, recipient_infos, eci, None, tag.clone(), None)?
                    .to_content_info()
            }
            None => EnvelopedData::new(None, recipient_infos, eci, None)?.to_content_info(),
        };
        debug!(content_type = %content_type, alg = alg.as_str(), "sealed content");
        Ok(der)
    }

    // ── Decode ───────────────────────────────────────────────────────

    /// Parse an EnvelopedData ContentInfo (BER accepted when configured).
    pub fn disassemble(&self, input: &[u8]) -> Result<EnvelopedData, CmsError> {
        let der = normalize_input(input, &self.config)?;
        let ed = EnvelopedData::from_content_info(&der)?;
        debug!(
            version = ed.version,
            recipients = ed.recipient_infos.len(),
            "parsed EnvelopedData"
        );
        Ok(ed)
    }

    /// Parse an AuthEnvelopedData ContentInfo.
    pub fn disassemble_auth(&self, input: &[u8]) -> Result<AuthEnvelopedData, CmsError> {
        let der = normalize_input(input, &self.config)?;
        let aed = AuthEnvelopedData::from_content_info(&der)?;
        debug!(recipients = aed.recipient_infos.len(), "parsed AuthEnvelopedData");
        Ok(aed)
    }

    /// Parse either envelope kind, chosen by the ContentInfo content type.
    pub fn disassemble_any(&self, input: &[u8]) -> Result<Envelope, CmsError> {
        let der = normalize_input(input, &self.config)?;
        self.parse_envelope_der(&der)
    }

    pub(crate) fn parse_envelope_der(&self, der: &[u8]) -> Result<Envelope, CmsError> {
        let ci = ContentInfo::from_der(der)?;
        if ci.content_type == known::pkcs7_enveloped_data() {
            Ok(Envelope::Enveloped(EnvelopedData::parse(&ci.content)?))
        } else if ci.content_type == known::auth_enveloped_data() {
            Ok(Envelope::AuthEnveloped(AuthEnvelopedData::parse(&ci.content)?))
        } else {
            Err(cerr(&format!(
                "content type {} is not an envelope",
                ci.content_type
            )))
        }
    }

    /// Walk `recipient_infos` against `keys`; the first successful unwrap wins.
    pub fn recover_cek(
        &self,
        recipient_infos: &[RecipientInfo],
        keys: &[DecryptionKey],
        content_alg: ContentEncryptionAlg,
    ) -> Result<Zeroizing<Vec<u8>>, CmsError> {
        recipient::recover_cek(
            self.provider(),
            self.handler(),
            &self.config,
            recipient_infos,
            keys,
            content_alg,
        )
    }

    /// Decrypt the content carried inside an EnvelopedData.
    pub fn decrypt(&self, ed: &EnvelopedData, cek: &[u8]) -> Result<Vec<u8>, CmsError> {
        let ciphertext = attached(&ed.encrypted_content_info)?;
        self.decrypt_detached(ed, cek, ciphertext)
    }

    /// Decrypt content transported outside the EnvelopedData.
    pub fn decrypt_detached(
        &self,
        ed: &EnvelopedData,
        cek: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CmsError> {
        content::decrypt(
            self.provider(),
            ciphertext,
            &ed.encrypted_content_info.content_encryption_algorithm,
            cek,
            None,
            None,
        )
    }

    /// Verify the tag over content and authAttrs, then decrypt.
    pub fn decrypt_auth(&self, aed: &AuthEnvelopedData, cek: &[u8]) -> Result<Vec<u8>, CmsError> {
        require_aead(&aed.auth_encrypted_content_info)?;
        let ciphertext = attached(&aed.auth_encrypted_content_info)?;
        content::decrypt(
            self.provider(),
            ciphertext,
            &aed.auth_encrypted_content_info.content_encryption_algorithm,
            cek,
            Some(&aed.mac),
            aed.aad(),
        )
    }

    /// Decrypt either envelope kind.
    pub fn decrypt_envelope(&self, envelope: &Envelope, cek: &[u8]) -> Result<Vec<u8>, CmsError> {
        match envelope {
            Envelope::Enveloped(ed) => self.decrypt(ed, cek),
            Envelope::AuthEnveloped(aed) => self.decrypt_auth(aed, cek),
        }
    }

    /// Parse, recover the CEK with `keys`, and decrypt an EnvelopedData.
    pub fn open(&self, input: &[u8], keys: &[DecryptionKey]) -> Result<Vec<u8>, CmsError> {
        let ed = self.disassemble(input)?;
        let alg = ed.encrypted_content_info.content_alg()?;
        let cek = self.recover_cek(&ed.recipient_infos, keys, alg)?;
        self.decrypt(&ed, &cek)
    }

    /// Parse, recover the CEK with `keys`, verify and decrypt an
    /// AuthEnvelopedData.
    pub fn open_auth(&self, input: &[u8], keys: &[DecryptionKey]) -> Result<Vec<u8>, CmsError> {
        let aed = self.disassemble_auth(input)?;
        let alg = aed.auth_encrypted_content_info.content_alg()?;
        let cek = self.recover_cek(&aed.recipient_infos, keys, alg)?;
        self.decrypt_auth(&aed, &cek)
    }

    /// Open either envelope kind, returning the inner content type and the
    /// plaintext.
    pub fn open_any(
        &self,
        input: &[u8],
        keys: &[DecryptionKey],
    ) -> Result<(Oid, Vec<u8>), CmsError> {
        let envelope = self.disassemble_any(input)?;
        let cek = self.recover_cek(envelope.recipient_infos(), keys, envelope.content_alg()?)?;
        let plaintext = self.decrypt_envelope(&envelope, &cek)?;
        Ok((envelope.encrypted_content_info().content_type.clone(), plaintext))
    }

    /// [`open`](Self::open) into a caller buffer. On a `Length` error the
    /// recovered plaintext is wiped and `out` is untouched.
    pub fn open_into(
        &self,
        input: &[u8],
        keys: &[DecryptionKey],
        out: Option<&mut [u8]>,
    ) -> Result<usize, CmsError> {
        let plaintext = Zeroizing::new(self.open(input, keys)?);
        Ok(copy_out(&plaintext, out)?)
    }

    pub fn open_auth_into(
        &self,
        input: &[u8],
        keys: &[DecryptionKey],
        out: Option<&mut [u8]>,
    ) -> Result<usize, CmsError> {
        let plaintext = Zeroizing::new(self.open_auth(input, keys)?);
        Ok(copy_out(&plaintext, out)?)
    }
}

fn encrypted_content_info(
    content_type: &Oid,
    output: &ContentCipherOutput,
) -> EncryptedContentInfo {
    EncryptedContentInfo {
        content_type: content_type.clone(),
        content_encryption_algorithm: output.algorithm.clone(),
        encrypted_content: Some(output.ciphertext.clone()),
    }
}

fn attached(eci: &EncryptedContentInfo) -> Result<&[u8], CmsError> {
    eci.encrypted_content
        .as_deref()
        .ok_or_else(|| CmsError::InvalidArg("encrypted content is detached".into()))
}
