//! CMS (Cryptographic Message Syntax) enveloping, RFC 5652 / RFC 5083.

pub mod auth_enveloped;
pub mod compose;
pub mod content;
pub mod engine;
pub mod enveloped;
pub mod recipient;
pub mod stream;

use cmsenv_types::CmsError;
use cmsenv_utils::asn1::{ber_to_der, tags, Decoder};
use cmsenv_utils::oid::Oid;

use crate::config::EngineConfig;
use crate::encoding::{enc_explicit_ctx, enc_int, enc_oid, enc_seq, enc_set_of, enc_tagged_set_of};

/// Build a parse error with context.
pub(crate) fn cerr(msg: &str) -> CmsError {
    CmsError::Parse(msg.to_string())
}

/// Normalize incoming bytes to a single DER element.
///
/// With `accept_ber` the input is rewritten through the BER converter;
/// otherwise it is only checked to be one complete element. Trailing bytes
/// after the element are a parse error.
pub(crate) fn normalize_input(input: &[u8], config: &EngineConfig) -> Result<Vec<u8>, CmsError> {
    if config.accept_ber {
        let (der, consumed) = ber_to_der(input, config.max_nesting_depth)
            .map_err(|e| cerr(&format!("BER input: {e}")))?;
        if consumed != input.len() {
            return Err(cerr("trailing bytes after top-level element"));
        }
        Ok(der)
    } else {
        let mut dec = Decoder::new(input);
        dec.read_tlv().map_err(|e| cerr(&format!("DER input: {e}")))?;
        if !dec.is_empty() {
            return Err(cerr("trailing bytes after top-level element"));
        }
        Ok(input.to_vec())
    }
}

/// Read a CMSVersion INTEGER.
pub(crate) fn read_version(dec: &mut Decoder, what: &str) -> Result<u32, CmsError> {
    dec.read_u32()
        .map_err(|e| cerr(&format!("{what} version: {e}")))
}

// ── ContentInfo ──────────────────────────────────────────────────────

/// Outer `ContentInfo { contentType, [0] EXPLICIT content }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentInfo {
    pub content_type: Oid,
    /// DER of the inner content.
    pub content: Vec<u8>,
}

impl ContentInfo {
    pub fn new(content_type: Oid, content: Vec<u8>) -> Self {
        Self {
            content_type,
            content,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut inner = enc_oid(&self.content_type.to_der_value());
        inner.extend_from_slice(&enc_explicit_ctx(0, &self.content));
        enc_seq(&inner)
    }

    /// Parse a DER ContentInfo. The whole input must be one element.
    pub fn from_der(data: &[u8]) -> Result<Self, CmsError> {
        let mut outer = Decoder::new(data);
        let mut seq = outer
            .read_sequence()
            .map_err(|e| cerr(&format!("ContentInfo: {e}")))?;
        if !outer.is_empty() {
            return Err(cerr("ContentInfo: trailing data"));
        }
        let oid = seq
            .read_oid()
            .map_err(|e| cerr(&format!("ContentInfo type: {e}")))?;
        let content_type =
            Oid::from_der_value(oid).map_err(|e| cerr(&format!("ContentInfo type: {e}")))?;
        let ctx = seq
            .read_context_specific(0, true)
            .map_err(|e| cerr(&format!("ContentInfo [0]: {e}")))?;
        let mut inner = Decoder::new(ctx.value);
        let content = inner
            .read_tlv()
            .map_err(|e| cerr(&format!("ContentInfo content: {e}")))?
            .raw
            .to_vec();
        if !inner.is_empty() || !seq.is_empty() {
            return Err(cerr("ContentInfo: unexpected trailing fields"));
        }
        Ok(Self {
            content_type,
            content,
        })
    }
}

// ── AlgorithmIdentifier ──────────────────────────────────────────────

/// AlgorithmIdentifier with raw DER parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmIdentifier {
    /// DER value bytes of the algorithm OID.
    pub oid: Vec<u8>,
    /// Encoded parameters, if any.
    pub params: Option<Vec<u8>>,
}

impl AlgorithmIdentifier {
    pub fn new(oid: &Oid, params: Option<Vec<u8>>) -> Self {
        Self {
            oid: oid.to_der_value(),
            params,
        }
    }

    pub fn is(&self, oid: &Oid) -> bool {
        self.oid == oid.to_der_value()
    }

    pub fn oid(&self) -> Result<Oid, CmsError> {
        Oid::from_der_value(&self.oid).map_err(|e| cerr(&format!("algorithm OID: {e}")))
    }

    /// Parameters, treating an explicit NULL as absent.
    pub fn non_null_params(&self) -> Option<&[u8]> {
        match self.params.as_deref() {
            None | Some([tags::NULL, 0x00]) => None,
            Some(p) => Some(p),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        enc_seq(&self.encode_fields())
    }

    /// The SEQUENCE contents, for IMPLICIT re-tagging.
    pub(crate) fn encode_fields(&self) -> Vec<u8> {
        let mut inner = enc_oid(&self.oid);
        if let Some(params) = &self.params {
            inner.extend_from_slice(params);
        }
        inner
    }

    pub(crate) fn parse(dec: &mut Decoder) -> Result<Self, CmsError> {
        let seq = dec
            .read_sequence()
            .map_err(|e| cerr(&format!("AlgId: {e}")))?;
        Self::parse_fields(seq)
    }

    pub(crate) fn parse_fields(mut seq: Decoder) -> Result<Self, CmsError> {
        let oid = seq
            .read_oid()
            .map_err(|e| cerr(&format!("alg OID: {e}")))?
            .to_vec();
        let params = if !seq.is_empty() {
            Some(seq.remaining().to_vec())
        } else {
            None
        };
        Ok(Self { oid, params })
    }
}

// ── Attributes ───────────────────────────────────────────────────────

/// `Attribute { attrType, attrValues SET OF AttributeValue }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub attr_type: Oid,
    /// DER encodings of the values.
    pub values: Vec<Vec<u8>>,
}

impl Attribute {
    pub fn new(attr_type: Oid, values: Vec<Vec<u8>>) -> Self {
        Self { attr_type, values }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut inner = enc_oid(&self.attr_type.to_der_value());
        inner.extend_from_slice(&enc_set_of(&self.values));
        enc_seq(&inner)
    }

    fn parse(dec: &mut Decoder) -> Result<Self, CmsError> {
        let mut seq = dec
            .read_sequence()
            .map_err(|e| cerr(&format!("Attribute: {e}")))?;
        let oid = seq
            .read_oid()
            .map_err(|e| cerr(&format!("Attribute type: {e}")))?;
        let attr_type =
            Oid::from_der_value(oid).map_err(|e| cerr(&format!("Attribute type: {e}")))?;
        let mut set = seq
            .read_set()
            .map_err(|e| cerr(&format!("Attribute values: {e}")))?;
        let mut values = Vec::new();
        while !set.is_empty() {
            let tlv = set
                .read_tlv()
                .map_err(|e| cerr(&format!("Attribute value: {e}")))?;
            values.push(tlv.raw.to_vec());
        }
        if values.is_empty() {
            return Err(cerr("Attribute: empty value set"));
        }
        Ok(Self { attr_type, values })
    }
}

/// Check caller-supplied attributes: each needs at least one value, and
/// every value must be exactly one DER element.
pub(crate) fn validate_attributes(attrs: &[Attribute]) -> Result<(), CmsError> {
    for attr in attrs {
        if attr.values.is_empty() {
            return Err(CmsError::InvalidArg(format!(
                "attribute {} has no values",
                attr.attr_type
            )));
        }
        for value in &attr.values {
            let mut dec = Decoder::new(value);
            if dec.read_tlv().is_err() || !dec.is_empty() {
                return Err(CmsError::InvalidArg(format!(
                    "attribute {} value is not a single DER element",
                    attr.attr_type
                )));
            }
        }
    }
    Ok(())
}

/// Encode an attribute set as DER `SET OF` under `tag`.
pub(crate) fn encode_attributes(attrs: &[Attribute], tag: u8) -> Vec<u8> {
    let encoded: Vec<Vec<u8>> = attrs.iter().map(Attribute::encode).collect();
    enc_tagged_set_of(tag, &encoded)
}

/// Parse the contents of an attribute `SET OF`.
pub(crate) fn parse_attributes(value: &[u8]) -> Result<Vec<Attribute>, CmsError> {
    let mut dec = Decoder::new(value);
    let mut attrs = Vec::new();
    while !dec.is_empty() {
        attrs.push(Attribute::parse(&mut dec)?);
    }
    if attrs.is_empty() {
        return Err(cerr("empty attribute set"));
    }
    Ok(attrs)
}

// ── Recipient identifiers ────────────────────────────────────────────

/// How a recipient's certificate is identified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecipientId {
    /// Issuer Name (full DER) and certificate serial number (INTEGER contents).
    IssuerAndSerial { issuer: Vec<u8>, serial: Vec<u8> },
    /// Subject key identifier.
    SubjectKeyId(Vec<u8>),
}

impl RecipientId {
    /// `issuer` is the DER `Name`; `serial` is a big-endian magnitude and is
    /// normalized to its minimal INTEGER contents.
    pub fn issuer_and_serial(issuer: &[u8], serial: &[u8]) -> Self {
        RecipientId::IssuerAndSerial {
            issuer: issuer.to_vec(),
            serial: normalize_serial(serial),
        }
    }

    pub fn subject_key_id(ski: &[u8]) -> Self {
        RecipientId::SubjectKeyId(ski.to_vec())
    }

    pub(crate) fn encode_issuer_and_serial(issuer: &[u8], serial: &[u8]) -> Vec<u8> {
        let mut inner = issuer.to_vec();
        inner.extend_from_slice(&enc_int(serial));
        enc_seq(&inner)
    }

    /// Parse the contents of an IssuerAndSerialNumber SEQUENCE.
    pub(crate) fn parse_issuer_and_serial(mut seq: Decoder) -> Result<Self, CmsError> {
        let issuer = seq
            .read_tlv()
            .map_err(|e| cerr(&format!("issuer: {e}")))?;
        if issuer.tag.number != 0x10 || !issuer.tag.constructed {
            return Err(cerr("issuer: expected Name SEQUENCE"));
        }
        let serial = seq
            .read_integer()
            .map_err(|e| cerr(&format!("serial: {e}")))?;
        Ok(RecipientId::IssuerAndSerial {
            issuer: issuer.raw.to_vec(),
            serial: serial.to_vec(),
        })
    }
}

fn normalize_serial(serial: &[u8]) -> Vec<u8> {
    let mut v = serial;
    while v.len() > 1 && v[0] == 0 && v[1] & 0x80 == 0 {
        v = &v[1..];
    }
    match v.first() {
        None => vec![0],
        Some(&b) if b & 0x80 != 0 => {
            let mut out = Vec::with_capacity(v.len() + 1);
            out.push(0);
            out.extend_from_slice(v);
            out
        }
        Some(_) => v.to_vec(),
    }
}
