//! Layering an envelope with an outer signature and/or compression.
//!
//! Signing and compression algorithms are supplied by the caller. The
//! compressed layer is a CMS CompressedData (RFC 3274) whose encapsulated
//! content is the envelope. Every operation builds its result in owned
//! buffers; the `_into` variants touch the caller's buffer only once the
//! whole chain has succeeded.

use cmsenv_types::{CmsError, ContentEncryptionAlg};
use cmsenv_utils::asn1::{copy_out, Decoder};
use cmsenv_utils::oid::{known, Oid};
use tracing::debug;
use zeroize::Zeroizing;

use super::engine::CmsEngine;
use super::recipient::{DecryptionKey, RecipientSpec};
use super::{cerr, normalize_input, read_version, AlgorithmIdentifier, ContentInfo};
use crate::encoding::{enc_explicit_ctx, enc_octet, enc_oid, enc_seq, enc_u32};

/// Produces a SignedData over some content.
pub trait Signer {
    /// Sign `content` of type `content_type`, returning the DER of a
    /// `ContentInfo` carrying SignedData with the content encapsulated.
    fn sign(&self, content: &[u8], content_type: &Oid) -> Result<Vec<u8>, CmsError>;
}

/// Checks a SignedData produced by a [`Signer`].
pub trait SignatureVerifier {
    /// Verify a SignedData `ContentInfo` and return the encapsulated content
    /// type and content.
    fn verify(&self, signed: &[u8]) -> Result<(Oid, Vec<u8>), CmsError>;
}

/// Raw zlib-style compression.
pub trait Compressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CmsError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CmsError>;
}

fn signer_err(e: CmsError) -> CmsError {
    match e {
        CmsError::Signer(_) => e,
        other => CmsError::Signer(other.to_string()),
    }
}

fn compression_err(e: CmsError) -> CmsError {
    match e {
        CmsError::Compression(_) => e,
        other => CmsError::Compression(other.to_string()),
    }
}

// ── CompressedData ───────────────────────────────────────────────────

/// Build a CompressedData `ContentInfo` around `content` of `content_type`.
pub fn compress_content(
    compressor: &dyn Compressor,
    content_type: &Oid,
    content: &[u8],
) -> Result<Vec<u8>, CmsError> {
    let compressed = compressor.compress(content).map_err(compression_err)?;

    let mut encap = enc_oid(&content_type.to_der_value());
    encap.extend_from_slice(&enc_explicit_ctx(0, &enc_octet(&compressed)));

    let mut inner = enc_u32(0);
    inner.extend_from_slice(&AlgorithmIdentifier::new(&known::zlib_compress(), None).encode());
    inner.extend_from_slice(&enc_seq(&encap));
    Ok(ContentInfo::new(known::compressed_data(), enc_seq(&inner)).encode())
}

/// Parse a CompressedData `ContentInfo` and return the decompressed
/// encapsulated content with its type.
pub fn decompress_content(
    compressor: &dyn Compressor,
    der: &[u8],
) -> Result<(Oid, Vec<u8>), CmsError> {
    let ci = ContentInfo::from_der(der)?;
    if ci.content_type != known::compressed_data() {
        return Err(cerr(&format!(
            "expected id-ct-compressedData, got {}",
            ci.content_type
        )));
    }
    let mut seq = Decoder::new(&ci.content)
        .read_sequence()
        .map_err(|e| cerr(&format!("CompressedData: {e}")))?;
    let version = read_version(&mut seq, "CompressedData")?;
    if version != 0 {
        return Err(CmsError::UnsupportedVersion(version));
    }
    let alg = AlgorithmIdentifier::parse(&mut seq)?;
    if !alg.is(&known::zlib_compress()) {
        return Err(CmsError::UnsupportedAlgorithm(format!(
            "compression algorithm {}",
            alg.oid()?
        )));
    }
    let mut encap = seq
        .read_sequence()
        .map_err(|e| cerr(&format!("EncapsulatedContentInfo: {e}")))?;
    let oid = encap
        .read_oid()
        .map_err(|e| cerr(&format!("eContentType: {e}")))?;
    let content_type = Oid::from_der_value(oid).map_err(|e| cerr(&format!("eContentType: {e}")))?;
    let ctx = encap
        .read_context_specific(0, true)
        .map_err(|e| cerr(&format!("eContent: {e}")))?;
    let compressed = Decoder::new(ctx.value)
        .read_octet_string()
        .map_err(|e| cerr(&format!("eContent: {e}")))?;
    if !encap.is_empty() || !seq.is_empty() {
        return Err(cerr("CompressedData: trailing data"));
    }
    let content = compressor.decompress(compressed).map_err(compression_err)?;
    Ok((content_type, content))
}

// ── Encode compositions ──────────────────────────────────────────────

/// Sign `content`, then envelope the SignedData.
pub fn sign_then_envelope(
    engine: &CmsEngine,
    signer: &dyn Signer,
    content: &[u8],
    content_type: &Oid,
    alg: ContentEncryptionAlg,
    recipients: &[RecipientSpec],
) -> Result<Vec<u8>, CmsError> {
    let signed = signer.sign(content, content_type).map_err(signer_err)?;
    let ci = ContentInfo::from_der(&signed).map_err(signer_err)?;
    if ci.content_type != known::pkcs7_signed_data() {
        return Err(CmsError::Signer(format!(
            "signer returned {} instead of SignedData",
            ci.content_type
        )));
    }
    debug!(signed_len = ci.content.len(), "signed before enveloping");
    engine.seal(&ci.content, &ci.content_type, alg, recipients)
}

/// Envelope `content`, then compress the envelope.
pub fn envelope_then_compress(
    engine: &CmsEngine,
    compressor: &dyn Compressor,
    content: &[u8],
    alg: ContentEncryptionAlg,
    recipients: &[RecipientSpec],
) -> Result<Vec<u8>, CmsError> {
    let envelope = engine.seal(content, &engine.config().content_type, alg, recipients)?;
    compress_envelope(compressor, &envelope)
}

/// Sign, envelope, then compress.
pub fn sign_then_envelope_then_compress(
    engine: &CmsEngine,
    signer: &dyn Signer,
    compressor: &dyn Compressor,
    content: &[u8],
    content_type: &Oid,
    alg: ContentEncryptionAlg,
    recipients: &[RecipientSpec],
) -> Result<Vec<u8>, CmsError> {
    let envelope = sign_then_envelope(engine, signer, content, content_type, alg, recipients)?;
    compress_envelope(compressor, &envelope)
}

fn compress_envelope(compressor: &dyn Compressor, envelope: &[u8]) -> Result<Vec<u8>, CmsError> {
    let ci = ContentInfo::from_der(envelope)?;
    let der = compress_content(compressor, &ci.content_type, &ci.content)?;
    debug!(envelope_len = envelope.len(), compressed_len = der.len(), "compressed envelope");
    Ok(der)
}

// ── Decode compositions ──────────────────────────────────────────────

/// Open an envelope whose content is SignedData, then verify it.
pub fn open_then_verify(
    engine: &CmsEngine,
    verifier: &dyn SignatureVerifier,
    input: &[u8],
    keys: &[DecryptionKey],
) -> Result<(Oid, Vec<u8>), CmsError> {
    let (content_type, signed) = engine.open_any(input, keys)?;
    let signed = Zeroizing::new(signed);
    if content_type != known::pkcs7_signed_data() {
        return Err(cerr(&format!(
            "enveloped content is {content_type}, not SignedData"
        )));
    }
    let signed_ci = ContentInfo::new(content_type, signed.to_vec()).encode();
    verifier.verify(&signed_ci).map_err(signer_err)
}

/// Decompress, then open the envelope inside.
pub fn decompress_then_open(
    engine: &CmsEngine,
    compressor: &dyn Compressor,
    input: &[u8],
    keys: &[DecryptionKey],
) -> Result<(Oid, Vec<u8>), CmsError> {
    let envelope = decompress_envelope(engine, compressor, input)?;
    engine.open_any(&envelope, keys)
}

/// Decompress, open, then verify.
pub fn decompress_then_open_then_verify(
    engine: &CmsEngine,
    compressor: &dyn Compressor,
    verifier: &dyn SignatureVerifier,
    input: &[u8],
    keys: &[DecryptionKey],
) -> Result<(Oid, Vec<u8>), CmsError> {
    let envelope = decompress_envelope(engine, compressor, input)?;
    open_then_verify(engine, verifier, &envelope, keys)
}

fn decompress_envelope(
    engine: &CmsEngine,
    compressor: &dyn Compressor,
    input: &[u8],
) -> Result<Vec<u8>, CmsError> {
    let der = normalize_input(input, engine.config())?;
    let (content_type, content) = decompress_content(compressor, &der)?;
    if content_type != known::pkcs7_enveloped_data()
        && content_type != known::auth_enveloped_data()
    {
        return Err(cerr(&format!(
            "compressed content is {content_type}, not an envelope"
        )));
    }
    Ok(ContentInfo::new(content_type, content).encode())
}

// ── Caller buffers ───────────────────────────────────────────────────

/// Copy a finished composition into `out` (length query when `None`).
pub fn write_output(
    result: Result<Vec<u8>, CmsError>,
    out: Option<&mut [u8]>,
) -> Result<usize, CmsError> {
    let bytes = Zeroizing::new(result?);
    Ok(copy_out(&bytes, out)?)
}

#[allow(clippy::too_many_arguments)]
pub fn sign_then_envelope_then_compress_into(
    engine: &CmsEngine,
    signer: &dyn Signer,
    compressor: &dyn Compressor,
    content: &[u8],
    content_type: &Oid,
    alg: ContentEncryptionAlg,
    recipients: &[RecipientSpec],
    out: Option<&mut [u8]>,
) -> Result<usize, CmsError> {
    write_output(
        sign_then_envelope_then_compress(
            engine,
            signer,
            compressor,
            content,
            content_type,
            alg,
            recipients,
        ),
        out,
    )
}

/// Decompress, open and verify into `out`; the content type is returned
/// with the written length.
pub fn decompress_then_open_then_verify_into(
    engine: &CmsEngine,
    compressor: &dyn Compressor,
    verifier: &dyn SignatureVerifier,
    input: &[u8],
    keys: &[DecryptionKey],
    out: Option<&mut [u8]>,
) -> Result<(Oid, usize), CmsError> {
    let (content_type, content) =
        decompress_then_open_then_verify(engine, compressor, verifier, input, keys)?;
    let written = write_output(Ok(content), out)?;
    Ok((content_type, written))
}
