/// Primitive and codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    // General errors
    #[error("null or empty input")]
    NullInput,
    #[error("invalid argument")]
    InvalidArg,
    #[error("operation not supported")]
    NotSupported,
    #[error("invalid key")]
    InvalidKey,
    #[error("random generation failed")]
    RandomFail,

    // Buffer errors
    #[error("buffer length not enough: need {need}, got {got}")]
    BufferTooSmall { need: usize, got: usize },
    #[error("input data too long")]
    InputOverflow,

    // RSA errors
    #[error("rsa: encryption failed")]
    RsaEncryptFail,
    #[error("rsa: decryption failed")]
    RsaDecryptFail,

    // ECC errors
    #[error("ecc: invalid private key")]
    EccInvalidPrivateKey,
    #[error("ecc: invalid public key")]
    EccInvalidPublicKey,

    // Symmetric cipher errors
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("invalid iv length")]
    InvalidIvLength,
    #[error("invalid tag length")]
    InvalidTagLength,
    #[error("input is not a multiple of the block size")]
    NotBlockAligned,
    #[error("aead: tag verification failed")]
    AeadTagVerifyFail,
    #[error("invalid padding")]
    InvalidPadding,
    #[error("key wrap: integrity check failed")]
    KeyWrapFail,

    // KDF errors
    #[error("kdf: derived key length overflow")]
    KdfDkLenOverflow,

    // Encoding/Decoding errors
    #[error("decode: asn1 buffer failed")]
    DecodeAsn1Fail,
    #[error("decode: asn1 nesting too deep")]
    Asn1TooDeep,
    #[error("decode: unknown oid")]
    DecodeUnknownOid,
    #[error("decode: decoder already finished or failed")]
    DecoderTerminated,
}

/// Errors surfaced by the enveloped-data engine.
#[derive(Debug, thiserror::Error)]
pub enum CmsError {
    /// Malformed ASN.1. No partial structure is returned.
    #[error("asn1 parse error: {0}")]
    Parse(String),
    /// Output buffer too small. Nothing was written.
    #[error("output buffer too small: need {need}, got {got}")]
    Length { need: usize, got: usize },
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("unsupported version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid content padding")]
    BadPadding,
    /// AEAD tag mismatch. Any recovered plaintext has been zeroized.
    #[error("authentication tag verification failed")]
    AuthFailure,
    #[error("no recipient info matched the available key material")]
    NoRecipientFound,
    #[error("invalid argument: {0}")]
    InvalidArg(String),
    #[error("invalid decoder state: {0}")]
    InvalidState(&'static str),
    /// A single recipient failed to release the CEK.
    #[error("recipient unwrap failed: {0}")]
    Unwrap(String),
    #[error("other-recipient callback failed: {0}")]
    Callback(String),
    #[error("signer failed: {0}")]
    Signer(String),
    #[error("compressor failed: {0}")]
    Compression(String),
    #[error("crypto error: {0}")]
    Crypto(CryptoError),
}

impl From<CryptoError> for CmsError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::DecodeAsn1Fail | CryptoError::Asn1TooDeep => {
                CmsError::Parse(e.to_string())
            }
            CryptoError::BufferTooSmall { need, got } => CmsError::Length { need, got },
            CryptoError::AeadTagVerifyFail => CmsError::AuthFailure,
            CryptoError::InvalidPadding => CmsError::BadPadding,
            CryptoError::DecodeUnknownOid => CmsError::UnsupportedAlgorithm(e.to_string()),
            CryptoError::DecoderTerminated => CmsError::InvalidState("stream decoder terminated"),
            other => CmsError::Crypto(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_error_mapping() {
        assert!(matches!(
            CmsError::from(CryptoError::DecodeAsn1Fail),
            CmsError::Parse(_)
        ));
        assert!(matches!(
            CmsError::from(CryptoError::BufferTooSmall { need: 10, got: 4 }),
            CmsError::Length { need: 10, got: 4 }
        ));
        assert!(matches!(
            CmsError::from(CryptoError::AeadTagVerifyFail),
            CmsError::AuthFailure
        ));
        assert!(matches!(
            CmsError::from(CryptoError::InvalidPadding),
            CmsError::BadPadding
        ));
        assert!(matches!(
            CmsError::from(CryptoError::KeyWrapFail),
            CmsError::Crypto(CryptoError::KeyWrapFail)
        ));
    }

    #[test]
    fn test_error_display() {
        let e = CmsError::Length { need: 32, got: 16 };
        assert_eq!(e.to_string(), "output buffer too small: need 32, got 16");
    }
}
