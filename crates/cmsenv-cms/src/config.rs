//! Engine configuration with builder pattern.

use cmsenv_types::{CmsError, HashAlgId};
use cmsenv_utils::asn1::DEFAULT_MAX_DEPTH;
use cmsenv_utils::oid::{known, Oid};

/// Default PBKDF2 iteration count for password recipients.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 2048;
/// Default PBKDF2 salt length in bytes.
pub const DEFAULT_PBKDF2_SALT_LEN: usize = 16;
/// Default GCM tag (ICV) length in bytes.
pub const DEFAULT_GCM_TAG_LEN: usize = 16;
/// GCM nonce length. RFC 5084 recommends 12 bytes and nothing else is emitted.
pub const GCM_NONCE_LEN: usize = 12;
/// Largest PBKDF2 iteration count accepted from a received PWRI.
pub const DEFAULT_MAX_PBKDF2_ITERATIONS: u32 = 1_000_000;
/// Default bound on a buffered streaming envelope (16 MiB).
pub const DEFAULT_MAX_STREAM_LEN: usize = 16 * 1024 * 1024;

/// Settings shared by every encode/decode call of one engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Inner content type placed in EncryptedContentInfo.
    pub content_type: Oid,
    pub pbkdf2_iterations: u32,
    pub pbkdf2_salt_len: usize,
    pub pbkdf2_prf: HashAlgId,
    /// Upper bound on `iterationCount` when deriving a KEK on decode.
    pub max_pbkdf2_iterations: u32,
    pub gcm_tag_len: usize,
    pub max_stream_len: usize,
    pub max_nesting_depth: usize,
    /// Normalize BER input to DER before parsing. When false, only DER is
    /// accepted.
    pub accept_ber: bool,
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            content_type: known::pkcs7_data(),
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            pbkdf2_salt_len: DEFAULT_PBKDF2_SALT_LEN,
            pbkdf2_prf: HashAlgId::Sha256,
            max_pbkdf2_iterations: DEFAULT_MAX_PBKDF2_ITERATIONS,
            gcm_tag_len: DEFAULT_GCM_TAG_LEN,
            max_stream_len: DEFAULT_MAX_STREAM_LEN,
            max_nesting_depth: DEFAULT_MAX_DEPTH,
            accept_ber: true,
        }
    }
}

/// Builder for `EngineConfig`.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn content_type(mut self, oid: Oid) -> Self {
        self.config.content_type = oid;
        self
    }

    pub fn pbkdf2_iterations(mut self, iterations: u32) -> Self {
        self.config.pbkdf2_iterations = iterations;
        self
    }

    pub fn pbkdf2_salt_len(mut self, len: usize) -> Self {
        self.config.pbkdf2_salt_len = len;
        self
    }

    pub fn pbkdf2_prf(mut self, prf: HashAlgId) -> Self {
        self.config.pbkdf2_prf = prf;
        self
    }

    pub fn max_pbkdf2_iterations(mut self, iterations: u32) -> Self {
        self.config.max_pbkdf2_iterations = iterations;
        self
    }

    pub fn gcm_tag_len(mut self, len: usize) -> Self {
        self.config.gcm_tag_len = len;
        self
    }

    pub fn max_stream_len(mut self, len: usize) -> Self {
        self.config.max_stream_len = len;
        self
    }

    pub fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.config.max_nesting_depth = depth;
        self
    }

    pub fn accept_ber(mut self, accept: bool) -> Self {
        self.config.accept_ber = accept;
        self
    }

    pub fn build(self) -> Result<EngineConfig, CmsError> {
        let c = &self.config;
        if c.pbkdf2_iterations == 0 {
            return Err(CmsError::InvalidArg("pbkdf2 iterations must be positive".into()));
        }
        if c.max_pbkdf2_iterations < c.pbkdf2_iterations {
            return Err(CmsError::InvalidArg(format!(
                "pbkdf2 iteration limit {} is below the configured count {}",
                c.max_pbkdf2_iterations, c.pbkdf2_iterations
            )));
        }
        if c.pbkdf2_salt_len < 8 {
            return Err(CmsError::InvalidArg(format!(
                "pbkdf2 salt length {} is below 8",
                c.pbkdf2_salt_len
            )));
        }
        if !(12..=16).contains(&c.gcm_tag_len) {
            return Err(CmsError::InvalidArg(format!(
                "gcm tag length {} outside 12..=16",
                c.gcm_tag_len
            )));
        }
        if c.max_stream_len == 0 || c.max_nesting_depth == 0 {
            return Err(CmsError::InvalidArg("decoder limits must be positive".into()));
        }
        Ok(self.config)
    }
}
