#![forbid(unsafe_code)]
#![doc = "Multi-recipient CMS EnvelopedData and AuthEnvelopedData for cmsenv."]

pub mod cms;
pub mod config;

pub(crate) mod encoding;
pub(crate) mod oid_mapping;

pub use cms::auth_enveloped::AuthEnvelopedData;
pub use cms::compose::{Compressor, SignatureVerifier, Signer};
pub use cms::content::ContentCipherOutput;
pub use cms::engine::{CmsEngine, Envelope};
pub use cms::enveloped::{EncryptedContentInfo, EnvelopedData};
pub use cms::recipient::{DecryptionKey, OtherRecipientHandler, RecipientInfo, RecipientSpec};
pub use cms::stream::{DecodeProgress, DecoderState, EnvelopeDecoder};
pub use cms::{AlgorithmIdentifier, Attribute, ContentInfo, RecipientId};
pub use config::{EngineConfig, EngineConfigBuilder};
