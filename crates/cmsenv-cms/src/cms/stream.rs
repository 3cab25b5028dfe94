//! Incremental envelope decoding.
//!
//! ```text
//! Empty ─feed─▶ Parsing ─feed─▶ Parsed ─select_recipient─▶ RecipientSelected
//!                                                  ─decrypt_content─▶ ContentDecrypted
//! ```
//! Any failed transition moves to `Failed`, which is terminal until
//! [`EnvelopeDecoder::reset`].

use cmsenv_types::CmsError;
use cmsenv_utils::asn1::{StreamDecoder, StreamStatus};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::engine::{CmsEngine, Envelope};
use super::recipient::DecryptionKey;

/// Externally visible decoder phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Empty,
    Parsing,
    Parsed,
    RecipientSelected,
    ContentDecrypted,
    Failed,
}

/// Result of one [`EnvelopeDecoder::feed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeProgress {
    /// Everything fed so far was buffered; the envelope is not complete.
    NeedMoreInput { consumed: usize },
    /// The envelope is complete and parsed. `consumed` counts the bytes of
    /// this call that belonged to it.
    Parsed { consumed: usize },
}

enum State {
    Empty,
    Parsing,
    Parsed(Envelope),
    RecipientSelected {
        envelope: Envelope,
        cek: Zeroizing<Vec<u8>>,
    },
    ContentDecrypted(Envelope),
    Failed(String),
}

/// Caller-owned streaming decoder for EnvelopedData or AuthEnvelopedData.
pub struct EnvelopeDecoder<'e> {
    engine: &'e CmsEngine,
    stream: StreamDecoder,
    state: State,
}

impl<'e> EnvelopeDecoder<'e> {
    pub fn new(engine: &'e CmsEngine) -> Self {
        let config = engine.config();
        Self {
            engine,
            stream: StreamDecoder::with_limits(config.max_stream_len, config.max_nesting_depth),
            state: State::Empty,
        }
    }

    pub fn state(&self) -> DecoderState {
        match self.state {
            State::Empty => DecoderState::Empty,
            State::Parsing => DecoderState::Parsing,
            State::Parsed(_) => DecoderState::Parsed,
            State::RecipientSelected { .. } => DecoderState::RecipientSelected,
            State::ContentDecrypted(_) => DecoderState::ContentDecrypted,
            State::Failed(_) => DecoderState::Failed,
        }
    }

    /// Why the decoder failed, if it did.
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            State::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// The parsed envelope, once available.
    pub fn envelope(&self) -> Option<&Envelope> {
        match &self.state {
            State::Parsed(envelope)
            | State::RecipientSelected { envelope, .. }
            | State::ContentDecrypted(envelope) => Some(envelope),
            _ => None,
        }
    }

    /// Buffer the next piece of input and parse once the top-level element
    /// is complete.
    pub fn feed(&mut self, input: &[u8]) -> Result<DecodeProgress, CmsError> {
        match self.state {
            State::Empty | State::Parsing => {}
            State::Failed(_) => return Err(CmsError::InvalidState("decoder has failed")),
            _ => return Err(CmsError::InvalidState("envelope already parsed")),
        }
        let status = match self.stream.feed(input) {
            Ok(status) => status,
            Err(e) => return Err(self.fail(e.into())),
        };
        match status {
            StreamStatus::NeedMoreInput { consumed } => {
                self.state = State::Parsing;
                Ok(DecodeProgress::NeedMoreInput { consumed })
            }
            StreamStatus::Complete { der, consumed } => {
                match self.engine.parse_envelope_der(&der) {
                    Ok(envelope) => {
                        debug!(
                            len = der.len(),
                            recipients = envelope.recipient_infos().len(),
                            auth = matches!(envelope, Envelope::AuthEnveloped(_)),
                            "stream envelope parsed"
                        );
                        self.state = State::Parsed(envelope);
                        Ok(DecodeProgress::Parsed { consumed })
                    }
                    Err(e) => Err(self.fail(e)),
                }
            }
        }
    }

    /// Recover the CEK with the first RecipientInfo `keys` unlock.
    pub fn select_recipient(&mut self, keys: &[DecryptionKey]) -> Result<(), CmsError> {
        let envelope = match std::mem::replace(&mut self.state, State::Empty) {
            State::Parsed(envelope) => envelope,
            other => return Err(self.refuse(other, "no parsed envelope to select from")),
        };
        let cek = envelope
            .content_alg()
            .and_then(|alg| self.engine.recover_cek(envelope.recipient_infos(), keys, alg));
        match cek {
            Ok(cek) => {
                self.state = State::RecipientSelected { envelope, cek };
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Decrypt (and for AuthEnvelopedData, verify) the content.
    pub fn decrypt_content(&mut self) -> Result<Vec<u8>, CmsError> {
        let (envelope, cek) = match std::mem::replace(&mut self.state, State::Empty) {
            State::RecipientSelected { envelope, cek } => (envelope, cek),
            other => return Err(self.refuse(other, "no recipient selected")),
        };
        match self.engine.decrypt_envelope(&envelope, &cek) {
            Ok(plaintext) => {
                self.state = State::ContentDecrypted(envelope);
                Ok(plaintext)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Drop all input, keys and results and return to `Empty`.
    pub fn reset(&mut self) {
        self.stream.reset();
        self.state = State::Empty;
    }

    fn refuse(&mut self, previous: State, msg: &'static str) -> CmsError {
        let failed = matches!(previous, State::Failed(_));
        self.state = previous;
        if failed {
            CmsError::InvalidState("decoder has failed")
        } else {
            CmsError::InvalidState(msg)
        }
    }

    fn fail(&mut self, e: CmsError) -> CmsError {
        warn!(error = %e, "envelope decoder failed");
        self.stream.reset();
        self.state = State::Failed(e.to_string());
        e
    }
}

impl std::fmt::Debug for EnvelopeDecoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeDecoder")
            .field("state", &self.state())
            .field("buffered", &self.stream.buffered())
            .finish_non_exhaustive()
    }
}
