#![no_main]
use std::sync::Arc;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&chunk, rest)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(chunk).max(1);
    let engine = cmsenv_cms::CmsEngine::new(Arc::new(cmsenv_crypto::DefaultProvider::new()));
    let mut decoder = cmsenv_cms::EnvelopeDecoder::new(&engine);
    for piece in rest.chunks(chunk) {
        match decoder.feed(piece) {
            Ok(cmsenv_cms::DecodeProgress::NeedMoreInput { .. }) => continue,
            _ => break,
        }
    }
});
