#![no_main]
use std::sync::Arc;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let engine = cmsenv_cms::CmsEngine::new(Arc::new(cmsenv_crypto::DefaultProvider::new()));
    let _ = engine.disassemble_any(data);
});
