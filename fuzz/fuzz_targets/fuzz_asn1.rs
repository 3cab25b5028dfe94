#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut decoder = cmsenv_utils::asn1::Decoder::new(data);
    while !decoder.is_empty() {
        if decoder.read_tlv().is_err() {
            break;
        }
    }
    if let Ok((der, _)) = cmsenv_utils::asn1::ber_to_der(data, 64) {
        // normalized output must itself be valid DER
        assert!(cmsenv_utils::asn1::Decoder::new(&der).read_tlv().is_ok());
    }
});
