//! Integration tests for cmsenv.
//! Cross-crate enveloping scenarios.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cmsenv_cms::cms::recipient::{KeyAgreeParams, OriginatorKey};
    use cmsenv_cms::{
        Attribute, CmsEngine, DecodeProgress, DecoderState, DecryptionKey, EngineConfig,
        EnvelopeDecoder, RecipientId, RecipientInfo, RecipientSpec,
    };
    use cmsenv_crypto::{CryptoProvider, DefaultProvider};
    use cmsenv_types::{
        CmsError, ContentEncryptionAlg, EccCurveId, HashAlgId, KeyAgreeScheme, KeyWrapAlg,
        RsaPadding,
    };
    use cmsenv_utils::asn1::{tags, Decoder, Encoder};
    use cmsenv_utils::oid::{known, Oid};

    const RSA_A_PEM: &str = include_str!("../../vectors/rsa/recipient_a.pem");
    const RSA_A_PUB_PEM: &str = include_str!("../../vectors/rsa/recipient_a_pub.pem");
    const RSA_B_PEM: &str = include_str!("../../vectors/rsa/recipient_b.pem");
    const RSA_B_PUB_PEM: &str = include_str!("../../vectors/rsa/recipient_b_pub.pem");

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn engine() -> CmsEngine {
        let config = EngineConfig::builder().pbkdf2_iterations(64).build().unwrap();
        CmsEngine::with_config(Arc::new(DefaultProvider::new()), config)
    }

    /// (PKCS#8 private key, SubjectPublicKeyInfo) DER from the PEM fixtures.
    fn rsa_keys(priv_pem: &str, pub_pem: &str) -> (Vec<u8>, Vec<u8>) {
        use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
        let sk = rsa::RsaPrivateKey::from_pkcs8_pem(priv_pem).unwrap();
        let pk = rsa::RsaPublicKey::from_public_key_pem(pub_pem).unwrap();
        (
            sk.to_pkcs8_der().unwrap().as_bytes().to_vec(),
            pk.to_public_key_der().unwrap().as_bytes().to_vec(),
        )
    }

    /// DER Name with a single CN.
    fn name(cn: &str) -> Vec<u8> {
        let mut atv = Encoder::new();
        atv.write_oid(&known::common_name().to_der_value())
            .write_utf8_string(cn);
        let mut rdn = Encoder::new();
        rdn.write_sequence(&atv.finish());
        let mut set = Encoder::new();
        set.write_set(&rdn.finish());
        let mut name = Encoder::new();
        name.write_sequence(&set.finish());
        name.finish()
    }

    /// Rewrite every SEQUENCE with indefinite length.
    fn to_indefinite(der: &[u8]) -> Vec<u8> {
        let mut dec = Decoder::new(der);
        let mut out = Vec::new();
        while !dec.is_empty() {
            let tlv = dec.read_tlv().unwrap();
            if tlv.raw[0] == tags::SEQUENCE {
                out.extend_from_slice(&[tags::SEQUENCE, 0x80]);
                out.extend_from_slice(&to_indefinite(tlv.value));
                out.extend_from_slice(&[0x00, 0x00]);
            } else {
                out.extend_from_slice(tlv.raw);
            }
        }
        out
    }

    // -------------------------------------------------------
    // 1. "Hello World": RSA-2048, IssuerAndSerialNumber, AES-256-CBC
    // -------------------------------------------------------
    #[test]
    fn test_hello_world_rsa_issuer_and_serial() {
        init_logging();
        let e = engine();
        let (sk, pk) = rsa_keys(RSA_A_PEM, RSA_A_PUB_PEM);
        let rid = RecipientId::issuer_and_serial(&name("Recipient A"), &hex("01020304"));
        let plaintext = hex("48656c6c6f20576f726c64");
        assert_eq!(plaintext, b"Hello World");

        let alg = ContentEncryptionAlg::Aes256Cbc;
        let output = e.encrypt_content(&plaintext, alg, None).unwrap();
        let ri = e
            .wrap_recipient(
                &RecipientSpec::key_transport(rid.clone(), &pk, RsaPadding::Pkcs1v15),
                &output.cek,
                alg,
            )
            .unwrap();
        assert_eq!(ri.version(), 0);
        let der = e.assemble(vec![ri], &output, None).unwrap();

        let ed = e.disassemble(&der).unwrap();
        assert_eq!(ed.version, 0);
        let cek = e
            .recover_cek(&ed.recipient_infos, &[DecryptionKey::key_transport(rid, &sk)], alg)
            .unwrap();
        let recovered = e.decrypt(&ed, &cek).unwrap();
        assert_eq!(recovered.len(), 11);
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn test_hello_world_corrupted_cek_other_recipient_intact() {
        init_logging();
        let e = engine();
        let (sk_a, pk_a) = rsa_keys(RSA_A_PEM, RSA_A_PUB_PEM);
        let (sk_b, pk_b) = rsa_keys(RSA_B_PEM, RSA_B_PUB_PEM);
        let rid_a = RecipientId::issuer_and_serial(&name("Recipient A"), &[0x01]);
        let rid_b = RecipientId::issuer_and_serial(&name("Recipient B"), &[0x02]);
        let padding = RsaPadding::Oaep(HashAlgId::Sha256);
        let specs = [
            RecipientSpec::key_transport(rid_a.clone(), &pk_a, padding),
            RecipientSpec::key_transport(rid_b.clone(), &pk_b, padding),
        ];
        let mut der = e
            .envelope(b"Hello World", ContentEncryptionAlg::Aes256Cbc, &specs, None)
            .unwrap();

        // flip a byte of A's wrapped CEK in place
        let ed = e.disassemble(&der).unwrap();
        let RecipientInfo::KeyTransport(ktri) = &ed.recipient_infos[0] else {
            panic!("expected ktri");
        };
        let pos = der
            .windows(ktri.encrypted_key.len())
            .position(|w| w == ktri.encrypted_key.as_slice())
            .unwrap();
        der[pos + 17] ^= 0x5A;

        let key_a = [DecryptionKey::key_transport(rid_a, &sk_a)];
        let key_b = [DecryptionKey::key_transport(rid_b, &sk_b)];
        assert!(matches!(e.open(&der, &key_a), Err(CmsError::NoRecipientFound)));
        assert_eq!(e.open(&der, &key_b).unwrap(), b"Hello World");
    }

    // -------------------------------------------------------
    // 2. Multi-recipient independence: A, B, C open; D does not
    // -------------------------------------------------------
    #[test]
    fn test_multi_recipient_independence() {
        init_logging();
        let e = engine();
        let (sk_a, pk_a) = rsa_keys(RSA_A_PEM, RSA_A_PUB_PEM);
        let rid_a = RecipientId::subject_key_id(&hex("a1a2a3a4a5a6a7a8a9aa"));
        let (sk_b, pk_b) = e.provider().ec_generate(EccCurveId::NistP384).unwrap();
        let rid_b = RecipientId::subject_key_id(&hex("b1b2b3b4"));

        let specs = [
            RecipientSpec::key_transport(rid_a.clone(), &pk_a, RsaPadding::Oaep(HashAlgId::Sha1)),
            RecipientSpec::KeyAgreement(KeyAgreeParams {
                curve: EccCurveId::NistP384,
                scheme: KeyAgreeScheme::StdDh(HashAlgId::Sha384),
                wrap: KeyWrapAlg::Aes256Wrap,
                originator: OriginatorKey::Ephemeral,
                ukm: Some(b"user keying material".to_vec()),
                recipients: vec![(rid_b.clone(), pk_b)],
            }),
            RecipientSpec::password(b"recipient C passphrase"),
        ];

        for alg in [ContentEncryptionAlg::Aes128Cbc, ContentEncryptionAlg::Aes256Gcm] {
            let payload = vec![0x3Cu8; 1000];
            let der = if alg.is_aead() {
                e.envelope_auth(&payload, alg, &specs, None, None).unwrap()
            } else {
                e.envelope(&payload, alg, &specs, None).unwrap()
            };
            let keys = [
                DecryptionKey::key_transport(rid_a.clone(), &sk_a),
                DecryptionKey::key_agreement(rid_b.clone(), EccCurveId::NistP384, &sk_b),
                DecryptionKey::password(b"recipient C passphrase"),
            ];
            for key in &keys {
                let (ct, got) = e.open_any(&der, std::slice::from_ref(key)).unwrap();
                assert_eq!(ct, known::pkcs7_data());
                assert_eq!(got, payload);
            }
            let d = [DecryptionKey::password(b"recipient D guess")];
            assert!(matches!(e.open_any(&der, &d), Err(CmsError::NoRecipientFound)));
        }
    }

    // -------------------------------------------------------
    // 3. Streaming: BER input fed a byte at a time
    // -------------------------------------------------------
    #[test]
    fn test_streaming_ber_equivalence() {
        init_logging();
        let e = engine();
        let spec = [RecipientSpec::kek(b"stream-kek", &[0x0Fu8; 32])];
        let keys = [DecryptionKey::kek(b"stream-kek", &[0x0Fu8; 32])];
        let der = e
            .envelope(b"streamed over the wire", ContentEncryptionAlg::Aes192Cbc, &spec, None)
            .unwrap();
        let ber = to_indefinite(&der);

        let mut whole = EnvelopeDecoder::new(&e);
        assert_eq!(
            whole.feed(&ber).unwrap(),
            DecodeProgress::Parsed { consumed: ber.len() }
        );
        let mut bytewise = EnvelopeDecoder::new(&e);
        let mut last = None;
        for b in &ber {
            last = Some(bytewise.feed(std::slice::from_ref(b)).unwrap());
        }
        assert_eq!(last, Some(DecodeProgress::Parsed { consumed: 1 }));
        assert_eq!(whole.envelope(), bytewise.envelope());
        assert_eq!(
            whole.envelope(),
            Some(&e.disassemble_any(&der).unwrap())
        );

        for d in [&mut whole, &mut bytewise] {
            d.select_recipient(&keys).unwrap();
            assert_eq!(d.decrypt_content().unwrap(), b"streamed over the wire");
            assert_eq!(d.state(), DecoderState::ContentDecrypted);
        }
    }

    // -------------------------------------------------------
    // 4. AEAD: tag and authenticated attributes are bound
    // -------------------------------------------------------
    #[test]
    fn test_auth_enveloped_tamper_detection() {
        init_logging();
        let e = engine();
        let spec = [RecipientSpec::kek(b"k", &[0x99u8; 16])];
        let keys = [DecryptionKey::kek(b"k", &[0x99u8; 16])];
        let mut value = Encoder::new();
        value.write_octet_string(b"message-id-0001");
        let oid = Oid::new(&[1, 3, 6, 1, 4, 1, 99999, 7]);
        let auth = vec![Attribute::new(oid, vec![value.finish()])];
        let der = e
            .envelope_auth(b"integrity", ContentEncryptionAlg::Aes192Gcm, &spec, Some(auth), None)
            .unwrap();
        assert_eq!(e.open_auth(&der, &keys).unwrap(), b"integrity");

        let aed = e.disassemble_auth(&der).unwrap();
        let mut bad_mac = aed.clone();
        let last = bad_mac.mac.len() - 1;
        bad_mac.mac[last] ^= 0x01;
        assert!(matches!(
            e.open_auth(&bad_mac.to_content_info(), &keys),
            Err(CmsError::AuthFailure)
        ));

        let pos = der.windows(15).position(|w| w == b"message-id-0001").unwrap();
        let mut bad_attr = der.clone();
        bad_attr[pos + 14] = b'2';
        assert!(matches!(e.open_auth(&bad_attr, &keys), Err(CmsError::AuthFailure)));
    }

    // -------------------------------------------------------
    // 5. KEK and password wrap identity for every CEK length
    // -------------------------------------------------------
    #[test]
    fn test_kek_and_password_wrap_identity() {
        let e = engine();
        for alg in [
            ContentEncryptionAlg::Aes128Cbc,
            ContentEncryptionAlg::Aes192Cbc,
            ContentEncryptionAlg::Aes256Cbc,
        ] {
            let cek = vec![0xC5u8; alg.key_len()];
            for kek_len in [16usize, 24, 32] {
                let kek = vec![0x1Bu8; kek_len];
                let ri = e.wrap_recipient(&RecipientSpec::kek(b"id", &kek), &cek, alg).unwrap();
                let got = e.recover_cek(&[ri], &[DecryptionKey::kek(b"id", &kek)], alg).unwrap();
                assert_eq!(*got, cek);
            }
            let ri = e.wrap_recipient(&RecipientSpec::password(b"pw"), &cek, alg).unwrap();
            assert_eq!(ri.version(), 0);
            let got = e.recover_cek(&[ri], &[DecryptionKey::password(b"pw")], alg).unwrap();
            assert_eq!(*got, cek);
        }
    }

    // -------------------------------------------------------
    // 6. Caller buffer contract
    // -------------------------------------------------------
    #[test]
    fn test_output_length_query() {
        let e = engine();
        let spec = [RecipientSpec::kek(b"k", &[1u8; 24])];
        let keys = [DecryptionKey::kek(b"k", &[1u8; 24])];
        let alg = ContentEncryptionAlg::Aes128Cbc;
        let need = e.envelope_into(b"sized", alg, &spec, None, None).unwrap();
        let mut buf = vec![0u8; need + 8];
        let n = e.envelope_into(b"sized", alg, &spec, None, Some(&mut buf[..])).unwrap();
        assert_eq!(n, need);
        assert_eq!(e.open_into(&buf[..n], &keys, None).unwrap(), 5);
        assert!(matches!(
            e.open_into(&buf[..n], &keys, Some(&mut [0u8; 2][..])),
            Err(CmsError::Length { need: 5, got: 2 })
        ));
    }
}
