//! Shared OID-to-algorithm mapping helpers for the CMS crate.
//!
//! Lookups return `None` for unrecognized OIDs; callers wrap that in
//! `CmsError::UnsupportedAlgorithm` with their own context.

use cmsenv_types::{ContentEncryptionAlg, EccCurveId, HashAlgId, KeyAgreeScheme, KeyWrapAlg};
use cmsenv_utils::oid::{known, Oid};

pub(crate) fn content_alg_oid(alg: ContentEncryptionAlg) -> Oid {
    match alg {
        ContentEncryptionAlg::Aes128Cbc => known::aes128_cbc(),
        ContentEncryptionAlg::Aes192Cbc => known::aes192_cbc(),
        ContentEncryptionAlg::Aes256Cbc => known::aes256_cbc(),
        ContentEncryptionAlg::Aes128Gcm => known::aes128_gcm(),
        ContentEncryptionAlg::Aes192Gcm => known::aes192_gcm(),
        ContentEncryptionAlg::Aes256Gcm => known::aes256_gcm(),
    }
}

pub(crate) fn oid_to_content_alg(oid: &Oid) -> Option<ContentEncryptionAlg> {
    [
        ContentEncryptionAlg::Aes128Cbc,
        ContentEncryptionAlg::Aes192Cbc,
        ContentEncryptionAlg::Aes256Cbc,
        ContentEncryptionAlg::Aes128Gcm,
        ContentEncryptionAlg::Aes192Gcm,
        ContentEncryptionAlg::Aes256Gcm,
    ]
    .into_iter()
    .find(|alg| content_alg_oid(*alg) == *oid)
}

pub(crate) fn key_wrap_oid(alg: KeyWrapAlg) -> Oid {
    match alg {
        KeyWrapAlg::Aes128Wrap => known::aes128_wrap(),
        KeyWrapAlg::Aes192Wrap => known::aes192_wrap(),
        KeyWrapAlg::Aes256Wrap => known::aes256_wrap(),
    }
}

pub(crate) fn oid_to_key_wrap(oid: &Oid) -> Option<KeyWrapAlg> {
    if *oid == known::aes128_wrap() {
        Some(KeyWrapAlg::Aes128Wrap)
    } else if *oid == known::aes192_wrap() {
        Some(KeyWrapAlg::Aes192Wrap)
    } else if *oid == known::aes256_wrap() {
        Some(KeyWrapAlg::Aes256Wrap)
    } else {
        None
    }
}

pub(crate) fn hash_oid(hash: HashAlgId) -> Oid {
    match hash {
        HashAlgId::Sha1 => known::sha1(),
        HashAlgId::Sha224 => known::sha224(),
        HashAlgId::Sha256 => known::sha256(),
        HashAlgId::Sha384 => known::sha384(),
        HashAlgId::Sha512 => known::sha512(),
    }
}

pub(crate) fn oid_to_hash(oid: &Oid) -> Option<HashAlgId> {
    ALL_HASHES.into_iter().find(|h| hash_oid(*h) == *oid)
}

pub(crate) fn hmac_prf_oid(hash: HashAlgId) -> Oid {
    match hash {
        HashAlgId::Sha1 => known::hmac_with_sha1(),
        HashAlgId::Sha224 => known::hmac_with_sha224(),
        HashAlgId::Sha256 => known::hmac_with_sha256(),
        HashAlgId::Sha384 => known::hmac_with_sha384(),
        HashAlgId::Sha512 => known::hmac_with_sha512(),
    }
}

pub(crate) fn oid_to_hmac_prf(oid: &Oid) -> Option<HashAlgId> {
    ALL_HASHES.into_iter().find(|h| hmac_prf_oid(*h) == *oid)
}

pub(crate) fn curve_oid(curve: EccCurveId) -> Oid {
    match curve {
        EccCurveId::NistP256 => known::prime256v1(),
        EccCurveId::NistP384 => known::secp384r1(),
    }
}

pub(crate) fn oid_to_curve_id(oid: &Oid) -> Option<EccCurveId> {
    if *oid == known::prime256v1() {
        Some(EccCurveId::NistP256)
    } else if *oid == known::secp384r1() {
        Some(EccCurveId::NistP384)
    } else {
        None
    }
}

pub(crate) fn key_agree_oid(scheme: KeyAgreeScheme) -> Oid {
    match scheme {
        KeyAgreeScheme::StdDh(HashAlgId::Sha1) => known::dh_single_pass_std_dh_sha1kdf(),
        KeyAgreeScheme::StdDh(HashAlgId::Sha224) => known::dh_single_pass_std_dh_sha224kdf(),
        KeyAgreeScheme::StdDh(HashAlgId::Sha256) => known::dh_single_pass_std_dh_sha256kdf(),
        KeyAgreeScheme::StdDh(HashAlgId::Sha384) => known::dh_single_pass_std_dh_sha384kdf(),
        KeyAgreeScheme::StdDh(HashAlgId::Sha512) => known::dh_single_pass_std_dh_sha512kdf(),
        KeyAgreeScheme::CofactorDh(HashAlgId::Sha1) => known::dh_single_pass_cofactor_dh_sha1kdf(),
        KeyAgreeScheme::CofactorDh(HashAlgId::Sha224) => {
            known::dh_single_pass_cofactor_dh_sha224kdf()
        }
        KeyAgreeScheme::CofactorDh(HashAlgId::Sha256) => {
            known::dh_single_pass_cofactor_dh_sha256kdf()
        }
        KeyAgreeScheme::CofactorDh(HashAlgId::Sha384) => {
            known::dh_single_pass_cofactor_dh_sha384kdf()
        }
        KeyAgreeScheme::CofactorDh(HashAlgId::Sha512) => {
            known::dh_single_pass_cofactor_dh_sha512kdf()
        }
    }
}

pub(crate) fn oid_to_key_agree(oid: &Oid) -> Option<KeyAgreeScheme> {
    ALL_HASHES
        .into_iter()
        .flat_map(|h| [KeyAgreeScheme::StdDh(h), KeyAgreeScheme::CofactorDh(h)])
        .find(|s| key_agree_oid(*s) == *oid)
}

const ALL_HASHES: [HashAlgId; 5] = [
    HashAlgId::Sha1,
    HashAlgId::Sha224,
    HashAlgId::Sha256,
    HashAlgId::Sha384,
    HashAlgId::Sha512,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_alg_mapping() {
        for alg in [
            ContentEncryptionAlg::Aes128Cbc,
            ContentEncryptionAlg::Aes192Gcm,
            ContentEncryptionAlg::Aes256Cbc,
        ] {
            assert_eq!(oid_to_content_alg(&content_alg_oid(alg)), Some(alg));
        }
        assert_eq!(oid_to_content_alg(&known::aes128_wrap()), None);
    }

    #[test]
    fn test_key_agree_mapping() {
        let scheme = KeyAgreeScheme::CofactorDh(HashAlgId::Sha384);
        assert_eq!(
            key_agree_oid(scheme).to_string(),
            "1.3.132.1.14.2"
        );
        assert_eq!(oid_to_key_agree(&key_agree_oid(scheme)), Some(scheme));
        assert_eq!(
            oid_to_key_agree(&known::dh_single_pass_std_dh_sha1kdf()),
            Some(KeyAgreeScheme::StdDh(HashAlgId::Sha1))
        );
    }

    #[test]
    fn test_prf_and_curve_mapping() {
        assert_eq!(
            oid_to_hmac_prf(&known::hmac_with_sha512()),
            Some(HashAlgId::Sha512)
        );
        assert_eq!(oid_to_hash(&known::sha224()), Some(HashAlgId::Sha224));
        assert_eq!(
            oid_to_curve_id(&known::secp384r1()),
            Some(EccCurveId::NistP384)
        );
        assert_eq!(oid_to_key_wrap(&known::aes192_wrap()), Some(KeyWrapAlg::Aes192Wrap));
    }
}
