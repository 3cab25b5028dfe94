//! RSA key transport and NIST-curve ECDH.

use cmsenv_types::{CryptoError, EccCurveId, HashAlgId, RsaPadding};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

fn oaep(hash: HashAlgId) -> Oaep {
    match hash {
        HashAlgId::Sha1 => Oaep::new::<sha1::Sha1>(),
        HashAlgId::Sha224 => Oaep::new::<sha2::Sha224>(),
        HashAlgId::Sha256 => Oaep::new::<sha2::Sha256>(),
        HashAlgId::Sha384 => Oaep::new::<sha2::Sha384>(),
        HashAlgId::Sha512 => Oaep::new::<sha2::Sha512>(),
    }
}

pub(crate) fn rsa_encrypt(
    public_key_der: &[u8],
    padding: RsaPadding,
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let key = RsaPublicKey::from_public_key_der(public_key_der)
        .map_err(|_| CryptoError::InvalidKey)?;
    let mut rng = OsRng;
    let out = match padding {
        RsaPadding::Pkcs1v15 => key.encrypt(&mut rng, Pkcs1v15Encrypt, data),
        RsaPadding::Oaep(hash) => key.encrypt(&mut rng, oaep(hash), data),
    };
    out.map_err(|_| CryptoError::RsaEncryptFail)
}

pub(crate) fn rsa_decrypt(
    private_key_der: &[u8],
    padding: RsaPadding,
    data: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let key = RsaPrivateKey::from_pkcs8_der(private_key_der)
        .map_err(|_| CryptoError::InvalidKey)?;
    let out = match padding {
        RsaPadding::Pkcs1v15 => key.decrypt(Pkcs1v15Encrypt, data),
        RsaPadding::Oaep(hash) => key.decrypt(oaep(hash), data),
    };
    out.map(Zeroizing::new)
        .map_err(|_| CryptoError::RsaDecryptFail)
}

pub(crate) fn ec_generate(
    curve: EccCurveId,
) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), CryptoError> {
    match curve {
        EccCurveId::NistP256 => {
            let sk = p256::SecretKey::random(&mut OsRng);
            let public = sk.public_key().to_encoded_point(false).as_bytes().to_vec();
            Ok((Zeroizing::new(sk.to_bytes().to_vec()), public))
        }
        EccCurveId::NistP384 => {
            let sk = p384::SecretKey::random(&mut OsRng);
            let public = sk.public_key().to_encoded_point(false).as_bytes().to_vec();
            Ok((Zeroizing::new(sk.to_bytes().to_vec()), public))
        }
    }
}

pub(crate) fn ecdh(
    curve: EccCurveId,
    private: &[u8],
    peer_public: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if private.len() != curve.field_size() {
        return Err(CryptoError::EccInvalidPrivateKey);
    }
    match curve {
        EccCurveId::NistP256 => {
            let sk = p256::SecretKey::from_slice(private)
                .map_err(|_| CryptoError::EccInvalidPrivateKey)?;
            let pk = p256::PublicKey::from_sec1_bytes(peer_public)
                .map_err(|_| CryptoError::EccInvalidPublicKey)?;
            let shared = p256::ecdh::diffie_hellman(sk.to_nonzero_scalar(), pk.as_affine());
            Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
        }
        EccCurveId::NistP384 => {
            let sk = p384::SecretKey::from_slice(private)
                .map_err(|_| CryptoError::EccInvalidPrivateKey)?;
            let pk = p384::PublicKey::from_sec1_bytes(peer_public)
                .map_err(|_| CryptoError::EccInvalidPublicKey)?;
            let shared = p384::ecdh::diffie_hellman(sk.to_nonzero_scalar(), pk.as_affine());
            Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
        }
    }
}
