//! Other recipient info (RFC 5652 §6.2.5), delegated to a caller handler.

use cmsenv_types::CmsError;
use cmsenv_utils::asn1::Decoder;
use cmsenv_utils::oid::Oid;
use zeroize::Zeroizing;

use crate::cms::cerr;
use crate::encoding::enc_oid;

/// Caller-supplied key management for `OtherRecipientInfo`.
///
/// The engine never interprets `oriType`; it hands the value to this
/// handler in both directions.
pub trait OtherRecipientHandler: Send + Sync {
    /// Produce `(oriType, oriValue DER)` protecting `cek`.
    fn wrap_cek(&self, cek: &[u8]) -> Result<(Oid, Vec<u8>), CmsError>;

    /// Recover the CEK from a received `(oriType, oriValue DER)`.
    fn unwrap_cek(&self, ori_type: &Oid, ori_value: &[u8]) -> Result<Zeroizing<Vec<u8>>, CmsError>;
}

/// `OtherRecipientInfo { oriType, oriValue }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherRecipientInfo {
    pub ori_type: Oid,
    /// DER of `oriValue`.
    pub ori_value: Vec<u8>,
}

impl OtherRecipientInfo {
    pub fn wrap(handler: &dyn OtherRecipientHandler, cek: &[u8]) -> Result<Self, CmsError> {
        let (ori_type, ori_value) = handler
            .wrap_cek(cek)
            .map_err(|e| CmsError::Callback(e.to_string()))?;
        let mut dec = Decoder::new(&ori_value);
        if dec.read_tlv().is_err() || !dec.is_empty() {
            return Err(CmsError::Callback(
                "oriValue is not a single DER element".into(),
            ));
        }
        Ok(Self {
            ori_type,
            ori_value,
        })
    }

    pub fn unwrap(
        &self,
        handler: &dyn OtherRecipientHandler,
    ) -> Result<Zeroizing<Vec<u8>>, CmsError> {
        handler
            .unwrap_cek(&self.ori_type, &self.ori_value)
            .map_err(|e| CmsError::Callback(e.to_string()))
    }

    pub(crate) fn encode_fields(&self) -> Vec<u8> {
        let mut inner = enc_oid(&self.ori_type.to_der_value());
        inner.extend_from_slice(&self.ori_value);
        inner
    }

    pub(crate) fn parse_fields(mut dec: Decoder) -> Result<Self, CmsError> {
        let oid = dec
            .read_oid()
            .map_err(|e| cerr(&format!("oriType: {e}")))?;
        let ori_type = Oid::from_der_value(oid).map_err(|e| cerr(&format!("oriType: {e}")))?;
        let ori_value = dec
            .read_tlv()
            .map_err(|e| cerr(&format!("oriValue: {e}")))?
            .raw
            .to_vec();
        if !dec.is_empty() {
            return Err(cerr("OtherRecipientInfo: trailing data"));
        }
        Ok(Self {
            ori_type,
            ori_value,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_handler {
    use super::*;
    use crate::encoding::enc_octet;

    /// Wraps by XOR with a fixed pad under a private OID.
    pub(crate) struct XorHandler {
        pub(crate) pad: u8,
    }

    pub(crate) fn xor_oid() -> Oid {
        Oid::new(&[1, 3, 6, 1, 4, 1, 99999, 1])
    }

    impl OtherRecipientHandler for XorHandler {
        fn wrap_cek(&self, cek: &[u8]) -> Result<(Oid, Vec<u8>), CmsError> {
            let masked: Vec<u8> = cek.iter().map(|b| b ^ self.pad).collect();
            Ok((xor_oid(), enc_octet(&masked)))
        }

        fn unwrap_cek(
            &self,
            ori_type: &Oid,
            ori_value: &[u8],
        ) -> Result<Zeroizing<Vec<u8>>, CmsError> {
            if *ori_type != xor_oid() {
                return Err(CmsError::UnsupportedAlgorithm(ori_type.to_string()));
            }
            let masked = Decoder::new(ori_value)
                .read_octet_string()
                .map_err(|e| cerr(&e.to_string()))?;
            Ok(Zeroizing::new(masked.iter().map(|b| b ^ self.pad).collect()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_handler::{xor_oid, XorHandler};
    use super::*;

    #[test]
    fn test_ori_roundtrip_through_handler() {
        let h = XorHandler { pad: 0x5A };
        let ori = OtherRecipientInfo::wrap(&h, &[1u8; 16]).unwrap();
        assert_eq!(ori.ori_type, xor_oid());
        let parsed = OtherRecipientInfo::parse_fields(Decoder::new(&ori.encode_fields())).unwrap();
        assert_eq!(parsed, ori);
        assert_eq!(*parsed.unwrap(&h).unwrap(), [1u8; 16]);
    }

    #[test]
    fn test_ori_handler_error_is_callback() {
        let h = XorHandler { pad: 0 };
        let ori = OtherRecipientInfo {
            ori_type: Oid::new(&[1, 2, 3]),
            ori_value: vec![0x05, 0x00],
        };
        assert!(matches!(ori.unwrap(&h), Err(CmsError::Callback(_))));
    }

    struct BadHandler;

    impl OtherRecipientHandler for BadHandler {
        fn wrap_cek(&self, _cek: &[u8]) -> Result<(Oid, Vec<u8>), CmsError> {
            Ok((Oid::new(&[1, 2, 3]), vec![0x05, 0x00, 0x05, 0x00]))
        }

        fn unwrap_cek(&self, _: &Oid, _: &[u8]) -> Result<Zeroizing<Vec<u8>>, CmsError> {
            Err(CmsError::Callback("unused".into()))
        }
    }

    #[test]
    fn test_ori_value_must_be_single_element() {
        assert!(matches!(
            OtherRecipientInfo::wrap(&BadHandler, &[0u8; 16]),
            Err(CmsError::Callback(_))
        ));
    }
}
