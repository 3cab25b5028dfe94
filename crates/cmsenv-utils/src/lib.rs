#![forbid(unsafe_code)]
#![doc = "Utility functions for cmsenv: ASN.1 codec, incremental decoding, OID."]

#[cfg(feature = "asn1")]
pub mod asn1;

#[cfg(feature = "oid")]
pub mod oid;
