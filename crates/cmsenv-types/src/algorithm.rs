/// Hash algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgId {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgId {
    /// Digest output size in bytes.
    pub fn output_size(self) -> usize {
        match self {
            HashAlgId::Sha1 => 20,
            HashAlgId::Sha224 => 28,
            HashAlgId::Sha256 => 32,
            HashAlgId::Sha384 => 48,
            HashAlgId::Sha512 => 64,
        }
    }
}

/// AES block cipher keyed by size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockCipherId {
    Aes128,
    Aes192,
    Aes256,
}

impl BlockCipherId {
    pub const BLOCK_SIZE: usize = 16;

    pub fn key_len(self) -> usize {
        match self {
            BlockCipherId::Aes128 => 16,
            BlockCipherId::Aes192 => 24,
            BlockCipherId::Aes256 => 32,
        }
    }

    /// Pick the AES variant for a raw key length.
    pub fn for_key_len(len: usize) -> Option<Self> {
        match len {
            16 => Some(BlockCipherId::Aes128),
            24 => Some(BlockCipherId::Aes192),
            32 => Some(BlockCipherId::Aes256),
            _ => None,
        }
    }
}

/// Content encryption algorithm (cipher + mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEncryptionAlg {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes192Gcm,
    Aes256Gcm,
}

impl ContentEncryptionAlg {
    pub fn cipher(self) -> BlockCipherId {
        match self {
            Self::Aes128Cbc | Self::Aes128Gcm => BlockCipherId::Aes128,
            Self::Aes192Cbc | Self::Aes192Gcm => BlockCipherId::Aes192,
            Self::Aes256Cbc | Self::Aes256Gcm => BlockCipherId::Aes256,
        }
    }

    /// CEK length in bytes.
    pub fn key_len(self) -> usize {
        self.cipher().key_len()
    }

    pub fn block_size(self) -> usize {
        BlockCipherId::BLOCK_SIZE
    }

    pub fn is_aead(self) -> bool {
        matches!(self, Self::Aes128Gcm | Self::Aes192Gcm | Self::Aes256Gcm)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aes128Cbc => "AES-128-CBC",
            Self::Aes192Cbc => "AES-192-CBC",
            Self::Aes256Cbc => "AES-256-CBC",
            Self::Aes128Gcm => "AES-128-GCM",
            Self::Aes192Gcm => "AES-192-GCM",
            Self::Aes256Gcm => "AES-256-GCM",
        }
    }
}

/// AES key wrap (RFC 3394) keyed by KEK size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyWrapAlg {
    Aes128Wrap,
    Aes192Wrap,
    Aes256Wrap,
}

impl KeyWrapAlg {
    pub fn kek_len(self) -> usize {
        match self {
            KeyWrapAlg::Aes128Wrap => 16,
            KeyWrapAlg::Aes192Wrap => 24,
            KeyWrapAlg::Aes256Wrap => 32,
        }
    }

    pub fn for_kek_len(len: usize) -> Option<Self> {
        match len {
            16 => Some(KeyWrapAlg::Aes128Wrap),
            24 => Some(KeyWrapAlg::Aes192Wrap),
            32 => Some(KeyWrapAlg::Aes256Wrap),
            _ => None,
        }
    }
}

/// RSA encryption padding used for key transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RsaPadding {
    /// PKCS#1 v1.5 (rsaEncryption).
    Pkcs1v15,
    /// RSAES-OAEP with the given hash for both the label digest and MGF1.
    Oaep(HashAlgId),
}

/// ECC named curves usable for key agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EccCurveId {
    NistP256,
    NistP384,
}

impl EccCurveId {
    /// Field element size in bytes (also the length of the shared secret Z).
    pub fn field_size(self) -> usize {
        match self {
            EccCurveId::NistP256 => 32,
            EccCurveId::NistP384 => 48,
        }
    }
}

/// Key agreement scheme with its X9.63 KDF hash (RFC 5753).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAgreeScheme {
    /// dhSinglePass-stdDH-*kdf-scheme.
    StdDh(HashAlgId),
    /// dhSinglePass-cofactorDH-*kdf-scheme.
    CofactorDh(HashAlgId),
}

impl KeyAgreeScheme {
    pub fn kdf_hash(self) -> HashAlgId {
        match self {
            KeyAgreeScheme::StdDh(h) | KeyAgreeScheme::CofactorDh(h) => h,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_alg_sizes() {
        assert_eq!(ContentEncryptionAlg::Aes128Cbc.key_len(), 16);
        assert_eq!(ContentEncryptionAlg::Aes192Gcm.key_len(), 24);
        assert_eq!(ContentEncryptionAlg::Aes256Cbc.key_len(), 32);
        assert_eq!(ContentEncryptionAlg::Aes256Gcm.block_size(), 16);
        assert!(ContentEncryptionAlg::Aes128Gcm.is_aead());
        assert!(!ContentEncryptionAlg::Aes128Cbc.is_aead());
    }

    #[test]
    fn test_key_wrap_for_kek_len() {
        assert_eq!(KeyWrapAlg::for_kek_len(16), Some(KeyWrapAlg::Aes128Wrap));
        assert_eq!(KeyWrapAlg::for_kek_len(24), Some(KeyWrapAlg::Aes192Wrap));
        assert_eq!(KeyWrapAlg::for_kek_len(32), Some(KeyWrapAlg::Aes256Wrap));
        assert_eq!(KeyWrapAlg::for_kek_len(20), None);
    }

    #[test]
    fn test_key_agree_kdf_hash() {
        assert_eq!(
            KeyAgreeScheme::CofactorDh(HashAlgId::Sha384).kdf_hash(),
            HashAlgId::Sha384
        );
        assert_eq!(EccCurveId::NistP384.field_size(), 48);
    }
}
