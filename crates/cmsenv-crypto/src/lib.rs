#![forbid(unsafe_code)]
#![doc = "Crypto-primitive boundary for cmsenv."]

// Core trait
pub mod provider;

#[cfg(feature = "default-provider")]
pub mod default;

pub use provider::CryptoProvider;

#[cfg(feature = "default-provider")]
pub use default::DefaultProvider;
