//! Picks a concrete [Crypto] backend for the `edhoc` and `oscore` crates.
//!
//! This mirrors the split between the protocol logic and its crypto backend that `lakers`
//! uses: the core crates are written against the [CryptoTrait] interface only, and a small
//! facade crate like this one is responsible for wiring in a concrete implementation. Only
//! one backend (`edhoc-crypto-rustcrypto`, built on the RustCrypto project's crates) ships
//! today; a PSA or hardware-accelerated backend would plug in here the same way.
#![no_std]

pub use edhoc_shared::Crypto as CryptoTrait;

#[cfg(feature = "rustcrypto")]
pub use edhoc_crypto_rustcrypto::Crypto as RustCryptoBackend;

#[cfg(feature = "rustcrypto")]
pub fn default_crypto() -> RustCryptoBackend {
    RustCryptoBackend::new()
}
