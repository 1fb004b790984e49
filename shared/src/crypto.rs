//! The narrow crypto facade EDHOC and OSCORE are built against.
//!
//! Every primitive the core needs — AEAD, hash, HMAC-based KDF, ECDH, ephemeral key
//! generation, and sign/verify — is expressed as one method on [Crypto]. Concrete backends
//! (see the `edhoc-crypto-rustcrypto` crate) implement it in terms of whatever crypto
//! library they prefer; the core never reaches for a crypto primitive directly.

use super::*;

/// The elliptic curve an ECDH or signature operation runs over.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EcdhAlg {
    P256,
    X25519,
}

/// The signature algorithm a party authenticates with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SignAlg {
    Es256,
    EdDsa,
}

/// Uniform interface over the cryptographic primitives EDHOC and OSCORE depend on.
///
/// Implementations are free to be `no_std`; `&mut self` lets stateful backends (e.g. ones
/// backed by a hardware RNG or a PSA crypto service handle) hold open resources across
/// calls.
pub trait Crypto {
    /// SHA-256 over the given input.
    fn sha256_digest(&mut self, message: &[u8]) -> BytesHashLen;

    /// `HKDF-Extract(salt, ikm)` per RFC 5869, using SHA-256.
    fn hkdf_extract(&mut self, salt: &BytesHashLen, ikm: &[u8]) -> BytesHashLen;

    /// `HKDF-Expand(prk, info, length)` per RFC 5869, using SHA-256. `length` must not
    /// exceed [MAX_BUFFER_LEN].
    fn hkdf_expand(&mut self, prk: &BytesHashLen, info: &[u8], length: usize) -> BytesMaxBuffer;

    /// AES-CCM-16-64-128 encryption: a 13-byte nonce, an 8-byte tag appended to the
    /// ciphertext.
    fn aes_ccm_encrypt_tag_8(
        &mut self,
        key: &[u8; AES_CCM_KEY_LEN],
        iv: &[u8; AES_CCM_IV_LEN],
        ad: &[u8],
        plaintext: &[u8],
    ) -> BytesMaxBuffer;

    /// AES-CCM-16-64-128 decryption/verification; fails with
    /// [CoreError::MacAuthenticationFailed] if the tag does not verify.
    fn aes_ccm_decrypt_tag_8(
        &mut self,
        key: &[u8; AES_CCM_KEY_LEN],
        iv: &[u8; AES_CCM_IV_LEN],
        ad: &[u8],
        ciphertext: &[u8],
    ) -> Result<BytesMaxBuffer, CoreError>;

    /// Generates a fresh ephemeral P-256 key pair, returning `(private, public.x)`.
    fn p256_generate_key_pair(&mut self) -> (BytesP256ElemLen, BytesP256ElemLen);

    /// ECDH on P-256: computes the x-coordinate of `private * public`.
    fn p256_ecdh(&mut self, private: &BytesP256ElemLen, public_x: &BytesP256ElemLen) -> BytesP256ElemLen;

    /// Generates a fresh ephemeral X25519 key pair, returning `(private, public)`.
    fn x25519_generate_key_pair(&mut self) -> (BytesP256ElemLen, BytesP256ElemLen);

    /// X25519 Diffie-Hellman.
    fn x25519_ecdh(&mut self, private: &BytesP256ElemLen, public: &BytesP256ElemLen) -> BytesP256ElemLen;

    /// ECDSA-with-P256 (ES256) or EdDSA (Ed25519) signature generation, selected by `alg`.
    /// `sk` is the 32-byte private scalar (or Ed25519 seed) in both cases.
    fn sign(&mut self, alg: SignAlg, sk: &BytesP256ElemLen, message: &[u8]) -> BytesMaxBuffer;

    /// Signature verification counterpart to [Crypto::sign]. `pk` is the subject public key
    /// as carried by [crate::cred::Credential]: the raw Ed25519 encoded point for
    /// [SignAlg::EdDsa], or the P-256 x-coordinate for [SignAlg::Es256] (the matching point
    /// is recovered using the even-parity SEC1 convention, consistent with how
    /// ECDH-derived x-only keys are handled elsewhere in this crate).
    fn verify(
        &mut self,
        alg: SignAlg,
        pk: &BytesP256ElemLen,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CoreError>;

    /// A single random byte, used to pick connection identifiers.
    fn get_random_byte(&mut self) -> u8;

    /// Fills `buf` with random bytes (ephemeral keys, ECHO challenge values, ...).
    fn fill_random(&mut self, buf: &mut [u8]);
}
