//! Cipher-suite registry (RFC 9528 §3.6, Table 6 rows 0 and 2 — the two
//! mandatory-to-implement suites this workspace supports).

use edhoc_shared::*;

/// One self-consistent row of algorithm choices, selected once at handshake
/// start and held fixed for the life of that handshake.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Suite {
    pub label: u8,
    pub ecdh: EcdhAlg,
    pub sign: SignAlg,
    /// Length in bytes of an ECDH public key / private scalar (32 for both
    /// P-256's x-coordinate and X25519/Ed25519's native encoding).
    pub ecdh_pk_len: usize,
    /// AEAD key length, in bytes (16 for AES-CCM-16-64-128).
    pub aead_key_len: usize,
    /// AEAD nonce/IV length, in bytes (13 for AES-CCM-16-64-128).
    pub aead_iv_len: usize,
    /// AEAD tag length, in bytes (8 for AES-CCM-16-64-128).
    pub aead_tag_len: usize,
    /// Hash output length, in bytes (32 for SHA-256).
    pub hash_len: usize,
    /// MAC length used when the signer authenticates with static DH
    /// instead of a signature (8 for every MTI suite).
    pub static_dh_mac_len: usize,
    /// Signature length, in bytes (64 for both ES256 and EdDSA).
    pub signature_len: usize,
}

/// Suite 0: X25519 + EdDSA + AES-CCM-16-64-128 + SHA-256.
pub const SUITE_0: Suite = Suite {
    label: 0,
    ecdh: EcdhAlg::X25519,
    sign: SignAlg::EdDsa,
    ecdh_pk_len: X25519_ELEM_LEN,
    aead_key_len: AES_CCM_KEY_LEN,
    aead_iv_len: AES_CCM_IV_LEN,
    aead_tag_len: AES_CCM_TAG_LEN,
    hash_len: SHA256_DIGEST_LEN,
    static_dh_mac_len: MAC_LENGTH_STATIC_DH,
    signature_len: ED25519_SIGNATURE_LEN,
};

/// Suite 2: P-256 + ES256 + AES-CCM-16-64-128 + SHA-256.
pub const SUITE_2: Suite = Suite {
    label: 2,
    ecdh: EcdhAlg::P256,
    sign: SignAlg::Es256,
    ecdh_pk_len: P256_ELEM_LEN,
    aead_key_len: AES_CCM_KEY_LEN,
    aead_iv_len: AES_CCM_IV_LEN,
    aead_tag_len: AES_CCM_TAG_LEN,
    hash_len: SHA256_DIGEST_LEN,
    static_dh_mac_len: MAC_LENGTH_STATIC_DH,
    signature_len: P256_SIGNATURE_LEN,
};

/// Resolves a suite label to its row, failing for anything beyond the two
/// suites this workspace implements (RFC 9528/8613 MTI only, per the
/// non-goal on "arbitrary COSE algorithms").
pub fn get_suite(label: u8) -> Result<Suite, CoreError> {
    match label {
        0 => Ok(SUITE_0),
        2 => Ok(SUITE_2),
        _ => Err(CoreError::UnsupportedCipherSuite),
    }
}

/// Picks the suite the Responder will use: the last entry of `suites_i`
/// (RFC 9528 §3.6/§5.2.1). `suites_i` is given in on-the-wire order (the
/// Initiator's full proposal, not just the selected tail); only the tail
/// entry is ever a candidate, so an unsupported last entry aborts the
/// handshake rather than silently falling back to an earlier, supported one.
pub fn select_responder_suite(suites_i: &[u8]) -> Result<Suite, CoreError> {
    let candidate = *suites_i.last().ok_or(CoreError::UnsupportedCipherSuite)?;
    get_suite(candidate)
}
