//! [edhoc_shared::Crypto] backed by the RustCrypto project's crates: `p256` for P-256 ECDH
//! and ECDSA, `x25519-dalek`/`ed25519-dalek` for Curve25519, `aes`+`ccm` for AES-CCM-16-64-128,
//! `sha2`/`hkdf` for the key schedule, and `rand_core`'s OS RNG for randomness.
#![no_std]

use aes::Aes128;
use ccm::aead::{AeadInPlace, KeyInit};
use ccm::consts::{U8, U13};
use ccm::Ccm;
use ed25519_dalek::{Signer as _, Verifier as _};
use hkdf::Hkdf;
use p256::ecdsa::signature::{Signer as _, Verifier as _};
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

use edhoc_shared::{
    BytesHashLen, BytesMaxBuffer, BytesP256ElemLen, CoreError, SignAlg, AES_CCM_IV_LEN,
    AES_CCM_KEY_LEN, MAX_BUFFER_LEN, P256_ELEM_LEN, SHA256_DIGEST_LEN,
};

type AesCcm16_64_128 = Ccm<Aes128, U8, U13>;

/// The RustCrypto-backed [edhoc_shared::Crypto] implementation. Holds no state of its own;
/// randomness is drawn from the OS RNG on every call.
pub struct Crypto {
    rng: OsRng,
}

impl Crypto {
    pub fn new() -> Self {
        Crypto { rng: OsRng }
    }
}

impl Default for Crypto {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconstructs a P-256 affine point from its x-coordinate alone, using the even-parity
/// SEC1 convention (tag `0x02`). Valid for ECDH, where the result only depends on the input
/// point's x-coordinate regardless of which of the two candidate y values was chosen.
fn affine_from_x(x: &BytesP256ElemLen) -> Result<p256::AffinePoint, CoreError> {
    let mut compressed = [0u8; 1 + P256_ELEM_LEN];
    compressed[0] = 0x02;
    compressed[1..].copy_from_slice(x);
    let encoded = p256::EncodedPoint::from_bytes(compressed).map_err(|_| CoreError::WrongParameter)?;
    Option::from(p256::AffinePoint::from_encoded_point(&encoded)).ok_or(CoreError::WrongParameter)
}

impl edhoc_shared::Crypto for Crypto {
    fn sha256_digest(&mut self, message: &[u8]) -> BytesHashLen {
        let mut hasher = Sha256::new();
        hasher.update(message);
        let digest = hasher.finalize();
        let mut out = [0u8; SHA256_DIGEST_LEN];
        out.copy_from_slice(&digest);
        out
    }

    fn hkdf_extract(&mut self, salt: &BytesHashLen, ikm: &[u8]) -> BytesHashLen {
        let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), ikm);
        let mut out = [0u8; SHA256_DIGEST_LEN];
        out.copy_from_slice(&prk);
        out
    }

    fn hkdf_expand(&mut self, prk: &BytesHashLen, info: &[u8], length: usize) -> BytesMaxBuffer {
        let hkdf = Hkdf::<Sha256>::from_prk(prk).expect("PRK is always hash-length");
        let mut out = [0u8; MAX_BUFFER_LEN];
        hkdf.expand(info, &mut out[..length])
            .expect("requested length never exceeds HKDF-Expand's limit for SHA-256");
        out
    }

    fn aes_ccm_encrypt_tag_8(
        &mut self,
        key: &[u8; AES_CCM_KEY_LEN],
        iv: &[u8; AES_CCM_IV_LEN],
        ad: &[u8],
        plaintext: &[u8],
    ) -> BytesMaxBuffer {
        let cipher = AesCcm16_64_128::new(key.into());
        let mut out = [0u8; MAX_BUFFER_LEN];
        out[..plaintext.len()].copy_from_slice(plaintext);
        let tag = cipher
            .encrypt_in_place_detached(iv.into(), ad, &mut out[..plaintext.len()])
            .expect("CCM encryption of a bounded plaintext does not fail");
        out[plaintext.len()..plaintext.len() + tag.len()].copy_from_slice(&tag);
        out
    }

    fn aes_ccm_decrypt_tag_8(
        &mut self,
        key: &[u8; AES_CCM_KEY_LEN],
        iv: &[u8; AES_CCM_IV_LEN],
        ad: &[u8],
        ciphertext: &[u8],
    ) -> Result<BytesMaxBuffer, CoreError> {
        if ciphertext.len() < 8 {
            return Err(CoreError::MacAuthenticationFailed);
        }
        let (body, tag) = ciphertext.split_at(ciphertext.len() - 8);
        let cipher = AesCcm16_64_128::new(key.into());
        let mut out = [0u8; MAX_BUFFER_LEN];
        out[..body.len()].copy_from_slice(body);
        cipher
            .decrypt_in_place_detached(iv.into(), ad, &mut out[..body.len()], tag.into())
            .map_err(|_| CoreError::MacAuthenticationFailed)?;
        Ok(out)
    }

    fn p256_generate_key_pair(&mut self) -> (BytesP256ElemLen, BytesP256ElemLen) {
        let sk = p256::SecretKey::random(&mut self.rng);
        let pk = sk.public_key();
        let encoded = pk.to_encoded_point(false);
        let mut sk_bytes = [0u8; P256_ELEM_LEN];
        sk_bytes.copy_from_slice(&sk.to_bytes());
        let mut pk_bytes = [0u8; P256_ELEM_LEN];
        pk_bytes.copy_from_slice(encoded.x().expect("uncompressed point always carries x"));
        (sk_bytes, pk_bytes)
    }

    fn p256_ecdh(&mut self, private: &BytesP256ElemLen, public_x: &BytesP256ElemLen) -> BytesP256ElemLen {
        let affine = affine_from_x(public_x).expect("peer public key is a valid curve point");
        let scalar = p256::NonZeroScalar::try_from(private.as_slice())
            .expect("private scalar is never zero");
        let shared = (p256::ProjectivePoint::from(affine) * *scalar).to_affine();
        let encoded = shared.to_encoded_point(false);
        let mut out = [0u8; P256_ELEM_LEN];
        out.copy_from_slice(encoded.x().expect("uncompressed point always carries x"));
        out
    }

    fn x25519_generate_key_pair(&mut self) -> (BytesP256ElemLen, BytesP256ElemLen) {
        let sk = x25519_dalek::StaticSecret::random_from_rng(&mut self.rng);
        let pk = x25519_dalek::PublicKey::from(&sk);
        (sk.to_bytes(), pk.to_bytes())
    }

    fn x25519_ecdh(&mut self, private: &BytesP256ElemLen, public: &BytesP256ElemLen) -> BytesP256ElemLen {
        let sk = x25519_dalek::StaticSecret::from(*private);
        let pk = x25519_dalek::PublicKey::from(*public);
        sk.diffie_hellman(&pk).to_bytes()
    }

    fn sign(&mut self, alg: SignAlg, sk: &BytesP256ElemLen, message: &[u8]) -> BytesMaxBuffer {
        let mut out = [0u8; MAX_BUFFER_LEN];
        match alg {
            SignAlg::Es256 => {
                let signing_key = p256::ecdsa::SigningKey::from_bytes(sk.into())
                    .expect("private scalar is a valid ECDSA signing key");
                let signature: p256::ecdsa::Signature = signing_key.sign(message);
                out[..64].copy_from_slice(&signature.to_bytes());
            }
            SignAlg::EdDsa => {
                let signing_key = ed25519_dalek::SigningKey::from_bytes(sk);
                let signature = signing_key.sign(message);
                out[..64].copy_from_slice(&signature.to_bytes());
            }
        }
        out
    }

    fn verify(
        &mut self,
        alg: SignAlg,
        pk: &BytesP256ElemLen,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CoreError> {
        if signature.len() != 64 {
            return Err(CoreError::SignatureAuthenticationFailed);
        }
        match alg {
            SignAlg::Es256 => {
                let affine = affine_from_x(pk)?;
                let verifying_key = p256::ecdsa::VerifyingKey::from_affine(affine)
                    .map_err(|_| CoreError::SignatureAuthenticationFailed)?;
                let sig = p256::ecdsa::Signature::from_slice(signature)
                    .map_err(|_| CoreError::SignatureAuthenticationFailed)?;
                verifying_key
                    .verify(message, &sig)
                    .map_err(|_| CoreError::SignatureAuthenticationFailed)
            }
            SignAlg::EdDsa => {
                let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(pk)
                    .map_err(|_| CoreError::SignatureAuthenticationFailed)?;
                let sig_bytes: [u8; 64] = signature.try_into().unwrap();
                let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
                verifying_key
                    .verify(message, &sig)
                    .map_err(|_| CoreError::SignatureAuthenticationFailed)
            }
        }
    }

    fn get_random_byte(&mut self) -> u8 {
        (self.rng.next_u32() & 0xff) as u8
    }

    fn fill_random(&mut self, buf: &mut [u8]) {
        self.rng.fill_bytes(buf)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use edhoc_shared::Crypto as _;

    #[test]
    fn test_sha256_known_vector() {
        let mut crypto = Crypto::new();
        let digest = crypto.sha256_digest(b"abc");
        assert_eq!(
            digest,
            [
                0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d,
                0xae, 0x22, 0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10,
                0xff, 0x61, 0xf2, 0x00, 0x15, 0xad
            ]
        );
    }

    #[test]
    fn test_x25519_roundtrip() {
        let mut crypto = Crypto::new();
        let (sk_a, pk_a) = crypto.x25519_generate_key_pair();
        let (sk_b, pk_b) = crypto.x25519_generate_key_pair();
        let shared_a = crypto.x25519_ecdh(&sk_a, &pk_b);
        let shared_b = crypto.x25519_ecdh(&sk_b, &pk_a);
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn test_p256_ecdh_roundtrip() {
        let mut crypto = Crypto::new();
        let (sk_a, pk_a) = crypto.p256_generate_key_pair();
        let (sk_b, pk_b) = crypto.p256_generate_key_pair();
        let shared_a = crypto.p256_ecdh(&sk_a, &pk_b);
        let shared_b = crypto.p256_ecdh(&sk_b, &pk_a);
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn test_aes_ccm_roundtrip() {
        let mut crypto = Crypto::new();
        let key = [0x42u8; AES_CCM_KEY_LEN];
        let iv = [0x24u8; AES_CCM_IV_LEN];
        let ad = b"associated data";
        let plaintext = b"EDHOC message";
        let ct = crypto.aes_ccm_encrypt_tag_8(&key, &iv, ad, plaintext);
        let pt = crypto
            .aes_ccm_decrypt_tag_8(&key, &iv, ad, &ct[..plaintext.len() + 8])
            .unwrap();
        assert_eq!(&pt[..plaintext.len()], plaintext);
    }

    #[test]
    fn test_eddsa_sign_verify() {
        let mut crypto = Crypto::new();
        let mut sk = [0u8; 32];
        crypto.fill_random(&mut sk);
        let signing_key = ed25519_dalek::SigningKey::from_bytes(&sk);
        let pk = signing_key.verifying_key().to_bytes();
        let message = b"EDHOC_MAC_2";
        let signature = crypto.sign(SignAlg::EdDsa, &sk, message);
        crypto
            .verify(SignAlg::EdDsa, &pk, message, &signature[..64])
            .unwrap();
    }
}
