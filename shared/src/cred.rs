//! Credential identifiers and credential values (RFC 9528 §3.5.3, §6.2).
//!
//! `ID_CRED_x` is a CBOR map carrying at most one of `kid`, `x5bag`, `x5chain`, `x5t`,
//! `x5u`, `c5b`, `c5c`, `c5t`, `c5u`. `CRED_x` is the bytes of the credential itself (a CCS,
//! an X.509 certificate/chain, or a C.509 certificate). [Credential] represents either form
//! once it has been resolved to a concrete public key; before resolution, a bare `kid`
//! reference is represented with an empty `value`.

use super::*;

/// The CBOR map key used for each `ID_CRED_x` identifier kind (COSE header parameters,
/// RFC 9528 §3.5.3 / RFC 9360).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum IdCredKind {
    Kid = 4,
    X5Bag = 32,
    X5Chain = 33,
    X5T = 34,
    X5U = 35,
    C5B = 52,
    C5C = 53,
    C5T = 54,
    C5U = 55,
}

impl IdCredKind {
    pub fn from_map_key(key: u8) -> Option<Self> {
        Some(match key {
            4 => Self::Kid,
            32 => Self::X5Bag,
            33 => Self::X5Chain,
            34 => Self::X5T,
            35 => Self::X5U,
            52 => Self::C5B,
            53 => Self::C5C,
            54 => Self::C5T,
            55 => Self::C5U,
            _ => return None,
        })
    }

    /// Whether this identifier kind carries the credential's bytes directly (`x5chain`,
    /// `c5c`, and their bag variants), as opposed to a hash/thumbprint or a bare reference.
    pub fn carries_value(&self) -> bool {
        matches!(self, Self::X5Chain | Self::X5Bag | Self::C5C | Self::C5B)
    }
}

/// The encoding of the credential bytes (`CRED_x`) pointed to by an `ID_CRED_x`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CredKind {
    /// A CBOR Claims Set (RFC 9528 Appendix B), the raw-public-key case.
    Ccs,
    /// An X.509 certificate or certificate chain (DER-encoded).
    X509,
    /// A C.509 certificate (CBOR-encoded, draft-ietf-cose-cbor-encoded-cert).
    C509,
}

/// A resolved credential: the public key material of one EDHOC party, plus enough of its
/// `ID_CRED_x`/`CRED_x` to reproduce the compact encodings used on the wire.
///
/// `value` is empty when this instance represents an unresolved `kid` reference (i.e. the
/// credential still needs to be looked up by the caller); [Credential::reference_only]
/// reports that case.
#[derive(Clone, Copy, Debug)]
pub struct Credential {
    pub id_kind: IdCredKind,
    pub cred_kind: CredKind,
    /// The compact `kid` value, meaningful when `id_kind == Kid`.
    pub kid: u8,
    /// The raw `CRED_x` bytes, or empty if this is a bare reference.
    pub value: EdhocMessageBuffer,
    /// The subject's public key (ECDH static-DH key or signature verification key,
    /// depending on how this credential ends up being used), always 32 bytes: an X25519 or
    /// Ed25519 key verbatim, or a P-256 key's x-coordinate.
    pub public_key: BytesP256ElemLen,
}

impl Credential {
    /// Builds a credential from a raw-public-key CCS, extracting `kid` (COSE_Key label 2)
    /// and the subject public key (COSE_Key label -2) from the nested `COSE_Key` at CWT
    /// claim 8 ("cnf") -> 1 ("COSE_Key").
    ///
    /// This only handles the fixed CCS shape RFC 9528 Appendix B uses for its test vectors:
    /// `{2: subject, 8: {1: {1: kty, 2: kid, -1: crv, -2: x [, -3: y]}}}`.
    pub fn parse_ccs(cred_bytes: &[u8]) -> Result<Self, CoreError> {
        let mut value = EdhocMessageBuffer::new();
        value
            .fill_with_slice(cred_bytes)
            .map_err(|_| CoreError::CborDecodingError)?;

        let mut decoder = CBORDecoder::new(cred_bytes);
        let top_len = decoder.map()?;
        let mut kid = None;
        let mut public_key = [0u8; P256_ELEM_LEN];
        let mut found_key = false;

        for _ in 0..top_len {
            let key = decoder.int_raw()?;
            match key {
                2 => {
                    // subject name (tstr); skip over it
                    decoder.str()?;
                }
                8 => {
                    let cnf_len = decoder.map()?;
                    for _ in 0..cnf_len {
                        let cnf_key = decoder.int_raw()?;
                        if cnf_key == 1 {
                            let cose_key_len = decoder.map()?;
                            for _ in 0..cose_key_len {
                                let label = decoder.i8().map_err(|_| CoreError::CborDecodingError)?;
                                match label {
                                    1 => {
                                        decoder.u8()?;
                                    }
                                    2 => {
                                        kid = Some(decoder.int_raw()?);
                                    }
                                    -1 => {
                                        decoder.u8()?;
                                    }
                                    -2 => {
                                        let x = decoder.bytes()?;
                                        let len = x.len().min(P256_ELEM_LEN);
                                        public_key[..len].copy_from_slice(&x[..len]);
                                        found_key = true;
                                    }
                                    -3 => {
                                        // EC2 y-coordinate: unused (we carry only x, as does
                                        // the rest of this implementation).
                                        decoder.bytes()?;
                                    }
                                    _ => return Err(CoreError::CborDecodingError),
                                }
                            }
                        } else {
                            return Err(CoreError::CborDecodingError);
                        }
                    }
                }
                _ => return Err(CoreError::CborDecodingError),
            }
        }

        if !found_key {
            return Err(CoreError::CborDecodingError);
        }

        Ok(Credential {
            id_kind: IdCredKind::Kid,
            cred_kind: CredKind::Ccs,
            kid: kid.unwrap_or(0),
            value,
            public_key,
        })
    }

    /// Builds an unresolved reference: the peer sent only a `kid`, and the application must
    /// look up the matching credential out of band.
    pub fn new_reference(kid: u8) -> Self {
        Credential {
            id_kind: IdCredKind::Kid,
            cred_kind: CredKind::Ccs,
            kid,
            value: EdhocMessageBuffer::new(),
            public_key: [0u8; P256_ELEM_LEN],
        }
    }

    /// True if this credential carries no resolved `CRED_x` bytes yet (a bare `kid`
    /// reference that the caller must resolve via [crate::credential_check_or_fetch]-style
    /// logic, here left to the `edhoc` crate's credential store).
    pub fn reference_only(&self) -> bool {
        self.value.len == 0
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        if self.reference_only() || other.reference_only() {
            self.kid == other.kid
        } else {
            self.value == other.value
        }
    }
}
