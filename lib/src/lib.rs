//! EDHOC (RFC 9528) lightweight authenticated key exchange.
//!
//! The public API is a typestate chain: each method consumes `self` and returns the next
//! state, so a caller can't accidentally call `prepare_message_2` before `process_message_1`
//! or re-send a message that's already gone out. `edhoc`'s free functions do the actual
//! transcript-hash/key-schedule/codec work; these wrapper types just thread `Crypto` and the
//! per-state data through them.
#![no_std]

pub use {edhoc_shared::Crypto as CryptoTrait, edhoc_shared::*};

mod edhoc;
pub use edhoc::*;

pub mod suites;
pub use suites::*;

pub mod credential_store;
pub use credential_store::*;

/// Picks a fresh connection identifier, encoded as a single CBOR int byte (`-24..=23`), per
/// RFC 9528 §3.3.2's recommendation to prefer short, even non-colliding identifiers.
pub fn generate_connection_identifier(crypto: &mut impl CryptoTrait) -> i8 {
    loop {
        let byte = crypto.get_random_byte();
        let value = (byte % 48) as i16 - 24;
        if value != 0 {
            return value as i8;
        }
    }
}

/// [generate_connection_identifier], but returned in its raw on-the-wire CBOR encoding
/// (what every codec in this crate actually stores and re-emits).
pub fn generate_connection_identifier_cbor(crypto: &mut impl CryptoTrait) -> u8 {
    let value = generate_connection_identifier(crypto);
    if value >= 0 {
        value as u8
    } else {
        CBOR_NEG_INT_1BYTE_START - 1 + value.unsigned_abs()
    }
}

// -- Initiator ---------------------------------------------------------------

pub struct EdhocInitiator<Crypto: CryptoTrait> {
    pub(crate) crypto: Crypto,
    pub(crate) method: u8,
    pub(crate) suite: Suite,
}

pub struct EdhocInitiatorWaitM2<Crypto: CryptoTrait> {
    crypto: Crypto,
    state: WaitM2,
}

pub struct EdhocInitiatorProcessingM2<Crypto: CryptoTrait> {
    crypto: Crypto,
    state: ProcessingM2,
}

pub struct EdhocInitiatorProcessedM2<Crypto: CryptoTrait> {
    crypto: Crypto,
    state: ProcessedM2,
}

pub struct EdhocInitiatorDone<Crypto: CryptoTrait> {
    crypto: Crypto,
    state: Completed,
}

impl<Crypto: CryptoTrait> EdhocInitiator<Crypto> {
    /// Starts an Initiator session for the given `method` (RFC 9528 Table 4) and cipher
    /// suite. A fresh instance is required per suite: the ephemeral key and `SUITES_I` this
    /// crate sends are both tied to the suite picked here.
    pub fn new(mut crypto: Crypto, method: u8, suite: Suite) -> Self {
        EdhocInitiator { crypto, method, suite }
    }

    /// `message_1` (RFC 9528 §5.2.1). `ead_1` carries any opaque external-authorization data
    /// the application wants attached.
    pub fn prepare_message_1(
        mut self,
        c_i: u8,
        ead_1: &Option<EADItem>,
    ) -> Result<(EdhocInitiatorWaitM2<Crypto>, BufferMessage1), EDHOCError> {
        let (x, g_x) = match self.suite.ecdh {
            EcdhAlg::P256 => self.crypto.p256_generate_key_pair(),
            EcdhAlg::X25519 => self.crypto.x25519_generate_key_pair(),
        };
        let start = InitiatorStart {
            method: self.method,
            x,
            g_x,
            suite: self.suite,
            c_i,
        };
        let (state, message_1) = edhoc::i_prepare_message_1(&start, &mut self.crypto, ead_1)?;
        Ok((
            EdhocInitiatorWaitM2 {
                crypto: self.crypto,
                state,
            },
            message_1,
        ))
    }
}

impl<Crypto: CryptoTrait> EdhocInitiatorWaitM2<Crypto> {
    /// Parses `message_2`, returning the Responder's claimed credential (which the caller
    /// must validate, e.g. against a trust anchor, before handing it to
    /// [EdhocInitiatorProcessingM2::verify_message_2]) and any `EAD_2` the Responder sent.
    pub fn parse_message_2(
        mut self,
        message_2: &BufferMessage2,
    ) -> Result<(EdhocInitiatorProcessingM2<Crypto>, u8, Credential, Option<EADItem>), EDHOCError> {
        let (state, c_r, id_cred_r, ead_2) = edhoc::i_parse_message_2(&self.state, &mut self.crypto, message_2)?;
        Ok((
            EdhocInitiatorProcessingM2 {
                crypto: self.crypto,
                state,
            },
            c_r,
            id_cred_r,
            ead_2,
        ))
    }
}

impl<Crypto: CryptoTrait> EdhocInitiatorProcessingM2<Crypto> {
    /// Verifies `Signature_or_MAC_2` against the now-validated Responder credential, and
    /// authenticates this Initiator for `message_3` using `i_priv` (our own static DH key or
    /// signature private key, per the negotiated method).
    pub fn verify_message_2(
        mut self,
        valid_cred_r: Credential,
        i_priv: &BytesP256ElemLen,
    ) -> Result<EdhocInitiatorProcessedM2<Crypto>, EDHOCError> {
        let state = edhoc::i_verify_message_2(&self.state, &mut self.crypto, valid_cred_r, i_priv)?;
        Ok(EdhocInitiatorProcessedM2 {
            crypto: self.crypto,
            state,
        })
    }
}

impl<Crypto: CryptoTrait> EdhocInitiatorProcessedM2<Crypto> {
    /// Builds `message_3` and completes the handshake, returning `PRK_out`.
    pub fn prepare_message_3(
        mut self,
        cred_i: Credential,
        i_priv: &BytesP256ElemLen,
        ead_3: &Option<EADItem>,
    ) -> Result<(EdhocInitiatorDone<Crypto>, BufferMessage3, BytesHashLen), EDHOCError> {
        let (state, message_3, prk_out) =
            edhoc::i_prepare_message_3(&self.state, &mut self.crypto, cred_i, i_priv, ead_3)?;
        Ok((
            EdhocInitiatorDone {
                crypto: self.crypto,
                state,
            },
            message_3,
            prk_out,
        ))
    }
}

impl<Crypto: CryptoTrait> EdhocInitiatorDone<Crypto> {
    /// The EDHOC exporter interface (§4.3/§6.5).
    pub fn edhoc_exporter(
        &mut self,
        label: u8,
        context: &BytesMaxContextBuffer,
        context_len: usize,
        length: usize,
    ) -> BytesMaxBuffer {
        edhoc::edhoc_exporter(&self.state, &mut self.crypto, label, context, context_len, length)
    }

    /// `KeyUpdate` (§4.3.1): ratchets `PRK_out` forward on caller-supplied fresh context.
    pub fn edhoc_key_update(&mut self, context: &BytesMaxContextBuffer, context_len: usize) -> BytesHashLen {
        edhoc::edhoc_key_update(&mut self.state, &mut self.crypto, context, context_len)
    }

    #[cfg(feature = "message-4")]
    pub fn prepare_message_4(
        &mut self,
        suite: &Suite,
        ead_4: &Option<EADItem>,
    ) -> Result<BufferMessage4, EDHOCError> {
        edhoc::i_prepare_message_4(&self.state, &mut self.crypto, suite, ead_4)
    }
}

// -- Responder -----------------------------------------------------------------

pub struct EdhocResponder<Crypto: CryptoTrait> {
    crypto: Crypto,
}

pub struct EdhocResponderProcessedM1<Crypto: CryptoTrait> {
    crypto: Crypto,
    state: ProcessingM1,
    ead_1: Option<EADItem>,
}

pub struct EdhocResponderWaitM3<Crypto: CryptoTrait> {
    crypto: Crypto,
    state: WaitM3,
}

pub struct EdhocResponderProcessingM3<Crypto: CryptoTrait> {
    crypto: Crypto,
    state: ProcessingM3,
}

pub struct EdhocResponderDone<Crypto: CryptoTrait> {
    crypto: Crypto,
    state: Completed,
}

impl<Crypto: CryptoTrait> EdhocResponder<Crypto> {
    pub fn new(crypto: Crypto) -> Self {
        EdhocResponder { crypto }
    }

    /// Processes `message_1`, selecting the leftmost suite in `SUITES_I` this Responder
    /// supports. Unlike a single-suite implementation, ephemeral key generation is deferred
    /// to [EdhocResponderProcessedM1::prepare_message_2] because which ECDH group to
    /// generate a key in isn't known until the suite negotiation above runs.
    pub fn process_message_1(
        mut self,
        message_1: &BufferMessage1,
    ) -> Result<EdhocResponderProcessedM1<Crypto>, EDHOCError> {
        let (state, ead_1) = edhoc::r_process_message_1(&ResponderStart, &mut self.crypto, message_1)?;
        Ok(EdhocResponderProcessedM1 {
            crypto: self.crypto,
            state,
            ead_1,
        })
    }
}

impl<Crypto: CryptoTrait> EdhocResponderProcessedM1<Crypto> {
    pub fn ead_1(&self) -> &Option<EADItem> {
        &self.ead_1
    }

    /// Builds `message_2`, authenticating this Responder with `r_priv` and the chosen
    /// connection identifier `c_r`.
    pub fn prepare_message_2(
        mut self,
        cred_r: Credential,
        r_priv: &BytesP256ElemLen,
        c_r: u8,
        ead_2: &Option<EADItem>,
    ) -> Result<(EdhocResponderWaitM3<Crypto>, BufferMessage2), EDHOCError> {
        let (state, message_2) =
            edhoc::r_prepare_message_2(&self.state, &mut self.crypto, cred_r, r_priv, c_r, ead_2)?;
        Ok((
            EdhocResponderWaitM3 {
                crypto: self.crypto,
                state,
            },
            message_2,
        ))
    }
}

impl<Crypto: CryptoTrait> EdhocResponderWaitM3<Crypto> {
    /// Parses `message_3`, returning the Initiator's claimed credential for caller-side
    /// validation and any `EAD_3`.
    pub fn parse_message_3(
        mut self,
        message_3: &BufferMessage3,
    ) -> Result<(EdhocResponderProcessingM3<Crypto>, Credential, Option<EADItem>), EDHOCError> {
        let (state, id_cred_i, ead_3) = edhoc::r_parse_message_3(&self.state, &mut self.crypto, message_3)?;
        Ok((
            EdhocResponderProcessingM3 {
                crypto: self.crypto,
                state,
            },
            id_cred_i,
            ead_3,
        ))
    }
}

impl<Crypto: CryptoTrait> EdhocResponderProcessingM3<Crypto> {
    /// Verifies `Signature_or_MAC_3` against the now-validated Initiator credential and
    /// completes the handshake, returning `PRK_out`.
    pub fn verify_message_3(
        mut self,
        valid_cred_i: Credential,
    ) -> Result<(EdhocResponderDone<Crypto>, BytesHashLen), EDHOCError> {
        let (state, prk_out) = edhoc::r_verify_message_3(&self.state, &mut self.crypto, valid_cred_i)?;
        Ok((
            EdhocResponderDone {
                crypto: self.crypto,
                state,
            },
            prk_out,
        ))
    }
}

impl<Crypto: CryptoTrait> EdhocResponderDone<Crypto> {
    pub fn edhoc_exporter(
        &mut self,
        label: u8,
        context: &BytesMaxContextBuffer,
        context_len: usize,
        length: usize,
    ) -> BytesMaxBuffer {
        edhoc::edhoc_exporter(&self.state, &mut self.crypto, label, context, context_len, length)
    }

    pub fn edhoc_key_update(&mut self, context: &BytesMaxContextBuffer, context_len: usize) -> BytesHashLen {
        edhoc::edhoc_key_update(&mut self.state, &mut self.crypto, context, context_len)
    }

    #[cfg(feature = "message-4")]
    pub fn process_message_4(
        &mut self,
        suite: &Suite,
        message_4: &BufferMessage4,
    ) -> Result<Option<EADItem>, EDHOCError> {
        edhoc::r_process_message_4(&self.state, &mut self.crypto, suite, message_4)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use edhoc_crypto::RustCryptoBackend;
    use suites::SUITE_0;

    #[test]
    fn test_connection_identifier_is_single_cbor_byte() {
        let mut crypto = RustCryptoBackend::new();
        for _ in 0..64 {
            let cbor = generate_connection_identifier_cbor(&mut crypto);
            assert!((0..=0x17).contains(&cbor) || (0x20..=0x37).contains(&cbor));
        }
    }

    #[test]
    fn test_typestate_handshake_suite_0_method_3() {
        let mut i_crypto = RustCryptoBackend::new();
        let mut r_crypto = RustCryptoBackend::new();

        let (i_sk, i_pk) = i_crypto.x25519_generate_key_pair();
        let (r_sk, r_pk) = r_crypto.x25519_generate_key_pair();
        let cred_i = Credential {
            id_kind: IdCredKind::Kid,
            cred_kind: CredKind::Ccs,
            kid: 11,
            value: EdhocMessageBuffer::new(),
            public_key: i_pk,
        };
        let cred_r = Credential {
            id_kind: IdCredKind::Kid,
            cred_kind: CredKind::Ccs,
            kid: 22,
            value: EdhocMessageBuffer::new(),
            public_key: r_pk,
        };

        let initiator = EdhocInitiator::new(RustCryptoBackend::new(), 3, SUITE_0);
        let (wait_m2, message_1) = initiator.prepare_message_1(5, &None).unwrap();

        let responder = EdhocResponder::new(RustCryptoBackend::new());
        let processed_m1 = responder.process_message_1(&message_1).unwrap();
        let (wait_m3, message_2) = processed_m1
            .prepare_message_2(cred_r.clone(), &r_sk, 6, &None)
            .unwrap();

        let (processing_m2, _c_r, _id_cred_r, _ead_2) = wait_m2.parse_message_2(&message_2).unwrap();
        let processed_m2 = processing_m2.verify_message_2(cred_r, &i_sk).unwrap();
        let (initiator_done, message_3, prk_out_i) =
            processed_m2.prepare_message_3(cred_i.clone(), &i_sk, &None).unwrap();

        let (processing_m3, _id_cred_i, _ead_3) = wait_m3.parse_message_3(&message_3).unwrap();
        let (mut responder_done, prk_out_r) = processing_m3.verify_message_3(cred_i).unwrap();

        assert_eq!(prk_out_i, prk_out_r);

        let mut context = [0u8; MAX_KDF_CONTEXT_LEN];
        context[0] = 0xAA;
        let mut initiator_done = initiator_done;
        let oscore_secret_i = initiator_done.edhoc_exporter(0, &context, 1, 16);
        let oscore_secret_r = responder_done.edhoc_exporter(0, &context, 1, 16);
        assert_eq!(oscore_secret_i[..16], oscore_secret_r[..16]);
    }
}
