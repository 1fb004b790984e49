//! The EDHOC state machine's actual cryptographic work (RFC 9528 §4-§5):
//! transcript hashing, the key schedule, Signature_or_MAC, and the four
//! message codecs. `lib.rs`'s typestate structs are thin wrappers around the
//! functions here, the same split `lakers`'s `lib.rs`/`edhoc` module pair
//! uses.

use crate::suites::Suite;
use edhoc_shared::*;
pub use edhoc_shared::Crypto as CryptoTrait;
use log::trace;

/// This workspace's EDHOC error type is the shared, protocol-spanning
/// [CoreError] verbatim: every EDHOC failure mode in RFC 9528 is already a
/// variant there, so a wrapping newtype would only cost call sites a
/// `.into()`.
pub type EDHOCError = CoreError;

// -- Initiator states --------------------------------------------------

#[derive(Debug)]
pub struct InitiatorStart {
    pub method: u8,
    pub x: BytesP256ElemLen,
    pub g_x: BytesP256ElemLen,
    pub suite: Suite,
    pub c_i: u8,
}

#[derive(Debug)]
pub struct WaitM2 {
    pub method: u8,
    pub x: BytesP256ElemLen,
    pub suite: Suite,
    pub c_i: u8,
    pub h_message_1: BytesHashLen,
}

#[derive(Debug)]
pub struct ProcessingM2 {
    pub method: u8,
    pub suite: Suite,
    pub x: BytesP256ElemLen,
    pub c_i: u8,
    pub c_r: u8,
    pub g_y: BytesP256ElemLen,
    pub th_2: BytesHashLen,
    pub prk_2e: BytesHashLen,
    pub id_cred_r: Credential,
    pub sig_or_mac_2: EdhocMessageBuffer,
    pub ead_2: Option<EADItem>,
}

#[derive(Debug)]
pub struct ProcessedM2 {
    pub method: u8,
    pub suite: Suite,
    pub c_i: u8,
    pub c_r: u8,
    pub prk_3e2m: BytesHashLen,
    pub prk_4e3m: BytesHashLen,
    pub th_3: BytesHashLen,
}

#[derive(Debug)]
pub struct Completed {
    pub prk_out: BytesHashLen,
    /// `TH_4` and `PRK_4e3m`, kept around only to support the optional message_4 (RFC 9528
    /// §4.6.2): it's the last point both parties have had TH_4 before exporter-derived
    /// traffic keys take over.
    th_4: BytesHashLen,
    prk_4e3m: BytesHashLen,
}

// -- Responder states ----------------------------------------------------

#[derive(Debug)]
pub struct ResponderStart;

#[derive(Debug)]
pub struct ProcessingM1 {
    pub method: u8,
    pub suite: Suite,
    pub g_x: BytesP256ElemLen,
    pub c_i: u8,
    pub h_message_1: BytesHashLen,
    pub ead_1: Option<EADItem>,
}

#[derive(Debug)]
pub struct WaitM3 {
    pub method: u8,
    pub suite: Suite,
    pub c_i: u8,
    pub c_r: u8,
    pub prk_3e2m: BytesHashLen,
    pub th_3: BytesHashLen,
    pub g_x: BytesP256ElemLen,
    pub y: BytesP256ElemLen,
}

#[derive(Debug)]
pub struct ProcessingM3 {
    pub method: u8,
    pub suite: Suite,
    pub prk_3e2m: BytesHashLen,
    pub th_3: BytesHashLen,
    pub g_x: BytesP256ElemLen,
    pub y: BytesP256ElemLen,
    pub id_cred_i: Credential,
    pub sig_or_mac_3: EdhocMessageBuffer,
    pub ead_3: Option<EADItem>,
}

/// Whether the given EDHOC method authenticates the Initiator/Responder
/// with a static DH key (`true`) or a signature key (`false`), per RFC 9528
/// Table 4: method 0 both sign, 1 Initiator static-DH, 2 Responder
/// static-DH, 3 both static-DH.
fn initiator_uses_static_dh(method: u8) -> bool {
    method == 1 || method == 3
}

fn responder_uses_static_dh(method: u8) -> bool {
    method == 2 || method == 3
}

fn hash_len_slice(buf: &BytesMaxBuffer, hash_len: usize) -> BytesHashLen {
    let mut out = [0u8; SHA256_DIGEST_LEN];
    out[..hash_len].copy_from_slice(&buf[..hash_len]);
    out
}

fn edhoc_kdf<Crypto: CryptoTrait>(
    crypto: &mut Crypto,
    prk: &BytesHashLen,
    label: u8,
    context: &[u8],
    length: usize,
) -> BytesMaxBuffer {
    let (info, info_len) = encode_info(label, context, length);
    crypto.hkdf_expand(prk, &info[..info_len], length)
}

/// `TH_2 = H( bstr(H(message_1)), bstr(G_Y), encode(C_R) )`.
///
/// `C_R` travels as a cleartext field of message_2 (see [parse_message_2]), so the Initiator
/// has it before decrypting CIPHERTEXT_2 and can compute TH_2 up front, same as the
/// Responder. `encode(C_R)` is the raw single-byte CBOR int, matching how `C_I` is encoded
/// onto message_1.
fn compute_th_2<Crypto: CryptoTrait>(
    crypto: &mut Crypto,
    h_message_1: &BytesHashLen,
    g_y: &[u8],
    c_r: u8,
) -> Result<BytesHashLen, EDHOCError> {
    let mut buf = EdhocMessageBuffer::new();
    push_bstr(&mut buf, h_message_1)?;
    push_bstr(&mut buf, g_y)?;
    buf.push(c_r).map_err(|_| CoreError::CborEncodingError)?;
    Ok(crypto.sha256_digest(buf.as_slice()))
}

fn compute_th_3_or_4<Crypto: CryptoTrait>(
    crypto: &mut Crypto,
    th_prev: &BytesHashLen,
    plaintext: &[u8],
    cred: &[u8],
) -> BytesHashLen {
    let mut buf = EdhocMessageBuffer::new();
    // these buffers are bounded by MAX_MESSAGE_SIZE_LEN; a plaintext plus a credential
    // chain that would overflow it is already rejected earlier during parsing.
    push_bstr(&mut buf, th_prev).ok();
    buf.extend_from_slice(plaintext).ok();
    buf.extend_from_slice(cred).ok();
    crypto.sha256_digest(buf.as_slice())
}

fn compute_prk_2e<Crypto: CryptoTrait>(
    crypto: &mut Crypto,
    th_2: &BytesHashLen,
    g_xy: &BytesP256ElemLen,
) -> BytesHashLen {
    crypto.hkdf_extract(th_2, g_xy)
}

/// `PRK_3e2m` per §4.3: identity if the Responder signs, else re-keyed on the
/// Responder's static-DH shared secret `G_RX`.
fn compute_prk_3e2m<Crypto: CryptoTrait>(
    crypto: &mut Crypto,
    suite: &Suite,
    prk_2e: &BytesHashLen,
    th_2: &BytesHashLen,
    method: u8,
    g_rx: Option<&BytesP256ElemLen>,
) -> Result<BytesHashLen, EDHOCError> {
    if !responder_uses_static_dh(method) {
        return Ok(*prk_2e);
    }
    let g_rx = g_rx.ok_or(CoreError::WrongParameter)?;
    let salt = edhoc_kdf(crypto, prk_2e, KdfLabel::Salt3e2m as u8, th_2, suite.hash_len);
    let salt = hash_len_slice(&salt, suite.hash_len);
    Ok(crypto.hkdf_extract(&salt, g_rx))
}

/// `PRK_4e3m` per §4.3: identity if the Initiator signs, else re-keyed on the
/// Initiator's static-DH shared secret `G_IY`.
fn compute_prk_4e3m<Crypto: CryptoTrait>(
    crypto: &mut Crypto,
    suite: &Suite,
    prk_3e2m: &BytesHashLen,
    th_3: &BytesHashLen,
    method: u8,
    g_iy: Option<&BytesP256ElemLen>,
) -> Result<BytesHashLen, EDHOCError> {
    if !initiator_uses_static_dh(method) {
        return Ok(*prk_3e2m);
    }
    let g_iy = g_iy.ok_or(CoreError::WrongParameter)?;
    let salt = edhoc_kdf(crypto, prk_3e2m, KdfLabel::Salt4e3m as u8, th_3, suite.hash_len);
    let salt = hash_len_slice(&salt, suite.hash_len);
    Ok(crypto.hkdf_extract(&salt, g_iy))
}

/// Computes `MAC_i` per §4.5: `EDHOC-KDF(prk, label, ID_CRED || bstr(TH) || CRED || ?EAD, length)`.
fn compute_mac<Crypto: CryptoTrait>(
    crypto: &mut Crypto,
    prk: &BytesHashLen,
    label: u8,
    id_cred_compact: &[u8],
    th: &BytesHashLen,
    cred: &[u8],
    ead: Option<&[u8]>,
    length: usize,
) -> Result<BytesMaxBuffer, EDHOCError> {
    let mut context = EdhocMessageBuffer::new();
    context
        .extend_from_slice(id_cred_compact)
        .map_err(|_| CoreError::CborEncodingError)?;
    push_bstr(&mut context, th)?;
    context
        .extend_from_slice(cred)
        .map_err(|_| CoreError::CborEncodingError)?;
    if let Some(ead) = ead {
        context
            .extend_from_slice(ead)
            .map_err(|_| CoreError::CborEncodingError)?;
    }
    Ok(edhoc_kdf(crypto, prk, label, context.as_slice(), length))
}

/// Generates `Signature_or_MAC_i`: the raw MAC bytes when `static_dh` is true, or a
/// signature over the `Sig_structure` the MAC feeds into otherwise.
#[allow(clippy::too_many_arguments)]
fn signature_or_mac_generate<Crypto: CryptoTrait>(
    crypto: &mut Crypto,
    suite: &Suite,
    static_dh: bool,
    mac_prk: &BytesHashLen,
    mac_label: u8,
    id_cred_compact: &[u8],
    th: &BytesHashLen,
    cred: &[u8],
    ead: Option<&[u8]>,
    sk: &BytesP256ElemLen,
) -> Result<EdhocMessageBuffer, EDHOCError> {
    let mac_len = if static_dh { suite.static_dh_mac_len } else { suite.hash_len };
    let mac = compute_mac(crypto, mac_prk, mac_label, id_cred_compact, th, cred, ead, mac_len)?;

    let mut out = EdhocMessageBuffer::new();
    if static_dh {
        out.extend_from_slice(&mac[..mac_len])
            .map_err(|_| CoreError::CborEncodingError)?;
    } else {
        let sig_structure = encode_sig_structure(id_cred_compact, th, cred, ead, &mac[..mac_len])?;
        let signature = crypto.sign(suite.sign, sk, sig_structure.as_slice());
        out.extend_from_slice(&signature[..suite.signature_len])
            .map_err(|_| CoreError::CborEncodingError)?;
    }
    Ok(out)
}

/// Verifies `Signature_or_MAC_i` against the peer's public key (for signature auth) or by
/// recomputing and comparing the MAC (for static-DH auth).
#[allow(clippy::too_many_arguments)]
fn signature_or_mac_verify<Crypto: CryptoTrait>(
    crypto: &mut Crypto,
    suite: &Suite,
    static_dh: bool,
    mac_prk: &BytesHashLen,
    mac_label: u8,
    id_cred_compact: &[u8],
    th: &BytesHashLen,
    cred: &[u8],
    ead: Option<&[u8]>,
    pk: &BytesP256ElemLen,
    received: &[u8],
) -> Result<(), EDHOCError> {
    let mac_len = if static_dh { suite.static_dh_mac_len } else { suite.hash_len };
    let mac = compute_mac(crypto, mac_prk, mac_label, id_cred_compact, th, cred, ead, mac_len)?;

    if static_dh {
        if received.len() == mac_len && received == &mac[..mac_len] {
            Ok(())
        } else {
            Err(CoreError::MacAuthenticationFailed)
        }
    } else {
        let sig_structure = encode_sig_structure(id_cred_compact, th, cred, ead, &mac[..mac_len])?;
        crypto.verify(suite.sign, pk, sig_structure.as_slice(), received)
    }
}

/// Encodes an `ID_CRED_x` in compact form: a bare `kid` int, or a one-entry map carrying
/// the credential's bytes (§4.4).
fn encode_id_cred_compact(out: &mut EdhocMessageBuffer, cred: &Credential) -> Result<(), CoreError> {
    if cred.id_kind.carries_value() {
        push_map_header(out, 1)?;
        push_uint(out, cred.id_kind as u8)?;
        push_bstr(out, cred.value.as_slice())?;
    } else {
        push_int(out, cred.kid as i8)?;
    }
    Ok(())
}

fn encode_ead(out: &mut EdhocMessageBuffer, ead: &EADItem) -> Result<(), CoreError> {
    let label = if ead.is_critical { -(ead.label as i16) } else { ead.label as i16 };
    push_int(out, label as i8)?;
    if let Some(value) = &ead.value {
        out.extend_from_slice(value.as_slice())
            .map_err(|_| CoreError::CborEncodingError)?;
    }
    Ok(())
}

// -- Initiator driver ------------------------------------------------------

pub fn i_prepare_message_1<Crypto: CryptoTrait>(
    state: &InitiatorStart,
    crypto: &mut Crypto,
    ead_1: &Option<EADItem>,
) -> Result<(WaitM2, BufferMessage1), EDHOCError> {
    let mut message_1 = EdhocMessageBuffer::new();
    push_int(&mut message_1, state.method as i8)?;
    message_1
        .push(state.suite.label)
        .map_err(|_| CoreError::CborEncodingError)?;
    push_bstr(&mut message_1, &state.g_x[..state.suite.ecdh_pk_len])?;
    message_1
        .push(state.c_i)
        .map_err(|_| CoreError::CborEncodingError)?;
    if let Some(ead) = ead_1 {
        encode_ead(&mut message_1, ead)?;
    }

    trace!("prepared message_1, {} bytes", message_1.len);

    let h_message_1 = crypto.sha256_digest(message_1.as_slice());
    Ok((
        WaitM2 {
            method: state.method,
            x: state.x,
            suite: state.suite,
            c_i: state.c_i,
            h_message_1,
        },
        message_1,
    ))
}

pub fn i_parse_message_2<Crypto: CryptoTrait>(
    state: &WaitM2,
    crypto: &mut Crypto,
    message_2: &BufferMessage2,
) -> Result<(ProcessingM2, u8, Credential, Option<EADItem>), EDHOCError> {
    let (g_y, ciphertext_2, c_r) = parse_message_2(message_2)?;

    let g_xy = match state.suite.ecdh {
        EcdhAlg::P256 => crypto.p256_ecdh(&state.x, &g_y),
        EcdhAlg::X25519 => crypto.x25519_ecdh(&state.x, &g_y),
    };

    let th_2 = compute_th_2(crypto, &state.h_message_1, &g_y[..state.suite.ecdh_pk_len], c_r)?;
    let prk_2e = compute_prk_2e(crypto, &th_2, &g_xy);

    let keystream_2 = edhoc_kdf(crypto, &prk_2e, KdfLabel::KeyStream2 as u8, &th_2, ciphertext_2.len);
    let mut plaintext_2 = EdhocMessageBuffer::new();
    for i in 0..ciphertext_2.len {
        plaintext_2
            .push(ciphertext_2.content[i] ^ keystream_2[i])
            .map_err(|_| CoreError::CborEncodingError)?;
    }

    let (id_cred_r, sig_or_mac_2, ead_2) = decode_plaintext_2(&plaintext_2)?;
    let id_cred_r = match id_cred_r {
        IdCred::CompactKid(kid) => Credential::new_reference(kid),
        IdCred::FullCredential(bytes) => Credential::parse_ccs(bytes)?,
    };

    trace!("parsed message_2, selecting responder credential kid={}", id_cred_r.kid);

    Ok((
        ProcessingM2 {
            method: state.method,
            suite: state.suite,
            x: state.x,
            c_i: state.c_i,
            c_r,
            g_y,
            th_2,
            prk_2e,
            id_cred_r: id_cred_r.clone(),
            sig_or_mac_2,
            ead_2: ead_2.clone(),
        },
        c_r,
        id_cred_r,
        ead_2,
    ))
}

pub fn i_verify_message_2<Crypto: CryptoTrait>(
    state: &ProcessingM2,
    crypto: &mut Crypto,
    valid_cred_r: Credential,
    i_priv: &BytesP256ElemLen,
) -> Result<ProcessedM2, EDHOCError> {
    let g_rx = if responder_uses_static_dh(state.method) {
        Some(match state.suite.ecdh {
            EcdhAlg::P256 => crypto.p256_ecdh(&state.x, &valid_cred_r.public_key),
            EcdhAlg::X25519 => crypto.x25519_ecdh(&state.x, &valid_cred_r.public_key),
        })
    } else {
        None
    };
    let prk_3e2m = compute_prk_3e2m(
        crypto,
        &state.suite,
        &state.prk_2e,
        &state.th_2,
        state.method,
        g_rx.as_ref(),
    )?;

    let mut id_cred_compact = EdhocMessageBuffer::new();
    encode_id_cred_compact(&mut id_cred_compact, &valid_cred_r)?;

    signature_or_mac_verify(
        crypto,
        &state.suite,
        responder_uses_static_dh(state.method),
        &prk_3e2m,
        KdfLabel::Mac2 as u8,
        id_cred_compact.as_slice(),
        &state.th_2,
        valid_cred_r.value.as_slice(),
        state.ead_2.as_ref().and_then(|e| e.value.as_ref()).map(|v| v.as_slice()),
        &valid_cred_r.public_key,
        state.sig_or_mac_2.as_slice(),
    )?;

    // rebuild PLAINTEXT_2 to compute TH_3 (RFC 9528 §4.2: TH_3 is over the raw
    // PLAINTEXT_2 bytes, not CIPHERTEXT_2).
    let mut plaintext_2 = EdhocMessageBuffer::new();
    plaintext_2
        .push(state.c_r)
        .map_err(|_| CoreError::CborEncodingError)?;
    encode_id_cred_compact(&mut plaintext_2, &valid_cred_r)?;
    push_bstr(&mut plaintext_2, state.sig_or_mac_2.as_slice())?;

    let th_3 = compute_th_3_or_4(crypto, &state.th_2, plaintext_2.as_slice(), valid_cred_r.value.as_slice());

    let g_iy = if initiator_uses_static_dh(state.method) {
        Some(match state.suite.ecdh {
            EcdhAlg::P256 => crypto.p256_ecdh(i_priv, &state.g_y),
            EcdhAlg::X25519 => crypto.x25519_ecdh(i_priv, &state.g_y),
        })
    } else {
        None
    };
    let prk_4e3m = compute_prk_4e3m(crypto, &state.suite, &prk_3e2m, &th_3, state.method, g_iy.as_ref())?;

    Ok(ProcessedM2 {
        method: state.method,
        suite: state.suite,
        c_i: state.c_i,
        c_r: state.c_r,
        prk_3e2m,
        prk_4e3m,
        th_3,
    })
}

pub fn i_prepare_message_3<Crypto: CryptoTrait>(
    state: &ProcessedM2,
    crypto: &mut Crypto,
    cred_i: Credential,
    i_priv: &BytesP256ElemLen,
    ead_3: &Option<EADItem>,
) -> Result<(Completed, BufferMessage3, BytesHashLen), EDHOCError> {
    let mut id_cred_compact = EdhocMessageBuffer::new();
    encode_id_cred_compact(&mut id_cred_compact, &cred_i)?;

    let ead_3_bytes = ead_3.as_ref().map(|e| {
        let mut b = EdhocMessageBuffer::new();
        encode_ead(&mut b, e).ok();
        b
    });

    let sig_or_mac_3 = signature_or_mac_generate(
        crypto,
        &state.suite,
        initiator_uses_static_dh(state.method),
        &state.prk_4e3m,
        KdfLabel::Mac3 as u8,
        id_cred_compact.as_slice(),
        &state.th_3,
        cred_i.value.as_slice(),
        ead_3_bytes.as_ref().map(|b| b.as_slice()),
        i_priv,
    )?;

    let mut plaintext_3 = EdhocMessageBuffer::new();
    plaintext_3
        .extend_from_slice(id_cred_compact.as_slice())
        .map_err(|_| CoreError::CborEncodingError)?;
    push_bstr(&mut plaintext_3, sig_or_mac_3.as_slice())?;
    if let Some(b) = &ead_3_bytes {
        plaintext_3
            .extend_from_slice(b.as_slice())
            .map_err(|_| CoreError::CborEncodingError)?;
    }

    let key = edhoc_kdf(crypto, &state.prk_3e2m, KdfLabel::K3 as u8, &state.th_3, state.suite.aead_key_len);
    let iv = edhoc_kdf(crypto, &state.prk_3e2m, KdfLabel::Iv3 as u8, &state.th_3, state.suite.aead_iv_len);
    let aad = encode_enc_structure(&state.th_3)?;

    let mut key_arr = [0u8; AES_CCM_KEY_LEN];
    key_arr.copy_from_slice(&key[..AES_CCM_KEY_LEN]);
    let mut iv_arr = [0u8; AES_CCM_IV_LEN];
    iv_arr.copy_from_slice(&iv[..AES_CCM_IV_LEN]);

    let ciphertext = crypto.aes_ccm_encrypt_tag_8(&key_arr, &iv_arr, aad.as_slice(), plaintext_3.as_slice());
    let ct_len = plaintext_3.len + state.suite.aead_tag_len;

    let mut message_3 = EdhocMessageBuffer::new();
    push_bstr(&mut message_3, &ciphertext[..ct_len])?;

    let th_4 = compute_th_3_or_4(crypto, &state.th_3, plaintext_3.as_slice(), cred_i.value.as_slice());
    let prk_out_full = edhoc_kdf(crypto, &state.prk_4e3m, KdfLabel::PrkOut as u8, &th_4, state.suite.hash_len);
    let prk_out = hash_len_slice(&prk_out_full, state.suite.hash_len);

    trace!("prepared message_3, {} bytes", message_3.len);

    Ok((
        Completed {
            prk_out,
            th_4,
            prk_4e3m: state.prk_4e3m,
        },
        message_3,
        prk_out,
    ))
}

// -- Responder driver ------------------------------------------------------

pub fn r_process_message_1<Crypto: CryptoTrait>(
    _state: &ResponderStart,
    crypto: &mut Crypto,
    message_1: &BufferMessage1,
) -> Result<(ProcessingM1, Option<EADItem>), EDHOCError> {
    let (method, suites_i, suites_i_len, g_x, c_i, ead_1) = parse_message_1(message_1)?;
    if suites_i_len == 0 {
        return Err(CoreError::SuitesIListEmpty);
    }
    let suite = crate::suites::select_responder_suite(&suites_i[..suites_i_len])?;
    let h_message_1 = crypto.sha256_digest(message_1.as_slice());

    trace!("processed message_1, selected suite {}", suite.label);

    Ok((
        ProcessingM1 {
            method,
            suite,
            g_x,
            c_i,
            h_message_1,
            ead_1: ead_1.clone(),
        },
        ead_1,
    ))
}

pub fn r_prepare_message_2<Crypto: CryptoTrait>(
    state: &ProcessingM1,
    crypto: &mut Crypto,
    cred_r: Credential,
    r_priv: &BytesP256ElemLen,
    c_r: u8,
    ead_2: &Option<EADItem>,
) -> Result<(WaitM3, BufferMessage2), EDHOCError> {
    let (y, g_y) = match state.suite.ecdh {
        EcdhAlg::P256 => crypto.p256_generate_key_pair(),
        EcdhAlg::X25519 => crypto.x25519_generate_key_pair(),
    };

    let g_xy = match state.suite.ecdh {
        EcdhAlg::P256 => crypto.p256_ecdh(&y, &state.g_x),
        EcdhAlg::X25519 => crypto.x25519_ecdh(&y, &state.g_x),
    };

    let th_2 = compute_th_2(crypto, &state.h_message_1, &g_y[..state.suite.ecdh_pk_len], c_r)?;
    let prk_2e = compute_prk_2e(crypto, &th_2, &g_xy);

    let g_rx = if responder_uses_static_dh(state.method) {
        Some(match state.suite.ecdh {
            EcdhAlg::P256 => crypto.p256_ecdh(r_priv, &state.g_x),
            EcdhAlg::X25519 => crypto.x25519_ecdh(r_priv, &state.g_x),
        })
    } else {
        None
    };
    let prk_3e2m = compute_prk_3e2m(crypto, &state.suite, &prk_2e, &th_2, state.method, g_rx.as_ref())?;

    let mut id_cred_compact = EdhocMessageBuffer::new();
    encode_id_cred_compact(&mut id_cred_compact, &cred_r)?;

    let ead_2_bytes = ead_2.as_ref().map(|e| {
        let mut b = EdhocMessageBuffer::new();
        encode_ead(&mut b, e).ok();
        b
    });

    let sig_or_mac_2 = signature_or_mac_generate(
        crypto,
        &state.suite,
        responder_uses_static_dh(state.method),
        &prk_3e2m,
        KdfLabel::Mac2 as u8,
        id_cred_compact.as_slice(),
        &th_2,
        cred_r.value.as_slice(),
        ead_2_bytes.as_ref().map(|b| b.as_slice()),
        r_priv,
    )?;

    let mut plaintext_2 = EdhocMessageBuffer::new();
    plaintext_2
        .extend_from_slice(id_cred_compact.as_slice())
        .map_err(|_| CoreError::CborEncodingError)?;
    push_bstr(&mut plaintext_2, sig_or_mac_2.as_slice())?;
    if let Some(b) = &ead_2_bytes {
        plaintext_2
            .extend_from_slice(b.as_slice())
            .map_err(|_| CoreError::CborEncodingError)?;
    }

    let keystream_2 = edhoc_kdf(crypto, &prk_2e, KdfLabel::KeyStream2 as u8, &th_2, plaintext_2.len);
    let mut ciphertext_2 = EdhocMessageBuffer::new();
    for i in 0..plaintext_2.len {
        ciphertext_2
            .push(plaintext_2.content[i] ^ keystream_2[i])
            .map_err(|_| CoreError::CborEncodingError)?;
    }

    let mut message_2 = EdhocMessageBuffer::new();
    let g_y_and_ct_len = state.suite.ecdh_pk_len + ciphertext_2.len;
    push_bstr_header(&mut message_2, g_y_and_ct_len)?;
    message_2
        .extend_from_slice(&g_y[..state.suite.ecdh_pk_len])
        .map_err(|_| CoreError::CborEncodingError)?;
    message_2
        .extend_from_slice(ciphertext_2.as_slice())
        .map_err(|_| CoreError::CborEncodingError)?;
    message_2
        .push(c_r)
        .map_err(|_| CoreError::CborEncodingError)?;

    let th_3 = compute_th_3_or_4(crypto, &th_2, plaintext_2.as_slice(), cred_r.value.as_slice());

    trace!("prepared message_2, {} bytes", message_2.len);

    Ok((
        WaitM3 {
            method: state.method,
            suite: state.suite,
            c_i: state.c_i,
            c_r,
            prk_3e2m,
            th_3,
            g_x: state.g_x,
            y,
        },
        message_2,
    ))
}

pub fn r_parse_message_3<Crypto: CryptoTrait>(
    state: &WaitM3,
    crypto: &mut Crypto,
    message_3: &BufferMessage3,
) -> Result<(ProcessingM3, Credential, Option<EADItem>), EDHOCError> {
    let mut decoder = CBORDecoder::new(message_3.as_slice());
    let ciphertext_3 = decoder.bytes()?;
    if !decoder.finished() {
        return Err(CoreError::CborDecodingError);
    }
    if ciphertext_3.len() < state.suite.aead_tag_len {
        return Err(CoreError::MacAuthenticationFailed);
    }

    let key = edhoc_kdf(crypto, &state.prk_3e2m, KdfLabel::K3 as u8, &state.th_3, state.suite.aead_key_len);
    let iv = edhoc_kdf(crypto, &state.prk_3e2m, KdfLabel::Iv3 as u8, &state.th_3, state.suite.aead_iv_len);
    let aad = encode_enc_structure(&state.th_3)?;

    let mut key_arr = [0u8; AES_CCM_KEY_LEN];
    key_arr.copy_from_slice(&key[..AES_CCM_KEY_LEN]);
    let mut iv_arr = [0u8; AES_CCM_IV_LEN];
    iv_arr.copy_from_slice(&iv[..AES_CCM_IV_LEN]);

    let plaintext = crypto
        .aes_ccm_decrypt_tag_8(&key_arr, &iv_arr, aad.as_slice(), ciphertext_3)?;
    let plaintext_len = ciphertext_3.len() - state.suite.aead_tag_len;
    let mut plaintext_3 = EdhocMessageBuffer::new();
    plaintext_3
        .fill_with_slice(&plaintext[..plaintext_len])
        .map_err(|_| CoreError::CborDecodingError)?;

    let (id_cred_i, sig_or_mac_3, ead_3) = decode_plaintext_3(&plaintext_3)?;
    let id_cred_i = match id_cred_i {
        IdCred::CompactKid(kid) => Credential::new_reference(kid),
        IdCred::FullCredential(bytes) => Credential::parse_ccs(bytes)?,
    };

    trace!("parsed message_3, selecting initiator credential kid={}", id_cred_i.kid);

    Ok((
        ProcessingM3 {
            method: state.method,
            suite: state.suite,
            prk_3e2m: state.prk_3e2m,
            th_3: state.th_3,
            g_x: state.g_x,
            y: state.y,
            id_cred_i: id_cred_i.clone(),
            sig_or_mac_3,
            ead_3: ead_3.clone(),
        },
        id_cred_i,
        ead_3,
    ))
}

pub fn r_verify_message_3<Crypto: CryptoTrait>(
    state: &ProcessingM3,
    crypto: &mut Crypto,
    cred_i: Credential,
) -> Result<(Completed, BytesHashLen), EDHOCError> {
    let g_iy = if initiator_uses_static_dh(state.method) {
        Some(match state.suite.ecdh {
            EcdhAlg::P256 => crypto.p256_ecdh(&state.y, &cred_i.public_key),
            EcdhAlg::X25519 => crypto.x25519_ecdh(&state.y, &cred_i.public_key),
        })
    } else {
        None
    };
    let prk_4e3m = compute_prk_4e3m(crypto, &state.suite, &state.prk_3e2m, &state.th_3, state.method, g_iy.as_ref())?;

    let mut id_cred_compact = EdhocMessageBuffer::new();
    encode_id_cred_compact(&mut id_cred_compact, &cred_i)?;

    signature_or_mac_verify(
        crypto,
        &state.suite,
        initiator_uses_static_dh(state.method),
        &prk_4e3m,
        KdfLabel::Mac3 as u8,
        id_cred_compact.as_slice(),
        &state.th_3,
        cred_i.value.as_slice(),
        state.ead_3.as_ref().and_then(|e| e.value.as_ref()).map(|v| v.as_slice()),
        &cred_i.public_key,
        state.sig_or_mac_3.as_slice(),
    )?;

    let mut plaintext_3 = EdhocMessageBuffer::new();
    plaintext_3
        .extend_from_slice(id_cred_compact.as_slice())
        .map_err(|_| CoreError::CborEncodingError)?;
    push_bstr(&mut plaintext_3, state.sig_or_mac_3.as_slice())?;

    let th_4 = compute_th_3_or_4(crypto, &state.th_3, plaintext_3.as_slice(), cred_i.value.as_slice());
    let prk_out_full = edhoc_kdf(crypto, &prk_4e3m, KdfLabel::PrkOut as u8, &th_4, state.suite.hash_len);
    let prk_out = hash_len_slice(&prk_out_full, state.suite.hash_len);

    Ok((
        Completed {
            prk_out,
            th_4,
            prk_4e3m,
        },
        prk_out,
    ))
}

/// Builds message_4 (RFC 9528 §4.6.2): an AEAD-protected, normally-empty plaintext that lets
/// the Initiator confirm the Responder's last flight without waiting for protected
/// application data. Only meaningful when the transport can't itself provide that
/// confirmation (e.g. no immediately-following OSCORE request).
#[cfg(feature = "message-4")]
pub fn i_prepare_message_4<Crypto: CryptoTrait>(
    state: &Completed,
    crypto: &mut Crypto,
    suite: &Suite,
    ead_4: &Option<EADItem>,
) -> Result<BufferMessage4, EDHOCError> {
    let mut plaintext_4 = EdhocMessageBuffer::new();
    if let Some(ead) = ead_4 {
        encode_ead(&mut plaintext_4, ead)?;
    }

    let key = edhoc_kdf(crypto, &state.prk_4e3m, KdfLabel::K4 as u8, &state.th_4, suite.aead_key_len);
    let iv = edhoc_kdf(crypto, &state.prk_4e3m, KdfLabel::Iv4 as u8, &state.th_4, suite.aead_iv_len);
    let aad = encode_enc_structure(&state.th_4)?;

    let mut key_arr = [0u8; AES_CCM_KEY_LEN];
    key_arr.copy_from_slice(&key[..AES_CCM_KEY_LEN]);
    let mut iv_arr = [0u8; AES_CCM_IV_LEN];
    iv_arr.copy_from_slice(&iv[..AES_CCM_IV_LEN]);

    let ciphertext = crypto.aes_ccm_encrypt_tag_8(&key_arr, &iv_arr, aad.as_slice(), plaintext_4.as_slice());
    let ct_len = plaintext_4.len + suite.aead_tag_len;

    let mut message_4 = EdhocMessageBuffer::new();
    push_bstr(&mut message_4, &ciphertext[..ct_len])?;
    Ok(message_4)
}

/// Verifies and decrypts message_4, returning any `EAD_4`.
#[cfg(feature = "message-4")]
pub fn r_process_message_4<Crypto: CryptoTrait>(
    state: &Completed,
    crypto: &mut Crypto,
    suite: &Suite,
    message_4: &BufferMessage4,
) -> Result<Option<EADItem>, EDHOCError> {
    let mut decoder = CBORDecoder::new(message_4.as_slice());
    let ciphertext_4 = decoder.bytes()?;
    if !decoder.finished() || ciphertext_4.len() < suite.aead_tag_len {
        return Err(CoreError::MacAuthenticationFailed);
    }

    let key = edhoc_kdf(crypto, &state.prk_4e3m, KdfLabel::K4 as u8, &state.th_4, suite.aead_key_len);
    let iv = edhoc_kdf(crypto, &state.prk_4e3m, KdfLabel::Iv4 as u8, &state.th_4, suite.aead_iv_len);
    let aad = encode_enc_structure(&state.th_4)?;

    let mut key_arr = [0u8; AES_CCM_KEY_LEN];
    key_arr.copy_from_slice(&key[..AES_CCM_KEY_LEN]);
    let mut iv_arr = [0u8; AES_CCM_IV_LEN];
    iv_arr.copy_from_slice(&iv[..AES_CCM_IV_LEN]);

    let plaintext = crypto.aes_ccm_decrypt_tag_8(&key_arr, &iv_arr, aad.as_slice(), ciphertext_4)?;
    let plaintext_len = ciphertext_4.len() - suite.aead_tag_len;
    if plaintext_len == 0 {
        return Ok(None);
    }
    parse_ead(&plaintext[..plaintext_len])
}

// -- Shared post-handshake operations ---------------------------------------

/// The EDHOC exporter interface (§4.3/§6.5): derives application-specific keying material,
/// including the OSCORE Master Secret (label 0) and Master Salt (label 1), from `PRK_out`.
pub fn edhoc_exporter<Crypto: CryptoTrait>(
    state: &Completed,
    crypto: &mut Crypto,
    label: u8,
    context: &BytesMaxContextBuffer,
    context_len: usize,
    length: usize,
) -> BytesMaxBuffer {
    let prk_exporter_full = edhoc_kdf(crypto, &state.prk_out, KdfLabel::PrkExporter as u8, &[], SHA256_DIGEST_LEN);
    let prk_exporter = hash_len_slice(&prk_exporter_full, SHA256_DIGEST_LEN);
    edhoc_kdf(crypto, &prk_exporter, label, &context[..context_len], length)
}

/// `KeyUpdate` (RFC 9528 §4.3.1): ratchets `PRK_out` forward so past exporter outputs can no
/// longer be recomputed, keyed on caller-supplied fresh context.
pub fn edhoc_key_update<Crypto: CryptoTrait>(
    state: &mut Completed,
    crypto: &mut Crypto,
    context: &BytesMaxContextBuffer,
    context_len: usize,
) -> BytesHashLen {
    let new_prk_out = edhoc_kdf(
        crypto,
        &state.prk_out,
        KdfLabel::PrkOutUpdate as u8,
        &context[..context_len],
        SHA256_DIGEST_LEN,
    );
    state.prk_out = hash_len_slice(&new_prk_out, SHA256_DIGEST_LEN);
    state.prk_out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::suites::SUITE_2;
    use edhoc_crypto::RustCryptoBackend as TestCrypto;

    fn test_credential(kid: u8, sk: BytesP256ElemLen, pk: BytesP256ElemLen) -> (BytesP256ElemLen, Credential) {
        (
            sk,
            Credential {
                id_kind: IdCredKind::Kid,
                cred_kind: CredKind::Ccs,
                kid,
                value: EdhocMessageBuffer::new(),
                public_key: pk,
            },
        )
    }

    #[test]
    fn test_full_handshake_method_0_agrees_on_prk_out() {
        let mut crypto = TestCrypto::new();

        let (i_sk, i_cred_pair) = {
            let (sk, pk) = crypto.p256_generate_key_pair();
            test_credential(10, sk, pk)
        };
        let (r_sk, r_cred_pair) = {
            let (sk, pk) = crypto.p256_generate_key_pair();
            test_credential(20, sk, pk)
        };

        let (x, g_x) = crypto.p256_generate_key_pair();
        let initiator_start = InitiatorStart {
            method: 0,
            x,
            g_x,
            suite: SUITE_2,
            c_i: 5,
        };
        let (wait_m2, message_1) = i_prepare_message_1(&initiator_start, &mut crypto, &None).unwrap();

        let (processing_m1, _ead_1) =
            r_process_message_1(&ResponderStart, &mut crypto, &message_1).unwrap();
        let (wait_m3, message_2) =
            r_prepare_message_2(&processing_m1, &mut crypto, r_cred_pair.clone(), &r_sk, 6, &None).unwrap();

        let (processing_m2, _c_r, _id_cred_r, _ead_2) =
            i_parse_message_2(&wait_m2, &mut crypto, &message_2).unwrap();
        let processed_m2 =
            i_verify_message_2(&processing_m2, &mut crypto, r_cred_pair, &i_sk).unwrap();
        let (initiator_done, message_3, prk_out_i) =
            i_prepare_message_3(&processed_m2, &mut crypto, i_cred_pair.clone(), &i_sk, &None).unwrap();

        let (processing_m3, _id_cred_i, _ead_3) =
            r_parse_message_3(&wait_m3, &mut crypto, &message_3).unwrap();
        let (responder_done, prk_out_r) =
            r_verify_message_3(&processing_m3, &mut crypto, i_cred_pair).unwrap();

        assert_eq!(prk_out_i, prk_out_r);
        assert_eq!(initiator_done.prk_out, responder_done.prk_out);
    }
}
