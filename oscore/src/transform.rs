//! `coap2oscore`/`oscore2coap`: the OSCORE transform itself (RFC 8613 §8), orchestrating
//! message classification, AEAD protection, the interactions table, replay/Echo freshness,
//! and the Observe special case.

use crate::aad::encode_aad;
use crate::coap::{
    encode_options_and_payload, is_class_u, parse_options_and_payload, CoapMessage, CoapOption,
    CODE_CHANGED, CODE_CONTENT, CODE_FETCH, CODE_GET, CODE_POST, OPT_ECHO, OPT_OBSERVE, OPT_OSCORE,
};
use crate::context::{compute_nonce, NvmStore, SecurityContext};
use crate::echo::EchoState;
use crate::interactions::{InteractionsTable, RequestType};
use crate::config::MAX_COAP_OPTIONS;
use crate::option::{self, piv_to_bytes};
use edhoc_shared::{CoreError, Crypto, EdhocMessageBuffer, AES_CCM_TAG_LEN};
use log::trace;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Registration,
    Cancellation,
    Notification,
    Response,
}

/// Classifies a plaintext CoAP message per RFC 8613 §4.13's distinction between ordinary
/// requests/responses and Observe registrations/cancellations/notifications.
pub fn classify(msg: &CoapMessage) -> MessageKind {
    let observe = msg.get_option(OPT_OBSERVE);
    if msg.code_class() == 0 {
        match observe {
            None => MessageKind::Request,
            Some(o) if o.value.len == 0 || o.value.as_slice() == [0] => MessageKind::Registration,
            Some(_) => MessageKind::Cancellation,
        }
    } else if observe.is_some() {
        MessageKind::Notification
    } else {
        MessageKind::Response
    }
}

fn aead_encrypt<C: Crypto>(
    crypto: &mut C,
    key: &[u8; 16],
    nonce: &[u8; 13],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<EdhocMessageBuffer, CoreError> {
    let ct = crypto.aes_ccm_encrypt_tag_8(key, nonce, aad, plaintext);
    EdhocMessageBuffer::new_from_slice(&ct[..plaintext.len() + AES_CCM_TAG_LEN])
        .map_err(|_| CoreError::BufferTooSmall)
}

fn aead_decrypt<C: Crypto>(
    crypto: &mut C,
    key: &[u8; 16],
    nonce: &[u8; 13],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<EdhocMessageBuffer, CoreError> {
    if ciphertext.len() < AES_CCM_TAG_LEN {
        return Err(CoreError::MacAuthenticationFailed);
    }
    let pt = crypto.aes_ccm_decrypt_tag_8(key, nonce, aad, ciphertext)?;
    EdhocMessageBuffer::new_from_slice(&pt[..ciphertext.len() - AES_CCM_TAG_LEN])
        .map_err(|_| CoreError::BufferTooSmall)
}

/// Splits `msg`'s options into the Class U subset (stays on the outer, unprotected message)
/// and the Class E subset (moved into the encrypted inner message).
fn split_options(msg: &CoapMessage) -> ([CoapOption; MAX_COAP_OPTIONS], usize, [CoapOption; MAX_COAP_OPTIONS], usize) {
    let mut class_u = [CoapOption { number: 0, value: Default::default() }; MAX_COAP_OPTIONS];
    let mut class_u_len = 0;
    let mut class_e = [CoapOption { number: 0, value: Default::default() }; MAX_COAP_OPTIONS];
    let mut class_e_len = 0;
    for opt in msg.options() {
        if opt.number == OPT_OSCORE || opt.number == OPT_OBSERVE {
            continue;
        }
        if is_class_u(opt.number) {
            class_u[class_u_len] = *opt;
            class_u_len += 1;
        } else {
            class_e[class_e_len] = *opt;
            class_e_len += 1;
        }
    }
    (class_u, class_u_len, class_e, class_e_len)
}

fn encode_inner(code: u8, options: &[CoapOption], payload: &[u8]) -> Result<EdhocMessageBuffer, CoreError> {
    let mut out = EdhocMessageBuffer::new();
    out.push(code).map_err(|_| CoreError::CborEncodingError)?;
    encode_options_and_payload(&mut out, options, payload)?;
    Ok(out)
}

/// Protects an outbound request (or Observe registration/cancellation), writing a fresh
/// interaction record so the matching response can be unprotected later.
pub fn protect_request<C: Crypto>(
    crypto: &mut C,
    ctx: &mut SecurityContext,
    interactions: &mut InteractionsTable,
    nvm: Option<&mut dyn NvmStore>,
    msg: &CoapMessage,
) -> Result<CoapMessage, CoreError> {
    let kind = classify(msg);
    let request_type = match kind {
        MessageKind::Request => RequestType::Request,
        MessageKind::Registration => RequestType::Registration,
        MessageKind::Cancellation => RequestType::Cancellation,
        _ => return Err(CoreError::NotOscorePkt),
    };

    let piv = ctx.sender.next_piv(nvm)?;
    let (piv_bytes, piv_len) = piv_to_bytes(piv);
    let kid = ctx.sender.sender_id();

    let (class_u, class_u_len, class_e, class_e_len) = split_options(msg);

    let observe_duplicated = msg.get_option(OPT_OBSERVE).copied();
    let mut inner_options = class_e;
    let mut inner_len = class_e_len;
    if let Some(o) = &observe_duplicated {
        inner_options[inner_len] = *o;
        inner_len += 1;
        inner_options[..inner_len].sort_by_key(|o| o.number);
    }

    let plaintext = encode_inner(msg.header.code, &inner_options[..inner_len], msg.payload.as_slice())?;
    let aad = encode_aad(kid, &piv_bytes[..piv_len])?;
    let nonce = compute_nonce(kid, piv, &ctx.common_iv);
    let ciphertext = aead_encrypt(crypto, &ctx.sender.sender_key, &nonce, aad.as_slice(), plaintext.as_slice())?;

    let kid_context = if matches!(request_type, RequestType::Registration) {
        ctx.id_context()
    } else {
        None
    };
    let option_buf = option::encode_request_option(&piv_bytes[..piv_len], kid, kid_context)?;
    let option_len = option::encode_option_len(&piv_bytes[..piv_len], Some(kid), kid_context);

    let out_code = match kind {
        MessageKind::Request if msg.header.code == CODE_GET => CODE_POST,
        MessageKind::Registration | MessageKind::Cancellation if msg.header.code == CODE_GET => CODE_FETCH,
        _ => CODE_POST,
    };

    let mut out = CoapMessage::new(out_code, msg.header.message_id, msg.token.as_slice())?;
    out.header.version = msg.header.version;
    out.header.msg_type = msg.header.msg_type;
    for opt in &class_u[..class_u_len] {
        out.push_option(opt.number, opt.value.as_slice())?;
    }
    out.push_option(OPT_OSCORE, &option_buf[..option_len])?;
    if let Some(o) = &observe_duplicated {
        out.push_option(OPT_OBSERVE, o.value.as_slice())?;
    }
    out.payload.fill_with_slice(ciphertext.as_slice()).map_err(|_| CoreError::BufferTooSmall)?;

    interactions.set_record(
        uri_path_of(&class_u[..class_u_len]),
        request_type,
        msg.token.as_slice(),
        piv,
        kid,
    )?;

    trace!("protected request, piv={}, {} bytes", piv, out.payload.len);
    Ok(out)
}

fn uri_path_of(class_u: &[CoapOption]) -> &[u8] {
    class_u
        .iter()
        .find(|o| o.number == crate::coap::OPT_URI_PATH)
        .map(|o| o.value.as_slice())
        .unwrap_or(&[])
}

/// Unprotects an inbound request at the server, recording an interaction keyed by
/// (URI-path, request type) and the client's Token so the outbound response can later reuse
/// the same AEAD identifiers.
pub fn unprotect_request<C: Crypto>(
    crypto: &mut C,
    ctx: &mut SecurityContext,
    interactions: &mut InteractionsTable,
    msg: &CoapMessage,
) -> Result<CoapMessage, CoreError> {
    let oscore_opt = msg.get_option(OPT_OSCORE).ok_or(CoreError::NotOscorePkt)?;
    let decoded = option::decode(oscore_opt.value.as_slice())?;
    let kid = decoded.kid().ok_or(CoreError::NotOscorePkt)?;
    if kid != ctx.recipient.recipient_id() {
        return Err(CoreError::UnknownPeer);
    }
    let piv = be_bytes_to_u64(decoded.piv());

    let echo_state = ctx.recipient.echo.state;
    if echo_state == EchoState::Synchronized && !ctx.recipient.replay.is_valid(piv) {
        return Err(CoreError::OscoreReplayWindowProtectionError);
    }

    let aad = encode_aad(kid, decoded.piv())?;
    let nonce = compute_nonce(kid, piv, &ctx.common_iv);
    let plaintext = aead_decrypt(crypto, &ctx.recipient.recipient_key, &nonce, aad.as_slice(), msg.payload.as_slice())?;

    // The AEAD tag just verified, so the peer is live; freshness relative to our own replay
    // state still depends on where we are in the reboot/Echo recovery (RFC 9175 §2).
    match echo_state {
        EchoState::Reboot => return Err(CoreError::FirstRequestAfterReboot),
        EchoState::Verify => {
            let echo_opt = msg.get_option(OPT_ECHO).ok_or(CoreError::EchoValidationFailed)?;
            if !ctx.recipient.echo.verify_echo(echo_opt.value.as_slice(), piv, &mut ctx.recipient.replay) {
                return Err(CoreError::EchoValidationFailed);
            }
        }
        EchoState::Synchronized => ctx.recipient.replay.update(piv),
    }

    let inner_code = *plaintext.as_slice().first().ok_or(CoreError::NotValidInputPacket)?;
    let mut inner = CoapMessage::new(inner_code, msg.header.message_id, msg.token.as_slice())?;
    parse_options_and_payload(&plaintext.as_slice()[1..], &mut inner)?;

    let mut out = CoapMessage::new(inner_code, msg.header.message_id, msg.token.as_slice())?;
    out.header.version = msg.header.version;
    out.header.msg_type = msg.header.msg_type;
    for opt in msg.options() {
        if opt.number != OPT_OSCORE && is_class_u(opt.number) {
            out.push_option(opt.number, opt.value.as_slice())?;
        }
    }
    for opt in inner.options() {
        out.push_option(opt.number, opt.value.as_slice())?;
    }
    out.payload.fill_with_slice(inner.payload.as_slice()).map_err(|_| CoreError::BufferTooSmall)?;

    let kind = classify(&out);
    let request_type = match kind {
        MessageKind::Request => RequestType::Request,
        MessageKind::Registration => RequestType::Registration,
        MessageKind::Cancellation => RequestType::Cancellation,
        _ => return Err(CoreError::NotOscorePkt),
    };
    let uri_path = uri_path_of(out.options());
    interactions.set_record(uri_path, request_type, msg.token.as_slice(), piv, kid)?;

    trace!("unprotected request, piv={}", piv);
    Ok(out)
}

/// Protects an outbound response (or notification) at the server, reusing the matching
/// request's KID/PIV for the AAD and nonce (RFC 8613 §5.4) except for notifications, which
/// mint a fresh PIV of their own so the client can detect reordering/replay across an
/// Observe stream.
pub fn protect_response<C: Crypto>(
    crypto: &mut C,
    ctx: &mut SecurityContext,
    interactions: &mut InteractionsTable,
    nvm: Option<&mut dyn NvmStore>,
    token: &[u8],
    msg: &CoapMessage,
) -> Result<CoapMessage, CoreError> {
    let record = interactions
        .get_record(token)
        .ok_or(CoreError::OscoreInteractionNotFound)?;
    let request_piv = record.piv;
    let mut request_kid = [0u8; option::MAX_KID_LEN];
    let request_kid_len = record.kid().len();
    request_kid[..request_kid_len].copy_from_slice(record.kid());

    let kind = classify(msg);
    let (class_u, class_u_len, class_e, class_e_len) = split_options(msg);

    let is_notification = matches!(kind, MessageKind::Notification);
    let mut inner_options = class_e;
    let mut inner_len = class_e_len;

    let observe_real_value = msg.get_option(OPT_OBSERVE).map(|o| *o);
    if let Some(o) = &observe_real_value {
        if is_notification {
            inner_options[inner_len] = CoapOption { number: OPT_OBSERVE, value: Default::default() };
        } else {
            inner_options[inner_len] = *o;
        }
        inner_len += 1;
        inner_options[..inner_len].sort_by_key(|o| o.number);
    }

    let plaintext = encode_inner(msg.header.code, &inner_options[..inner_len], msg.payload.as_slice())?;

    // AAD/nonce always key off the *request's* KID and PIV (RFC 8613 §5.4), except that a
    // notification carries a fresh PIV of its own in the OSCORE option so the client's
    // per-recipient notification counter can detect reordering across the Observe stream.
    let (notification_piv, notification_piv_bytes, notification_piv_len) = if is_notification {
        let piv = ctx.sender.next_piv(nvm)?;
        let (bytes, len) = piv_to_bytes(piv);
        (Some(piv), bytes, len)
    } else {
        (None, [0u8; option::MAX_PIV_LEN], 0)
    };

    let (request_piv_bytes, request_piv_len) = piv_to_bytes(request_piv);
    let aad = encode_aad(&request_kid[..request_kid_len], &request_piv_bytes[..request_piv_len])?;
    let nonce = compute_nonce(&request_kid[..request_kid_len], request_piv, &ctx.common_iv);
    let ciphertext = aead_encrypt(crypto, &ctx.sender.sender_key, &nonce, aad.as_slice(), plaintext.as_slice())?;

    let option_buf = if notification_piv.is_some() {
        option::encode_response_option(&notification_piv_bytes[..notification_piv_len])?
    } else {
        option::encode_response_option(&[])?
    };
    let option_len = option::encode_option_len(
        if notification_piv.is_some() {
            &notification_piv_bytes[..notification_piv_len]
        } else {
            &[]
        },
        None,
        None,
    );

    let out_code = if is_notification { CODE_CONTENT } else { CODE_CHANGED };
    let mut out = CoapMessage::new(out_code, msg.header.message_id, token)?;
    out.header.version = msg.header.version;
    out.header.msg_type = msg.header.msg_type;
    for opt in &class_u[..class_u_len] {
        out.push_option(opt.number, opt.value.as_slice())?;
    }
    out.push_option(OPT_OSCORE, &option_buf[..option_len])?;
    if let Some(o) = &observe_real_value {
        if is_notification {
            out.push_option(OPT_OBSERVE, o.value.as_slice())?;
        }
    }
    out.payload
        .fill_with_slice(ciphertext.as_slice())
        .map_err(|_| CoreError::BufferTooSmall)?;

    if !is_notification {
        interactions.remove_record(token);
    }

    trace!("protected response, notification={}", is_notification);
    Ok(out)
}

/// Unprotects an inbound response (or notification) at the client, recovering the matching
/// request's KID/PIV from the interactions table for the AAD/nonce, since responses
/// normally carry neither. Notifications are additionally checked against the
/// per-recipient strictly-increasing counter (RFC 8613 §7.4.1).
pub fn unprotect_response<C: Crypto>(
    crypto: &mut C,
    ctx: &mut SecurityContext,
    interactions: &mut InteractionsTable,
    msg: &CoapMessage,
) -> Result<CoapMessage, CoreError> {
    let oscore_opt = msg.get_option(OPT_OSCORE).ok_or(CoreError::NotOscorePkt)?;
    let decoded = option::decode(oscore_opt.value.as_slice())?;

    let record = interactions
        .get_record(msg.token.as_slice())
        .ok_or(CoreError::OscoreInteractionNotFound)?;
    let request_piv = record.piv;
    let mut request_kid = [0u8; option::MAX_KID_LEN];
    let request_kid_len = record.kid().len();
    request_kid[..request_kid_len].copy_from_slice(record.kid());

    let is_notification = msg.get_option(OPT_OBSERVE).is_some();
    let response_piv = if decoded.piv_len > 0 {
        be_bytes_to_u64(decoded.piv())
    } else {
        request_piv
    };

    if is_notification {
        ctx.recipient.check_notification_piv(response_piv)?;
    }

    let (request_piv_bytes, request_piv_len) = piv_to_bytes(request_piv);
    let aad = encode_aad(&request_kid[..request_kid_len], &request_piv_bytes[..request_piv_len])?;
    let nonce = compute_nonce(&request_kid[..request_kid_len], request_piv, &ctx.common_iv);
    let plaintext = aead_decrypt(crypto, &ctx.recipient.recipient_key, &nonce, aad.as_slice(), msg.payload.as_slice())?;

    let inner_code = *plaintext.as_slice().first().ok_or(CoreError::NotValidInputPacket)?;
    let mut inner = CoapMessage::new(inner_code, msg.header.message_id, msg.token.as_slice())?;
    parse_options_and_payload(&plaintext.as_slice()[1..], &mut inner)?;

    let mut out = CoapMessage::new(inner_code, msg.header.message_id, msg.token.as_slice())?;
    out.header.version = msg.header.version;
    out.header.msg_type = msg.header.msg_type;
    for opt in msg.options() {
        if opt.number != OPT_OSCORE && opt.number != OPT_OBSERVE && is_class_u(opt.number) {
            out.push_option(opt.number, opt.value.as_slice())?;
        }
    }
    for opt in inner.options() {
        if opt.number == OPT_OBSERVE && is_notification {
            // the inner Observe value is a zero-length placeholder for notifications; the
            // real sequence number travels on the outer option instead.
            if let Some(outer_observe) = msg.get_option(OPT_OBSERVE) {
                out.push_option(OPT_OBSERVE, outer_observe.value.as_slice())?;
                continue;
            }
        }
        out.push_option(opt.number, opt.value.as_slice())?;
    }
    out.payload
        .fill_with_slice(inner.payload.as_slice())
        .map_err(|_| CoreError::BufferTooSmall)?;

    if !is_notification {
        interactions.remove_record(msg.token.as_slice());
    }

    trace!("unprotected response, notification={}", is_notification);
    Ok(out)
}

fn be_bytes_to_u64(bytes: &[u8]) -> u64 {
    let mut v = 0u64;
    for &b in bytes {
        v = (v << 8) | b as u64;
    }
    v
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::coap::{CODE_GET, OPT_URI_PATH};
    use crate::context::{context_init, OscoreInitParams};
    use edhoc_crypto::RustCryptoBackend as TestCrypto;

    fn two_party_contexts() -> (SecurityContext, SecurityContext) {
        let mut crypto = TestCrypto::new();
        let client = context_init(
            &mut crypto,
            &OscoreInitParams {
                master_secret: &[0x01; 16],
                master_salt: &[0x02; 8],
                id_context: None,
                sender_id: &[0x00],
                recipient_id: &[0x01],
            },
            true,
            None,
        )
        .unwrap();
        let server = context_init(
            &mut crypto,
            &OscoreInitParams {
                master_secret: &[0x01; 16],
                master_salt: &[0x02; 8],
                id_context: None,
                sender_id: &[0x01],
                recipient_id: &[0x00],
            },
            true,
            None,
        )
        .unwrap();
        (client, server)
    }

    #[test]
    fn test_request_response_roundtrip() {
        let mut crypto = TestCrypto::new();
        let (mut client_ctx, mut server_ctx) = two_party_contexts();
        let mut client_interactions = InteractionsTable::new();
        let mut server_interactions = InteractionsTable::new();

        let mut req = CoapMessage::new(CODE_GET, 1, &[0x77]).unwrap();
        req.push_option(OPT_URI_PATH, b"temperature").unwrap();

        let protected_req = protect_request(&mut crypto, &mut client_ctx, &mut client_interactions, None, &req).unwrap();
        assert!(protected_req.get_option(crate::coap::OPT_OSCORE).is_some());

        let unprotected_req = unprotect_request(&mut crypto, &mut server_ctx, &mut server_interactions, &protected_req).unwrap();
        assert_eq!(unprotected_req.header.code, CODE_GET);
        assert_eq!(unprotected_req.get_option(OPT_URI_PATH).unwrap().value.as_slice(), b"temperature");

        let mut resp = CoapMessage::new(0x45, 1, &[0x77]).unwrap();
        resp.payload.fill_with_slice(b"21.5").unwrap();

        let protected_resp = protect_response(
            &mut crypto,
            &mut server_ctx,
            &mut server_interactions,
            None,
            &[0x77],
            &resp,
        )
        .unwrap();

        let unprotected_resp =
            unprotect_response(&mut crypto, &mut client_ctx, &mut client_interactions, &protected_resp).unwrap();
        assert_eq!(unprotected_resp.payload.as_slice(), b"21.5");
    }

    #[test]
    fn test_reboot_forces_echo_challenge_then_resynchronizes() {
        let mut crypto = TestCrypto::new();
        let (mut client_ctx, mut server_ctx) = two_party_contexts();
        let mut client_interactions = InteractionsTable::new();
        let mut server_interactions = InteractionsTable::new();
        server_ctx.recipient.echo = crate::echo::EchoContext::from_reboot();

        let mut req = CoapMessage::new(CODE_GET, 1, &[0x01]).unwrap();
        req.push_option(OPT_URI_PATH, b"a").unwrap();
        let protected = protect_request(&mut crypto, &mut client_ctx, &mut client_interactions, None, &req).unwrap();

        let err = unprotect_request(&mut crypto, &mut server_ctx, &mut server_interactions, &protected).unwrap_err();
        assert_eq!(err, CoreError::FirstRequestAfterReboot);
        assert_eq!(server_ctx.recipient.echo.state, crate::echo::EchoState::Reboot);

        let challenge = [0x42u8; crate::echo::ECHO_VALUE_LEN];
        server_ctx.recipient.echo.begin_challenge(&challenge);

        let mut retry = CoapMessage::new(CODE_GET, 2, &[0x02]).unwrap();
        retry.push_option(OPT_URI_PATH, b"a").unwrap();
        retry.push_option(crate::coap::OPT_ECHO, &challenge).unwrap();
        let protected_retry = protect_request(&mut crypto, &mut client_ctx, &mut client_interactions, None, &retry).unwrap();

        let unprotected = unprotect_request(&mut crypto, &mut server_ctx, &mut server_interactions, &protected_retry).unwrap();
        assert_eq!(unprotected.get_option(OPT_URI_PATH).unwrap().value.as_slice(), b"a");
        assert_eq!(server_ctx.recipient.echo.state, crate::echo::EchoState::Synchronized);
    }

    #[test]
    fn test_replay_of_request_rejected() {
        let mut crypto = TestCrypto::new();
        let (mut client_ctx, mut server_ctx) = two_party_contexts();
        let mut client_interactions = InteractionsTable::new();
        let mut server_interactions = InteractionsTable::new();

        let mut req = CoapMessage::new(CODE_GET, 1, &[0x01]).unwrap();
        req.push_option(OPT_URI_PATH, b"a").unwrap();
        let protected = protect_request(&mut crypto, &mut client_ctx, &mut client_interactions, None, &req).unwrap();

        unprotect_request(&mut crypto, &mut server_ctx, &mut server_interactions, &protected).unwrap();
        let err = unprotect_request(&mut crypto, &mut server_ctx, &mut server_interactions, &protected).unwrap_err();
        assert_eq!(err, CoreError::OscoreReplayWindowProtectionError);
    }
}
