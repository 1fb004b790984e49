//! Runs a single EDHOC handshake (Initiator and Responder in the same process, standing in
//! for two separate constrained endpoints) and then protects and unprotects one CoAP
//! GET/response exchange with the OSCORE Security Context the handshake exports.
use edhoc::{
    generate_connection_identifier_cbor, Credential, CredKind, EdhocInitiator, EdhocResponder,
    IdCredKind, SUITE_0,
};
use edhoc_crypto::RustCryptoBackend;
use oscore::coap::{CODE_GET, OPT_URI_PATH};
use oscore::{protect_request, protect_response, unprotect_request, unprotect_response, CoapMessage, InteractionsTable};

/// RFC 9528 §A.1's OSCORE profile: Master Secret/Salt are the EDHOC exporter's output for
/// labels 0 and 1 respectively, truncated to the lengths the chosen AEAD needs.
const OSCORE_MASTER_SECRET_LEN: usize = 16;
const OSCORE_MASTER_SALT_LEN: usize = 8;

fn main() {
    env_logger::init();

    let mut i_crypto = RustCryptoBackend::new();
    let mut r_crypto = RustCryptoBackend::new();

    // SUITE_0 authenticates with EdDSA; the same key-pair generator used for the ephemeral
    // ECDH keys below also produces each party's static signing key (both are 32-byte scalars
    // on this workspace's x-only representation).
    let (i_priv, i_pub) = i_crypto.x25519_generate_key_pair();
    let (r_priv, r_pub) = r_crypto.x25519_generate_key_pair();

    let cred_i = Credential {
        id_kind: IdCredKind::Kid,
        cred_kind: CredKind::Ccs,
        kid: 11,
        value: Default::default(),
        public_key: i_pub,
    };
    let cred_r = Credential {
        id_kind: IdCredKind::Kid,
        cred_kind: CredKind::Ccs,
        kid: 22,
        value: Default::default(),
        public_key: r_pub,
    };

    let c_i = generate_connection_identifier_cbor(&mut i_crypto);
    let c_r = generate_connection_identifier_cbor(&mut r_crypto);

    let initiator = EdhocInitiator::new(RustCryptoBackend::new(), 3, SUITE_0);
    let (wait_m2, message_1) = initiator.prepare_message_1(c_i, &None).expect("prepare message_1");
    log::info!("sent message_1 ({} bytes)", message_1.len);

    let responder = EdhocResponder::new(RustCryptoBackend::new());
    let processed_m1 = responder.process_message_1(&message_1).expect("process message_1");
    let (wait_m3, message_2) = processed_m1
        .prepare_message_2(cred_r.clone(), &r_priv, c_r, &None)
        .expect("prepare message_2");
    log::info!("sent message_2 ({} bytes)", message_2.len);

    let (processing_m2, _c_r, _id_cred_r, _ead_2) = wait_m2.parse_message_2(&message_2).expect("parse message_2");
    let processed_m2 = processing_m2.verify_message_2(cred_r.clone(), &i_priv).expect("verify message_2");
    let (initiator_done, message_3, prk_out_i) = processed_m2
        .prepare_message_3(cred_i.clone(), &i_priv, &None)
        .expect("prepare message_3");
    log::info!("sent message_3 ({} bytes)", message_3.len);

    let (processing_m3, _id_cred_i, _ead_3) = wait_m3.parse_message_3(&message_3).expect("parse message_3");
    let (mut responder_done, prk_out_r) = processing_m3.verify_message_3(cred_i).expect("verify message_3");

    assert_eq!(prk_out_i, prk_out_r, "both sides must derive the same PRK_out");
    log::info!("handshake complete, PRK_out matches on both sides");

    let mut initiator_done = initiator_done;
    let context = [0u8; edhoc::MAX_KDF_CONTEXT_LEN];
    let master_secret_i = initiator_done.edhoc_exporter(0, &context, 0, OSCORE_MASTER_SECRET_LEN);
    let master_secret_r = responder_done.edhoc_exporter(0, &context, 0, OSCORE_MASTER_SECRET_LEN);
    assert_eq!(master_secret_i[..OSCORE_MASTER_SECRET_LEN], master_secret_r[..OSCORE_MASTER_SECRET_LEN]);
    let master_salt_i = initiator_done.edhoc_exporter(1, &context, 0, OSCORE_MASTER_SALT_LEN);
    let master_salt_r = responder_done.edhoc_exporter(1, &context, 0, OSCORE_MASTER_SALT_LEN);
    assert_eq!(master_salt_i[..OSCORE_MASTER_SALT_LEN], master_salt_r[..OSCORE_MASTER_SALT_LEN]);

    // The Initiator becomes the OSCORE client: its Sender ID is the server's Recipient ID and
    // vice versa, per RFC 8613 §3.1's convention of assigning IDs from the connection identifiers.
    let mut client_crypto = RustCryptoBackend::new();
    let mut server_crypto = RustCryptoBackend::new();
    let mut client_ctx = oscore::context_from_edhoc_exporter(
        &mut client_crypto,
        &master_secret_i[..OSCORE_MASTER_SECRET_LEN],
        &master_salt_i[..OSCORE_MASTER_SALT_LEN],
        &[0x00],
        &[0x01],
    )
    .expect("derive client security context");
    let mut server_ctx = oscore::context_from_edhoc_exporter(
        &mut server_crypto,
        &master_secret_r[..OSCORE_MASTER_SECRET_LEN],
        &master_salt_r[..OSCORE_MASTER_SALT_LEN],
        &[0x01],
        &[0x00],
    )
    .expect("derive server security context");
    log::info!("OSCORE security contexts derived from EDHOC exporter");

    let mut client_interactions = InteractionsTable::new();
    let mut server_interactions = InteractionsTable::new();

    let mut request = CoapMessage::new(CODE_GET, 1, &[0x77]).expect("build request");
    request.push_option(OPT_URI_PATH, b"temperature").expect("push uri-path");

    let protected_request = protect_request(&mut client_crypto, &mut client_ctx, &mut client_interactions, None, &request)
        .expect("protect request");
    log::info!("client sent an OSCORE-protected GET /temperature ({} byte payload)", protected_request.payload.len);

    let unprotected_request =
        unprotect_request(&mut server_crypto, &mut server_ctx, &mut server_interactions, &protected_request)
            .expect("unprotect request");
    log::info!(
        "server received GET {}",
        std::str::from_utf8(unprotected_request.get_option(OPT_URI_PATH).unwrap().value.as_slice()).unwrap()
    );

    let mut response = CoapMessage::new(0x45, 1, &[0x77]).expect("build response");
    response.payload.fill_with_slice(b"21.5").expect("fill response payload");

    let protected_response = protect_response(
        &mut server_crypto,
        &mut server_ctx,
        &mut server_interactions,
        None,
        &[0x77],
        &response,
    )
    .expect("protect response");

    let unprotected_response =
        unprotect_response(&mut client_crypto, &mut client_ctx, &mut client_interactions, &protected_response)
            .expect("unprotect response");
    log::info!(
        "client received response: {}",
        std::str::from_utf8(unprotected_response.payload.as_slice()).unwrap()
    );
}
