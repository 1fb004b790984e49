//! OSCORE (RFC 8613): object security for CoAP, layered on top of the `edhoc` crate's key
//! schedule output. Derives a Security Context from an EDHOC `PRK_out` (or from master
//! secret/salt provisioned out of band), and transforms plaintext CoAP packets into
//! OSCORE-protected ones and back.
#![no_std]

pub mod aad;
pub mod coap;
pub mod config;
pub mod context;
pub mod echo;
pub mod interactions;
pub mod option;
pub mod replay;
pub mod transform;

pub use coap::{CoapMessage, CoapOption};
pub use context::{context_init, NvmStore, OscoreInitParams, SecurityContext};
pub use echo::{EchoContext, EchoState};
pub use interactions::{InteractionRecord, InteractionsTable, RequestType};
pub use option::OscoreOption;
pub use replay::ReplayWindow;
pub use transform::{classify, protect_request, protect_response, unprotect_request, unprotect_response, MessageKind};

pub use edhoc_shared::CoreError as OscoreError;

/// Derives a fresh [SecurityContext] straight from an EDHOC `PRK_out`/`PRK_exporter`
/// (RFC 9528 §A.1's OSCORE appendix): `master_secret` and `master_salt` are obtained by
/// calling the `edhoc` crate's `edhoc_exporter` with labels 0 and 1 respectively, then fed
/// into [context_init] as any other Master Secret/Salt would be.
pub fn context_from_edhoc_exporter<Crypto: edhoc_shared::Crypto>(
    crypto: &mut Crypto,
    master_secret: &[u8],
    master_salt: &[u8],
    sender_id: &[u8],
    recipient_id: &[u8],
) -> Result<SecurityContext, OscoreError> {
    context_init(
        crypto,
        &OscoreInitParams {
            master_secret,
            master_salt,
            id_context: None,
            sender_id,
            recipient_id,
        },
        true,
        None,
    )
}
