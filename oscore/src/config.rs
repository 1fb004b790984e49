//! Compile-time knobs (RFC 8613's `#define`-style configuration), matching the C
//! implementation's `inc/oscore/oscore_coap.h`/`oscore.h` header constants. Every array bound
//! an OSCORE context needs at compile time (for `no_std`, no heap) lives here as a `const`.

/// Outstanding request/response/notification exchanges tracked per context.
pub const OSCORE_INTERACTIONS_COUNT: usize = 3;

/// Width of the server-side replay window (RFC 8613 §7.4).
pub const OSCORE_SERVER_REPLAY_WINDOW_SIZE: usize = 32;

/// Cap on the concatenated URI-path bytes an interaction record stores.
pub const OSCORE_MAX_URI_PATH_LEN: usize = 64;

/// How many outbound Sender Sequence Numbers pass between each persisted write.
pub const K_SSN_NVM_STORE_INTERVAL: u64 = 64;

/// Unwritten SSN increments a restart must assume happened since the last persisted value.
pub const F_NVM_MAX_WRITE_FAILURE: u64 = 10;

/// SSN ceiling for AES-CCM-16-64-128 (2^23 − 1; the 5-byte PIV field and the AEAD's nonce
/// reuse bound both cap it here).
pub const OSCORE_SSN_OVERFLOW_VALUE: u64 = (1 << 23) - 1;

/// Maximum encoded CoAP message this crate will parse/build.
pub const MAX_COAP_MESSAGE_LEN: usize = 1024;

/// Maximum number of CoAP options this crate will parse in one message.
pub const MAX_COAP_OPTIONS: usize = 16;
