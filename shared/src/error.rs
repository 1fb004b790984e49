//! The single error type shared by the EDHOC and OSCORE drivers.
//!
//! The reference implementation this crate is modeled on (`uoscore-uedhoc`) uses one flat
//! `enum err` across both protocols; `CoreError` mirrors that choice; see
//! `inc/common/oscore_edhoc_error.h` and RFC 9528/RFC 8613 for the conditions each variant
//! corresponds to. `first_request_after_reboot`, `echo_validation_failed` and `not_oscore_pkt`
//! are informational: callers inspect them to decide on a recovery action rather than
//! treating them as terminal failures.

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
#[repr(C)]
pub enum CoreError {
    // -- input well-formedness --
    CborDecodingError,
    CborEncodingError,
    WrongParameter,
    BufferTooSmall,
    NotValidInputPacket,
    OscoreInvalidTkl,
    OscoreInvalidOptionDelta,
    OscoreInvalidOptionLen,
    OscoreInvalidPiv,
    TooManyOptions,
    SuitesIListEmpty,
    SuitesIListTooLong,

    // -- algorithm support --
    UnsupportedCipherSuite,
    UnsupportedEcdhCurve,
    UnsupportedSignatureAlgorithm,
    CryptoOperationNotImplemented,
    OscoreInvalidAlgorithmAead,
    OscoreInvalidAlgorithmHkdf,
    OscoreUnknownHkdf,

    // -- authentication --
    MacAuthenticationFailed,
    SignatureAuthenticationFailed,
    CertificateAuthenticationFailed,
    CredentialNotFound,
    NoSuchCa,
    UnknownPeer,

    // -- protocol state --
    ErrorMessageReceived,
    ErrorMessageSent,
    FirstRequestAfterReboot,
    EchoValidationFailed,
    NoEchoOption,
    EchoValMismatch,
    NotOscorePkt,

    // -- replay / freshness --
    OscoreReplayWindowProtectionError,
    OscoreReplayNotificationProtectionError,
    OscoreSsnOverflow,

    // -- interactions --
    OscoreMaxInteractions,
    OscoreInteractionDuplicatedToken,
    OscoreInteractionNotFound,

    // -- I/O or external collaborators --
    UnexpectedResultFromExtLib,
    SignFailed,
    ShaFailed,
    HkdfFailed,
    XorError,
}
