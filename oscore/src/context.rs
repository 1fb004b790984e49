//! Security Context derivation (RFC 8613 §3) and per-direction sub-contexts: the Sender
//! Context used to protect outgoing messages and the Recipient Context used to unprotect
//! incoming ones, both derived from one shared Common Context via HKDF-Expand.

use crate::config::{
    F_NVM_MAX_WRITE_FAILURE, K_SSN_NVM_STORE_INTERVAL, OSCORE_SSN_OVERFLOW_VALUE,
};
use crate::echo::EchoContext;
use crate::option::{MAX_KID_LEN, MAX_KID_CONTEXT_LEN};
use crate::replay::ReplayWindow;
use edhoc_shared::{
    push_bstr, push_tstr, AES_CCM_IV_LEN, AES_CCM_KEY_LEN, BytesHashLen, CoreError,
    EdhocMessageBuffer,
};

/// Hook for persisting the Sender Sequence Number across restarts (RFC 8613 §7.5.1). A
/// `no_std` target without flash/EEPROM access can skip this by passing `fresh: true` to
/// [context_init], e.g. for a context derived straight from an EDHOC exchange.
pub trait NvmStore {
    fn write_ssn(&mut self, ssn: u64);
    fn read_ssn(&mut self) -> Option<u64>;
}

/// Parameters needed to derive a Security Context, corresponding to RFC 8613 §3.2's inputs
/// to the HKDF-based context derivation.
pub struct OscoreInitParams<'a> {
    pub master_secret: &'a [u8],
    pub master_salt: &'a [u8],
    pub id_context: Option<&'a [u8]>,
    pub sender_id: &'a [u8],
    pub recipient_id: &'a [u8],
}

#[derive(Copy, Clone, Debug)]
pub struct SenderContext {
    pub sender_id: [u8; MAX_KID_LEN],
    pub sender_id_len: usize,
    pub sender_key: [u8; AES_CCM_KEY_LEN],
    pub ssn: u64,
    last_persisted_ssn: u64,
}

impl SenderContext {
    pub fn sender_id(&self) -> &[u8] {
        &self.sender_id[..self.sender_id_len]
    }

    /// Returns the PIV to use for the next outgoing message and advances the SSN. Fails
    /// once the SSN reaches [OSCORE_SSN_OVERFLOW_VALUE]: per RFC 8613 §7.2.1 the Sender
    /// Context must not be used again, a new Security Context must be established instead.
    pub fn next_piv(&mut self, nvm: Option<&mut dyn NvmStore>) -> Result<u64, CoreError> {
        if self.ssn >= OSCORE_SSN_OVERFLOW_VALUE {
            return Err(CoreError::OscoreSsnOverflow);
        }
        let piv = self.ssn;
        self.ssn += 1;
        if let Some(nvm) = nvm {
            if self.ssn - self.last_persisted_ssn >= K_SSN_NVM_STORE_INTERVAL {
                nvm.write_ssn(self.ssn);
                self.last_persisted_ssn = self.ssn;
            }
        }
        Ok(piv)
    }

    /// Forces an immediate NVM write, used right before issuing an Echo challenge so a
    /// reboot mid-challenge can't replay the SSN that was about to be spent.
    pub fn persist_now(&mut self, nvm: &mut dyn NvmStore) {
        nvm.write_ssn(self.ssn);
        self.last_persisted_ssn = self.ssn;
    }
}

#[derive(Clone, Debug)]
pub struct RecipientContext {
    pub recipient_id: [u8; MAX_KID_LEN],
    pub recipient_id_len: usize,
    pub recipient_key: [u8; AES_CCM_KEY_LEN],
    pub replay: ReplayWindow,
    pub echo: EchoContext,
    pub notification_num: u64,
    pub notification_num_initialized: bool,
}

impl RecipientContext {
    pub fn recipient_id(&self) -> &[u8] {
        &self.recipient_id[..self.recipient_id_len]
    }

    /// Client-side replay protection for Observe notifications (RFC 8613 §7.4.1): the PIV
    /// must strictly increase from one notification to the next for a given Recipient
    /// Context. The first notification received always initializes the counter.
    pub fn check_notification_piv(&mut self, piv: u64) -> Result<(), CoreError> {
        if !self.notification_num_initialized {
            self.notification_num = piv;
            self.notification_num_initialized = true;
            return Ok(());
        }
        if piv <= self.notification_num {
            return Err(CoreError::OscoreReplayNotificationProtectionError);
        }
        self.notification_num = piv;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct SecurityContext {
    pub common_iv: [u8; AES_CCM_IV_LEN],
    pub id_context: [u8; MAX_KID_CONTEXT_LEN],
    pub id_context_len: usize,
    pub sender: SenderContext,
    pub recipient: RecipientContext,
}

impl SecurityContext {
    pub fn id_context(&self) -> Option<&[u8]> {
        if self.id_context_len > 0 {
            Some(&self.id_context[..self.id_context_len])
        } else {
            None
        }
    }
}

/// RFC 8613 §3.2's `info` structure: `[ id, id_context, alg_aead, type, L ]`, CBOR-encoded,
/// fed to HKDF-Expand. `id` is empty for the Common IV.
fn encode_oscore_info(
    id: &[u8],
    id_context: Option<&[u8]>,
    out_type: &str,
    length: usize,
) -> Result<EdhocMessageBuffer, CoreError> {
    let mut out = EdhocMessageBuffer::new();
    out.push(0x85).map_err(|_| CoreError::CborEncodingError)?; // array(5)
    push_bstr(&mut out, id)?;
    push_bstr(&mut out, id_context.unwrap_or(&[]))?;
    out.push(0x0A).map_err(|_| CoreError::CborEncodingError)?; // AES-CCM-16-64-128 = 10
    push_tstr(&mut out, out_type.as_bytes())?;
    if length < 24 {
        out.push(length as u8).map_err(|_| CoreError::CborEncodingError)?;
    } else {
        out.push(0x18).map_err(|_| CoreError::CborEncodingError)?;
        out.push(length as u8).map_err(|_| CoreError::CborEncodingError)?;
    }
    Ok(out)
}

/// Derives a full Security Context from `params` via HKDF, per RFC 8613 §3.2.1. `fresh`
/// marks a context coming straight out of an EDHOC exchange (SSN starts at 0, no NVM
/// lookup needed); pass `false` plus a populated `nvm` for contexts recovered after a
/// restart, whose SSN must resume past whatever might not have been persisted.
pub fn context_init<Crypto: edhoc_shared::Crypto>(
    crypto: &mut Crypto,
    params: &OscoreInitParams<'_>,
    fresh: bool,
    nvm: Option<&mut dyn NvmStore>,
) -> Result<SecurityContext, CoreError> {
    if params.sender_id.len() > MAX_KID_LEN || params.recipient_id.len() > MAX_KID_LEN {
        return Err(CoreError::OscoreInvalidOptionLen);
    }
    if let Some(ctx) = params.id_context {
        if ctx.len() > MAX_KID_CONTEXT_LEN {
            return Err(CoreError::OscoreInvalidOptionLen);
        }
    }

    let mut salt = BytesHashLen::default();
    let salt_len = params.master_salt.len().min(salt.len());
    salt[..salt_len].copy_from_slice(&params.master_salt[..salt_len]);
    let prk = crypto.hkdf_extract(&salt, params.master_secret);

    let sender_info = encode_oscore_info(params.sender_id, params.id_context, "Key", AES_CCM_KEY_LEN)?;
    let sender_key_buf = crypto.hkdf_expand(&prk, sender_info.as_slice(), AES_CCM_KEY_LEN);
    let mut sender_key = [0u8; AES_CCM_KEY_LEN];
    sender_key.copy_from_slice(&sender_key_buf[..AES_CCM_KEY_LEN]);

    let recipient_info = encode_oscore_info(params.recipient_id, params.id_context, "Key", AES_CCM_KEY_LEN)?;
    let recipient_key_buf = crypto.hkdf_expand(&prk, recipient_info.as_slice(), AES_CCM_KEY_LEN);
    let mut recipient_key = [0u8; AES_CCM_KEY_LEN];
    recipient_key.copy_from_slice(&recipient_key_buf[..AES_CCM_KEY_LEN]);

    let iv_info = encode_oscore_info(&[], params.id_context, "IV", AES_CCM_IV_LEN)?;
    let iv_buf = crypto.hkdf_expand(&prk, iv_info.as_slice(), AES_CCM_IV_LEN);
    let mut common_iv = [0u8; AES_CCM_IV_LEN];
    common_iv.copy_from_slice(&iv_buf[..AES_CCM_IV_LEN]);

    let mut sender_id = [0u8; MAX_KID_LEN];
    sender_id[..params.sender_id.len()].copy_from_slice(params.sender_id);
    let mut recipient_id = [0u8; MAX_KID_LEN];
    recipient_id[..params.recipient_id.len()].copy_from_slice(params.recipient_id);

    let ssn = if fresh {
        0
    } else {
        let stored = nvm.and_then(|n| n.read_ssn()).unwrap_or(0);
        stored + K_SSN_NVM_STORE_INTERVAL + F_NVM_MAX_WRITE_FAILURE
    };

    let mut id_context = [0u8; MAX_KID_CONTEXT_LEN];
    let id_context_len = params.id_context.map(|c| c.len()).unwrap_or(0);
    if let Some(c) = params.id_context {
        id_context[..c.len()].copy_from_slice(c);
    }

    Ok(SecurityContext {
        common_iv,
        id_context,
        id_context_len,
        sender: SenderContext {
            sender_id,
            sender_id_len: params.sender_id.len(),
            sender_key,
            ssn,
            last_persisted_ssn: ssn,
        },
        recipient: RecipientContext {
            recipient_id,
            recipient_id_len: params.recipient_id.len(),
            recipient_key,
            replay: ReplayWindow::new(),
            echo: if fresh { EchoContext::fresh() } else { EchoContext::from_reboot() },
            notification_num: 0,
            notification_num_initialized: false,
        },
    })
}

/// Derives the AEAD nonce for `piv` under `id` (RFC 8613 §5.2): the Partial IV, right-
/// aligned and zero-padded, concatenated with the ID's length byte and zero-padded ID,
/// all XORed with the Common IV.
pub fn compute_nonce(id: &[u8], piv: u64, common_iv: &[u8; AES_CCM_IV_LEN]) -> [u8; AES_CCM_IV_LEN] {
    debug_assert!(id.len() <= AES_CCM_IV_LEN - 6, "Sender/Recipient ID too long for the nonce layout");
    let mut buf = [0u8; AES_CCM_IV_LEN];
    buf[0] = id.len() as u8;
    let id_start = AES_CCM_IV_LEN - 6 - id.len();
    buf[id_start..AES_CCM_IV_LEN - 6].copy_from_slice(id);
    let piv_bytes = piv.to_be_bytes();
    buf[AES_CCM_IV_LEN - 5..].copy_from_slice(&piv_bytes[3..]);

    let mut nonce = [0u8; AES_CCM_IV_LEN];
    for i in 0..AES_CCM_IV_LEN {
        nonce[i] = buf[i] ^ common_iv[i];
    }
    nonce
}

#[cfg(test)]
mod test {
    use super::*;
    use edhoc_crypto::RustCryptoBackend as TestCrypto;

    #[test]
    fn test_context_init_and_nonce() {
        let mut crypto = TestCrypto::new();
        let params = OscoreInitParams {
            master_secret: &[0x01; 16],
            master_salt: &[0x02; 8],
            id_context: None,
            sender_id: &[0x00],
            recipient_id: &[0x01],
        };
        let ctx = context_init(&mut crypto, &params, true, None).unwrap();
        assert_ne!(ctx.sender.sender_key, ctx.recipient.recipient_key);

        let n1 = compute_nonce(ctx.sender.sender_id(), 0, &ctx.common_iv);
        let n2 = compute_nonce(ctx.sender.sender_id(), 1, &ctx.common_iv);
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_sender_piv_overflow() {
        let mut crypto = TestCrypto::new();
        let params = OscoreInitParams {
            master_secret: &[0x01; 16],
            master_salt: &[0x02; 8],
            id_context: None,
            sender_id: &[0x00],
            recipient_id: &[0x01],
        };
        let mut ctx = context_init(&mut crypto, &params, true, None).unwrap();
        ctx.sender.ssn = OSCORE_SSN_OVERFLOW_VALUE;
        assert_eq!(
            ctx.sender.next_piv(None).unwrap_err(),
            CoreError::OscoreSsnOverflow
        );
    }
}
