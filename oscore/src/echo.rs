//! Server-side freshness state machine for RFC 9175 (Echo) challenges, used to re-establish
//! replay protection after a reboot wipes the replay window but the Security Context itself
//! (derived from EDHOC or provisioned out of band) survives.

use crate::replay::ReplayWindow;

pub const ECHO_VALUE_LEN: usize = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EchoState {
    /// Context loaded from persistent storage after a restart; the replay window is not
    /// trustworthy until a challenge round-trip confirms the peer is live and in sync.
    Reboot,
    /// A 4.01 Unauthorized + Echo challenge has been sent; waiting for the peer to echo it
    /// back before trusting any PIV.
    Verify,
    /// Replay window is live and enforced normally.
    Synchronized,
}

#[derive(Clone, Debug)]
pub struct EchoContext {
    pub state: EchoState,
    challenge: [u8; ECHO_VALUE_LEN],
}

impl EchoContext {
    /// A context derived fresh (e.g. straight out of EDHOC) starts `Synchronized`: there is
    /// no stale replay window to distrust.
    pub fn fresh() -> Self {
        EchoContext {
            state: EchoState::Synchronized,
            challenge: [0u8; ECHO_VALUE_LEN],
        }
    }

    /// A context recovered from NVM after a restart starts in `Reboot`.
    pub fn from_reboot() -> Self {
        EchoContext {
            state: EchoState::Reboot,
            challenge: [0u8; ECHO_VALUE_LEN],
        }
    }

    /// Call when in `Reboot` state and a request's AEAD tag has verified: the caller should
    /// reject the request with 4.01+Echo and transition here before replying.
    pub fn begin_challenge(&mut self, challenge: &[u8; ECHO_VALUE_LEN]) {
        self.challenge = *challenge;
        self.state = EchoState::Verify;
    }

    /// Call when in `Verify` state and a new request's AEAD tag has verified: checks whether
    /// its Echo option matches the outstanding challenge. On match, re-synchronizes the
    /// replay window around the request's PIV and transitions to `Synchronized`; the request
    /// itself is accepted without a further replay check (the matching Echo already proves
    /// freshness). On mismatch, state is left unchanged and the caller must reject.
    pub fn verify_echo(&mut self, echo_option: &[u8], piv: u64, window: &mut ReplayWindow) -> bool {
        if echo_option != self.challenge {
            return false;
        }
        window.reinit(piv);
        self.state = EchoState::Synchronized;
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reboot_to_synchronized_flow() {
        let mut ctx = EchoContext::from_reboot();
        assert_eq!(ctx.state, EchoState::Reboot);

        let challenge = [0x11u8; ECHO_VALUE_LEN];
        ctx.begin_challenge(&challenge);
        assert_eq!(ctx.state, EchoState::Verify);

        let mut window = ReplayWindow::new();
        assert!(ctx.verify_echo(&challenge, 42, &mut window));
        assert_eq!(ctx.state, EchoState::Synchronized);
        assert!(!window.is_valid(42));
        assert!(window.is_valid(43));
    }

    #[test]
    fn test_echo_mismatch_stays_in_verify() {
        let mut ctx = EchoContext::from_reboot();
        let challenge = [0x22u8; ECHO_VALUE_LEN];
        ctx.begin_challenge(&challenge);

        let mut window = ReplayWindow::new();
        assert!(!ctx.verify_echo(&[0x00u8; ECHO_VALUE_LEN], 1, &mut window));
        assert_eq!(ctx.state, EchoState::Verify);
    }
}
