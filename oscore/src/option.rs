//! The OSCORE option value itself (RFC 8613 §6.1): a flag byte plus an optional PIV,
//! KID Context, and KID, carried as the value of CoAP option number 9.

use edhoc_shared::CoreError;

pub const MAX_PIV_LEN: usize = 5;
/// RFC 8613's nonce layout (§5.2) reserves `nonce_length - 6` bytes for the Sender/Recipient
/// ID; with a 13-byte AES-CCM-16-64-128 nonce that's 7 bytes.
pub const MAX_KID_LEN: usize = 7;
pub const MAX_KID_CONTEXT_LEN: usize = 16;

const FLAG_H: u8 = 0b0001_0000;
const FLAG_K: u8 = 0b0000_1000;
const FLAG_N_MASK: u8 = 0b0000_0111;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OscoreOption {
    pub piv: [u8; MAX_PIV_LEN],
    pub piv_len: usize,
    pub kid_context: [u8; MAX_KID_CONTEXT_LEN],
    pub kid_context_len: usize,
    pub kid: [u8; MAX_KID_LEN],
    pub kid_len: usize,
    pub kid_present: bool,
}

impl OscoreOption {
    pub fn piv(&self) -> &[u8] {
        &self.piv[..self.piv_len]
    }

    pub fn kid(&self) -> Option<&[u8]> {
        if self.kid_present {
            Some(&self.kid[..self.kid_len])
        } else {
            None
        }
    }

    pub fn kid_context(&self) -> Option<&[u8]> {
        if self.kid_context_len > 0 {
            Some(&self.kid_context[..self.kid_context_len])
        } else {
            None
        }
    }
}

/// Encodes `piv` as the shortest big-endian byte string that represents it (RFC 8613's
/// Partial IV encoding) — zero itself is one byte (`0x00`), not an empty string; "no PIV at
/// all" is represented separately via `n = 0` in the flag byte.
pub fn piv_to_bytes(piv: u64) -> ([u8; MAX_PIV_LEN], usize) {
    let full = piv.to_be_bytes();
    let mut start = 0;
    while start < 7 && full[start] == 0 {
        start += 1;
    }
    let len = (8 - start).min(MAX_PIV_LEN);
    let mut out = [0u8; MAX_PIV_LEN];
    out[..len].copy_from_slice(&full[8 - len..]);
    (out, len)
}

/// Builds the OSCORE option value for an outbound request (always carries a PIV; carries a
/// KID, and on the first request in a new security context pair also a KID Context).
pub fn encode_request_option(piv: &[u8], kid: &[u8], kid_context: Option<&[u8]>) -> Result<[u8; 1 + MAX_KID_CONTEXT_LEN + 1 + MAX_PIV_LEN + MAX_KID_LEN], CoreError> {
    encode(piv, Some(kid), kid_context)
}

/// Builds the OSCORE option value for an outbound response. Responses never carry a KID or
/// KID Context; the PIV itself is present only when the response establishes a fresh nonce
/// (in practice: always, by this implementation's policy of deriving a response nonce from
/// the response's own PIV rather than reusing the request's).
pub fn encode_response_option(piv: &[u8]) -> Result<[u8; 1 + MAX_KID_CONTEXT_LEN + 1 + MAX_PIV_LEN + MAX_KID_LEN], CoreError> {
    encode(piv, None, None)
}

fn encode(
    piv: &[u8],
    kid: Option<&[u8]>,
    kid_context: Option<&[u8]>,
) -> Result<[u8; 1 + MAX_KID_CONTEXT_LEN + 1 + MAX_PIV_LEN + MAX_KID_LEN], CoreError> {
    if piv.len() > MAX_PIV_LEN {
        return Err(CoreError::OscoreInvalidPiv);
    }
    let mut out = [0u8; 1 + MAX_KID_CONTEXT_LEN + 1 + MAX_PIV_LEN + MAX_KID_LEN];
    let mut pos = 1;
    let mut flags = 0u8;

    if !piv.is_empty() {
        flags |= piv.len() as u8 & FLAG_N_MASK;
        out[pos..pos + piv.len()].copy_from_slice(piv);
        pos += piv.len();
    }

    if let Some(ctx) = kid_context {
        if ctx.len() > MAX_KID_CONTEXT_LEN {
            return Err(CoreError::OscoreInvalidOptionLen);
        }
        flags |= FLAG_H;
        out[pos] = ctx.len() as u8;
        pos += 1;
        out[pos..pos + ctx.len()].copy_from_slice(ctx);
        pos += ctx.len();
    }

    if let Some(kid) = kid {
        if kid.len() > MAX_KID_LEN {
            return Err(CoreError::OscoreInvalidOptionLen);
        }
        flags |= FLAG_K;
        out[pos..pos + kid.len()].copy_from_slice(kid);
        pos += kid.len();
    }

    out[0] = flags;
    // Caller truncates to `pos` bytes; the rest is unused padding within the fixed array.
    let _ = pos;
    Ok(out)
}

/// As [encode_request_option]/[encode_response_option] but also returns the used length,
/// since both return a fixed-size array padded with zeros.
pub fn encode_option_len(piv: &[u8], kid: Option<&[u8]>, kid_context: Option<&[u8]>) -> usize {
    if piv.is_empty() && kid.is_none() && kid_context.is_none() {
        // the fully-empty option value (no flags byte even): RFC 8613's "no PIV, no KID, no
        // KID Context" case, which `decode` also special-cases for a zero-length slice.
        return 0;
    }
    let mut len = 1 + piv.len().min(MAX_PIV_LEN);
    if let Some(ctx) = kid_context {
        len += 1 + ctx.len();
    }
    if let Some(kid) = kid {
        len += kid.len();
    }
    len
}

/// Special case: an empty OSCORE option value (all of flags/PIV/KID/KID-Context absent) is
/// valid and means "no PIV, no KID, no KID Context" — used by outbound responses that don't
/// need to convey a PIV because the exchange is keyed purely by the request's Token.
pub fn decode(value: &[u8]) -> Result<OscoreOption, CoreError> {
    let mut opt = OscoreOption::default();
    if value.is_empty() {
        return Ok(opt);
    }

    let flags = value[0];
    let n = flags & FLAG_N_MASK;
    if n as usize > MAX_PIV_LEN {
        return Err(CoreError::OscoreInvalidPiv);
    }
    let mut pos = 1;

    if n > 0 {
        let piv = value.get(pos..pos + n as usize).ok_or(CoreError::OscoreInvalidOptionLen)?;
        opt.piv[..n as usize].copy_from_slice(piv);
        opt.piv_len = n as usize;
        pos += n as usize;
    }

    if flags & FLAG_H != 0 {
        let ctx_len = *value.get(pos).ok_or(CoreError::OscoreInvalidOptionLen)? as usize;
        pos += 1;
        if ctx_len > MAX_KID_CONTEXT_LEN {
            return Err(CoreError::OscoreInvalidOptionLen);
        }
        let ctx = value.get(pos..pos + ctx_len).ok_or(CoreError::OscoreInvalidOptionLen)?;
        opt.kid_context[..ctx_len].copy_from_slice(ctx);
        opt.kid_context_len = ctx_len;
        pos += ctx_len;
    }

    if flags & FLAG_K != 0 {
        let kid = value.get(pos..).ok_or(CoreError::OscoreInvalidOptionLen)?;
        if kid.len() > MAX_KID_LEN {
            return Err(CoreError::OscoreInvalidOptionLen);
        }
        opt.kid[..kid.len()].copy_from_slice(kid);
        opt.kid_len = kid.len();
        opt.kid_present = true;
    }

    Ok(opt)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_option_roundtrip_with_kid_context() {
        let piv = [0x05];
        let kid = [0xAA, 0xBB];
        let kid_context = [0x01, 0x02, 0x03];
        let buf = encode_request_option(&piv, &kid, Some(&kid_context)).unwrap();
        let len = encode_option_len(&piv, Some(&kid), Some(&kid_context));
        let decoded = decode(&buf[..len]).unwrap();
        assert_eq!(decoded.piv(), &piv);
        assert_eq!(decoded.kid(), Some(&kid[..]));
        assert_eq!(decoded.kid_context(), Some(&kid_context[..]));
    }

    #[test]
    fn test_response_option_no_kid() {
        let piv = [0x01];
        let buf = encode_response_option(&piv).unwrap();
        let len = encode_option_len(&piv, None, None);
        let decoded = decode(&buf[..len]).unwrap();
        assert_eq!(decoded.piv(), &piv);
        assert_eq!(decoded.kid(), None);
        assert_eq!(decoded.kid_context(), None);
    }

    #[test]
    fn test_piv_to_bytes_minimal_encoding() {
        assert_eq!(piv_to_bytes(0), ([0, 0, 0, 0, 0], 1));
        assert_eq!(piv_to_bytes(1).1, 1);
        assert_eq!(piv_to_bytes(256).1, 2);
    }

    #[test]
    fn test_empty_option_value() {
        let decoded = decode(&[]).unwrap();
        assert_eq!(decoded.piv(), &[] as &[u8]);
        assert_eq!(decoded.kid(), None);
    }
}
