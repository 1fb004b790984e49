//! Encoders for the small set of COSE structures EDHOC and OSCORE build AEAD/signature
//! input from: the `Encrypt0` `enc_structure` (RFC 9052 §5.3) and the `Signature1`
//! `Sig_structure` (RFC 9052 §4.4), both specialised the way RFC 9528 and RFC 8613 use them.

use super::*;

const SIGNATURE1_CONTEXT: &[u8] = b"Signature1";
const ENCRYPT0_CONTEXT: &[u8] = b"Encrypt0";

/// Pushes a CBOR byte-string header (major type 2) for a value of length `len`.
pub fn push_bstr_header(out: &mut EdhocMessageBuffer, len: usize) -> Result<(), CoreError> {
    if len < 24 {
        out.push(len as u8 | CBOR_MAJOR_BYTE_STRING)
    } else if len < 256 {
        out.push(CBOR_BYTE_STRING)
            .and_then(|_| out.push(len as u8))
    } else {
        Err(MessageBufferError::BufferAlreadyFull)
    }
    .map_err(|_| CoreError::CborEncodingError)
}

/// Pushes a complete CBOR byte string.
pub fn push_bstr(out: &mut EdhocMessageBuffer, value: &[u8]) -> Result<(), CoreError> {
    push_bstr_header(out, value.len())?;
    out.extend_from_slice(value)
        .map_err(|_| CoreError::CborEncodingError)
}

/// Pushes a complete CBOR text string shorter than 24 bytes (the only length this workspace
/// ever needs to emit: "Signature1"/"Encrypt0").
pub fn push_tstr(out: &mut EdhocMessageBuffer, value: &[u8]) -> Result<(), CoreError> {
    if value.len() >= 24 {
        return Err(CoreError::CborEncodingError);
    }
    out.push(value.len() as u8 | CBOR_MAJOR_TEXT_STRING)
        .map_err(|_| CoreError::CborEncodingError)?;
    out.extend_from_slice(value)
        .map_err(|_| CoreError::CborEncodingError)
}

/// Pushes a CBOR array header for an array shorter than 24 elements.
pub fn push_array_header(out: &mut EdhocMessageBuffer, len: usize) -> Result<(), CoreError> {
    if len >= 24 {
        return Err(CoreError::CborEncodingError);
    }
    out.push(len as u8 | CBOR_MAJOR_ARRAY)
        .map_err(|_| CoreError::CborEncodingError)
}

/// Pushes a CBOR map header for a map with fewer than 24 entries.
pub fn push_map_header(out: &mut EdhocMessageBuffer, len: usize) -> Result<(), CoreError> {
    if len >= 24 {
        return Err(CoreError::CborEncodingError);
    }
    out.push(len as u8 | CBOR_MAJOR_MAP)
        .map_err(|_| CoreError::CborEncodingError)
}

/// Pushes a single-byte CBOR integer in `-24..=23` (connection identifiers, EAD labels, and
/// other small values this workspace only ever encodes in that range).
pub fn push_int(out: &mut EdhocMessageBuffer, value: i8) -> Result<(), CoreError> {
    let byte = if value >= 0 {
        value as u8
    } else {
        CBOR_NEG_INT_1BYTE_START - 1 + value.unsigned_abs()
    };
    out.push(byte).map_err(|_| CoreError::CborEncodingError)
}

/// Pushes a CBOR unsigned integer in `0..=255`, using the one-byte-extended `0x18` form for
/// values that don't fit a single byte. Used for `ID_CRED_x` map keys (COSE header labels up
/// to 55: `x5chain`=33, `c5u`=55, ...), which [push_int]'s `-24..=23` range doesn't cover.
pub fn push_uint(out: &mut EdhocMessageBuffer, value: u8) -> Result<(), CoreError> {
    if value <= 0x17 {
        out.push(value).map_err(|_| CoreError::CborEncodingError)
    } else {
        out.push(CBOR_UINT_1BYTE)
            .and_then(|_| out.push(value))
            .map_err(|_| CoreError::CborEncodingError)
    }
}

/// Builds the three-element `Encrypt0` `enc_structure` with an empty protected header:
/// `[ "Encrypt0", h'', external_aad ]`. Used verbatim by EDHOC's CIPHERTEXT_3/CIPHERTEXT_4
/// AAD and, with a different `external_aad`, by OSCORE's AEAD AAD.
pub fn encode_enc_structure(external_aad: &[u8]) -> Result<EdhocMessageBuffer, CoreError> {
    let mut out = EdhocMessageBuffer::new();
    push_array_header(&mut out, 3)?;
    push_tstr(&mut out, ENCRYPT0_CONTEXT)?;
    push_bstr(&mut out, &[])?;
    push_bstr(&mut out, external_aad)?;
    Ok(out)
}

/// Builds the four-element EDHOC `Sig_structure`:
/// `[ "Signature1", ID_CRED, bstr(TH) || CRED || EAD, MAC_i ]`.
///
/// Note this departs from a generic COSE `Sig_structure` (whose third field, `external_aad`,
/// would itself be the encoded bstr): RFC 9528 folds `TH`, `CRED`, and `EAD` together into
/// one byte string rather than CBOR-encoding them individually.
pub fn encode_sig_structure(
    id_cred: &[u8],
    th: &BytesHashLen,
    cred: &[u8],
    ead: Option<&[u8]>,
    mac: &[u8],
) -> Result<EdhocMessageBuffer, CoreError> {
    let mut external_aad = EdhocMessageBuffer::new();
    push_bstr(&mut external_aad, th)?;
    external_aad
        .extend_from_slice(cred)
        .map_err(|_| CoreError::CborEncodingError)?;
    if let Some(ead) = ead {
        external_aad
            .extend_from_slice(ead)
            .map_err(|_| CoreError::CborEncodingError)?;
    }

    let mut out = EdhocMessageBuffer::new();
    push_array_header(&mut out, 4)?;
    push_tstr(&mut out, SIGNATURE1_CONTEXT)?;
    out.extend_from_slice(id_cred)
        .map_err(|_| CoreError::CborEncodingError)?;
    push_bstr(&mut out, external_aad.as_slice())?;
    push_bstr(&mut out, mac)?;
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_encode_enc_structure() {
        let th = [0x11u8; 32];
        let enc = encode_enc_structure(&th).unwrap();
        // ["Encrypt0", h'', bstr(th)] -- array(3), tstr("Encrypt0"), bstr(empty), bstr(32)
        assert_eq!(enc.content[0], 0x83);
        assert_eq!(enc.content[1], 0x68); // tstr len 8
        assert_eq!(&enc.content[2..10], b"Encrypt0");
        assert_eq!(enc.content[10], 0x40); // empty bstr
        assert_eq!(enc.content[11], 0x58); // bstr, 1-byte length follows
        assert_eq!(enc.content[12], 32);
    }
}
