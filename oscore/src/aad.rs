//! AAD assembly for the OSCORE AEAD transform (RFC 8613 §5.4): builds `external_aad` and
//! wraps it in a COSE `Encrypt0` enc_structure, reusing the same CBOR helper EDHOC uses for
//! its own `Enc_structure`s.

use edhoc_shared::{encode_enc_structure, push_array_header, push_bstr, CoreError, EdhocMessageBuffer};

/// AEAD algorithm identifier for AES-CCM-16-64-128 (COSE registry value 10).
const ALG_AEAD_AES_CCM_16_64_128: i8 = 10;

/// Builds `external_aad = [ oscore_version, [ alg_aead ], request_kid, request_piv, options ]`
/// per RFC 8613 §5.4. `options` is always empty in this implementation since no Class I
/// options are defined; kept as a parameter so intent stays visible at the call site.
pub fn encode_external_aad(request_kid: &[u8], request_piv: &[u8], options: &[u8]) -> Result<EdhocMessageBuffer, CoreError> {
    let mut out = EdhocMessageBuffer::new();
    push_array_header(&mut out, 5)?;
    out.push(1).map_err(|_| CoreError::CborEncodingError)?; // oscore_version = 1
    push_array_header(&mut out, 1)?;
    out.push(ALG_AEAD_AES_CCM_16_64_128 as u8)
        .map_err(|_| CoreError::CborEncodingError)?;
    push_bstr(&mut out, request_kid)?;
    push_bstr(&mut out, request_piv)?;
    push_bstr(&mut out, options)?;
    Ok(out)
}

/// Wraps `external_aad` in the `Encrypt0` enc_structure the AEAD actually authenticates.
pub fn encode_aad(request_kid: &[u8], request_piv: &[u8]) -> Result<EdhocMessageBuffer, CoreError> {
    let external_aad = encode_external_aad(request_kid, request_piv, &[])?;
    encode_enc_structure(external_aad.as_slice())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_aad_is_deterministic_and_varies_with_piv() {
        let a = encode_aad(&[0x01], &[0x00]).unwrap();
        let b = encode_aad(&[0x01], &[0x01]).unwrap();
        assert_ne!(a.as_slice(), b.as_slice());

        let a2 = encode_aad(&[0x01], &[0x00]).unwrap();
        assert_eq!(a.as_slice(), a2.as_slice());
    }
}
