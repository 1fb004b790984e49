//! Common data structures used by the [edhoc] and [oscore] crates.
//!
//! This crate is separate from both to avoid a dependency cycle between them: the EDHOC
//! exporter interface hands OSCORE its master secret and salt, while OSCORE borrows the
//! wire-format primitives (CBOR helpers, error type, fixed-size message buffer) that EDHOC
//! already defines. Keeping those primitives here lets both crates depend on a single
//! common base instead of on one another.
//!
//! [edhoc]: https://docs.rs/edhoc/
//! [oscore]: https://docs.rs/oscore/
#![cfg_attr(not(feature = "alloc-bindings"), no_std)]

pub use cbor_decoder::*;
pub use cose::*;
pub use error::*;

mod crypto;
pub use crypto::Crypto;

mod cred;
pub use cred::*;

mod error;
mod cose;

// NOTE: the buffer needs to accommodate the largest message we parse/emit. message_2/3 with
// a certificate chain credential and EAD items can grow past a kilobyte; pick a size with
// comfortable headroom rather than tuning per deployment.
pub const MAX_MESSAGE_SIZE_LEN: usize = 1024;

pub const ID_CRED_LEN: usize = 4;
pub const SUITES_LEN: usize = 9;
pub const MAX_SUITES_I_LEN: usize = 9;
pub const P256_ELEM_LEN: usize = 32;
pub const X25519_ELEM_LEN: usize = 32;
pub const ED25519_ELEM_LEN: usize = 32;
pub const SHA256_DIGEST_LEN: usize = 32;
pub const AES_CCM_KEY_LEN: usize = 16;
pub const AES_CCM_IV_LEN: usize = 13;
pub const AES_CCM_TAG_LEN: usize = 8;
pub const P256_SIGNATURE_LEN: usize = 64;
pub const ED25519_SIGNATURE_LEN: usize = 64;
pub const MAC_LENGTH_STATIC_DH: usize = 8;

pub const MAX_KDF_CONTEXT_LEN: usize = 400;
pub const MAX_KDF_LABEL_LEN: usize = 15; // for "KEYSTREAM_2"
pub const MAX_BUFFER_LEN: usize = 256;
pub const MAX_CRED_LEN: usize = 400;

pub const CBOR_BYTE_STRING: u8 = 0x58u8;
pub const CBOR_TEXT_STRING: u8 = 0x78u8;
pub const CBOR_UINT_1BYTE: u8 = 0x18u8;
pub const CBOR_NEG_INT_1BYTE_START: u8 = 0x20u8;
pub const CBOR_NEG_INT_1BYTE_END: u8 = 0x37u8;
pub const CBOR_UINT_1BYTE_START: u8 = 0x0u8;
pub const CBOR_UINT_1BYTE_END: u8 = 0x17u8;
pub const CBOR_MAJOR_TEXT_STRING: u8 = 0x60u8;
pub const CBOR_MAJOR_BYTE_STRING: u8 = 0x40u8;
pub const CBOR_MAJOR_BYTE_STRING_MAX: u8 = 0x57u8;
pub const CBOR_MAJOR_ARRAY: u8 = 0x80u8;
pub const CBOR_MAJOR_ARRAY_MAX: u8 = 0x97u8;
pub const CBOR_MAJOR_MAP: u8 = 0xA0u8;

pub const MAX_INFO_LEN: usize = 2 + SHA256_DIGEST_LEN + 1 + MAX_KDF_LABEL_LEN + 3 + MAX_KDF_CONTEXT_LEN + 3;
pub const ENC_STRUCTURE_LEN: usize = 8 + 5 + SHA256_DIGEST_LEN; // 8 for "Encrypt0"

pub const MAX_EAD_SIZE_LEN: usize = 64;

pub type BytesSuites = [u8; MAX_SUITES_I_LEN];
/// All cipher suite labels known to the suite registry, excluding the private-use range.
pub const EDHOC_SUITES: [u8; 3] = [0, 1, 2];

pub type BytesIdCred = [u8; ID_CRED_LEN];
pub type BufferPlaintext2 = EdhocMessageBuffer;
pub type BufferPlaintext3 = EdhocMessageBuffer;
pub type BufferMessage1 = EdhocMessageBuffer;
pub type BufferMessage3 = EdhocMessageBuffer;
pub type BufferMessage4 = EdhocMessageBuffer;
pub type BufferCiphertext2 = EdhocMessageBuffer;
pub type BufferCiphertext3 = EdhocMessageBuffer;
pub type BytesHashLen = [u8; SHA256_DIGEST_LEN];
pub type BytesP256ElemLen = [u8; P256_ELEM_LEN];
pub type BufferMessage2 = EdhocMessageBuffer;
pub type BytesMaxBuffer = [u8; MAX_BUFFER_LEN];
pub type BytesMaxContextBuffer = [u8; MAX_KDF_CONTEXT_LEN];
pub type BytesMaxInfoBuffer = [u8; MAX_INFO_LEN];
pub type BytesEncStructureLen = [u8; ENC_STRUCTURE_LEN];
pub type BytesMacStaticDh = [u8; MAC_LENGTH_STATIC_DH];
pub type EADMessageBuffer = EdhocMessageBuffer;

/// Labels used within the EDHOC-KDF, per RFC 9528 Table 5.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum KdfLabel {
    KeyStream2 = 0,
    Salt3e2m = 1,
    Mac2 = 2,
    K3 = 3,
    Iv3 = 4,
    Salt4e3m = 5,
    Mac3 = 6,
    PrkOut = 7,
    K4 = 8,
    Iv4 = 9,
    PrkExporter = 10,
    PrkOutUpdate = 11,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CredentialTransfer {
    ByReference,
    ByValue,
}

#[derive(PartialEq, Debug)]
#[repr(C)]
pub enum MessageBufferError {
    BufferAlreadyFull,
    SliceTooLong,
}

/// An owned, fixed-capacity byte buffer.
///
/// Used to represent the various EDHOC/OSCORE messages in both encrypted and decrypted
/// form, as well as other CBOR-encoded data items. Its maximum length is
/// [MAX_MESSAGE_SIZE_LEN].
#[derive(PartialEq, Debug, Copy, Clone)]
pub struct EdhocMessageBuffer {
    pub content: [u8; MAX_MESSAGE_SIZE_LEN],
    pub len: usize,
}

impl Default for EdhocMessageBuffer {
    fn default() -> Self {
        EdhocMessageBuffer {
            content: [0; MAX_MESSAGE_SIZE_LEN],
            len: 0,
        }
    }
}

impl EdhocMessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_from_slice(slice: &[u8]) -> Result<Self, MessageBufferError> {
        let mut buffer = Self::new();
        buffer.fill_with_slice(slice)?;
        Ok(buffer)
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.content.get(index).copied()
    }

    pub fn push(&mut self, item: u8) -> Result<(), MessageBufferError> {
        if self.len < self.content.len() {
            self.content[self.len] = item;
            self.len += 1;
            Ok(())
        } else {
            Err(MessageBufferError::BufferAlreadyFull)
        }
    }

    pub fn get_slice(&self, start: usize, len: usize) -> Option<&[u8]> {
        self.content.get(start..start + len)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.content[0..self.len]
    }

    pub fn fill_with_slice(&mut self, slice: &[u8]) -> Result<(), MessageBufferError> {
        if slice.len() <= self.content.len() {
            self.len = slice.len();
            self.content[..self.len].copy_from_slice(slice);
            Ok(())
        } else {
            Err(MessageBufferError::SliceTooLong)
        }
    }

    pub fn extend_from_slice(&mut self, slice: &[u8]) -> Result<(), MessageBufferError> {
        if self.len + slice.len() <= self.content.len() {
            self.content[self.len..self.len + slice.len()].copy_from_slice(slice);
            self.len += slice.len();
            Ok(())
        } else {
            Err(MessageBufferError::SliceTooLong)
        }
    }

    #[cfg(any(test, feature = "alloc-bindings"))]
    pub fn from_hex(hex: &str) -> Self {
        let mut buffer = EdhocMessageBuffer::new();
        buffer.len = hex.len() / 2;
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let chunk_str = core::str::from_utf8(chunk).unwrap();
            buffer.content[i] = u8::from_str_radix(chunk_str, 16).unwrap();
        }
        buffer
    }
}

impl TryFrom<&[u8]> for EdhocMessageBuffer {
    type Error = MessageBufferError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        Self::new_from_slice(slice)
    }
}

/// A parsed external authorization data (EAD) item (RFC 9528 §3.8).
#[derive(Clone, Debug)]
pub struct EADItem {
    pub label: u8,
    pub is_critical: bool,
    pub value: Option<EdhocMessageBuffer>,
}

impl EADItem {
    pub fn new() -> Self {
        EADItem {
            label: 0,
            is_critical: false,
            value: None,
        }
    }
}

impl Default for EADItem {
    fn default() -> Self {
        Self::new()
    }
}

/// The compact form of an `ID_CRED_x` map: either a bare `kid` or a full by-value
/// credential identifier (`x5chain`, `x5t`, `c5c`, `c5t`, ...).
#[derive(Debug, Clone, Copy)]
pub enum IdCred<'a> {
    CompactKid(u8),
    FullCredential(&'a [u8]),
}

mod helpers {
    use super::*;

    /// Builds `info = (label: uint, context: bstr, length: uint)` as a CBOR sequence, per
    /// RFC 9528 §4.3.1.
    pub fn encode_info(
        label: u8,
        context: &[u8],
        length: usize,
    ) -> (BytesMaxInfoBuffer, usize) {
        let mut info: BytesMaxInfoBuffer = [0x00; MAX_INFO_LEN];
        let context_len = context.len();

        info[0] = label;
        let mut info_len = if context_len < 24 {
            info[1] = context_len as u8 | CBOR_MAJOR_BYTE_STRING;
            info[2..2 + context_len].copy_from_slice(context);
            2 + context_len
        } else {
            info[1] = CBOR_BYTE_STRING;
            info[2] = context_len as u8;
            info[3..3 + context_len].copy_from_slice(context);
            3 + context_len
        };

        info_len = if length < 24 {
            info[info_len] = length as u8;
            info_len + 1
        } else {
            info[info_len] = CBOR_UINT_1BYTE;
            info[info_len + 1] = length as u8;
            info_len + 2
        };

        (info, info_len)
    }
}
pub use helpers::*;

mod edhoc_parser {
    use super::*;

    /// Parses a CBOR-sequence-encoded EAD item: `label: int, ? value: bstr`.
    pub fn parse_ead(buffer: &[u8]) -> Result<Option<EADItem>, CoreError> {
        if let Some((&label, tail)) = buffer.split_first() {
            let (label, is_critical) = if CBORDecoder::is_u8(label) {
                (label, false)
            } else if CBORDecoder::is_i8(label) {
                (label - (CBOR_NEG_INT_1BYTE_START - 1), true)
            } else {
                return Err(CoreError::CborDecodingError);
            };

            let ead_value = if !tail.is_empty() {
                let mut buffer = EdhocMessageBuffer::new();
                buffer
                    .fill_with_slice(tail)
                    .map_err(|_| CoreError::CborDecodingError)?;
                Some(buffer)
            } else {
                None
            };

            Ok(Some(EADItem {
                label,
                is_critical,
                value: ead_value,
            }))
        } else {
            Err(CoreError::CborDecodingError)
        }
    }

    pub fn parse_suites_i(
        mut decoder: CBORDecoder,
    ) -> Result<(BytesSuites, usize, CBORDecoder), CoreError> {
        let mut suites_i: BytesSuites = Default::default();
        let curr = decoder.current()?;
        if CBOR_UINT_1BYTE_START == CBORDecoder::type_of(curr) {
            suites_i[0] = decoder.u8()?;
            Ok((suites_i, 1, decoder))
        } else if CBOR_MAJOR_ARRAY == CBORDecoder::type_of(curr) && CBORDecoder::info_of(curr) >= 2 {
            // NOTE: arrays must be at least 2 items long, otherwise the compact encoding
            // (a bare int) must be used.
            let suites_i_len = decoder.array()?;
            if suites_i_len == 0 || suites_i_len > suites_i.len() {
                return Err(CoreError::SuitesIListTooLong);
            }
            for slot in suites_i.iter_mut().take(suites_i_len) {
                *slot = decoder.u8()?;
            }
            Ok((suites_i, suites_i_len, decoder))
        } else {
            Err(CoreError::CborDecodingError)
        }
    }

    pub fn parse_message_1(
        rcvd_message_1: &BufferMessage1,
    ) -> Result<(u8, BytesSuites, usize, BytesP256ElemLen, u8, Option<EADItem>), CoreError> {
        let mut decoder = CBORDecoder::new(rcvd_message_1.as_slice());
        let method = decoder.u8()?;

        let (suites_i, suites_i_len, mut decoder) = parse_suites_i(decoder)?;

        let mut g_x: BytesP256ElemLen = [0x00; P256_ELEM_LEN];
        g_x.copy_from_slice(decoder.bytes_sized(P256_ELEM_LEN)?);

        // consume C_I encoded as a single-byte int (bstr-encoded connection identifiers are
        // not supported by this implementation)
        let c_i = decoder.int_raw()?;

        if rcvd_message_1.len > decoder.position() {
            let ead_1 = parse_ead(decoder.remaining_buffer()?)?;
            Ok((method, suites_i, suites_i_len, g_x, c_i, ead_1))
        } else if decoder.finished() {
            Ok((method, suites_i, suites_i_len, g_x, c_i, None))
        } else {
            Err(CoreError::CborDecodingError)
        }
    }

    /// Parses the cleartext of message_2: `(bstr(G_Y || CIPHERTEXT_2), C_R)` — a CBOR
    /// sequence of two items, `C_R` encoded as a raw single-byte int exactly like `C_I` in
    /// message_1, so the Initiator has it before decrypting `CIPHERTEXT_2` (needed to
    /// compute `TH_2`, which folds in `C_R`).
    pub fn parse_message_2(
        rcvd_message_2: &BufferMessage2,
    ) -> Result<(BytesP256ElemLen, BufferCiphertext2, u8), CoreError> {
        let mut ciphertext_2: BufferCiphertext2 = BufferCiphertext2::new();
        let mut decoder = CBORDecoder::new(rcvd_message_2.as_slice());

        let decoded = decoder.bytes()?;
        let key = decoded
            .get(0..P256_ELEM_LEN)
            .ok_or(CoreError::CborDecodingError)?;
        let mut g_y: BytesP256ElemLen = [0x00; P256_ELEM_LEN];
        g_y.copy_from_slice(key);
        let c2 = decoded
            .get(P256_ELEM_LEN..)
            .ok_or(CoreError::CborDecodingError)?;
        ciphertext_2
            .fill_with_slice(c2)
            .map_err(|_| CoreError::CborDecodingError)?;

        let c_r = decoder.int_raw()?;
        if !decoder.finished() {
            return Err(CoreError::CborDecodingError);
        }
        Ok((g_y, ciphertext_2, c_r))
    }

    /// Splits PLAINTEXT_2 into `(ID_CRED_R compact, SIGNATURE_or_MAC_2, ? EAD_2)`.
    pub fn decode_plaintext_2(
        plaintext_2: &BufferCiphertext2,
    ) -> Result<(IdCred, EdhocMessageBuffer, Option<EADItem>), CoreError> {
        let mut decoder = CBORDecoder::new(plaintext_2.as_slice());

        let id_cred_r = decode_compact_id_cred(&mut decoder)?;
        let sig_or_mac = decoder.bytes()?;
        let mut sig_or_mac_buf = EdhocMessageBuffer::new();
        sig_or_mac_buf
            .fill_with_slice(sig_or_mac)
            .map_err(|_| CoreError::CborDecodingError)?;

        if plaintext_2.len > decoder.position() {
            let ead_2 = parse_ead(decoder.remaining_buffer()?)?;
            Ok((id_cred_r, sig_or_mac_buf, ead_2))
        } else if decoder.finished() {
            Ok((id_cred_r, sig_or_mac_buf, None))
        } else {
            Err(CoreError::CborDecodingError)
        }
    }

    /// Splits PLAINTEXT_3 into `(ID_CRED_I compact, SIGNATURE_or_MAC_3, ? EAD_3)`.
    pub fn decode_plaintext_3(
        plaintext_3: &BufferPlaintext3,
    ) -> Result<(IdCred, EdhocMessageBuffer, Option<EADItem>), CoreError> {
        let mut decoder = CBORDecoder::new(plaintext_3.as_slice());

        let id_cred_i = decode_compact_id_cred(&mut decoder)?;
        let sig_or_mac = decoder.bytes()?;
        let mut sig_or_mac_buf = EdhocMessageBuffer::new();
        sig_or_mac_buf
            .fill_with_slice(sig_or_mac)
            .map_err(|_| CoreError::CborDecodingError)?;

        if plaintext_3.len > decoder.position() {
            let ead_3 = parse_ead(decoder.remaining_buffer()?)?;
            Ok((id_cred_i, sig_or_mac_buf, ead_3))
        } else if decoder.finished() {
            Ok((id_cred_i, sig_or_mac_buf, None))
        } else {
            Err(CoreError::CborDecodingError)
        }
    }

    /// Decodes an `ID_CRED_x` in its compact form: a bare int/bstr `kid`, or a one-entry
    /// CBOR map carrying `x5chain`/`x5t`/`x5bag`/`c5c`/`c5t`/`c5b`.
    fn decode_compact_id_cred<'a>(decoder: &mut CBORDecoder<'a>) -> Result<IdCred<'a>, CoreError> {
        let current = decoder.current()?;
        if CBORDecoder::type_of(current) == CBOR_MAJOR_MAP {
            // map with a single key: consume the map header, the key, and treat the value
            // as the full by-value credential identifier bytes.
            let map_len = decoder.map()?;
            if map_len != 1 {
                return Err(CoreError::CborDecodingError);
            }
            let _key = decoder.uint()?;
            Ok(IdCred::FullCredential(decoder.bytes()?))
        } else if CBOR_MAJOR_BYTE_STRING == CBORDecoder::type_of(current)
            && CBORDecoder::info_of(current) > 1
        {
            Ok(IdCred::FullCredential(decoder.bytes()?))
        } else {
            Ok(IdCred::CompactKid(decoder.int_raw()?))
        }
    }
}
pub use edhoc_parser::*;

mod cbor_decoder {
    //! A small forward-only CBOR decoder, inspired by the [minicbor](https://crates.io/crates/minicbor)
    //! crate, covering exactly the item shapes EDHOC and OSCORE need.
    use super::*;

    #[derive(Debug)]
    pub struct CBORDecoder<'a> {
        buf: &'a [u8],
        pos: usize,
    }

    impl<'a> CBORDecoder<'a> {
        pub fn new(bytes: &'a [u8]) -> Self {
            CBORDecoder { buf: bytes, pos: 0 }
        }

        fn read(&mut self) -> Result<u8, CoreError> {
            if let Some(b) = self.buf.get(self.pos) {
                self.pos += 1;
                Ok(*b)
            } else {
                Err(CoreError::CborDecodingError)
            }
        }

        fn read_slice(&mut self, n: usize) -> Result<&'a [u8], CoreError> {
            if let Some(b) = self
                .pos
                .checked_add(n)
                .and_then(|end| self.buf.get(self.pos..end))
            {
                self.pos += n;
                Ok(b)
            } else {
                Err(CoreError::CborDecodingError)
            }
        }

        pub fn position(&self) -> usize {
            self.pos
        }

        pub fn finished(&self) -> bool {
            self.pos == self.buf.len()
        }

        pub fn remaining_buffer(&self) -> Result<&'a [u8], CoreError> {
            self.buf.get(self.pos..).ok_or(CoreError::CborDecodingError)
        }

        pub fn current(&self) -> Result<u8, CoreError> {
            self.buf.get(self.pos).copied().ok_or(CoreError::CborDecodingError)
        }

        pub fn u8(&mut self) -> Result<u8, CoreError> {
            let n = self.read()?;
            if (0..=0x17).contains(&n) {
                Ok(n)
            } else if 0x18 == n {
                self.read()
            } else {
                Err(CoreError::CborDecodingError)
            }
        }

        pub fn i8(&mut self) -> Result<i8, CoreError> {
            let n = self.read()?;
            if (0..=0x17).contains(&n) {
                Ok(n as i8)
            } else if (0x20..=0x37).contains(&n) {
                Ok(-1 - (n - 0x20) as i8)
            } else if 0x18 == n {
                Ok(self.read()? as i8)
            } else if 0x38 == n {
                Ok(-1 - (self.read()? - 0x20) as i8)
            } else {
                Err(CoreError::CborDecodingError)
            }
        }

        /// Gets the raw byte of a single-byte positive or negative CBOR integer, without
        /// converting it to a signed value (used for C_I/C_R, which are carried around in
        /// their raw CBOR form).
        pub fn int_raw(&mut self) -> Result<u8, CoreError> {
            let n = self.read()?;
            if (0..=0x17).contains(&n) || (0x20..=0x37).contains(&n) {
                Ok(n)
            } else {
                Err(CoreError::CborDecodingError)
            }
        }

        /// Reads a CBOR unsigned integer (single byte, or the one-byte-extended `0x18`
        /// form) and returns its value, regardless of encoding width. Used for `ID_CRED_x`
        /// map keys (COSE header labels up to 55), which don't fit the `-24..=23` range
        /// [CBORDecoder::int_raw] preserves verbatim.
        pub fn uint(&mut self) -> Result<u8, CoreError> {
            let n = self.read()?;
            if (0..=0x17).contains(&n) {
                Ok(n)
            } else if CBOR_UINT_1BYTE == n {
                self.read()
            } else {
                Err(CoreError::CborDecodingError)
            }
        }

        pub fn str(&mut self) -> Result<&'a [u8], CoreError> {
            let b = self.read()?;
            if CBOR_MAJOR_TEXT_STRING != Self::type_of(b) || Self::info_of(b) == 31 {
                Err(CoreError::CborDecodingError)
            } else {
                let n = self.as_usize(Self::info_of(b))?;
                self.read_slice(n)
            }
        }

        pub fn bytes(&mut self) -> Result<&'a [u8], CoreError> {
            let b = self.read()?;
            if CBOR_MAJOR_BYTE_STRING != Self::type_of(b) || Self::info_of(b) == 31 {
                Err(CoreError::CborDecodingError)
            } else {
                let n = self.as_usize(Self::info_of(b))?;
                self.read_slice(n)
            }
        }

        pub fn bytes_sized(&mut self, expected_size: usize) -> Result<&'a [u8], CoreError> {
            let res = self.bytes()?;
            if res.len() == expected_size {
                Ok(res)
            } else {
                Err(CoreError::CborDecodingError)
            }
        }

        pub fn array(&mut self) -> Result<usize, CoreError> {
            let b = self.read()?;
            if CBOR_MAJOR_ARRAY != Self::type_of(b) {
                Err(CoreError::CborDecodingError)
            } else {
                match Self::info_of(b) {
                    31 => Err(CoreError::CborDecodingError), // no indefinite-length arrays
                    n => self.as_usize(n),
                }
            }
        }

        pub fn map(&mut self) -> Result<usize, CoreError> {
            let b = self.read()?;
            if CBOR_MAJOR_MAP != Self::type_of(b) {
                Err(CoreError::CborDecodingError)
            } else {
                match Self::info_of(b) {
                    31 => Err(CoreError::CborDecodingError),
                    n => self.as_usize(n),
                }
            }
        }

        pub fn as_usize(&mut self, b: u8) -> Result<usize, CoreError> {
            if (0..=0x17).contains(&b) {
                Ok(usize::from(b))
            } else if 0x18 == b {
                self.read().map(usize::from)
            } else if 0x19 == b {
                let hi = self.read()? as usize;
                let lo = self.read()? as usize;
                Ok((hi << 8) | lo)
            } else {
                Err(CoreError::CborDecodingError)
            }
        }

        pub fn type_of(b: u8) -> u8 {
            b & 0b111_00000
        }

        pub fn info_of(b: u8) -> u8 {
            b & 0b000_11111
        }

        pub fn is_u8(byte: u8) -> bool {
            (CBOR_UINT_1BYTE_START..=CBOR_UINT_1BYTE_END).contains(&byte)
        }

        pub fn is_i8(byte: u8) -> bool {
            (CBOR_NEG_INT_1BYTE_START..=CBOR_NEG_INT_1BYTE_END).contains(&byte)
        }
    }
}

#[cfg(test)]
mod test_cbor_decoder {
    use super::cbor_decoder::*;

    #[test]
    fn test_cbor_decoder() {
        // CBOR sequence: 1, -1, "hi", h'fefe'
        let input = [0x01, 0x20, 0x62, 0x68, 0x69, 0x42, 0xFE, 0xFE];
        let mut decoder = CBORDecoder::new(&input);

        assert_eq!(1, decoder.u8().unwrap());
        assert_eq!(-1, decoder.i8().unwrap());
        assert_eq!([0x68, 0x69], decoder.str().unwrap());
        assert_eq!([0xFE, 0xFE], decoder.bytes().unwrap());
    }

    #[test]
    fn test_map_single_entry() {
        // {4: h'0a'} -- ID_CRED with a kid entry
        let input = [0xA1, 0x04, 0x41, 0x0a];
        let mut decoder = CBORDecoder::new(&input);
        assert_eq!(1, decoder.map().unwrap());
        assert_eq!(4, decoder.int_raw().unwrap());
        assert_eq!([0x0a], decoder.bytes().unwrap());
    }
}
