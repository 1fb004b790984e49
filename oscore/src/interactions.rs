//! The interactions table (draft-ietf-core-oscore-capable-proxies-style bookkeeping folded
//! into RFC 8613 §8.4 guidance): a fixed-size record of in-flight Request/Registration/
//! Cancellation exchanges, keyed by (URI-path, request type) on the way out and by CoAP
//! Token on the way back in. A response or notification's AAD must use the *request's* PIV
//! and KID, never anything carried on the response itself, so this table is the only place
//! that data survives between `coap2oscore` and the matching `oscore2coap`.

use crate::config::{OSCORE_INTERACTIONS_COUNT, OSCORE_MAX_URI_PATH_LEN};
use crate::option::MAX_KID_LEN;
use edhoc_shared::CoreError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RequestType {
    Request,
    Registration,
    Cancellation,
}

#[derive(Copy, Clone, Debug)]
pub struct InteractionRecord {
    pub uri_path: [u8; OSCORE_MAX_URI_PATH_LEN],
    pub uri_path_len: usize,
    pub request_type: RequestType,
    pub token: [u8; 8],
    pub token_len: usize,
    pub piv: u64,
    pub kid: [u8; MAX_KID_LEN],
    pub kid_len: usize,
    pub in_use: bool,
}

impl InteractionRecord {
    const EMPTY: Self = InteractionRecord {
        uri_path: [0u8; OSCORE_MAX_URI_PATH_LEN],
        uri_path_len: 0,
        request_type: RequestType::Request,
        token: [0u8; 8],
        token_len: 0,
        piv: 0,
        kid: [0u8; MAX_KID_LEN],
        kid_len: 0,
        in_use: false,
    };

    pub fn uri_path(&self) -> &[u8] {
        &self.uri_path[..self.uri_path_len]
    }

    pub fn token(&self) -> &[u8] {
        &self.token[..self.token_len]
    }

    pub fn kid(&self) -> &[u8] {
        &self.kid[..self.kid_len]
    }
}

#[derive(Copy, Clone, Debug)]
pub struct InteractionsTable {
    records: [InteractionRecord; OSCORE_INTERACTIONS_COUNT],
}

impl InteractionsTable {
    pub fn new() -> Self {
        InteractionsTable {
            records: [InteractionRecord::EMPTY; OSCORE_INTERACTIONS_COUNT],
        }
    }

    fn find_by_key(&self, uri_path: &[u8], request_type: RequestType) -> Option<usize> {
        self.records.iter().position(|r| {
            r.in_use && r.request_type == request_type && r.uri_path() == uri_path
        })
    }

    fn find_by_token(&self, token: &[u8]) -> Option<usize> {
        self.records.iter().position(|r| r.in_use && r.token() == token)
    }

    /// Inserts or updates the record for `(uri_path, request_type)`. Rejects a `token`
    /// already bound to a *different* (uri_path, request_type) slot: RFC 8613 requires the
    /// Token to disambiguate concurrent exchanges, so a collision here means the client
    /// reused a Token while a prior exchange was still outstanding.
    pub fn set_record(
        &mut self,
        uri_path: &[u8],
        request_type: RequestType,
        token: &[u8],
        piv: u64,
        kid: &[u8],
    ) -> Result<(), CoreError> {
        if uri_path.len() > OSCORE_MAX_URI_PATH_LEN {
            return Err(CoreError::OscoreInvalidOptionLen);
        }
        if token.len() > 8 || kid.len() > MAX_KID_LEN {
            return Err(CoreError::OscoreInvalidOptionLen);
        }

        if let Some(existing) = self.find_by_token(token) {
            let same_key = self.records[existing].request_type == request_type
                && self.records[existing].uri_path() == uri_path;
            if !same_key {
                return Err(CoreError::OscoreInteractionDuplicatedToken);
            }
        }

        let idx = if let Some(idx) = self.find_by_key(uri_path, request_type) {
            idx
        } else if let Some(idx) = self.records.iter().position(|r| !r.in_use) {
            idx
        } else {
            return Err(CoreError::OscoreMaxInteractions);
        };

        let record = &mut self.records[idx];
        record.uri_path[..uri_path.len()].copy_from_slice(uri_path);
        record.uri_path_len = uri_path.len();
        record.request_type = request_type;
        record.token[..token.len()].copy_from_slice(token);
        record.token_len = token.len();
        record.piv = piv;
        record.kid[..kid.len()].copy_from_slice(kid);
        record.kid_len = kid.len();
        record.in_use = true;
        Ok(())
    }

    pub fn get_record(&self, token: &[u8]) -> Option<&InteractionRecord> {
        self.find_by_token(token).map(|idx| &self.records[idx])
    }

    pub fn remove_record(&mut self, token: &[u8]) {
        if let Some(idx) = self.find_by_token(token) {
            self.records[idx] = InteractionRecord::EMPTY;
        }
    }
}

impl Default for InteractionsTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let mut table = InteractionsTable::new();
        table
            .set_record(b"sensors/temp", RequestType::Request, &[0x01], 7, &[0xAA])
            .unwrap();
        let rec = table.get_record(&[0x01]).unwrap();
        assert_eq!(rec.uri_path(), b"sensors/temp");
        assert_eq!(rec.piv, 7);

        table.remove_record(&[0x01]);
        assert!(table.get_record(&[0x01]).is_none());
    }

    #[test]
    fn test_duplicate_token_different_key_rejected() {
        let mut table = InteractionsTable::new();
        table
            .set_record(b"a", RequestType::Request, &[0x01], 1, &[0xAA])
            .unwrap();
        let err = table
            .set_record(b"b", RequestType::Request, &[0x01], 1, &[0xAA])
            .unwrap_err();
        assert_eq!(err, CoreError::OscoreInteractionDuplicatedToken);
    }

    #[test]
    fn test_table_full() {
        let mut table = InteractionsTable::new();
        for i in 0..OSCORE_INTERACTIONS_COUNT {
            table
                .set_record(&[i as u8], RequestType::Request, &[i as u8], 0, &[0x00])
                .unwrap();
        }
        let err = table
            .set_record(b"overflow", RequestType::Request, &[0xFF], 0, &[0x00])
            .unwrap_err();
        assert_eq!(err, CoreError::OscoreMaxInteractions);
    }
}
