//! Typed secret payloads and their byte encoding.
//!
//! A record's `data` column holds one of four payload shapes selected by the
//! record type. Text is stored verbatim. The structured shapes are encoded
//! with `postcard`, which length-prefixes every field, so NUL bytes, newlines
//! and multi-megabyte file contents survive unchanged.
//!
//! Every structured encoding starts with a one-byte shape tag. postcard
//! writes `String` and `Vec<u8>` identically, so without the tag a file and
//! a login would be indistinguishable on the wire.
//!
//! Decoding is strict: the tag must match the record type, the input must be
//! consumed exactly, and a card whose month lies outside 1..=12 is rejected
//! as malformed.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::CodecError;
use crate::models::RecordType;

/// Minimum length of a card number accepted by [`CardData::validate`].
const MIN_CARD_NUMBER_LEN: usize = 15;

/// Shape tags leading each structured encoding.
const FILE_TAG: u8 = 1;
const LOGIN_TAG: u8 = 2;
const CARD_TAG: u8 = 3;

/// A named file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    pub name: String,
    pub contents: Vec<u8>,
}

/// A login/password pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginData {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for LoginData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginData")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Bank card details. `holder` and `cvv` may be empty.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardData {
    pub number: String,
    pub holder: String,
    pub month: u8,
    pub year: u16,
    pub cvv: String,
}

impl fmt::Debug for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardData")
            .field("number", &"[REDACTED]")
            .field("holder", &self.holder)
            .field("month", &self.month)
            .field("year", &self.year)
            .field("cvv", &"[REDACTED]")
            .finish()
    }
}

impl CardData {
    /// Turn a two-digit year into `20YY`. Longer years pass through.
    #[must_use]
    pub fn expand_year(year: u16) -> u16 {
        if year < 100 { 2000 + year } else { year }
    }

    /// Check the input rules clients apply before submitting a card.
    ///
    /// The store itself never re-validates stored cards.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Invalid`] naming the first rule that fails.
    pub fn validate(&self) -> Result<(), CodecError> {
        let invalid = |reason: &str| CodecError::Invalid {
            record_type: RecordType::Card,
            reason: reason.to_owned(),
        };

        if self.number.chars().count() < MIN_CARD_NUMBER_LEN {
            return Err(invalid("card number is too short"));
        }
        if !(1..=12).contains(&self.month) {
            return Err(invalid("expiry month must be between 1 and 12"));
        }
        if !(1000..=9999).contains(&self.year) {
            return Err(invalid("expiry year must have four digits"));
        }
        Ok(())
    }
}

/// A decoded record payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretPayload {
    Text(Vec<u8>),
    File(FileData),
    Login(LoginData),
    Card(CardData),
}

impl SecretPayload {
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Text(_) => RecordType::Text,
            Self::File(_) => RecordType::File,
            Self::Login(_) => RecordType::Login,
            Self::Card(_) => RecordType::Card,
        }
    }
}

/// Encode a payload into record bytes.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode(payload: &SecretPayload) -> Result<Vec<u8>, CodecError> {
    match payload {
        SecretPayload::Text(bytes) => Ok(bytes.clone()),
        SecretPayload::File(file) => to_bytes(RecordType::File, file),
        SecretPayload::Login(login) => to_bytes(RecordType::Login, login),
        SecretPayload::Card(card) => to_bytes(RecordType::Card, card),
    }
}

/// Decode record bytes as the payload shape of `record_type`.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] on truncated input, trailing bytes, a shape
/// that does not match `record_type`, or a card month outside 1..=12.
pub fn decode(record_type: RecordType, bytes: &[u8]) -> Result<SecretPayload, CodecError> {
    match record_type {
        RecordType::Text => Ok(SecretPayload::Text(bytes.to_vec())),
        RecordType::File => from_bytes(record_type, bytes).map(SecretPayload::File),
        RecordType::Login => from_bytes(record_type, bytes).map(SecretPayload::Login),
        RecordType::Card => {
            let card: CardData = from_bytes(record_type, bytes)?;
            if !(1..=12).contains(&card.month) {
                return Err(CodecError::Decode {
                    record_type,
                    reason: format!("expiry month {} out of range", card.month),
                });
            }
            Ok(SecretPayload::Card(card))
        }
    }
}

/// `None` for text, which carries no framing.
fn shape_tag(record_type: RecordType) -> Option<u8> {
    match record_type {
        RecordType::Text => None,
        RecordType::File => Some(FILE_TAG),
        RecordType::Login => Some(LOGIN_TAG),
        RecordType::Card => Some(CARD_TAG),
    }
}

fn to_bytes<T: Serialize>(record_type: RecordType, value: &T) -> Result<Vec<u8>, CodecError> {
    let body = postcard::to_stdvec(value).map_err(|e| CodecError::Encode {
        record_type,
        reason: e.to_string(),
    })?;

    let mut bytes = Vec::with_capacity(body.len() + 1);
    bytes.extend(shape_tag(record_type));
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

fn from_bytes<T: DeserializeOwned>(record_type: RecordType, bytes: &[u8]) -> Result<T, CodecError> {
    let decode_error = |reason: String| CodecError::Decode {
        record_type,
        reason,
    };

    let Some((&tag, body)) = bytes.split_first() else {
        return Err(decode_error("empty input".to_owned()));
    };
    if Some(tag) != shape_tag(record_type) {
        return Err(decode_error(format!("shape tag {tag} does not match")));
    }

    let (value, rest) =
        postcard::take_from_bytes::<T>(body).map_err(|e| decode_error(e.to_string()))?;

    if !rest.is_empty() {
        return Err(decode_error(format!("{} trailing bytes", rest.len())));
    }
    Ok(value)
}
