//! Telegram classification and size resolution.
//!
//! The PROFIBUS line protocol carries no out-of-band length signal: a receiver has to decide
//! from the first byte (the start delimiter) how many bytes to expect.  The variable-length
//! form is the exception, its size is only trustworthy once the duplicated length field has
//! arrived and matched, so resolution is deferred until the third byte.

use crate::consts;
use crate::Error;

/// The framing variant of a telegram, tagged by its start delimiter.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TelegramKind {
    /// SD1: fixed length telegram without data unit (6 bytes)
    NoData,
    /// SD2: variable data unit length (LE + 6 bytes)
    VarData,
    /// SD3: fixed length telegram with 8 byte data unit (14 bytes)
    FixData,
    /// SD4: token telegram (3 bytes)
    Token,
    /// SC: single-byte short confirmation
    ShortConfirmation,
}

impl TelegramKind {
    /// Classify a start delimiter byte.
    pub fn from_sd(sd: u8) -> Option<TelegramKind> {
        match sd {
            consts::SD1 => Some(TelegramKind::NoData),
            consts::SD2 => Some(TelegramKind::VarData),
            consts::SD3 => Some(TelegramKind::FixData),
            consts::SD4 => Some(TelegramKind::Token),
            consts::SC => Some(TelegramKind::ShortConfirmation),
            _ => None,
        }
    }
}

/// Result of resolving a telegram's size from its leading bytes.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SizeHint {
    /// More leading bytes are needed before the size can be resolved.
    Incomplete,
    /// Unknown start delimiter or inconsistent length fields.
    Invalid,
    /// The full on-wire size of the telegram.
    Known(usize),
}

/// Determine the full on-wire size of a telegram from its leading bytes.
///
/// For most telegram kinds the first byte is enough.  The variable-length kind needs the
/// first three bytes so the duplicated length field can be checked before committing to a
/// size.
pub fn telegram_size(header: &[u8]) -> SizeHint {
    let sd = match header.first() {
        Some(sd) => *sd,
        None => return SizeHint::Incomplete,
    };

    match TelegramKind::from_sd(sd) {
        Some(TelegramKind::NoData) => SizeHint::Known(6),
        Some(TelegramKind::VarData) => {
            if header.len() < 3 {
                return SizeHint::Incomplete;
            }
            let le = header[1];
            let ler = header[2];
            if le != ler {
                log::debug!("telegram length fields disagree: LE={le} LEr={ler}");
                return SizeHint::Invalid;
            }
            if !(consts::SD2_LE_MIN..=consts::SD2_LE_MAX).contains(&le) {
                log::debug!("telegram length field out of range: LE={le}");
                return SizeHint::Invalid;
            }
            SizeHint::Known(usize::from(le) + 6)
        }
        Some(TelegramKind::FixData) => SizeHint::Known(14),
        Some(TelegramKind::Token) => SizeHint::Known(3),
        Some(TelegramKind::ShortConfirmation) => SizeHint::Known(1),
        None => {
            log::debug!("unknown start delimiter 0x{sd:02x}");
            SizeHint::Invalid
        }
    }
}

/// Validate an outgoing telegram before transmission.
///
/// The size resolved from the leading bytes must match the buffer length exactly.  Returns
/// the telegram size on success.
pub fn validate(telegram: &[u8]) -> Result<usize, Error> {
    match telegram_size(telegram) {
        SizeHint::Known(size) if size == telegram.len() => Ok(size),
        _ => Err(Error::InvalidTelegram),
    }
}
