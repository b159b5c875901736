//! PROFIBUS Constants

/// Start Delimiter 1: fixed length, no data unit
pub const SD1: u8 = 0x10;
/// Start Delimiter 2: variable data unit length
pub const SD2: u8 = 0x68;
/// Start Delimiter 3: fixed length, 8 byte data unit
pub const SD3: u8 = 0xA2;
/// Start Delimiter 4: token telegram
pub const SD4: u8 = 0xDC;
/// End Delimiter
pub const ED: u8 = 0x16;
/// Short Confirmation
pub const SC: u8 = 0xE5;

/// Smallest valid value of the SD2 length field
pub const SD2_LE_MIN: u8 = 4;
/// Largest valid value of the SD2 length field
pub const SD2_LE_MAX: u8 = 249;

/// Largest possible telegram: SD2 framing with the maximum length field (249 + 6)
pub const MAX_TELEGRAM_SIZE: usize = 255;
