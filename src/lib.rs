//! # `profiphy` - A PROFIBUS-DP communication processor PHY core
//!
//! _profiphy_ implements the protocol core of a PROFIBUS DP communication processor: a small
//! device that drives an RS-485 UART on one side and talks a framed SPI packet protocol to a
//! host controller on the other.  The crate is structured along that bridge:
//!
//! - The [`hw`] module abstracts the hardware: a UART port with RS-485 driver control and the
//!   host-facing data-ready signal line.  A simulated implementation for tests and host-side
//!   development lives behind the `hw-simulator` feature.
//! - The [`telegram`] module classifies PROFIBUS telegrams by their start delimiter and
//!   resolves their on-wire size.
//! - The [`phy`] module implements [`PhyLink`][`phy::PhyLink`], the telegram transfer state
//!   machine (SDR/SDN transfers, byte-wise transmit/receive, receive timeout).
//! - The [`host`] module implements [`HostLink`][`host::HostLink`], the SPI packet protocol
//!   (framing, checksum, flow control, command dispatch).
//! - The [`bridge`] module ties one of each to their ports and routes PHY completion events
//!   into host replies.
//!
//! All protocol progress is driven by discrete hardware events (UART interrupts, SPI transfer
//! completions, millisecond ticks).  None of the entry points block.
//!
//! # Example
//! ```
//! use profiphy::{bridge, hw, phy};
//!
//! let uart = hw::SimUart::new();
//! let line = hw::SimHostLine::new();
//! let mut bridge = bridge::Bridge::new(uart, line, phy::PhyConfig::default()).unwrap();
//!
//! // The host clocks a reset packet over SPI: command 1, no payload, checksum 0xFE.
//! assert_eq!(bridge.spi_exchange(0x01), 0x00);
//! assert_eq!(bridge.spi_exchange(0x00), 0x00);
//! // The ACK reply starts draining with the transfer that completes the request.
//! assert_eq!(bridge.spi_exchange(0xFE), 0x06);
//! assert_eq!(bridge.spi_exchange(0x00), 0x00);
//! assert_eq!(bridge.spi_exchange(0x00), 0xF9);
//! ```
#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub mod bridge;
pub mod checksum;
pub mod consts;
pub mod host;
pub mod hw;
pub mod phy;
pub mod telegram;

#[cfg(all(test, feature = "std"))]
pub mod test_utils;

/// Errors reported by the protocol core.
///
/// Every error is handled at the layer that detects it: the PHY entry points return them to
/// the caller, the host link converts them into NACK replies.  No error is fatal; the state
/// machines always return to idle so subsequent requests can proceed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// A transfer is already in progress.  The request was rejected without side effects.
    Busy,
    /// The telegram has an unknown start delimiter or malformed length fields.
    InvalidTelegram,
    /// A host packet failed checksum validation.
    ChecksumMismatch,
    /// A configuration update was rejected (payload too small or baudrate not realizable).
    ConfigRejected,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Busy => write!(f, "transfer already in progress"),
            Error::InvalidTelegram => write!(f, "invalid telegram"),
            Error::ChecksumMismatch => write!(f, "checksum mismatch"),
            Error::ConfigRejected => write!(f, "configuration rejected"),
        }
    }
}

/// Baudrate for fieldbus communication
///
/// PROFIBUS DP networks can run at any of the available baudrates given that all stations
/// support the selected speed.  The discriminants double as the configuration codes used in
/// the host set-config payload.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum Baudrate {
    /// 9.6 kbit/s
    B9600 = 0,
    /// 19.2 kbit/s
    B19200 = 1,
    /// 45.45 kbit/s
    B45450 = 2,
    /// 93.75 kbit/s
    B93750 = 3,
    /// 187.5 kbit/s
    B187500 = 4,
    /// 500 kbit/s
    B500000 = 5,
    /// 1.5 Mbit/s
    B1500000 = 6,
    /// 3 Mbit/s
    B3000000 = 7,
    /// 6 Mbit/s
    B6000000 = 8,
    /// 12 Mbit/s
    B12000000 = 9,
}

/// UART baudrate generator settings derived from a [`Baudrate`] and a peripheral clock.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct UartDivisor {
    /// Value for the baudrate divisor register.
    pub ubrr: u16,
    /// Whether the double-speed mode (divide-by-8 instead of divide-by-16) is selected.
    pub double_speed: bool,
}

impl Baudrate {
    /// Convert baudrate into its numeric value in bit/s.
    pub const fn to_rate(self) -> u64 {
        match self {
            Baudrate::B9600 => 9600,
            Baudrate::B19200 => 19200,
            Baudrate::B45450 => 45450,
            Baudrate::B93750 => 93750,
            Baudrate::B187500 => 187500,
            Baudrate::B500000 => 500000,
            Baudrate::B1500000 => 1500000,
            Baudrate::B3000000 => 3000000,
            Baudrate::B6000000 => 6000000,
            Baudrate::B12000000 => 12000000,
        }
    }

    /// Decode the baudrate code used in the host set-config payload.
    pub fn from_host_code(code: u8) -> Option<Baudrate> {
        match code {
            0 => Some(Baudrate::B9600),
            1 => Some(Baudrate::B19200),
            2 => Some(Baudrate::B45450),
            3 => Some(Baudrate::B93750),
            4 => Some(Baudrate::B187500),
            5 => Some(Baudrate::B500000),
            6 => Some(Baudrate::B1500000),
            7 => Some(Baudrate::B3000000),
            8 => Some(Baudrate::B6000000),
            9 => Some(Baudrate::B12000000),
            _ => None,
        }
    }

    /// The baudrate code used in the host set-config payload.
    #[inline(always)]
    pub fn host_code(self) -> u8 {
        self as u8
    }

    /// Compute the UART divisor register settings for this baudrate at the given peripheral
    /// clock.
    ///
    /// Both the divide-by-16 and the double-speed divide-by-8 generator modes are evaluated
    /// and the one with the smaller rate error is selected.  Returns `None` when the clock
    /// cannot express the baudrate (the divisor would be zero or overflow the register).
    pub const fn divisor(self, clock_hz: u32) -> Option<UartDivisor> {
        let rate = self.to_rate() as u32;

        let normal = ubrr_value(clock_hz, rate, 16);
        let double = ubrr_value(clock_hz, rate, 8);
        let normal_error = rate_error(clock_hz, rate, normal, 16);
        let double_error = rate_error(clock_hz, rate, double, 8);

        let (ubrr, double_speed) = if double_error < normal_error {
            (double, true)
        } else {
            (normal, false)
        };

        if ubrr == 0 || ubrr > u16::MAX as u32 {
            None
        } else {
            Some(UartDivisor {
                ubrr: ubrr as u16,
                double_speed,
            })
        }
    }
}

const fn ubrr_value(clock_hz: u32, rate: u32, divider: u32) -> u32 {
    let denominator = (rate as u64) * (divider as u64);
    let quotient = ((clock_hz as u64 + denominator / 2) / denominator) as u32;
    quotient.saturating_sub(1)
}

const fn rate_error(clock_hz: u32, rate: u32, ubrr: u32, divider: u32) -> u32 {
    let denominator = (divider as u64) * (ubrr as u64 + 1);
    let actual = ((clock_hz as u64 + denominator / 2) / denominator) as u32;
    if actual > rate {
        actual - rate
    } else {
        rate - actual
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_code_roundtrip() {
        for code in 0u8..=9 {
            let baud = Baudrate::from_host_code(code).unwrap();
            assert_eq!(baud.host_code(), code);
        }
        assert_eq!(Baudrate::from_host_code(10), None);
        assert_eq!(Baudrate::from_host_code(0xFF), None);
    }

    #[test]
    fn divisor_at_standard_crystal() {
        // 18.432 MHz divides evenly into the classic UART rates.
        let clock = 18_432_000;

        assert_eq!(
            Baudrate::B9600.divisor(clock),
            Some(UartDivisor {
                ubrr: 119,
                double_speed: false
            })
        );
        assert_eq!(
            Baudrate::B19200.divisor(clock),
            Some(UartDivisor {
                ubrr: 59,
                double_speed: false
            })
        );

        // The high rates are out of reach for this clock.
        assert_eq!(Baudrate::B1500000.divisor(clock), None);
        assert_eq!(Baudrate::B12000000.divisor(clock), None);
    }

    #[test]
    fn divisor_prefers_smaller_rate_error() {
        // At 18.432 MHz, 500 kbit/s is closer in double-speed mode (460.8k vs. 576k).
        assert_eq!(
            Baudrate::B500000.divisor(18_432_000),
            Some(UartDivisor {
                ubrr: 4,
                double_speed: true
            })
        );
    }
}
