//! Hardware abstraction for the communication processor.
//!
//! The protocol core never touches registers directly.  Instead, the state machines are fed
//! discrete hardware events ([`UartEvent`], SPI exchanges, millisecond ticks) and drive the
//! hardware back through the [`UartPort`] and [`HostLine`] traits.  On a real target the
//! interrupt service routines translate between the peripheral registers and these calls; in
//! tests the simulated implementations from [`sim`] stand in.

#[cfg(feature = "hw-simulator")]
mod sim;
#[cfg(feature = "hw-simulator")]
pub use sim::{SimHostLine, SimUart};

use crate::{Baudrate, Error};

bitflags::bitflags! {
    /// Receive line status delivered alongside each received byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineStatus: u8 {
        /// A stop bit was sampled low.
        const FRAMING_ERROR = 1 << 0;
        /// The parity bit did not match the received data.
        const PARITY_ERROR = 1 << 1;
        /// A byte was lost because the data register was not read in time.
        const OVERRUN = 1 << 2;
    }
}

/// One UART hardware interrupt, delivered to the PHY state machine in arrival order.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UartEvent {
    /// The transmit data register is ready to accept the next byte.
    TxRegisterEmpty,
    /// The last queued byte has physically left the shift register.
    TxComplete,
    /// A byte arrived while the receiver was enabled.
    Rx {
        byte: u8,
        status: LineStatus,
    },
}

/// The RS-485 UART as seen by the PHY state machine.
///
/// None of these operations may block.  `load_tx` is only invoked while the transmit data
/// register is empty: either from a transfer request while the transmitter is idle, or in
/// response to a [`UartEvent::TxRegisterEmpty`] event.
pub trait UartPort {
    /// Load one byte into the transmit data register.
    fn load_tx(&mut self, byte: u8);

    /// Mask or unmask the transmit-register-empty interrupt source.
    fn set_tx_ready_irq(&mut self, enabled: bool);

    /// Enable the receiver and its interrupt source, discarding any stale data.
    fn enable_receiver(&mut self);

    /// Disable the receiver and its interrupt source.
    fn disable_receiver(&mut self);

    /// Drive the RS-485 transmit-enable line.
    fn set_rts(&mut self, asserted: bool);

    /// Drive the bus activity indication.
    fn set_activity(&mut self, on: bool);

    /// Reconfigure the baudrate generator.
    ///
    /// Fails with [`Error::ConfigRejected`] when the peripheral clock cannot express the
    /// requested rate.
    fn apply_baudrate(&mut self, baudrate: Baudrate) -> Result<(), Error>;
}

/// The host-directed data-ready signal line.
///
/// Asserted exactly while a fully built reply packet is waiting to be clocked out.
pub trait HostLine {
    fn set_ready(&mut self, asserted: bool);
}
