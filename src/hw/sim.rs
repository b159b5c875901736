//! Simulated hardware for tests and host-side development.

use crate::hw::{HostLine, UartPort};
use crate::{Baudrate, Error, UartDivisor};

/// A simulated RS-485 UART.
///
/// Bytes loaded for transmission are captured, the control lines and interrupt masks are
/// recorded, and baudrate changes are validated against a configurable peripheral clock the
/// same way a real baudrate generator would reject unreachable rates.
#[derive(Debug)]
pub struct SimUart {
    clock_hz: u32,
    tx: Vec<u8>,
    tx_ready_irq: bool,
    receiver_enabled: bool,
    rts: bool,
    activity: bool,
    baudrate: Option<Baudrate>,
    divisor: Option<UartDivisor>,
}

impl SimUart {
    /// The 18.432 MHz crystal of the original communication processor board.
    pub const DEFAULT_CLOCK_HZ: u32 = 18_432_000;

    pub fn new() -> Self {
        Self::with_clock(Self::DEFAULT_CLOCK_HZ)
    }

    pub fn with_clock(clock_hz: u32) -> Self {
        Self {
            clock_hz,
            tx: Vec::new(),
            tx_ready_irq: false,
            receiver_enabled: false,
            rts: false,
            activity: false,
            baudrate: None,
            divisor: None,
        }
    }

    /// All bytes loaded for transmission so far.
    pub fn transmitted(&self) -> &[u8] {
        &self.tx
    }

    /// Drain the captured transmit bytes.
    pub fn take_transmitted(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.tx)
    }

    pub fn tx_ready_irq(&self) -> bool {
        self.tx_ready_irq
    }

    pub fn receiver_enabled(&self) -> bool {
        self.receiver_enabled
    }

    pub fn rts(&self) -> bool {
        self.rts
    }

    pub fn activity(&self) -> bool {
        self.activity
    }

    /// The baudrate most recently applied, if any.
    pub fn baudrate(&self) -> Option<Baudrate> {
        self.baudrate
    }

    /// The divisor register settings programmed by the last baudrate change.
    pub fn divisor(&self) -> Option<UartDivisor> {
        self.divisor
    }
}

impl Default for SimUart {
    fn default() -> Self {
        Self::new()
    }
}

impl UartPort for SimUart {
    fn load_tx(&mut self, byte: u8) {
        log::trace!("uart tx 0x{byte:02x}");
        self.tx.push(byte);
    }

    fn set_tx_ready_irq(&mut self, enabled: bool) {
        self.tx_ready_irq = enabled;
    }

    fn enable_receiver(&mut self) {
        self.receiver_enabled = true;
    }

    fn disable_receiver(&mut self) {
        self.receiver_enabled = false;
    }

    fn set_rts(&mut self, asserted: bool) {
        self.rts = asserted;
    }

    fn set_activity(&mut self, on: bool) {
        self.activity = on;
    }

    fn apply_baudrate(&mut self, baudrate: Baudrate) -> Result<(), Error> {
        match baudrate.divisor(self.clock_hz) {
            Some(divisor) => {
                log::debug!(
                    "uart baudrate {:?}: ubrr={} double_speed={}",
                    baudrate,
                    divisor.ubrr,
                    divisor.double_speed
                );
                self.baudrate = Some(baudrate);
                self.divisor = Some(divisor);
                Ok(())
            }
            None => {
                log::debug!("uart baudrate {baudrate:?} not realizable at {} Hz", self.clock_hz);
                Err(Error::ConfigRejected)
            }
        }
    }
}

/// A simulated host data-ready signal line.
#[derive(Debug, Default)]
pub struct SimHostLine {
    ready: bool,
}

impl SimHostLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

impl HostLine for SimHostLine {
    fn set_ready(&mut self, asserted: bool) {
        self.ready = asserted;
    }
}
