//! PhyLink - the PROFIBUS telegram transfer state machine.
//!
//! PhyLink owns the UART side of the bridge.  A transfer is started by one of the
//! non-interrupt entry points ([`request_sdr`][`PhyLink::request_sdr`],
//! [`request_sdn`][`PhyLink::request_sdn`]) and then progresses exclusively through hardware
//! events fed into [`handle_uart`][`PhyLink::handle_uart`] and
//! [`tick_1ms`][`PhyLink::tick_1ms`].  Completion is reported as a [`PhyEvent`] return value
//! which the caller routes onward, usually into
//! [`HostLink::phy_event`][`crate::host::HostLink::phy_event`].
//!
//! Exclusive access replaces the interrupt-disable critical sections of a bare-metal
//! implementation: whoever owns the `&mut PhyLink` is the only execution context that can
//! observe or advance the transfer descriptor.  A real firmware wraps the whole bridge in its
//! platform's critical-section mutex at the ISR boundary.

use crate::consts;
use crate::hw::{LineStatus, UartEvent, UartPort};
use crate::telegram::{self, SizeHint};
use crate::{Baudrate, Error};

/// PHY configuration as carried in the host set-config payload.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PhyConfig {
    pub baudrate: Baudrate,
    /// Receive timeout in milliseconds, re-armed on every received byte.  Zero disables the
    /// timeout.
    pub rx_timeout_ms: u8,
    /// Whether framing/parity/overrun status on a received byte aborts the transfer.
    pub biterror_checks: bool,
}

impl PhyConfig {
    /// Size of the configuration record on the wire.
    pub const WIRE_LENGTH: usize = 3;

    /// Decode a configuration record from a set-config payload.
    ///
    /// Returns `None` when the payload is too small or the baudrate code is unknown.  Excess
    /// payload bytes are ignored.
    pub fn from_bytes(payload: &[u8]) -> Option<PhyConfig> {
        if payload.len() < Self::WIRE_LENGTH {
            return None;
        }
        Some(PhyConfig {
            baudrate: Baudrate::from_host_code(payload[0])?,
            rx_timeout_ms: payload[1],
            biterror_checks: payload[2] != 0,
        })
    }

    /// Encode the configuration record for a set-config payload.
    pub fn to_bytes(&self) -> [u8; Self::WIRE_LENGTH] {
        [
            self.baudrate.host_code(),
            self.rx_timeout_ms,
            u8::from(self.biterror_checks),
        ]
    }
}

impl Default for PhyConfig {
    fn default() -> Self {
        Self {
            baudrate: Baudrate::B19200,
            rx_timeout_ms: 100,
            biterror_checks: true,
        }
    }
}

/// Transfer state of the PHY.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum TransferState {
    /// No transfer in progress.
    Idle,
    /// Transmitting a telegram, a reply is expected afterwards.
    SendingSdr,
    /// Transmitting a telegram, no reply expected.
    SendingSdn,
    /// Waiting for / assembling the reply telegram.
    ReceivingSdr,
}

/// Completion event raised by the PHY state machine.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PhyEvent {
    /// An SDN transfer finished transmitting.
    SdnComplete,
    /// An SDR transfer finished transmitting; the receiver is now waiting for the reply.
    SdrSent,
    /// The reply telegram was received completely.  Carries the received byte count.
    SdrComplete(u8),
    /// The reply was malformed, had a line error, or timed out.
    SdrError,
}

/// The PROFIBUS telegram transfer state machine.
#[derive(Debug)]
pub struct PhyLink {
    state: TransferState,
    config: PhyConfig,
    request: [u8; consts::MAX_TELEGRAM_SIZE],
    reply: [u8; consts::MAX_TELEGRAM_SIZE],
    /// Expected size of the current transfer direction (0 while not yet resolved).
    size: usize,
    /// Running byte cursor into `request` or `reply`, depending on direction.
    cursor: usize,
    /// All bytes are queued, one transmit-complete interrupt is still pending for the final
    /// byte's physical transmission.
    tail_wait: bool,
    /// Milliseconds left until the pending receive is aborted.
    rx_countdown: Option<u8>,
}

impl PhyLink {
    pub fn new(config: PhyConfig) -> Self {
        Self {
            state: TransferState::Idle,
            config,
            request: [0; consts::MAX_TELEGRAM_SIZE],
            reply: [0; consts::MAX_TELEGRAM_SIZE],
            size: 0,
            cursor: 0,
            tail_wait: false,
            rx_countdown: None,
        }
    }

    /// Apply the configured baudrate and bring the transceiver into a known idle state.
    pub fn init<U: UartPort>(&mut self, uart: &mut U) -> Result<(), Error> {
        uart.apply_baudrate(self.config.baudrate)?;
        self.reset(uart);
        Ok(())
    }

    #[inline(always)]
    pub fn state(&self) -> TransferState {
        self.state
    }

    #[inline(always)]
    pub fn is_idle(&self) -> bool {
        self.state == TransferState::Idle
    }

    #[inline(always)]
    pub fn config(&self) -> &PhyConfig {
        &self.config
    }

    /// The reply telegram assembled by the last completed SDR transfer.
    pub fn reply(&self) -> &[u8] {
        &self.reply[..self.cursor]
    }

    /// Switch the baudrate, reprogramming the generator only when the rate actually changes.
    pub fn set_baudrate<U: UartPort>(
        &mut self,
        uart: &mut U,
        baudrate: Baudrate,
    ) -> Result<(), Error> {
        if baudrate != self.config.baudrate {
            uart.apply_baudrate(baudrate)?;
            log::info!("baudrate changed to {baudrate:?}");
            self.config.baudrate = baudrate;
        }
        Ok(())
    }

    pub fn set_rx_timeout(&mut self, ms: u8) {
        self.config.rx_timeout_ms = ms;
    }

    pub fn set_biterror_checks(&mut self, enable: bool) {
        self.config.biterror_checks = enable;
    }

    /// Start a send-and-request-data transfer: transmit `telegram`, then receive the reply.
    ///
    /// The transfer runs asynchronously; completion is reported through the event returned by
    /// [`handle_uart`][`Self::handle_uart`] / [`tick_1ms`][`Self::tick_1ms`].
    pub fn request_sdr<U: UartPort>(&mut self, uart: &mut U, telegram: &[u8]) -> Result<(), Error> {
        self.start_transfer(uart, telegram, TransferState::SendingSdr)
    }

    /// Start a send-data-no-reply transfer.
    pub fn request_sdn<U: UartPort>(&mut self, uart: &mut U, telegram: &[u8]) -> Result<(), Error> {
        self.start_transfer(uart, telegram, TransferState::SendingSdn)
    }

    fn start_transfer<U: UartPort>(
        &mut self,
        uart: &mut U,
        telegram: &[u8],
        state: TransferState,
    ) -> Result<(), Error> {
        let size = telegram::validate(telegram)?;

        if self.state != TransferState::Idle {
            return Err(Error::Busy);
        }

        self.state = state;
        self.request[..size].copy_from_slice(telegram);
        self.size = size;
        self.cursor = 0;
        self.tail_wait = false;

        uart.set_activity(true);
        uart.set_tx_ready_irq(true);
        uart.set_rts(true);
        // The transmitter is idle, so the data register is empty: prime the first byte.
        self.tx_next(uart);

        Ok(())
    }

    /// Forcibly return to idle, regardless of the current state.  Always safe to call.
    pub fn reset<U: UartPort>(&mut self, uart: &mut U) {
        self.state = TransferState::Idle;
        self.size = 0;
        self.cursor = 0;
        self.tail_wait = false;
        self.rx_countdown = None;

        uart.set_rts(false);
        uart.set_tx_ready_irq(false);
        uart.disable_receiver();
        uart.set_activity(false);
    }

    /// Advance the state machine by one UART hardware event.
    pub fn handle_uart<U: UartPort>(&mut self, uart: &mut U, event: UartEvent) -> Option<PhyEvent> {
        match event {
            UartEvent::TxRegisterEmpty => {
                self.on_tx_ready(uart);
                None
            }
            UartEvent::TxComplete => self.on_tx_complete(uart),
            UartEvent::Rx { byte, status } => self.on_rx(uart, byte, status),
        }
    }

    /// Millisecond tick driving the receive timeout.
    pub fn tick_1ms<U: UartPort>(&mut self, uart: &mut U) -> Option<PhyEvent> {
        if self.state != TransferState::ReceivingSdr {
            return None;
        }
        match self.rx_countdown {
            Some(1) => {
                log::debug!("receive timeout after {} bytes", self.cursor);
                Some(self.finish_receive(uart, true))
            }
            Some(remaining) => {
                self.rx_countdown = Some(remaining - 1);
                None
            }
            None => None,
        }
    }

    fn tx_next<U: UartPort>(&mut self, uart: &mut U) {
        let byte = self.request[self.cursor];
        self.cursor += 1;
        uart.load_tx(byte);
    }

    fn on_tx_ready<U: UartPort>(&mut self, uart: &mut U) {
        if self.tail_wait {
            return;
        }
        if self.cursor >= self.size {
            // All bytes are queued for transmission.
            uart.set_tx_ready_irq(false);
            self.tail_wait = true;
            return;
        }
        self.tx_next(uart);
    }

    fn on_tx_complete<U: UartPort>(&mut self, uart: &mut U) -> Option<PhyEvent> {
        if !self.tail_wait {
            return None;
        }
        self.tail_wait = false;

        match self.state {
            TransferState::SendingSdr => {
                // Transmission complete.  Turn the line around and wait for the reply.
                uart.set_rts(false);
                uart.enable_receiver();
                self.state = TransferState::ReceivingSdr;
                self.size = 0;
                self.cursor = 0;
                self.rx_countdown = self.arm_rx_timeout();
                Some(PhyEvent::SdrSent)
            }
            TransferState::SendingSdn => {
                self.state = TransferState::Idle;
                uart.set_activity(false);
                Some(PhyEvent::SdnComplete)
            }
            _ => None,
        }
    }

    fn on_rx<U: UartPort>(
        &mut self,
        uart: &mut U,
        byte: u8,
        status: LineStatus,
    ) -> Option<PhyEvent> {
        if self.state != TransferState::ReceivingSdr {
            return None;
        }

        if self.config.biterror_checks && !status.is_empty() {
            log::debug!("receive line error: {status:?}");
            return Some(self.finish_receive(uart, true));
        }

        self.reply[self.cursor] = byte;
        self.cursor += 1;
        self.rx_countdown = self.arm_rx_timeout();

        if self.size == 0 {
            match telegram::telegram_size(&self.reply[..self.cursor]) {
                SizeHint::Known(size) => self.size = size,
                SizeHint::Invalid => return Some(self.finish_receive(uart, true)),
                SizeHint::Incomplete => (),
            }
        }
        if self.size != 0 && self.cursor >= self.size {
            return Some(self.finish_receive(uart, false));
        }

        None
    }

    fn finish_receive<U: UartPort>(&mut self, uart: &mut U, error: bool) -> PhyEvent {
        uart.disable_receiver();
        self.state = TransferState::Idle;
        self.rx_countdown = None;
        uart.set_activity(false);

        if error {
            PhyEvent::SdrError
        } else {
            PhyEvent::SdrComplete(u8::try_from(self.cursor).unwrap())
        }
    }

    fn arm_rx_timeout(&self) -> Option<u8> {
        match self.config.rx_timeout_ms {
            0 => None,
            ms => Some(ms),
        }
    }
}
