//! HostLink - the SPI host packet protocol.
//!
//! The host controller talks to the communication processor through framed SPI packets: a
//! three byte header `[command][payload_size][checksum]` followed by up to 255 payload bytes.
//! Because SPI is host-clocked, every transfer exchanges one byte in each direction:
//! [`HostLink::exchange`] consumes the incoming byte and returns the byte to preload for the
//! next transfer.
//!
//! PROFIBUS commands are dispatched into [`PhyLink`]; its completion events are fed back
//! through [`HostLink::phy_event`], which builds the reply packet and asserts the data-ready
//! signal line.  While a PROFIBUS command is outstanding the link is *blocked*: incoming
//! bytes are discarded until the PHY has accepted the telegram onto the wire.

use crate::checksum;
use crate::hw::{HostLine, UartPort};
use crate::phy::{PhyConfig, PhyEvent, PhyLink};

/// Size of the packet header: command, payload size, checksum.
pub const HEADER_LENGTH: usize = 3;
/// Largest payload a packet can carry.
pub const MAX_PAYLOAD_SIZE: usize = 255;

/// Host packet command codes.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum Command {
    /// No operation; used by the host to clock out pending reply bytes.
    Nop = 0,
    /// Reset the PHY and the host link.
    Reset = 1,
    /// Apply a [`PhyConfig`] record.
    SetConfig = 2,
    /// PROFIBUS SRD request: send the payload telegram, expect a reply.
    PbSrd = 3,
    /// PROFIBUS SRD reply: carries the received telegram back to the host.
    PbSrdReply = 4,
    /// PROFIBUS SDN request: send the payload telegram, no reply.
    PbSdn = 5,
    /// Positive acknowledgment.
    Ack = 6,
    /// Negative acknowledgment.
    Nack = 7,
}

impl Command {
    pub fn from_u8(b: u8) -> Option<Command> {
        match b {
            0 => Some(Self::Nop),
            1 => Some(Self::Reset),
            2 => Some(Self::SetConfig),
            3 => Some(Self::PbSrd),
            4 => Some(Self::PbSrdReply),
            5 => Some(Self::PbSdn),
            6 => Some(Self::Ack),
            7 => Some(Self::Nack),
            _ => None,
        }
    }
}

/// One host packet, kept in its raw on-wire layout.
#[derive(Debug)]
struct Packet {
    bytes: [u8; HEADER_LENGTH + MAX_PAYLOAD_SIZE],
}

impl Packet {
    fn new() -> Self {
        Self {
            bytes: [0; HEADER_LENGTH + MAX_PAYLOAD_SIZE],
        }
    }

    fn command_byte(&self) -> u8 {
        self.bytes[0]
    }

    fn payload_size(&self) -> usize {
        usize::from(self.bytes[1])
    }

    fn fcs(&self) -> u8 {
        self.bytes[2]
    }

    fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LENGTH..HEADER_LENGTH + self.payload_size()]
    }

    /// Checksum over the header (sans the checksum byte itself) and the payload.
    fn calculate_fcs(&self) -> u8 {
        let sum = checksum::add_bytes(0, &self.bytes[..HEADER_LENGTH - 1]);
        let sum = checksum::add_bytes(sum, self.payload());
        sum ^ 0xFF
    }

    /// Fill in the header fields; the payload must already be in place.
    fn set_header(&mut self, command: Command, payload_size: u8) {
        self.bytes[0] = command as u8;
        self.bytes[1] = payload_size;
        self.bytes[2] = self.calculate_fcs();
    }
}

/// The SPI host packet state machine.
pub struct HostLink {
    rx: Packet,
    rx_cursor: usize,
    /// A PROFIBUS command is outstanding; incoming bytes are not stored.
    rx_blocked: bool,

    tx: Packet,
    tx_cursor: usize,
    /// Total length of the queued outgoing packet, zero when nothing is queued.
    tx_size: usize,
}

impl HostLink {
    pub fn new() -> Self {
        Self {
            rx: Packet::new(),
            rx_cursor: 0,
            rx_blocked: false,
            tx: Packet::new(),
            tx_cursor: 0,
            tx_size: 0,
        }
    }

    /// Whether a PROFIBUS command is outstanding and new host bytes are being discarded.
    #[inline(always)]
    pub fn is_blocked(&self) -> bool {
        self.rx_blocked
    }

    /// Whether an outgoing packet is queued and not yet fully drained.
    #[inline(always)]
    pub fn has_pending_reply(&self) -> bool {
        self.tx_size != 0
    }

    /// Drop all buffered state and de-assert the data-ready line.
    pub fn reset<H: HostLine>(&mut self, line: &mut H) {
        self.rx_cursor = 0;
        self.rx_blocked = false;
        self.tx_cursor = 0;
        self.tx_size = 0;
        line.set_ready(false);
    }

    /// Process one SPI transfer: consume the byte received from the host and return the byte
    /// to preload for the next transfer.
    ///
    /// Packet reception, validation, and dispatch all happen synchronously in here, so a
    /// reply queued for a just-completed packet already contributes its first byte to the
    /// return value.
    pub fn exchange<U: UartPort, H: HostLine>(
        &mut self,
        byte: u8,
        phy: &mut PhyLink,
        uart: &mut U,
        line: &mut H,
    ) -> u8 {
        if !self.rx_blocked {
            if self.rx_cursor == 0 && byte == Command::Nop as u8 {
                // Leading no-operation byte: the host is polling.  Don't store it.
            } else {
                self.rx.bytes[self.rx_cursor] = byte;
                self.rx_cursor += 1;

                if self.rx_cursor >= HEADER_LENGTH
                    && self.rx_cursor - HEADER_LENGTH == self.rx.payload_size()
                {
                    self.handle_packet(phy, uart, line);
                    self.rx_cursor = 0;
                }
            }
        }

        let mut out = 0;
        if self.tx_size != 0 {
            out = self.tx.bytes[self.tx_cursor];
            self.tx_cursor += 1;
            if self.tx_cursor >= self.tx_size {
                // All bytes handed over; the reply has been read.
                self.tx_size = 0;
                line.set_ready(false);
            }
        }
        out
    }

    /// Route a PHY completion event into the corresponding host reply.
    pub fn phy_event<H: HostLine>(&mut self, event: PhyEvent, phy: &PhyLink, line: &mut H) {
        match event {
            PhyEvent::SdnComplete => {
                self.rx_blocked = false;
                self.queue_control(line, Command::Ack);
            }
            PhyEvent::SdrSent => {
                // The telegram is out; new host commands may arrive again while the reply
                // is still pending on the bus.
                self.rx_blocked = false;
            }
            PhyEvent::SdrComplete(count) => {
                let reply = phy.reply();
                self.tx.bytes[HEADER_LENGTH..HEADER_LENGTH + reply.len()].copy_from_slice(reply);
                self.tx.set_header(Command::PbSrdReply, count);
                self.tx_cursor = 0;
                self.tx_size = HEADER_LENGTH + reply.len();
                line.set_ready(true);
            }
            PhyEvent::SdrError => self.queue_control(line, Command::Nack),
        }
    }

    fn handle_packet<U: UartPort, H: HostLine>(
        &mut self,
        phy: &mut PhyLink,
        uart: &mut U,
        line: &mut H,
    ) {
        if !self.check_rx_fcs() {
            log::debug!(
                "packet checksum mismatch: command=0x{:02x} fcs=0x{:02x}",
                self.rx.command_byte(),
                self.rx.fcs()
            );
            self.queue_control(line, Command::Nack);
            return;
        }

        let command = match Command::from_u8(self.rx.command_byte()) {
            Some(command) => command,
            None => {
                log::debug!("unknown command 0x{:02x}", self.rx.command_byte());
                self.queue_control(line, Command::Nack);
                return;
            }
        };

        match command {
            // Informational codes; nothing to do on this side of the link.
            Command::Nop | Command::PbSrdReply | Command::Ack | Command::Nack => (),
            Command::Reset => {
                phy.reset(uart);
                self.reset(line);
                self.queue_control(line, Command::Ack);
            }
            Command::SetConfig => self.apply_config(phy, uart, line),
            Command::PbSrd => match phy.request_sdr(uart, self.rx.payload()) {
                Ok(()) => self.rx_blocked = true,
                Err(err) => {
                    log::debug!("SRD request rejected: {err}");
                    self.queue_control(line, Command::Nack);
                }
            },
            Command::PbSdn => match phy.request_sdn(uart, self.rx.payload()) {
                Ok(()) => self.rx_blocked = true,
                Err(err) => {
                    log::debug!("SDN request rejected: {err}");
                    self.queue_control(line, Command::Nack);
                }
            },
        }
    }

    fn apply_config<U: UartPort, H: HostLine>(
        &mut self,
        phy: &mut PhyLink,
        uart: &mut U,
        line: &mut H,
    ) {
        let config = match PhyConfig::from_bytes(self.rx.payload()) {
            Some(config) => config,
            None => {
                log::debug!("malformed config payload ({} bytes)", self.rx.payload_size());
                self.queue_control(line, Command::Nack);
                return;
            }
        };

        if phy.set_baudrate(uart, config.baudrate).is_err() {
            self.queue_control(line, Command::Nack);
            return;
        }
        phy.set_rx_timeout(config.rx_timeout_ms);
        phy.set_biterror_checks(config.biterror_checks);

        self.queue_control(line, Command::Ack);
    }

    /// Validate the received packet's checksum.  No-operation packets are exempt.
    fn check_rx_fcs(&self) -> bool {
        if self.rx.command_byte() == Command::Nop as u8 {
            return true;
        }
        self.rx.calculate_fcs() == self.rx.fcs()
    }

    fn queue_control<H: HostLine>(&mut self, line: &mut H, command: Command) {
        self.tx.set_header(command, 0);
        self.tx_cursor = 0;
        self.tx_size = HEADER_LENGTH;
        line.set_ready(true);
    }
}

impl Default for HostLink {
    fn default() -> Self {
        Self::new()
    }
}
