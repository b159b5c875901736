//! The composition root tying PhyLink and HostLink together.
//!
//! A communication processor has exactly one PHY and one host interface, so the [`Bridge`] is
//! built once at startup and owns both state machines plus their port implementations.  It is
//! the single place where PHY completion events are routed into host replies - the interrupt
//! service routines of a real firmware translate their peripheral's registers into exactly
//! one [`Bridge`] method call each:
//!
//! - UART interrupts (data register empty, transmit complete, receive complete) call
//!   [`uart_event`][`Bridge::uart_event`],
//! - the SPI transfer-complete interrupt calls [`spi_exchange`][`Bridge::spi_exchange`] and
//!   stores the returned byte in the SPI data register,
//! - the system timer calls [`tick_1ms`][`Bridge::tick_1ms`].
//!
//! On targets where these interrupts can preempt each other, the `Bridge` must live inside
//! the platform's critical-section mutex; the `&mut self` receivers make that requirement
//! explicit instead of relying on ambient interrupt-disable windows.

use crate::host::HostLink;
use crate::hw::{HostLine, UartEvent, UartPort};
use crate::phy::{PhyConfig, PhyLink};
use crate::Error;

pub struct Bridge<U: UartPort, H: HostLine> {
    phy: PhyLink,
    host: HostLink,
    uart: U,
    line: H,
}

impl<U: UartPort, H: HostLine> Bridge<U, H> {
    /// Initialize the PHY with `config` and bring both links into their idle state.
    pub fn new(mut uart: U, mut line: H, config: PhyConfig) -> Result<Self, Error> {
        let mut phy = PhyLink::new(config);
        phy.init(&mut uart)?;
        let mut host = HostLink::new();
        host.reset(&mut line);

        Ok(Self {
            phy,
            host,
            uart,
            line,
        })
    }

    /// Feed one UART hardware event into the PHY and route any completion event into the
    /// host link.
    pub fn uart_event(&mut self, event: UartEvent) {
        if let Some(phy_event) = self.phy.handle_uart(&mut self.uart, event) {
            self.host.phy_event(phy_event, &self.phy, &mut self.line);
        }
    }

    /// Process one SPI transfer; returns the byte to preload for the next transfer.
    pub fn spi_exchange(&mut self, byte: u8) -> u8 {
        self.host
            .exchange(byte, &mut self.phy, &mut self.uart, &mut self.line)
    }

    /// Millisecond system tick.
    pub fn tick_1ms(&mut self) {
        if let Some(phy_event) = self.phy.tick_1ms(&mut self.uart) {
            self.host.phy_event(phy_event, &self.phy, &mut self.line);
        }
    }

    #[inline(always)]
    pub fn phy(&self) -> &PhyLink {
        &self.phy
    }

    #[inline(always)]
    pub fn host(&self) -> &HostLink {
        &self.host
    }

    #[inline(always)]
    pub fn uart(&self) -> &U {
        &self.uart
    }

    #[inline(always)]
    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }

    #[inline(always)]
    pub fn line(&self) -> &H {
        &self.line
    }
}
