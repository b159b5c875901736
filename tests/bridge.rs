use profiphy::bridge::Bridge;
use profiphy::checksum;
use profiphy::host::Command;
use profiphy::hw::{LineStatus, SimHostLine, SimUart, UartEvent};
use profiphy::phy::{PhyConfig, TransferState};
use profiphy::{Baudrate, UartDivisor};

fn setup_with(config: PhyConfig) -> Bridge<SimUart, SimHostLine> {
    let _ = env_logger::builder().is_test(true).try_init();
    Bridge::new(SimUart::new(), SimHostLine::new(), config).unwrap()
}

fn setup() -> Bridge<SimUart, SimHostLine> {
    setup_with(PhyConfig::default())
}

fn build_packet(command: u8, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![command, u8::try_from(payload.len()).unwrap(), 0];
    packet.extend_from_slice(payload);
    packet[2] = checksum::add_bytes(checksum::add_bytes(0, &packet[..2]), payload) ^ 0xFF;
    packet
}

/// Clock a packet into the bridge, then keep clocking no-operation bytes until the data-ready
/// line drops.  Returns everything the host would have read back, starting with the transfer
/// that completed the packet.
fn transact(bridge: &mut Bridge<SimUart, SimHostLine>, packet: &[u8]) -> Vec<u8> {
    let mut last = 0;
    for &byte in packet {
        last = bridge.spi_exchange(byte);
    }
    let mut reply = vec![last];
    while bridge.line().is_ready() {
        reply.push(bridge.spi_exchange(0));
    }
    reply
}

/// Read a reply that was queued outside of an SPI transfer (i.e. by a PHY event).
fn poll_reply(bridge: &mut Bridge<SimUart, SimHostLine>) -> Vec<u8> {
    assert!(bridge.line().is_ready());
    let mut reply = Vec::new();
    while bridge.line().is_ready() {
        reply.push(bridge.spi_exchange(0));
    }
    reply
}

/// Deliver transmit interrupts until the whole telegram is queued, then the final
/// transmit-complete.
fn drive_uart_tx(bridge: &mut Bridge<SimUart, SimHostLine>) {
    while bridge.uart().tx_ready_irq() {
        bridge.uart_event(UartEvent::TxRegisterEmpty);
    }
    bridge.uart_event(UartEvent::TxComplete);
}

fn feed_reply(bridge: &mut Bridge<SimUart, SimHostLine>, bytes: &[u8]) {
    for &byte in bytes {
        bridge.uart_event(UartEvent::Rx {
            byte,
            status: LineStatus::empty(),
        });
    }
}

/// A 16 byte SD2 telegram (LE = LEr = 10) with a valid line checksum.
fn sd2_telegram(da: u8, sa: u8) -> Vec<u8> {
    let mut telegram = vec![0x68, 10, 10, 0x68, da, sa, 0x5D];
    telegram.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);
    telegram.push(checksum::add_bytes(0, &telegram[4..14]));
    telegram.push(0x16);
    telegram
}

const ACK_REPLY: &[u8] = &[0x06, 0x00, 0xF9];
const NACK_REPLY: &[u8] = &[0x07, 0x00, 0xF8];

#[rstest::rstest]
#[case::b19200(Baudrate::B19200)]
#[case::b93750(Baudrate::B93750)]
#[case::b500000(Baudrate::B500000)]
fn set_config_applies_baudrate(#[case] baudrate: Baudrate) {
    let mut bridge = setup_with(PhyConfig {
        baudrate: Baudrate::B9600,
        ..PhyConfig::default()
    });
    assert_eq!(bridge.uart().baudrate(), Some(Baudrate::B9600));

    let payload = [baudrate.host_code(), 50, 1];
    let packet = build_packet(Command::SetConfig as u8, &payload);
    let reply = transact(&mut bridge, &packet);

    assert_eq!(reply, ACK_REPLY);
    assert_eq!(bridge.uart().baudrate(), Some(baudrate));
    assert_eq!(bridge.phy().config().baudrate, baudrate);
    assert_eq!(bridge.phy().config().rx_timeout_ms, 50);

    // The divisor registers must hold the table entry for the new rate.
    assert_eq!(
        bridge.uart().divisor(),
        baudrate.divisor(SimUart::DEFAULT_CLOCK_HZ)
    );
    if baudrate == Baudrate::B19200 {
        assert_eq!(
            bridge.uart().divisor(),
            Some(UartDivisor {
                ubrr: 59,
                double_speed: false
            })
        );
    }
}

#[test]
fn set_config_with_unreachable_baudrate_is_nacked() {
    let mut bridge = setup();

    // 12 Mbit/s cannot be generated from the default 18.432 MHz clock.
    let payload = [Baudrate::B12000000.host_code(), 100, 1];
    let packet = build_packet(Command::SetConfig as u8, &payload);
    let reply = transact(&mut bridge, &packet);

    assert_eq!(reply, NACK_REPLY);
    assert_eq!(bridge.phy().config().baudrate, Baudrate::B19200);
    assert_eq!(bridge.uart().baudrate(), Some(Baudrate::B19200));
}

#[test]
fn set_config_with_short_payload_is_nacked() {
    let mut bridge = setup();

    let packet = build_packet(Command::SetConfig as u8, &[1]);
    let reply = transact(&mut bridge, &packet);

    assert_eq!(reply, NACK_REPLY);
}

#[test]
fn sdn_request_transmits_and_acks() {
    let mut bridge = setup();

    let telegram = [0xDC, 0x22, 0x02];
    let packet = build_packet(Command::PbSdn as u8, &telegram);
    for &byte in &packet {
        bridge.spi_exchange(byte);
    }
    assert!(bridge.host().is_blocked());
    assert_eq!(bridge.phy().state(), TransferState::SendingSdn);

    drive_uart_tx(&mut bridge);
    assert_eq!(bridge.phy().state(), TransferState::Idle);
    assert!(!bridge.host().is_blocked());
    assert_eq!(bridge.uart().transmitted(), &telegram);

    assert_eq!(poll_reply(&mut bridge), ACK_REPLY);
}

#[test]
fn srd_request_roundtrip() {
    let mut bridge = setup();

    let telegram = sd2_telegram(0x22, 0x02);
    let packet = build_packet(Command::PbSrd as u8, &telegram);
    for &byte in &packet {
        bridge.spi_exchange(byte);
    }
    assert!(bridge.host().is_blocked());
    assert_eq!(bridge.phy().state(), TransferState::SendingSdr);

    drive_uart_tx(&mut bridge);
    assert_eq!(bridge.phy().state(), TransferState::ReceivingSdr);
    assert!(!bridge.host().is_blocked());
    assert!(bridge.uart().receiver_enabled());
    assert!(!bridge.uart().rts());
    assert_eq!(bridge.uart().transmitted(), &telegram);

    let bus_reply = sd2_telegram(0x02, 0x22);
    feed_reply(&mut bridge, &bus_reply);
    assert_eq!(bridge.phy().state(), TransferState::Idle);

    let reply = poll_reply(&mut bridge);
    assert_eq!(reply.len(), 3 + 16);
    assert_eq!(reply[0], Command::PbSrdReply as u8);
    assert_eq!(reply[1], 16);
    assert_eq!(&reply[3..], &bus_reply);

    // The reply packet's own checksum must validate on the host side.
    let expected_fcs =
        checksum::add_bytes(checksum::add_bytes(0, &reply[..2]), &reply[3..]) ^ 0xFF;
    assert_eq!(reply[2], expected_fcs);
}

#[test]
fn srd_request_with_corrupt_checksum_is_nacked_without_transfer() {
    let mut bridge = setup();

    let telegram = sd2_telegram(0x22, 0x02);
    let mut packet = build_packet(Command::PbSrd as u8, &telegram);
    packet[2] ^= 0xA5;

    let reply = transact(&mut bridge, &packet);
    assert_eq!(reply, NACK_REPLY);
    assert_eq!(bridge.phy().state(), TransferState::Idle);
    assert!(!bridge.host().is_blocked());
    assert!(bridge.uart().transmitted().is_empty());
}

#[test]
fn srd_request_while_phy_is_busy_is_nacked_synchronously() {
    let mut bridge = setup();

    let telegram = sd2_telegram(0x22, 0x02);
    let packet = build_packet(Command::PbSrd as u8, &telegram);
    for &byte in &packet {
        bridge.spi_exchange(byte);
    }
    drive_uart_tx(&mut bridge);
    assert_eq!(bridge.phy().state(), TransferState::ReceivingSdr);

    // The link is unblocked again, but the PHY still owns the bus.
    let reply = transact(&mut bridge, &packet);
    assert_eq!(reply, NACK_REPLY);
    assert_eq!(bridge.phy().state(), TransferState::ReceivingSdr);
}

#[test]
fn reset_during_receive_recovers_the_link() {
    let mut bridge = setup();

    let telegram = sd2_telegram(0x22, 0x02);
    let packet = build_packet(Command::PbSrd as u8, &telegram);
    for &byte in &packet {
        bridge.spi_exchange(byte);
    }
    drive_uart_tx(&mut bridge);
    feed_reply(&mut bridge, &sd2_telegram(0x02, 0x22)[..3]);
    assert_eq!(bridge.phy().state(), TransferState::ReceivingSdr);

    let reply = transact(&mut bridge, &build_packet(Command::Reset as u8, &[]));
    assert_eq!(reply, ACK_REPLY);
    assert_eq!(bridge.phy().state(), TransferState::Idle);
    assert!(!bridge.host().is_blocked());
    assert!(!bridge.uart().receiver_enabled());

    // A new request goes through immediately.
    bridge.uart_mut().take_transmitted();
    let token = [0xDC, 0x22, 0x02];
    for &byte in &build_packet(Command::PbSdn as u8, &token) {
        bridge.spi_exchange(byte);
    }
    drive_uart_tx(&mut bridge);
    assert_eq!(bridge.uart().transmitted(), &token);
    assert_eq!(poll_reply(&mut bridge), ACK_REPLY);
}

#[test]
fn receive_timeout_is_reported_as_nack() {
    let mut bridge = setup_with(PhyConfig {
        rx_timeout_ms: 5,
        ..PhyConfig::default()
    });

    let telegram = sd2_telegram(0x22, 0x02);
    for &byte in &build_packet(Command::PbSrd as u8, &telegram) {
        bridge.spi_exchange(byte);
    }
    drive_uart_tx(&mut bridge);
    assert_eq!(bridge.phy().state(), TransferState::ReceivingSdr);

    for _ in 0..5 {
        bridge.tick_1ms();
    }
    assert_eq!(bridge.phy().state(), TransferState::Idle);
    assert_eq!(poll_reply(&mut bridge), NACK_REPLY);
}
