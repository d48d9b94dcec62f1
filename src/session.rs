//! Device session: the single active device and everything routed from it
//!
//! A `Session` is only ever touched through the listener's lock, so none of
//! its methods synchronize on their own. At most one device handle is active
//! at a time; opening while one is active fails without touching it.

use rawhid_transport::{BoxedTransport, HidHandle};
use tracing::{debug, info, warn};

use crate::config::ListenerConfig;
use crate::console::Console;
use crate::discovery::{self, DiscoveredDevice};
use crate::error::ListenerError;
use crate::packet::{chunk, classify, Packet, PacketError, StreamId, PACKET_SIZE};
use crate::router::{hex_dump, StreamRouter};

/// What one poll iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No device open
    Idle,
    /// Receive timed out
    Timeout,
    /// Text printed to the console
    Text,
    /// Data packet routed
    Data(StreamId),
    /// Packet rejected and reported
    Dropped,
}

/// Shared session state: transport, active handle, stream routing, console
pub struct Session {
    transport: BoxedTransport,
    active: Option<HidHandle>,
    router: StreamRouter,
    console: Console,
    config: ListenerConfig,
}

impl Session {
    pub fn new(transport: BoxedTransport, config: ListenerConfig, console: Console) -> Self {
        Self {
            transport,
            active: None,
            router: StreamRouter::new(),
            console,
            config,
        }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_handle(&self) -> Option<HidHandle> {
        self.active
    }

    pub fn console(&mut self) -> &mut Console {
        &mut self.console
    }

    pub fn router(&self) -> &StreamRouter {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut StreamRouter {
        &mut self.router
    }

    /// Report a non-fatal error to the operator
    pub fn report(&mut self, err: &ListenerError) {
        match err {
            ListenerError::DeviceOffline(source) => warn!("Device offline: {}", source),
            ListenerError::Transport(source) => warn!("Transport failure: {}", source),
            other => debug!("Reporting: {:?}", other),
        }
        self.console.line(err);
    }

    fn ensure_closed(&self) -> Result<(), ListenerError> {
        match self.active {
            Some(_) => Err(ListenerError::DeviceAlreadyOpen),
            None => Ok(()),
        }
    }

    /// Open the first device of the first profile that has one
    pub fn open_first(&mut self) -> Result<HidHandle, ListenerError> {
        self.ensure_closed()?;
        let handles = discovery::open_matching(self.transport.as_mut(), &self.config.profiles, 1)?;

        let mut handles = handles.into_iter();
        let handle = handles.next().ok_or(ListenerError::DeviceNotFound)?;
        // A misbehaving backend may return more than asked for
        for extra in handles {
            self.transport.close(extra);
        }

        info!("Opened first device as {}", handle);
        self.active = Some(handle);
        self.console.line("found rawhid device");
        Ok(handle)
    }

    /// Open the device reporting `identity`
    pub fn open_by_identity(&mut self, identity: u8) -> Result<HidHandle, ListenerError> {
        self.ensure_closed()?;
        let handle = discovery::open_by_identity(self.transport.as_mut(), &self.config, identity)?;
        self.active = Some(handle);
        Ok(handle)
    }

    /// Identify all attached devices; refused while a device is open
    pub fn enumerate(&mut self) -> Result<Vec<DiscoveredDevice>, ListenerError> {
        self.ensure_closed()?;
        discovery::enumerate(self.transport.as_mut(), &self.config, &mut self.console)
    }

    /// Close the active device
    pub fn close(&mut self) -> Result<(), ListenerError> {
        let handle = self.active.take().ok_or(ListenerError::DeviceNotOpen)?;
        self.transport.close(handle);
        info!("Closed device {}", handle);
        Ok(())
    }

    /// Send `payload` to the active device in 64-byte chunks
    ///
    /// Each chunk gets `send_retries` extra attempts; the first chunk that
    /// still fails aborts the rest.
    ///
    /// # Returns
    /// Number of packets sent
    pub fn send_payload(&mut self, payload: &[u8]) -> Result<usize, ListenerError> {
        let handle = self.active.ok_or(ListenerError::DeviceNotOpen)?;
        let packets = chunk(payload);
        let attempts = self.config.send_retries + 1;

        for packet in &packets {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match self.transport.send(handle, packet, self.config.tx_timeout_ms) {
                    Ok(_) => break,
                    Err(source) => {
                        debug!("Send attempt {} to {} failed: {}", attempt, handle, source);
                        self.console.line("Send failed.");
                        if attempt >= attempts {
                            return Err(ListenerError::SendFailure { attempts, source });
                        }
                    }
                }
            }
        }

        debug!("Sent {} packet(s) to {}", packets.len(), handle);
        Ok(packets.len())
    }

    /// One receive attempt on the active device
    ///
    /// Text is printed, data is routed, malformed or short packets are
    /// reported and dropped. A transport failure closes the device.
    pub fn poll_once(&mut self) -> Result<PollOutcome, ListenerError> {
        let Some(handle) = self.active else {
            return Ok(PollOutcome::Idle);
        };

        let mut buf = [0u8; PACKET_SIZE];
        let len = match self.transport.receive(handle, &mut buf, self.config.rx_timeout_ms) {
            Ok(len) => len,
            Err(source) => {
                self.transport.close(handle);
                self.active = None;
                return Err(ListenerError::DeviceOffline(source));
            }
        };
        if len == 0 {
            return Ok(PollOutcome::Timeout);
        }

        let received = &buf[..len];
        match classify(received) {
            Ok(Packet::Text(text)) => {
                self.console.bytes(text);
                Ok(PollOutcome::Text)
            }
            Ok(Packet::Data { stream, payload }) => {
                self.router
                    .route(stream, received, payload, &mut self.console)?;
                Ok(PollOutcome::Data(stream))
            }
            Err(e) => {
                let incomplete = matches!(e, PacketError::Incomplete(_));
                self.report(&ListenerError::from(e));
                if incomplete {
                    self.console.text(hex_dump(received));
                }
                Ok(PollOutcome::Dropped)
            }
        }
    }

    /// Close the active device (if any) and every stream file
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.active.take() {
            self.transport.close(handle);
            info!("Closed device {} on shutdown", handle);
        }
        self.router.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::SharedBuffer;
    use crate::packet::{build_data_packet, RX_ID, TX_ID};
    use rawhid_transport::{SimDeviceId, SimulatedTransport, ARDUINO_RAWHID, TEENSY_RAWHID};

    fn session_with(sim: &SimulatedTransport) -> (Session, SharedBuffer) {
        let buffer = SharedBuffer::new();
        let config = ListenerConfig {
            rx_timeout_ms: 0,
            identify_attempts: 5,
            ..ListenerConfig::default()
        };
        let session = Session::new(
            Box::new(sim.clone()),
            config,
            Console::new(Box::new(buffer.clone())),
        );
        (session, buffer)
    }

    fn answer_identity(sim: &SimulatedTransport, dev: SimDeviceId, identity: u8) {
        sim.set_responder(
            dev,
            Box::new(move |report: &[u8; PACKET_SIZE]| {
                (report[..3] == [TX_ID; 3]).then(|| vec![RX_ID, identity])
            }),
        );
    }

    #[test]
    fn test_open_first_and_reopen_is_refused() {
        let sim = SimulatedTransport::new();
        let dev = sim.add_device(TEENSY_RAWHID);
        sim.add_device(TEENSY_RAWHID);
        let (mut session, _) = session_with(&sim);

        let handle = session.open_first().unwrap();
        assert!(session.is_open());
        assert_eq!(sim.device_for(handle), Some(dev));

        assert!(matches!(session.open_first(), Err(ListenerError::DeviceAlreadyOpen)));
        assert!(matches!(
            session.open_by_identity(1),
            Err(ListenerError::DeviceAlreadyOpen)
        ));
        assert_eq!(session.active_handle(), Some(handle));
        assert_eq!(sim.open_handles(), vec![handle]);
    }

    #[test]
    fn test_open_first_tries_second_profile() {
        let sim = SimulatedTransport::new();
        let dev = sim.add_device(ARDUINO_RAWHID);
        let (mut session, buffer) = session_with(&sim);

        let handle = session.open_first().unwrap();
        assert_eq!(sim.device_for(handle), Some(dev));
        assert_eq!(buffer.contents(), "found rawhid device\n");
    }

    #[test]
    fn test_open_first_without_devices() {
        let sim = SimulatedTransport::new();
        let (mut session, _) = session_with(&sim);
        assert!(matches!(session.open_first(), Err(ListenerError::DeviceNotFound)));
        assert!(!session.is_open());
    }

    #[test]
    fn test_open_by_identity_sets_active() {
        let sim = SimulatedTransport::new();
        let a = sim.add_device(TEENSY_RAWHID);
        let b = sim.add_device(TEENSY_RAWHID);
        answer_identity(&sim, a, 4);
        answer_identity(&sim, b, 5);
        let (mut session, _) = session_with(&sim);

        let handle = session.open_by_identity(5).unwrap();
        assert_eq!(sim.device_for(handle), Some(b));
        assert_eq!(session.active_handle(), Some(handle));
    }

    #[test]
    fn test_close_and_close_again() {
        let sim = SimulatedTransport::new();
        let dev = sim.add_device(TEENSY_RAWHID);
        let (mut session, _) = session_with(&sim);

        session.open_first().unwrap();
        session.close().unwrap();
        assert!(!session.is_open());
        assert!(matches!(session.close(), Err(ListenerError::DeviceNotOpen)));
        assert_eq!(sim.close_count(dev), 1);
    }

    #[test]
    fn test_enumerate_refused_while_open() {
        let sim = SimulatedTransport::new();
        sim.add_device(TEENSY_RAWHID);
        let (mut session, _) = session_with(&sim);
        session.open_first().unwrap();
        assert!(matches!(session.enumerate(), Err(ListenerError::DeviceAlreadyOpen)));
        assert_eq!(sim.open_handles().len(), 1);
    }

    #[test]
    fn test_send_payload_chunks() {
        let sim = SimulatedTransport::new();
        let dev = sim.add_device(TEENSY_RAWHID);
        let (mut session, _) = session_with(&sim);

        assert!(matches!(
            session.send_payload(b"x"),
            Err(ListenerError::DeviceNotOpen)
        ));

        session.open_first().unwrap();
        let payload: Vec<u8> = (0..100u8).collect();
        assert_eq!(session.send_payload(&payload).unwrap(), 2);

        let sent = sim.sent_reports(dev);
        assert_eq!(sent.len(), 2);
        assert_eq!(&sent[0][..], &payload[..64]);
        assert_eq!(&sent[1][..36], &payload[64..]);
        assert!(sent[1][36..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_send_retries_once_then_gives_up() {
        let sim = SimulatedTransport::new();
        let dev = sim.add_device(TEENSY_RAWHID);
        let (mut session, buffer) = session_with(&sim);
        session.open_first().unwrap();
        buffer.clear();

        sim.fail_sends(dev, 1);
        assert_eq!(session.send_payload(b"ok").unwrap(), 1);
        assert_eq!(sim.sent_reports(dev).len(), 1);
        assert_eq!(buffer.contents(), "Send failed.\n");

        sim.fail_sends(dev, 2);
        let err = session.send_payload(b"lost").unwrap_err();
        assert!(matches!(err, ListenerError::SendFailure { attempts: 2, .. }));
        assert_eq!(sim.sent_reports(dev).len(), 1);
        // Send failures do not close the device
        assert!(session.is_open());
    }

    #[test]
    fn test_poll_idle_and_timeout() {
        let sim = SimulatedTransport::new();
        let dev = sim.add_device(TEENSY_RAWHID);
        let (mut session, _) = session_with(&sim);

        assert_eq!(session.poll_once().unwrap(), PollOutcome::Idle);
        assert_eq!(sim.receive_calls(dev), 0);

        session.open_first().unwrap();
        assert_eq!(session.poll_once().unwrap(), PollOutcome::Timeout);
        assert_eq!(sim.receive_calls(dev), 1);
    }

    #[test]
    fn test_poll_prints_text() {
        let sim = SimulatedTransport::new();
        let dev = sim.add_device(TEENSY_RAWHID);
        let (mut session, buffer) = session_with(&sim);
        session.open_first().unwrap();
        buffer.clear();

        let mut packet = [0u8; PACKET_SIZE];
        packet[1..14].copy_from_slice(b"hello device\n");
        sim.queue_report(dev, &packet);

        assert_eq!(session.poll_once().unwrap(), PollOutcome::Text);
        assert_eq!(buffer.contents(), "hello device\n");
    }

    #[test]
    fn test_poll_prints_device_text_byte_for_byte() {
        let sim = SimulatedTransport::new();
        let dev = sim.add_device(TEENSY_RAWHID);
        let (mut session, buffer) = session_with(&sim);
        session.open_first().unwrap();
        buffer.clear();

        // Latin-1 degree sign followed by 'C'
        let mut packet = [0u8; PACKET_SIZE];
        packet[1..3].copy_from_slice(&[0xB0, 0x43]);
        sim.queue_report(dev, &packet);

        assert_eq!(session.poll_once().unwrap(), PollOutcome::Text);
        assert_eq!(buffer.raw(), vec![0xB0, 0x43]);
    }

    #[test]
    fn test_send_payload_keeps_raw_bytes() {
        let sim = SimulatedTransport::new();
        let dev = sim.add_device(TEENSY_RAWHID);
        let (mut session, _) = session_with(&sim);
        session.open_first().unwrap();

        session.send_payload(&[0xFF, 0x01]).unwrap();
        let sent = sim.sent_reports(dev);
        assert_eq!(&sent[0][..2], &[0xFF, 0x01]);
        assert!(sent[0][2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_poll_routes_data_to_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream1.bin");
        let sim = SimulatedTransport::new();
        let dev = sim.add_device(TEENSY_RAWHID);
        let (mut session, _) = session_with(&sim);
        session.open_first().unwrap();
        session
            .router_mut()
            .set_sink(StreamId::Data1, Some(&path))
            .unwrap();

        let payload: Vec<u8> = (1..=10).collect();
        sim.queue_report(dev, &build_data_packet(StreamId::Data1, &payload).unwrap());
        sim.queue_report(dev, &build_data_packet(StreamId::Data0, b"nope").unwrap());

        assert_eq!(session.poll_once().unwrap(), PollOutcome::Data(StreamId::Data1));
        assert_eq!(session.poll_once().unwrap(), PollOutcome::Data(StreamId::Data0));
        assert_eq!(std::fs::read(&path).unwrap(), payload);
    }

    #[test]
    fn test_poll_drops_incomplete_packet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream0.bin");
        let sim = SimulatedTransport::new();
        let dev = sim.add_device(TEENSY_RAWHID);
        let (mut session, buffer) = session_with(&sim);
        session.open_first().unwrap();
        session
            .router_mut()
            .set_sink(StreamId::Data0, Some(&path))
            .unwrap();
        buffer.clear();

        sim.queue_report(dev, &[0x09, 0xAA, 0xBB]);
        assert_eq!(session.poll_once().unwrap(), PollOutcome::Dropped);

        let out = buffer.contents();
        assert!(out.starts_with("Error reading. Got incomplete packet! Length = 3\n"));
        assert!(out.contains("recv 3 bytes:\n09 AA BB\n"));
        assert!(std::fs::read(&path).unwrap().is_empty());
    }

    #[test]
    fn test_poll_failure_closes_device() {
        let sim = SimulatedTransport::new();
        let dev = sim.add_device(TEENSY_RAWHID);
        let (mut session, _) = session_with(&sim);
        session.open_first().unwrap();

        sim.unplug(dev);
        let err = session.poll_once().unwrap_err();
        assert!(matches!(err, ListenerError::DeviceOffline(_)));
        assert_eq!(err.to_string(), "error reading, device went offline");
        assert!(!session.is_open());
        assert_eq!(sim.close_count(dev), 1);
        assert_eq!(session.poll_once().unwrap(), PollOutcome::Idle);
    }

    #[test]
    fn test_shutdown_closes_device_and_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let sim = SimulatedTransport::new();
        let dev = sim.add_device(TEENSY_RAWHID);
        let (mut session, _) = session_with(&sim);
        session.open_first().unwrap();
        session
            .router_mut()
            .set_sink(StreamId::Data2, Some(&dir.path().join("d2.bin")))
            .unwrap();

        session.shutdown();
        session.shutdown();
        assert!(!session.is_open());
        assert_eq!(session.router().sink_path(StreamId::Data2), None);
        assert_eq!(sim.close_count(dev), 1);
    }
}
