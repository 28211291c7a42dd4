//! In-process loopback `Iso1394` implementation (§4.10): feeds a
//! registered channel's transmit callback output directly into the
//! matching receive callback on a simulated 8000 Hz cycle clock. There is
//! no real FireWire hardware in this workspace to integrate with, so this
//! plays the role cpal's host/device abstraction plays for the teacher's
//! audio layer — the thing every other piece of the stack is actually
//! exercised against.
//!
//! Grounded on `bark-device::sink`/`source`: a background thread owned by
//! the transport, spawned via the shared `ffado_util::thread` helpers
//! (name + realtime priority), driving callbacks registered by the core.
//! `step()` exposes the same cycle-advance synchronously for use from
//! tests and the E2E scenarios in SPEC_FULL.md, which must not depend on
//! real wall-clock timing to stay deterministic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use ffado_streaming_types::cycletimer::CycleTimer;
use ffado_streaming_types::error::TransportError;
use ffado_streaming_types::{CYCLES_PER_SECOND, SECONDS_WRAP};

use crate::iso::{Iso1394, IsoChannel, ReceiveCallback, TransmitCallback};

const CYCLE_RING: u32 = CYCLES_PER_SECOND * SECONDS_WRAP;
const MAX_PACKET_LEN: usize = 1024;

struct Shared {
    cycle: AtomicU32,
    running: AtomicBool,
    receivers: Mutex<HashMap<IsoChannel, Box<dyn ReceiveCallback>>>,
    transmitters: Mutex<HashMap<IsoChannel, Box<dyn TransmitCallback>>>,
}

pub struct LoopbackTransport {
    shared: Arc<Shared>,
    node_id: u8,
    handle: Option<JoinHandle<()>>,
}

impl LoopbackTransport {
    pub fn new(node_id: u8) -> Self {
        LoopbackTransport {
            shared: Arc::new(Shared {
                cycle: AtomicU32::new(0),
                running: AtomicBool::new(false),
                receivers: Mutex::new(HashMap::new()),
                transmitters: Mutex::new(HashMap::new()),
            }),
            node_id,
            handle: None,
        }
    }

    /// Advance the simulated bus by exactly one cycle, synchronously.
    /// For every channel with both a transmitter and a receiver
    /// registered, pulls one packet from the transmitter and feeds it
    /// straight to the receiver.
    pub fn step(&self) -> u32 {
        let cycle = self.shared.cycle.fetch_add(1, Ordering::AcqRel) % CYCLE_RING;

        let mut transmitters = self.shared.transmitters.lock().unwrap();
        let mut receivers = self.shared.receivers.lock().unwrap();

        for (channel, xmit_cb) in transmitters.iter_mut() {
            let mut buf = Vec::with_capacity(MAX_PACKET_LEN);
            let (_disposition, tag, sy) = xmit_cb(&mut buf, cycle, false, MAX_PACKET_LEN);

            if buf.is_empty() {
                continue;
            }

            if let Some(recv_cb) = receivers.get_mut(channel) {
                recv_cb(&buf, tag, sy, cycle, false);
            }
        }

        cycle
    }
}

impl Iso1394 for LoopbackTransport {
    fn allocate_iso_channel(&mut self, _bandwidth: u32) -> Result<IsoChannel, TransportError> {
        // Loopback has no real bandwidth budget; channel numbers are
        // picked by the caller via `register_receive`/`register_transmit`.
        Ok(0)
    }

    fn free_iso_channel(&mut self, channel: IsoChannel) {
        self.shared.receivers.lock().unwrap().remove(&channel);
        self.shared.transmitters.lock().unwrap().remove(&channel);
    }

    fn register_receive(&mut self, channel: IsoChannel, cb: Box<dyn ReceiveCallback>) {
        self.shared.receivers.lock().unwrap().insert(channel, cb);
    }

    fn register_transmit(&mut self, channel: IsoChannel, cb: Box<dyn TransmitCallback>) {
        self.shared.transmitters.lock().unwrap().insert(channel, cb);
    }

    fn cycle_timer(&self) -> CycleTimer {
        let cycle = self.shared.cycle.load(Ordering::Acquire) % CYCLE_RING;
        let seconds = (cycle / CYCLES_PER_SECOND) as u8;
        let cycles = (cycle % CYCLES_PER_SECOND) as u16;
        CycleTimer::new(seconds, cycles, 0)
    }

    fn local_node_id(&self) -> u8 {
        self.node_id
    }

    fn start(&mut self) -> Result<(), TransportError> {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let shared = self.shared.clone();
        let handle = std::thread::spawn(move || {
            ffado_util::thread::set_name("ffado/loopback");
            ffado_util::thread::set_realtime_priority();

            while shared.running.load(Ordering::Acquire) {
                let cycle = shared.cycle.fetch_add(1, Ordering::AcqRel) % CYCLE_RING;

                let mut transmitters = shared.transmitters.lock().unwrap();
                let mut receivers = shared.receivers.lock().unwrap();

                for (channel, xmit_cb) in transmitters.iter_mut() {
                    let mut buf = Vec::with_capacity(MAX_PACKET_LEN);
                    let (_disposition, tag, sy) = xmit_cb(&mut buf, cycle, false, MAX_PACKET_LEN);

                    if buf.is_empty() {
                        continue;
                    }

                    if let Some(recv_cb) = receivers.get_mut(channel) {
                        recv_cb(&buf, tag, sy, cycle, false);
                    }
                }

                drop(receivers);
                drop(transmitters);

                std::thread::sleep(Duration::from_micros(125));
            }
        });

        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffado_streaming_types::error::{RecvDisposition, XmitDisposition};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn step_delivers_transmitted_packet_to_receiver() {
        let mut transport = LoopbackTransport::new(0);
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();

        transport.register_transmit(0, Box::new(move |out: &mut Vec<u8>, _cycle, _dropped, _max| {
            out.extend_from_slice(&[1, 2, 3, 4]);
            (XmitDisposition::Packet, 1, 0)
        }));

        transport.register_receive(0, Box::new(move |data: &[u8], _tag, _sy, _cycle, _dropped| {
            assert_eq!(data, &[1, 2, 3, 4]);
            received_clone.fetch_add(1, Ordering::SeqCst);
            RecvDisposition::Ok
        }));

        transport.step();
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_no_data_packets_are_not_delivered() {
        let mut transport = LoopbackTransport::new(0);
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();

        transport.register_transmit(0, Box::new(move |_out: &mut Vec<u8>, _cycle, _dropped, _max| {
            (XmitDisposition::EmptyPacket, 1, 0)
        }));

        transport.register_receive(0, Box::new(move |_data: &[u8], _tag, _sy, _cycle, _dropped| {
            received_clone.fetch_add(1, Ordering::SeqCst);
            RecvDisposition::Ok
        }));

        transport.step();
        assert_eq!(received.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cycle_timer_advances_with_step() {
        let transport = LoopbackTransport::new(0);
        let before = transport.cycle_timer();
        transport.step();
        let after = transport.cycle_timer();
        assert_ne!(before, after);
    }
}
