//! Timestamped ring buffer (C2): an SPSC byte ring carrying fixed-size
//! frame events, with a tail timestamp and a shared ticks-per-frame rate
//! used to extrapolate the head timestamp for any fill level.
//!
//! Grounded on the teacher's `bark-device::sink::Sink`/`Source`: a
//! `ringbuf::HeapRb` split into `Producer`/`Consumer` halves shared via
//! `Arc`, with auxiliary atomic state (there: `AtomicLatency` tracking
//! device latency; here: the tail timestamp and the DLL's current rate)
//! living alongside the raw sample ring rather than inside it.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};

use ffado_streaming_types::Timestamp;

struct Shared {
    event_size: usize,
    capacity_frames: usize,
    /// Bit pattern of the tick timestamp of the *last* frame written by
    /// the most recent `write_frames` call. Valid only once `has_data` is
    /// set.
    tail_timestamp: AtomicU64,
    /// Bit pattern (`f64::to_bits`) of the current ticks-per-frame
    /// estimate, updated by the consumer from the DLL.
    ticks_per_frame_bits: AtomicU64,
    filled_frames: AtomicUsize,
    has_data: std::sync::atomic::AtomicBool,
}

impl Shared {
    fn ticks_per_frame(&self) -> f64 {
        f64::from_bits(self.ticks_per_frame_bits.load(Ordering::Relaxed))
    }
}

pub fn new(capacity_frames: usize, event_size: usize, nominal_ticks_per_frame: f64) -> (RingProducer, RingConsumer) {
    assert!(capacity_frames.is_power_of_two(), "ring buffer capacity must be a power of two");

    let byte_capacity = capacity_frames * event_size;
    let rb = HeapRb::<u8>::new(byte_capacity);
    let (producer, consumer) = rb.split();

    let shared = Arc::new(Shared {
        event_size,
        capacity_frames,
        tail_timestamp: AtomicU64::new(0),
        ticks_per_frame_bits: AtomicU64::new(nominal_ticks_per_frame.to_bits()),
        filled_frames: AtomicUsize::new(0),
        has_data: std::sync::atomic::AtomicBool::new(false),
    });

    (
        RingProducer { shared: shared.clone(), producer },
        RingConsumer { shared, consumer },
    )
}

pub struct RingProducer {
    shared: Arc<Shared>,
    producer: HeapProducer<u8>,
}

pub struct RingConsumer {
    shared: Arc<Shared>,
    consumer: HeapConsumer<u8>,
}

/// A write could not be satisfied because fewer bytes than requested were
/// accepted by the underlying ring.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct XRun;

impl RingProducer {
    pub fn event_size(&self) -> usize {
        self.shared.event_size
    }

    pub fn capacity_frames(&self) -> usize {
        self.shared.capacity_frames
    }

    /// Write `n` frames (`n * event_size` bytes) from `src`, stamping the
    /// write with the tick timestamp of the *last* frame in this write.
    pub fn write_frames(&mut self, n: usize, src: &[u8], tail_ts: Timestamp) -> Result<(), XRun> {
        let event_size = self.shared.event_size;
        assert_eq!(src.len(), n * event_size, "write_frames: src length does not match n*event_size");

        // Check space up front so the write is all-or-nothing: a torn
        // frame must never become observable to the consumer.
        if self.producer.free_len() < src.len() {
            return Err(XRun);
        }

        let written = self.producer.push_slice(src);
        debug_assert_eq!(written, src.len());

        self.shared.tail_timestamp.store(tail_ts.ticks(), Ordering::Release);
        self.shared.filled_frames.fetch_add(n, Ordering::AcqRel);
        self.shared.has_data.store(true, Ordering::Release);
        Ok(())
    }

    pub fn write_space_frames(&self) -> usize {
        self.producer.free_len() / self.shared.event_size
    }

    /// Update the rate used to extrapolate the head timestamp. Mirrors
    /// [`RingConsumer::set_ticks_per_frame`] against the same shared
    /// state, for callers (e.g. the receive processor feeding the DLL)
    /// that hold the producer half.
    pub fn set_ticks_per_frame(&self, ticks_per_frame: f64) {
        self.shared.ticks_per_frame_bits.store(ticks_per_frame.to_bits(), Ordering::Relaxed);
    }

    /// Like [`write_frames`](Self::write_frames), but for client-facing
    /// callers that want a descriptive error instead of the bare `XRun`
    /// the realtime processors match on internally.
    pub fn write_frames_checked(
        &mut self,
        n: usize,
        src: &[u8],
        tail_ts: Timestamp,
    ) -> Result<(), ffado_streaming_types::error::RingBufferError> {
        let available = self.write_space_frames();
        self.write_frames(n, src, tail_ts)
            .map_err(|XRun| ffado_streaming_types::error::RingBufferError::Overrun { requested: n, available })
    }
}

impl RingConsumer {
    pub fn event_size(&self) -> usize {
        self.shared.event_size
    }

    pub fn capacity_frames(&self) -> usize {
        self.shared.capacity_frames
    }

    /// Read `n` frames into `dst`. Does not touch the stored tail
    /// timestamp; only the producer's next write moves it.
    pub fn read_frames(&mut self, n: usize, dst: &mut [u8]) -> Result<(), XRun> {
        let event_size = self.shared.event_size;
        assert_eq!(dst.len(), n * event_size, "read_frames: dst length does not match n*event_size");

        if self.consumer.len() < dst.len() {
            return Err(XRun);
        }

        let read = self.consumer.pop_slice(dst);
        debug_assert_eq!(read, dst.len());

        self.shared.filled_frames.fetch_sub(n, Ordering::AcqRel);
        Ok(())
    }

    pub fn read_space_frames(&self) -> usize {
        self.consumer.len() / self.shared.event_size
    }

    /// Like [`read_frames`](Self::read_frames), but for client-facing
    /// callers that want a descriptive error instead of the bare `XRun`
    /// the realtime processors match on internally.
    pub fn read_frames_checked(&mut self, n: usize, dst: &mut [u8]) -> Result<(), ffado_streaming_types::error::RingBufferError> {
        let available = self.read_space_frames();
        self.read_frames(n, dst)
            .map_err(|XRun| ffado_streaming_types::error::RingBufferError::Underrun { requested: n, available })
    }

    /// Update the rate used to extrapolate the head timestamp. Racy by
    /// design: a stale read only shifts the extrapolation by one DLL
    /// update's worth of drift, self-correcting on the next call.
    pub fn set_ticks_per_frame(&self, ticks_per_frame: f64) {
        self.shared.ticks_per_frame_bits.store(ticks_per_frame.to_bits(), Ordering::Relaxed);
    }

    pub fn ticks_per_frame(&self) -> f64 {
        self.shared.ticks_per_frame()
    }

    /// Tick timestamp of the frame currently at the read cursor, and the
    /// number of frames currently filled.
    pub fn get_buffer_head_timestamp(&self) -> Option<(Timestamp, usize)> {
        if !self.shared.has_data.load(Ordering::Acquire) {
            return None;
        }

        let fill = self.shared.filled_frames.load(Ordering::Acquire);
        if fill == 0 {
            return None;
        }

        let tail_ticks = self.shared.tail_timestamp.load(Ordering::Acquire);
        let tail_ts = Timestamp::from_ticks(tail_ticks);
        let back_ticks = ((fill - 1) as f64 * self.shared.ticks_per_frame()).round() as i64;
        Some((ffado_streaming_types::cycletimer::add_ticks(tail_ts, -back_ticks), fill))
    }

    /// Discard `n` frames without reading them into client memory
    /// (consumer-only operation).
    pub fn drop_frames(&mut self, n: usize) -> Result<(), XRun> {
        let event_size = self.shared.event_size;
        let skipped = self.consumer.skip(n * event_size);
        if skipped != n * event_size {
            return Err(XRun);
        }
        self.shared.filled_frames.fetch_sub(n, Ordering::AcqRel);
        Ok(())
    }

    pub fn reset(&mut self) {
        let len = self.consumer.len();
        self.consumer.skip(len);
        self.shared.filled_frames.store(0, Ordering::Release);
        self.shared.has_data.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT_SIZE: usize = 4;

    #[test]
    fn write_then_read_round_trips_bytes() {
        let (mut producer, mut consumer) = new(16, EVENT_SIZE, 512.0);

        let frame_a = [1u8, 2, 3, 4];
        let frame_b = [5u8, 6, 7, 8];
        let mut src = Vec::new();
        src.extend_from_slice(&frame_a);
        src.extend_from_slice(&frame_b);

        producer.write_frames(2, &src, Timestamp::from_ticks(2000)).unwrap();

        let mut dst = vec![0u8; EVENT_SIZE * 2];
        consumer.read_frames(2, &mut dst).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn head_timestamp_extrapolates_from_tail() {
        let (mut producer, consumer) = new(16, EVENT_SIZE, 512.0);

        let n = 8;
        let src = vec![0u8; EVENT_SIZE * n];
        producer.write_frames(n, &src, Timestamp::from_ticks(10_000)).unwrap();

        let (head_ts, fill) = consumer.get_buffer_head_timestamp().unwrap();
        assert_eq!(fill, n);
        // tail is the timestamp of the *last* frame; head is (n-1) frames
        // of ticks_per_frame earlier.
        assert_eq!(head_ts.ticks(), 10_000 - (n as u64 - 1) * 512);
    }

    #[test]
    fn overrun_reports_xrun() {
        let (mut producer, _consumer) = new(4, EVENT_SIZE, 512.0);
        let src = vec![0u8; EVENT_SIZE * 5];
        assert_eq!(producer.write_frames(5, &src, Timestamp::from_ticks(0)), Err(XRun));
    }

    #[test]
    fn underrun_reports_xrun() {
        let (_producer, mut consumer) = new(4, EVENT_SIZE, 512.0);
        let mut dst = vec![0u8; EVENT_SIZE];
        assert_eq!(consumer.read_frames(1, &mut dst), Err(XRun));
    }

    #[test]
    fn checked_overrun_reports_requested_and_available() {
        use ffado_streaming_types::error::RingBufferError;

        let (mut producer, _consumer) = new(4, EVENT_SIZE, 512.0);
        let src = vec![0u8; EVENT_SIZE * 5];
        let err = producer.write_frames_checked(5, &src, Timestamp::from_ticks(0)).unwrap_err();
        assert_eq!(err, RingBufferError::Overrun { requested: 5, available: 4 });
    }

    #[test]
    fn checked_underrun_reports_requested_and_available() {
        use ffado_streaming_types::error::RingBufferError;

        let (_producer, mut consumer) = new(4, EVENT_SIZE, 512.0);
        let mut dst = vec![0u8; EVENT_SIZE];
        let err = consumer.read_frames_checked(1, &mut dst).unwrap_err();
        assert_eq!(err, RingBufferError::Underrun { requested: 1, available: 0 });
    }

    #[test]
    fn ticks_per_frame_update_affects_next_extrapolation() {
        let (mut producer, consumer) = new(16, EVENT_SIZE, 512.0);
        let n = 4;
        let src = vec![0u8; EVENT_SIZE * n];
        producer.write_frames(n, &src, Timestamp::from_ticks(10_000)).unwrap();

        consumer.set_ticks_per_frame(1000.0);
        let (head_ts, _) = consumer.get_buffer_head_timestamp().unwrap();
        assert_eq!(head_ts.ticks(), 10_000 - 3000);
    }
}
