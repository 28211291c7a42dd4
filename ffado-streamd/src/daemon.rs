//! End-to-end orchestration: wires one receive and one transmit stream
//! processor through a [`LoopbackTransport`], drives the shared lifecycle
//! state machine, and demonstrates the whole pipeline with a generated
//! test tone in place of a real audio client.
//!
//! Grounded on the teacher's `stream::run`/`audio_thread` split: a
//! dedicated feeder thread (here: tone generator) paired with a
//! supervisor loop on the calling thread, both set to realtime priority
//! via the shared `ffado_util::thread` helpers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ffado_streaming_core::codec::{AmdtpCodec, MotuCodec};
use ffado_streaming_core::processor::transmit::XmitWindow;
use ffado_streaming_core::processor::{frame_byte_size, samples_to_bytes, FamilyCodec};
use ffado_streaming_core::{ring, RateDll, ReceiveProcessor, StreamProcessorManager, StreamState, SyncSource, TransmitProcessor};
use ffado_streaming_types::config::StreamingConfig;
use ffado_streaming_types::cycletimer::{add_ticks, ct_to_ticks, CycleTimer, Timestamp};
use ffado_streaming_types::diag::StreamDiagnostics;
use ffado_streaming_types::port::Direction;
use ffado_streaming_types::{CYCLES_PER_SECOND, TICKS_PER_SECOND};
use ffado_transport::{Iso1394, LoopbackTransport};

use crate::ProtocolFamily;

#[derive(Debug, derive_more::From)]
pub enum DaemonError {
    Transport(ffado_streaming_types::error::TransportError),
    Manager(ffado_streaming_types::error::ManagerError),
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonError::Transport(e) => write!(f, "transport error: {e}"),
            DaemonError::Manager(e) => write!(f, "manager error: {e}"),
        }
    }
}

pub struct RunOpt {
    pub sample_rate: u32,
    pub channels: usize,
    pub protocol: ProtocolFamily,
    pub duration_secs: u64,
}

fn cycle_to_ct(cycle: u32) -> CycleTimer {
    CycleTimer::new(
        (cycle / CYCLES_PER_SECOND) as u8,
        (cycle % CYCLES_PER_SECOND) as u16,
        0,
    )
}

fn make_codec(protocol: ProtocolFamily, channels: usize, direction: Direction) -> FamilyCodec {
    match protocol {
        ProtocolFamily::Amdtp => FamilyCodec::Amdtp(AmdtpCodec::new(channels, direction)),
        ProtocolFamily::Motu => FamilyCodec::Motu(MotuCodec::new(channels, direction)),
    }
}

pub fn run(opt: RunOpt, cfg: StreamingConfig) -> Result<(), DaemonError> {
    let channels = opt.channels;
    let sample_rate = opt.sample_rate;
    let period = cfg.common.period as usize;
    let ticks_per_frame = TICKS_PER_SECOND as f64 / sample_rate as f64;
    let capacity = (cfg.common.nb_buffers as usize * period).next_power_of_two();

    let diag = Arc::new(StreamDiagnostics::new());

    let (recv_producer, mut recv_consumer) = ring::new(capacity, frame_byte_size(channels), ticks_per_frame);
    let (mut xmit_producer, xmit_consumer) = ring::new(capacity, frame_byte_size(channels), ticks_per_frame);

    let recv_processor = ReceiveProcessor::new(make_codec(opt.protocol, channels, Direction::Receive), recv_producer, sample_rate, diag.clone());
    let mut xmit_processor = TransmitProcessor::new(make_codec(opt.protocol, channels, Direction::Transmit), xmit_consumer, sample_rate, 1, diag.clone());
    xmit_processor.set_window(XmitWindow {
        max_cycles_early: cfg.amdtp.xmit_max_cycles_early_transmit,
        transfer_delay_ticks: cfg.amdtp.xmit_transfer_delay,
        min_cycles_before_presentation: cfg.amdtp.xmit_min_cycles_before_presentation,
    });

    let update_rate_hz = sample_rate as f64 / period as f64;
    let dll = RateDll::new(ticks_per_frame, cfg.common.recv_sp_dll_bw as f64, update_rate_hz);

    let manager = Arc::new(Mutex::new(StreamProcessorManager::new(
        vec![recv_processor],
        vec![xmit_processor],
        SyncSource(0),
        dll,
        period,
        diag.clone(),
    )));

    manager.lock().unwrap().initialise();
    manager.lock().unwrap().prepare(std::slice::from_mut(&mut xmit_producer));
    manager.lock().unwrap().start_dry_running();

    let mut transport = LoopbackTransport::new(0);

    let recv_manager = manager.clone();
    transport.register_receive(0, Box::new(move |data: &[u8], tag, _sy, cycle, _dropped| {
        recv_manager.lock().unwrap().on_receive(0, data, tag, cycle_to_ct(cycle))
    }));

    let xmit_manager = manager.clone();
    transport.register_transmit(0, Box::new(move |out: &mut Vec<u8>, cycle, _dropped, _max| {
        let ct_now_ticks = ct_to_ticks(cycle_to_ct(cycle));
        let disposition = xmit_manager.lock().unwrap().build_transmit(0, cycle, ct_now_ticks, out);
        (disposition, 1, 0)
    }));

    transport.start()?;

    let running = Arc::new(AtomicBool::new(true));
    let feeder_running = running.clone();
    let feeder = std::thread::spawn(move || {
        ffado_util::thread::set_name("ffado/tone");
        ffado_util::thread::set_realtime_priority();
        feed_test_tone(&mut xmit_producer, channels, ticks_per_frame, &feeder_running);
    });

    let period_duration = Duration::from_secs_f64(period as f64 / sample_rate as f64);
    let mut enable_at: Option<Timestamp> = None;

    let deadline = std::time::Instant::now() + Duration::from_secs(opt.duration_secs);
    let mut scratch = vec![0u8; frame_byte_size(channels) * period];

    while std::time::Instant::now() < deadline {
        let mut locked = manager.lock().unwrap();
        match locked.state() {
            StreamState::DryRunning => {
                let fill = recv_consumer.read_space_frames();
                if locked.poll_dry_running(fill)? {
                    let (head_ts, _) = recv_consumer
                        .get_buffer_head_timestamp()
                        .unwrap_or((Timestamp::from_ticks(0), 0));
                    enable_at = Some(add_ticks(head_ts, (period as i64) * ticks_per_frame as i64));
                    log::info!("dry run complete, waiting to enable streams");
                }
            }
            StreamState::WaitingForStreamEnable => {
                if let (Some(enable_at), Some((head_ts, _))) = (enable_at, recv_consumer.get_buffer_head_timestamp()) {
                    if locked.poll_waiting_for_enable(head_ts, enable_at)? {
                        log::info!("streams running");
                    }
                }
            }
            StreamState::Running => {
                while recv_consumer.read_space_frames() >= period {
                    if let Err(e) = recv_consumer.read_frames_checked(period, &mut scratch) {
                        log::warn!("dropping client read: {e}");
                    }
                }
            }
            _ => {}
        }
        drop(locked);

        std::thread::sleep(period_duration);
    }

    // Symmetric shutdown: let the sync source's head timestamp cross a
    // chosen future tick before silencing transmitters, same handshake as
    // `WaitingForStreamEnable` above but in reverse.
    {
        let mut locked = manager.lock().unwrap();
        if locked.state() == StreamState::Running {
            locked.begin_stop();
        }
    }

    let disable_at = recv_consumer
        .get_buffer_head_timestamp()
        .map(|(head_ts, _)| add_ticks(head_ts, (period as i64) * ticks_per_frame as i64));

    if let Some(disable_at) = disable_at {
        loop {
            let mut locked = manager.lock().unwrap();
            match locked.state() {
                StreamState::WaitingForStreamDisable => {
                    if let Some((head_ts, _)) = recv_consumer.get_buffer_head_timestamp() {
                        if locked.poll_waiting_for_stream_disable(head_ts, disable_at) {
                            log::info!("streams disabled, stopping");
                        }
                    }
                }
                StreamState::Stopping => {
                    locked.finish_stop();
                    break;
                }
                _ => break,
            }
            drop(locked);
            std::thread::sleep(period_duration);
        }
    }

    running.store(false, Ordering::Release);
    let _ = feeder.join();
    transport.stop();

    let snapshot = diag.snapshot();
    log::info!(
        "stopped: invalid_packets={} xruns={} dll_unlock_events={} midi_overflows={}",
        snapshot.invalid_packets, snapshot.xruns, snapshot.dll_unlock_events, snapshot.midi_overflows
    );

    Ok(())
}

/// Continuously writes a fixed test tone into the transmit ring,
/// standing in for a real audio client.
fn feed_test_tone(producer: &mut ring::RingProducer, channels: usize, ticks_per_frame: f64, running: &AtomicBool) {
    const TONE_PERIOD_FRAMES: usize = 48;
    const AMPLITUDE: i32 = 1 << 20;

    let chunk_frames = 64;
    let mut samples = vec![0i32; chunk_frames * channels];
    let mut bytes = vec![0u8; chunk_frames * frame_byte_size(channels)];
    let mut phase: usize = 0;
    let mut tail_ticks: i64 = 0;

    while running.load(Ordering::Acquire) {
        if producer.write_space_frames() < chunk_frames {
            std::thread::sleep(Duration::from_micros(200));
            continue;
        }

        for frame in 0..chunk_frames {
            let angle = (phase + frame) % TONE_PERIOD_FRAMES;
            let value = ((angle as f64 / TONE_PERIOD_FRAMES as f64) * std::f64::consts::TAU).sin();
            let sample = (value * AMPLITUDE as f64) as i32;
            for ch in 0..channels {
                samples[frame * channels + ch] = sample;
            }
        }
        phase = (phase + chunk_frames) % TONE_PERIOD_FRAMES;

        samples_to_bytes(&samples, &mut bytes);
        tail_ticks += (chunk_frames as f64 * ticks_per_frame) as i64;
        let tail_ts = Timestamp::from_ticks(tail_ticks as u64);

        if let Err(e) = producer.write_frames_checked(chunk_frames, &bytes, tail_ts) {
            log::warn!("dropping tone chunk: {e}");
            // transmitter fell behind; drop this chunk and retry next loop.
            continue;
        }
    }
}
