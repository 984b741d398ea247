use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use hound::{WavSpec, WavWriter};
use parking_lot::Mutex;

use murmur_foundation::{AudioError, CaptureConfig, SharedClock};

use crate::backend::{CpalBackend, DeviceSnapshot};
use crate::constants::{
    BITS_PER_SAMPLE, CAPTURE_POLL_INTERVAL, SAMPLE_RATE_HZ, START_TIMEOUT, STOP_JOIN_TIMEOUT,
};
use crate::level::{frame_rms, LevelMeter};
use crate::silence::SilenceGate;

type WavSink = WavWriter<BufWriter<File>>;

/// Observer fed the smoothed level once per frame. Runs synchronously inside
/// the session lock and must not block; a slow observer stalls capture.
pub type LevelObserver = Arc<dyn Fn(f32) + Send + Sync>;

/// Everything the frame callback touches, behind the one session mutex.
pub(crate) struct CaptureShared {
    active: bool,
    auto_stopped: bool,
    writer: Option<WavSink>,
    gate: SilenceGate,
    meter: LevelMeter,
    started_at: Instant,
}

impl CaptureShared {
    fn idle(config: &CaptureConfig, clock: &SharedClock) -> Self {
        Self {
            active: false,
            auto_stopped: false,
            writer: None,
            gate: SilenceGate::new(
                config.silence_threshold,
                config.silent_start_timeout(),
                clock.clone(),
            ),
            meter: LevelMeter::new(),
            started_at: clock.now(),
        }
    }
}

struct CaptureWorker {
    handle: thread::JoinHandle<()>,
    done_rx: Receiver<()>,
}

/// Owns one recording session at a time: a dedicated thread holds the input
/// stream open while frames are classified, downmixed, and appended to the
/// mono 16-bit 22.05 kHz artifact.
///
/// Idle -> Recording -> {Stopped, AutoStopped} -> Idle.
pub struct RecordingEngine {
    backend: Arc<CpalBackend>,
    config: CaptureConfig,
    clock: SharedClock,
    path: PathBuf,
    level_observer: Option<LevelObserver>,
    shared: Arc<Mutex<CaptureShared>>,
    worker: Option<CaptureWorker>,
}

impl RecordingEngine {
    pub fn new(
        backend: Arc<CpalBackend>,
        config: CaptureConfig,
        path: impl Into<PathBuf>,
        clock: SharedClock,
    ) -> Self {
        let shared = Arc::new(Mutex::new(CaptureShared::idle(&config, &clock)));
        Self {
            backend,
            config,
            clock,
            path: path.into(),
            level_observer: None,
            shared,
            worker: None,
        }
    }

    /// Register the UI-side level sink. Must be non-blocking; it is invoked
    /// under the session lock on the audio subsystem's thread.
    pub fn set_level_observer(&mut self, observer: LevelObserver) {
        self.level_observer = Some(observer);
    }

    /// Open the selected device (or the system default) at its native
    /// channel count and begin capturing. The stream is built and owned on a
    /// dedicated thread; an open failure is surfaced here with the session
    /// marked auto-stopped and no thread left behind.
    pub fn start(&mut self, device: Option<&DeviceSnapshot>) -> Result<(), AudioError> {
        if self.worker.is_some() {
            return Err(AudioError::AlreadyActive);
        }

        {
            let mut session = self.shared.lock();
            session.active = true;
            session.auto_stopped = false;
            session.writer = None;
            session.gate = SilenceGate::new(
                self.config.silence_threshold,
                self.config.silent_start_timeout(),
                self.clock.clone(),
            );
            session.meter = LevelMeter::new();
            session.started_at = self.clock.now();
        }

        let shared = self.shared.clone();
        let backend = self.backend.clone();
        let selection = device.cloned();
        let path = self.path.clone();
        let observer = self.level_observer.clone();
        let clock = self.clock.clone();
        let (startup_tx, startup_rx) = bounded::<Result<(), AudioError>>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("murmur-capture".to_string())
            .spawn(move || {
                capture_thread(
                    backend, selection, path, shared, observer, clock, startup_tx, done_tx,
                )
            })
            .map_err(|e| AudioError::Fatal(format!("failed to spawn capture thread: {}", e)))?;

        match startup_rx.recv_timeout(START_TIMEOUT) {
            Ok(Ok(())) => {
                self.worker = Some(CaptureWorker { handle, done_rx });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                // Startup wedged inside the driver. Ask the loop to bail and
                // leave the thread to wind down on its own.
                let mut session = self.shared.lock();
                session.active = false;
                session.auto_stopped = true;
                drop(session);
                tracing::warn!("audio stream startup timed out; abandoning capture thread");
                Err(AudioError::Fatal(
                    "audio stream startup timed out".to_string(),
                ))
            }
        }
    }

    /// End the session. Safe to call concurrently with in-flight callbacks;
    /// waits a bounded time for the capture thread, then force-releases the
    /// file handle so a stuck driver can never hang the caller.
    pub fn stop(&mut self) {
        {
            let mut session = self.shared.lock();
            session.active = false;
        }

        let Some(worker) = self.worker.take() else {
            return;
        };
        match worker.done_rx.recv_timeout(STOP_JOIN_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.handle.join();
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout = ?STOP_JOIN_TIMEOUT,
                    "capture thread did not stop cleanly; forcing resource release"
                );
                let mut session = self.shared.lock();
                if let Some(writer) = session.writer.take() {
                    if let Err(e) = writer.finalize() {
                        tracing::warn!("failed to finalize recording after forced release: {}", e);
                    }
                }
            }
        }
    }

    /// Whether the most recent session ended via the silence timeout (or an
    /// internal fault) rather than an explicit stop.
    pub fn was_auto_stopped(&self) -> bool {
        self.shared.lock().auto_stopped
    }

    pub fn is_active(&self) -> bool {
        self.shared.lock().active
    }

    /// Most recent smoothed level, 0.0 to 1.0.
    pub fn current_level(&self) -> f32 {
        self.shared.lock().meter.value()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RecordingEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn capture_thread(
    backend: Arc<CpalBackend>,
    selection: Option<DeviceSnapshot>,
    path: PathBuf,
    shared: Arc<Mutex<CaptureShared>>,
    observer: Option<LevelObserver>,
    clock: SharedClock,
    startup_tx: Sender<Result<(), AudioError>>,
    done_tx: Sender<()>,
) {
    let stream = match open_session(&backend, selection.as_ref(), &path, &shared, observer) {
        Ok(stream) => {
            let _ = startup_tx.send(Ok(()));
            stream
        }
        Err(e) => {
            tracing::error!("failed to open recording session: {}", e);
            {
                let mut session = shared.lock();
                session.active = false;
                session.auto_stopped = true;
            }
            finalize_session(&shared);
            let _ = startup_tx.send(Err(e));
            let _ = done_tx.send(());
            return;
        }
    };

    // Stop is a flag the stream owner polls, not a signal thrown out of the
    // callback.
    loop {
        {
            if !shared.lock().active {
                break;
            }
        }
        thread::sleep(CAPTURE_POLL_INTERVAL);
    }

    // Tear the stream down before finalizing so no frame races the header
    // rewrite.
    drop(stream);

    let started_at = shared.lock().started_at;
    finalize_session(&shared);
    tracing::info!(
        elapsed = ?clock.now().duration_since(started_at),
        path = %path.display(),
        "capture session closed"
    );
    let _ = done_tx.send(());
}

fn open_session(
    backend: &CpalBackend,
    selection: Option<&DeviceSnapshot>,
    path: &Path,
    shared: &Arc<Mutex<CaptureShared>>,
    observer: Option<LevelObserver>,
) -> Result<Stream, AudioError> {
    let (device, channels) = backend.open_input(selection)?;
    let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
    let sample_format = device.default_input_config()?.sample_format();

    // The artifact is always mono; the stream runs at the device's native
    // channel count and is downmixed in software.
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE_HZ,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };
    let writer = WavWriter::create(path, spec)?;
    shared.lock().writer = Some(writer);

    let config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(SAMPLE_RATE_HZ),
        buffer_size: cpal::BufferSize::Default,
    };
    tracing::info!(
        device = %device_name,
        channels,
        format = ?sample_format,
        "starting capture"
    );
    let stream = build_stream(&device, config, sample_format, shared.clone(), observer, channels)?;
    stream.play()?;
    Ok(stream)
}

fn build_stream(
    device: &cpal::Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    shared: Arc<Mutex<CaptureShared>>,
    observer: Option<LevelObserver>,
    channels: u16,
) -> Result<Stream, AudioError> {
    let fault_shared = shared.clone();
    let err_fn = move |err: cpal::StreamError| {
        // A dying stream ends the session; nothing unwinds across the
        // callback boundary.
        tracing::error!("audio stream fault: {}", err);
        let mut session = fault_shared.lock();
        session.active = false;
        session.auto_stopped = true;
    };

    let on_frame = move |data: &[i16]| {
        process_frame(&shared, observer.as_ref(), data, channels);
    };

    // Scratch buffer for sample-format conversion, kept off the realtime
    // path's allocator.
    thread_local! {
        static CONVERT_BUFFER: std::cell::RefCell<Vec<i16>> =
            const { std::cell::RefCell::new(Vec::new()) };
    }

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &_| on_frame(data),
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &_| {
                CONVERT_BUFFER.with(|buf| {
                    let mut converted = buf.borrow_mut();
                    converted.clear();
                    converted.reserve(data.len());
                    // Recenter unsigned [0,65535] onto signed [-32768,32767].
                    for &s in data {
                        converted.push((s as i32 - 32768) as i16);
                    }
                    on_frame(&converted);
                });
            },
            err_fn,
            None,
        )?,
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &_| {
                CONVERT_BUFFER.with(|buf| {
                    let mut converted = buf.borrow_mut();
                    converted.clear();
                    converted.reserve(data.len());
                    for &s in data {
                        converted.push((s.clamp(-1.0, 1.0) * 32767.0).round() as i16);
                    }
                    on_frame(&converted);
                });
            },
            err_fn,
            None,
        )?,
        other => {
            return Err(AudioError::FormatNotSupported {
                format: format!("{:?}", other),
            })
        }
    };

    Ok(stream)
}

/// One buffer's worth of interleaved samples, arriving on whatever thread
/// the audio subsystem uses. Everything happens under the session lock and
/// stays bounded: classify, meter, downmix, append.
pub(crate) fn process_frame(
    shared: &Mutex<CaptureShared>,
    observer: Option<&LevelObserver>,
    samples: &[i16],
    channels: u16,
) {
    let mut session = shared.lock();
    if !session.active || session.writer.is_none() {
        return;
    }

    let rms = frame_rms(samples, channels);
    if session.gate.observe(rms) {
        session.auto_stopped = true;
        session.active = false;
    }

    // The level feed keeps flowing even while the silence gate deliberates.
    let level = session.meter.update(rms);
    if let Some(observer) = observer {
        observer(level);
    }

    if session.auto_stopped {
        return;
    }

    let step = channels.max(1) as usize;
    let mut fault = None;
    if let Some(writer) = session.writer.as_mut() {
        for frame in samples.chunks_exact(step) {
            let mono = (frame.iter().map(|&s| s as i32).sum::<i32>() / step as i32) as i16;
            if let Err(e) = writer.write_sample(mono) {
                fault = Some(e);
                break;
            }
        }
    }
    if let Some(e) = fault {
        // Recovered locally: the session halts exactly like an auto-stop.
        tracing::error!("write fault during capture: {}", e);
        session.active = false;
        session.auto_stopped = true;
    }
}

fn finalize_session(shared: &Mutex<CaptureShared>) {
    let mut session = shared.lock();
    session.active = false;
    if let Some(writer) = session.writer.take() {
        if let Err(e) = writer.finalize() {
            tracing::warn!("failed to finalize recording: {}", e);
        }
    }
}


#[cfg(test)]
mod convert_tests {
    // Unit checks for the sample-format conversions the stream arms apply.

    #[test]
    fn f32_to_i16_clamps_and_scales() {
        let src = [-2.0f32, -1.0, -0.5, 0.0, 0.5, 1.0, 2.0];
        let out: Vec<i16> = src
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0).round() as i16)
            .collect();
        assert_eq!(&out[..], &[-32767, -32767, -16384, 0, 16384, 32767, 32767]);
    }

    #[test]
    fn u16_to_i16_recenters() {
        let src = [0u16, 32768, 65535];
        let out: Vec<i16> = src.iter().map(|&s| (s as i32 - 32768) as i16).collect();
        assert_eq!(&out[..], &[-32768, 0, 32767]);
    }
}
