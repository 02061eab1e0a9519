use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, formats::FormatOptions, meta::MetadataOptions,
        probe::Hint,
    },
    default,
};

use crate::{
    AudioError, AudioResult, MediaBackend, MediaSession, MediaSource, NativeErrorCode, Notifier,
};

/// How often the control loop checks for end of media between commands.
const CONTROL_POLL: Duration = Duration::from_millis(25);

/// Audio engine backed by cpal + symphonia (local files only).
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    fn resolve_path(source: &MediaSource) -> AudioResult<PathBuf> {
        match source {
            MediaSource::File(path) => Ok(path.clone()),
            MediaSource::Url(url) => Err(AudioError::UnsupportedSource(url.clone())),
        }
    }
}

impl MediaBackend for CpalBackend {
    fn open(
        &self,
        source: &MediaSource,
        notifier: Notifier,
    ) -> AudioResult<Box<dyn MediaSession>> {
        let path = Self::resolve_path(source)?;
        if !path.is_file() {
            return Err(AudioError::Io(format!("{} is not a readable file", path.display())));
        }

        let shared = Arc::new(Shared::default());
        let (tx, rx) = mpsc::channel();
        let join = thread::Builder::new()
            .name("cadence-audio".into())
            .spawn({
                let shared = shared.clone();
                move || audio_thread(path, notifier, shared, rx)
            })
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        Ok(Box::new(CpalSession {
            control: tx,
            shared,
            join: Some(join),
        }))
    }
}

#[derive(Debug)]
enum Control {
    Play,
    Pause,
    Stop,
    Seek(Duration),
    Shutdown,
}

/// State shared between the session handle, the control thread and the stream callback.
#[derive(Debug, Default)]
struct Shared {
    /// Source frame position as `f64` bits so the callback can keep fractional steps.
    position: AtomicU64,
    sample_rate: AtomicU64,
    total_frames: AtomicU64,
    ready: AtomicBool,
    playing: AtomicBool,
    finished: AtomicBool,
    /// Set on release; a thread still decoding abandons the file at the next packet.
    cancelled: AtomicBool,
}

impl Shared {
    fn position_frames(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::SeqCst))
    }

    fn set_position_frames(&self, frames: f64) {
        self.position.store(frames.to_bits(), Ordering::SeqCst);
    }
}

struct CpalSession {
    control: mpsc::Sender<Control>,
    shared: Arc<Shared>,
    join: Option<JoinHandle<()>>,
}

impl CpalSession {
    fn send(&self, control: Control) -> AudioResult<()> {
        self.control
            .send(control)
            .map_err(|_| AudioError::Backend("audio thread has exited".into()))
    }

    /// Never waits on decoding: a thread that is still loading is left to notice the
    /// cancellation on its own. A ready thread leaves its control loop within one poll.
    fn shutdown(&mut self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        let _ = self.control.send(Control::Shutdown);
        if let Some(join) = self.join.take() {
            if self.shared.ready.load(Ordering::SeqCst) {
                let _ = join.join();
            }
        }
    }
}

impl MediaSession for CpalSession {
    fn play(&mut self) -> AudioResult<()> {
        if !self.shared.ready.load(Ordering::SeqCst) {
            return Err(AudioError::InvalidState("item is still loading".into()));
        }
        self.send(Control::Play)
    }

    fn pause(&mut self) -> AudioResult<()> {
        self.send(Control::Pause)
    }

    fn stop(&mut self) -> AudioResult<()> {
        self.send(Control::Stop)
    }

    fn seek(&mut self, position: Duration) -> AudioResult<()> {
        self.send(Control::Seek(position))
    }

    fn position(&self) -> Option<Duration> {
        if !self.shared.ready.load(Ordering::SeqCst) {
            return None;
        }
        let rate = self.shared.sample_rate.load(Ordering::SeqCst);
        if rate == 0 {
            return None;
        }
        Duration::try_from_secs_f64(self.shared.position_frames() / rate as f64).ok()
    }

    fn release(mut self: Box<Self>) -> AudioResult<()> {
        self.shutdown();
        Ok(())
    }
}

impl Drop for CpalSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Decoded {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl Decoded {
    fn frames(&self) -> u64 {
        (self.samples.len() / self.channels.max(1)) as u64
    }
}

fn audio_thread(
    path: PathBuf,
    notifier: Notifier,
    shared: Arc<Shared>,
    control: mpsc::Receiver<Control>,
) {
    notifier.buffering(0);
    let decoded = match decode_to_f32(&path, &shared.cancelled) {
        Ok(Some(decoded)) => Arc::new(decoded),
        Ok(None) => {
            tracing::debug!(path = %path.display(), "decode abandoned");
            return;
        }
        Err(err) => {
            if !shutdown_requested(&control, &shared) {
                notifier.failed(err.native_code(), err.to_string());
            }
            return;
        }
    };
    if shutdown_requested(&control, &shared) {
        return;
    }

    shared
        .sample_rate
        .store(decoded.sample_rate as u64, Ordering::SeqCst);
    shared
        .total_frames
        .store(decoded.frames(), Ordering::SeqCst);
    shared.set_position_frames(0.0);

    let stream = match build_stream(decoded.clone(), shared.clone()) {
        Ok(stream) => stream,
        Err(err) => {
            notifier.failed(NativeErrorCode::Unsupported, err.to_string());
            return;
        }
    };
    // Some hosts start streams on creation.
    let _ = stream.pause();
    if shared.cancelled.load(Ordering::SeqCst) {
        return;
    }

    shared.ready.store(true, Ordering::SeqCst);
    notifier.buffering(100);
    notifier.ready(
        Duration::try_from_secs_f64(decoded.frames() as f64 / decoded.sample_rate.max(1) as f64)
            .ok(),
    );

    loop {
        match control.recv_timeout(CONTROL_POLL) {
            Ok(Control::Play) => {
                if shared.finished.swap(false, Ordering::SeqCst) {
                    shared.set_position_frames(0.0);
                }
                shared.playing.store(true, Ordering::SeqCst);
                if let Err(err) = stream.play() {
                    tracing::error!("failed to start cpal stream: {}", err);
                    notifier.failed(NativeErrorCode::Unknown, err.to_string());
                }
            }
            Ok(Control::Pause) => {
                shared.playing.store(false, Ordering::SeqCst);
                let _ = stream.pause();
            }
            Ok(Control::Stop) => {
                shared.playing.store(false, Ordering::SeqCst);
                shared.finished.store(false, Ordering::SeqCst);
                shared.set_position_frames(0.0);
                let _ = stream.pause();
            }
            Ok(Control::Seek(position)) => {
                let total = shared.total_frames.load(Ordering::SeqCst) as f64;
                let frames = position.as_secs_f64() * decoded.sample_rate as f64;
                shared.set_position_frames(frames.min(total));
            }
            Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if shared.finished.load(Ordering::SeqCst) && shared.playing.swap(false, Ordering::SeqCst)
        {
            let _ = stream.pause();
            notifier.completed();
        }
    }
}

fn shutdown_requested(control: &mpsc::Receiver<Control>, shared: &Shared) -> bool {
    if shared.cancelled.load(Ordering::SeqCst) {
        return true;
    }
    loop {
        match control.try_recv() {
            Ok(Control::Shutdown) | Err(mpsc::TryRecvError::Disconnected) => return true,
            // Commands issued before the item was ready have nothing to act on.
            Ok(_) => continue,
            Err(mpsc::TryRecvError::Empty) => return false,
        }
    }
}

fn build_stream(decoded: Arc<Decoded>, shared: Arc<Shared>) -> AudioResult<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::Backend("no output device".into()))?;
    let config = device
        .default_output_config()
        .map_err(|e| AudioError::Backend(e.to_string()))?;

    let out_channels = config.channels() as usize;
    let step = decoded.sample_rate as f64 / config.sample_rate().0 as f64;
    let total_frames = decoded.frames() as f64;

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _| {
                let start = shared.position.load(Ordering::SeqCst);
                let mut position = f64::from_bits(start);
                let playing = shared.playing.load(Ordering::SeqCst);

                for frame in data.chunks_mut(out_channels.max(1)) {
                    if !playing || position >= total_frames {
                        frame.iter_mut().for_each(|s| *s = 0.0);
                        continue;
                    }
                    let base = position as usize * decoded.channels;
                    for (ch, sample) in frame.iter_mut().enumerate() {
                        let src_ch = ch.min(decoded.channels - 1);
                        *sample = decoded.samples[base + src_ch];
                    }
                    position += step;
                }

                if playing && position >= total_frames {
                    shared.finished.store(true, Ordering::SeqCst);
                }
                // A seek issued while this buffer was rendered wins.
                let _ = shared.position.compare_exchange(
                    start,
                    position.min(total_frames).to_bits(),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
            },
            move |err| {
                tracing::error!("cpal stream error: {}", err);
            },
            None,
        ),
        format => {
            return Err(AudioError::Backend(format!(
                "unsupported sample format: {format:?}"
            )));
        }
    }
    .map_err(|e: cpal::BuildStreamError| AudioError::Backend(e.to_string()))?;

    Ok(stream)
}

/// Decode the whole file, or `None` once `cancelled` is set.
fn decode_to_f32(path: &Path, cancelled: &AtomicBool) -> AudioResult<Option<Decoded>> {
    let file = File::open(path).map_err(|e| AudioError::Io(e.to_string()))?;
    let mss = symphonia::core::io::MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::UnsupportedSource(e.to_string()))?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| AudioError::Decode("no default track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let mut decoder = default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::UnsupportedSource(e.to_string()))?;

    let mut samples = Vec::new();
    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    loop {
        if cancelled.load(Ordering::Relaxed) {
            return Ok(None);
        }
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(_)) => break,
            Err(err) => return Err(AudioError::Decode(err.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let audio_buf = decoder
            .decode(&packet)
            .map_err(|e| AudioError::Decode(e.to_string()))?;
        let spec = *audio_buf.spec();
        channels = spec.channels.count();
        sample_rate = spec.rate;
        let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        samples.extend_from_slice(sample_buf.samples());
    }

    if channels == 0 || sample_rate == 0 {
        return Err(AudioError::Decode("stream has no audio frames".into()));
    }
    Ok(Some(Decoded {
        samples,
        channels,
        sample_rate,
    }))
}
