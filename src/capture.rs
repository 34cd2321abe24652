use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use crate::config::CaptureConfig;
use crate::error::FingerprintError;

/// How often the collector re-checks the stop flag when no audio arrives.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A fully captured fragment.
#[derive(Clone, Debug, PartialEq)]
pub struct Captured {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Anything that can hand the engine a finite mono sample buffer.
pub trait SampleSource {
    fn capture(&mut self) -> Result<Captured, FingerprintError>;
}

/// Messages from the device callbacks to the collector thread.
pub(crate) enum CaptureEvent {
    Samples(Vec<f32>),
    Failed(String),
}

/// What ends a microphone capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopTrigger {
    /// A line on stdin.
    Enter,
    After(Duration),
}

impl StopTrigger {
    pub fn from_config(config: &CaptureConfig) -> Self {
        config.duration().map_or(StopTrigger::Enter, StopTrigger::After)
    }

    fn wait(self) {
        match self {
            StopTrigger::Enter => {
                info!("press ENTER to stop listening");
                let mut line = String::new();
                if let Err(e) = io::stdin().lock().read_line(&mut line) {
                    warn!("failed to read stdin, stopping capture: {e}");
                }
            }
            StopTrigger::After(duration) => {
                info!(seconds = duration.as_secs_f32(), "listening");
                thread::sleep(duration);
            }
        }
    }
}

/// Default input device, recorded until a [`StopTrigger`] fires.
pub struct MicrophoneSource {
    config: CaptureConfig,
    trigger: StopTrigger,
}

impl MicrophoneSource {
    pub fn new(config: CaptureConfig, trigger: StopTrigger) -> Self {
        MicrophoneSource { config, trigger }
    }
}

impl SampleSource for MicrophoneSource {
    fn capture(&mut self) -> Result<Captured, FingerprintError> {
        let session = CaptureSession::start(&self.config)?;
        self.trigger.wait();
        session.finish()
    }
}

/// A running input stream plus the worker collecting its samples.
pub struct CaptureSession {
    stream: Stream,
    stop: Arc<AtomicBool>,
    worker: JoinHandle<Result<Vec<f32>, FingerprintError>>,
    sample_rate: u32,
}

impl CaptureSession {
    pub fn start(config: &CaptureConfig) -> Result<Self, FingerprintError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| FingerprintError::DeviceUnavailable("no default input device".into()))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown device".to_string());

        let supported = choose_config(&device, config)?;
        let sample_rate = supported.sample_rate().0;
        let channels = usize::from(supported.channels());
        let buffer_size = match supported.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max }
                if (*min..=*max).contains(&config.buffer_size) =>
            {
                cpal::BufferSize::Fixed(config.buffer_size)
            }
            _ => cpal::BufferSize::Default,
        };
        let stream_config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size,
        };

        info!(
            device = %device_name,
            sample_rate,
            channels,
            format = ?supported.sample_format(),
            "opening input stream"
        );

        let (tx, rx) = unbounded();
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, channels, tx),
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, channels, tx),
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, channels, tx),
            SampleFormat::I8 => build_stream::<i8>(&device, &stream_config, channels, tx),
            SampleFormat::U8 => build_stream::<u8>(&device, &stream_config, channels, tx),
            other => {
                return Err(FingerprintError::DeviceUnavailable(format!(
                    "unsupported sample format: {other}"
                )))
            }
        }?;

        let stop = Arc::new(AtomicBool::new(false));
        let worker = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("capture".into())
                .spawn(move || collect(rx, stop))
                .map_err(unavailable)?
        };

        stream.play().map_err(unavailable)?;

        Ok(CaptureSession {
            stream,
            stop,
            worker,
            sample_rate,
        })
    }

    /// Stops the device, then lets the worker drain what it already received.
    pub fn finish(self) -> Result<Captured, FingerprintError> {
        if let Err(e) = self.stream.pause() {
            debug!("pausing input stream failed: {e}");
        }
        drop(self.stream);
        self.stop.store(true, Ordering::Release);

        let samples = self
            .worker
            .join()
            .map_err(|_| FingerprintError::CaptureIo("capture worker panicked".into()))??;

        info!(
            samples = samples.len(),
            seconds = format_args!("{:.2}", samples.len() as f32 / self.sample_rate as f32),
            "capture finished"
        );
        Ok(Captured {
            samples,
            sample_rate: self.sample_rate,
        })
    }
}

/// Worker loop: appends incoming audio until stopped or disconnected.
/// Audio already queued when the stop flag is seen is still kept.
pub(crate) fn collect(
    events: Receiver<CaptureEvent>,
    stop: Arc<AtomicBool>,
) -> Result<Vec<f32>, FingerprintError> {
    let mut buffer = Vec::new();
    loop {
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => absorb(&mut buffer, event)?,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if stop.load(Ordering::Acquire) {
            for event in events.try_iter() {
                absorb(&mut buffer, event)?;
            }
            break;
        }
    }
    Ok(buffer)
}

fn absorb(buffer: &mut Vec<f32>, event: CaptureEvent) -> Result<(), FingerprintError> {
    match event {
        CaptureEvent::Samples(samples) => {
            buffer.extend_from_slice(&samples);
            Ok(())
        }
        CaptureEvent::Failed(reason) => {
            error!("input stream error: {reason}");
            Err(FingerprintError::CaptureIo(reason))
        }
    }
}

/// Picks a config with the requested rate and channel count, or the device default.
fn choose_config(
    device: &Device,
    wanted: &CaptureConfig,
) -> Result<cpal::SupportedStreamConfig, FingerprintError> {
    let rate = cpal::SampleRate(wanted.sample_rate);

    let exact = device
        .supported_input_configs()
        .map_err(unavailable)?
        .find(|range| {
            range.channels() == wanted.channels
                && range.min_sample_rate() <= rate
                && rate <= range.max_sample_rate()
        });

    match exact {
        Some(range) => Ok(range.with_sample_rate(rate)),
        None => {
            let fallback = device.default_input_config().map_err(unavailable)?;
            warn!(
                wanted_rate = wanted.sample_rate,
                wanted_channels = wanted.channels,
                rate = fallback.sample_rate().0,
                channels = fallback.channels(),
                "requested capture format not supported, using device default"
            );
            Ok(fallback)
        }
    }
}

fn unavailable(e: impl std::fmt::Display) -> FingerprintError {
    FingerprintError::DeviceUnavailable(e.to_string())
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    channels: usize,
    tx: Sender<CaptureEvent>,
) -> Result<Stream, FingerprintError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let err_tx = tx.clone();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono: Vec<f32> = data
                    .chunks_exact(channels)
                    .map(|frame| {
                        frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / channels as f32
                    })
                    .collect();
                let _ = tx.send(CaptureEvent::Samples(mono));
            },
            move |err| {
                let _ = err_tx.send(CaptureEvent::Failed(err.to_string()));
            },
            None,
        )
        .map_err(unavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_until_senders_are_gone() {
        let (tx, rx) = unbounded();
        tx.send(CaptureEvent::Samples(vec![0.1, 0.2])).unwrap();
        tx.send(CaptureEvent::Samples(vec![0.3])).unwrap();
        drop(tx);
        let samples = collect(rx, Arc::new(AtomicBool::new(false))).unwrap();
        assert_eq!(samples, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn stop_flag_keeps_already_queued_audio() {
        let (tx, rx) = unbounded();
        for i in 0..10 {
            tx.send(CaptureEvent::Samples(vec![i as f32])).unwrap();
        }
        let stop = Arc::new(AtomicBool::new(true));
        // sender still alive: only the flag can end the loop
        let samples = collect(rx, stop).unwrap();
        assert_eq!(samples.len(), 10);
        drop(tx);
    }

    #[test]
    fn stop_flag_set_from_another_thread_ends_the_worker() {
        let (tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let worker = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || collect(rx, stop))
        };
        tx.send(CaptureEvent::Samples(vec![1.0; 4])).unwrap();
        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::Release);
        let samples = worker.join().unwrap().unwrap();
        assert_eq!(samples, vec![1.0; 4]);
        drop(tx);
    }

    #[test]
    fn stream_failure_aborts_capture() {
        let (tx, rx) = unbounded();
        tx.send(CaptureEvent::Samples(vec![0.5])).unwrap();
        tx.send(CaptureEvent::Failed("device unplugged".into())).unwrap();
        drop(tx);
        assert!(matches!(
            collect(rx, Arc::new(AtomicBool::new(false))),
            Err(FingerprintError::CaptureIo(reason)) if reason == "device unplugged"
        ));
    }

    #[test]
    fn trigger_follows_configured_duration() {
        let mut config = CaptureConfig::default();
        assert_eq!(StopTrigger::from_config(&config), StopTrigger::Enter);
        config.duration_secs = Some(2.0);
        assert_eq!(
            StopTrigger::from_config(&config),
            StopTrigger::After(Duration::from_secs(2))
        );
    }
}
