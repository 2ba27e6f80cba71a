//! CPAL output backend (feature `realtime`).
//!
//! Opens an output stream on a device picked by name (or the host default),
//! with the supported config closest to the requested rate/channels. The graph
//! is mono; every frame duplicates it to all device channels, clamped to [-1, 1].

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use crate::backend::{lock, AudioBackend, BackendState, SharedGraph};
use crate::error::BackendError;
use crate::graph::Generator;

/// What to open. `None` fields fall back to the device defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceRequest {
    pub device_name: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

#[inline]
fn stream_err(e: impl std::fmt::Display) -> BackendError {
    BackendError::Stream { details: e.to_string() }
}

/// Names of the output devices of the default host.
pub fn list_output_devices() -> Result<Vec<String>, BackendError> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for dev in host.output_devices().map_err(stream_err)? {
        names.push(dev.name().map_err(stream_err)?);
    }
    Ok(names)
}

fn pick_device(req: &DeviceRequest) -> Result<cpal::Device, BackendError> {
    let host = cpal::default_host();
    if let Some(name) = &req.device_name {
        for d in host.output_devices().map_err(stream_err)? {
            if d.name().map_err(stream_err)? == *name {
                return Ok(d);
            }
        }
        return Err(BackendError::DeviceNotFound { name: name.clone() });
    }
    host.default_output_device().ok_or(BackendError::NoDevice)
}

fn choose_config(
    device: &cpal::Device,
    req_sr: Option<u32>,
    req_ch: Option<u16>,
) -> Result<cpal::SupportedStreamConfig, BackendError> {
    // If nothing requested, default is already concrete.
    if req_sr.is_none() && req_ch.is_none() {
        return device.default_output_config().map_err(stream_err);
    }

    // Pick a SupportedStreamConfigRange first.
    let mut best: Option<(u64, cpal::SupportedStreamConfigRange)> = None;
    for range in device.supported_output_configs().map_err(stream_err)? {
        let ch     = range.channels();
        let sr_min = range.min_sample_rate().0;
        let sr_max = range.max_sample_rate().0;

        let ch_pen = match req_ch { Some(c) => (i64::from(ch) - i64::from(c)).unsigned_abs(), None => 0 };
        let sr_pen = match req_sr {
            Some(sr) => if (sr_min..=sr_max).contains(&sr) { 0 } else { u64::from(sr_min.abs_diff(sr).min(sr_max.abs_diff(sr))) },
            None => 0,
        };

        let score = sr_pen.saturating_mul(1000) + ch_pen;
        if best.as_ref().map_or(true, |(s, _)| score < *s) {
            best = Some((score, range));
        }
    }

    let (_, range) = best.ok_or_else(|| stream_err("no supported output configs"))?;

    // Choose a concrete sample rate and convert the range into a concrete config.
    let pick_sr = match req_sr {
        Some(sr) => cpal::SampleRate(sr.clamp(range.min_sample_rate().0, range.max_sample_rate().0)),
        None => range.max_sample_rate(),
    };

    Ok(range.with_sample_rate(pick_sr))
}

fn build_stream<T>(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    graph: SharedGraph,
) -> Result<cpal::Stream, BackendError>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let channels = usize::from(cfg.channels);
    let err_fn = |e: cpal::StreamError| error!(error = %e, "audio stream error");

    device
        .build_output_stream(
            cfg,
            move |output: &mut [T], _| {
                let mut g = lock(&graph);
                for frame in output.chunks_mut(channels) {
                    let s = g.next().clamp(-1.0, 1.0);
                    let v: T = T::from_sample(s);
                    for ch in frame.iter_mut() { *ch = v; }
                }
            },
            err_fn,
            None,
        )
        .map_err(stream_err)
}

/// Output stream on a CPAL device.
pub struct CpalBackend {
    request: DeviceRequest,
    stream: Option<cpal::Stream>,
    state: BackendState,
    sr: u32,
    channels: u16,
    device_name: Option<String>,
}

impl CpalBackend {
    pub fn new(request: DeviceRequest) -> Self {
        let sr = request.sample_rate.unwrap_or(48_000);
        Self { request, stream: None, state: BackendState::Closed, sr, channels: 0, device_name: None }
    }

    /// Device channel count (0 before `open`).
    #[inline] pub fn channels(&self) -> u16 { self.channels }

    /// Name of the opened device.
    #[inline] pub fn device_name(&self) -> Option<&str> { self.device_name.as_deref() }
}

impl AudioBackend for CpalBackend {
    fn open(&mut self, graph: &SharedGraph) -> Result<(), BackendError> {
        let device = pick_device(&self.request)?;
        let sup_cfg = choose_config(&device, self.request.sample_rate, self.request.channels)?;
        let sample_format = sup_cfg.sample_format();
        let cfg = sup_cfg.config();

        lock(graph).reset(cfg.sample_rate.0 as f32);

        let shared = SharedGraph::clone(graph);
        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &cfg, shared)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &cfg, shared)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &cfg, shared)?,
            other => return Err(BackendError::UnsupportedFormat { format: format!("{other:?}") }),
        };
        stream.play().map_err(stream_err)?;

        let name = device.name().ok();
        info!(
            device = name.as_deref().unwrap_or("?"),
            sample_rate = cfg.sample_rate.0,
            channels = cfg.channels,
            format = ?sample_format,
            "output stream started"
        );
        self.sr = cfg.sample_rate.0;
        self.channels = cfg.channels;
        self.device_name = name;
        self.stream = Some(stream);
        self.state = BackendState::Running;
        Ok(())
    }

    #[inline] fn state(&self) -> BackendState { self.state }

    fn resume(&mut self) -> Result<(), BackendError> {
        if let (Some(stream), BackendState::Suspended) = (&self.stream, self.state) {
            stream.play().map_err(stream_err)?;
            self.state = BackendState::Running;
        }
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), BackendError> {
        if let (Some(stream), BackendState::Running) = (&self.stream, self.state) {
            stream.pause().map_err(stream_err)?;
            self.state = BackendState::Suspended;
        }
        Ok(())
    }

    #[inline] fn sample_rate(&self) -> u32 { self.sr }
}
