//! V4L2 capture backends.
//!
//! The sensor module exposes RGB24 directly. USB webcams usually offer YUYV
//! or MJPEG, which are converted to RGB here.

use image::{ImageFormat, RgbImage};
use log::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;

use super::{Camera, Frame};
use crate::config::CameraSettings;
use crate::error::{Result, TurretError};

const STREAM_BUFFERS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb24,
    Yuyv,
    Mjpeg,
}

impl PixelLayout {
    pub fn fourcc(&self) -> v4l::FourCC {
        match self {
            PixelLayout::Rgb24 => v4l::FourCC::new(b"RGB3"),
            PixelLayout::Yuyv => v4l::FourCC::new(b"YUYV"),
            PixelLayout::Mjpeg => v4l::FourCC::new(b"MJPG"),
        }
    }

    pub fn from_fourcc(repr: &[u8; 4]) -> Option<Self> {
        match repr {
            b"RGB3" => Some(PixelLayout::Rgb24),
            b"YUYV" => Some(PixelLayout::Yuyv),
            b"MJPG" => Some(PixelLayout::Mjpeg),
            _ => None,
        }
    }
}

pub struct V4l2Camera {
    stream: Option<MmapStream<'static>>,
    // Held so the device stays open for as long as the stream.
    _device: Device,
    width: u32,
    height: u32,
    stride: u32,
    layout: PixelLayout,
    backend: &'static str,
}

impl V4l2Camera {
    /// Sensor module on the camera connector. Only RGB24 is accepted.
    pub fn open_sensor_module(settings: &CameraSettings) -> Result<Self> {
        Self::open(
            &settings.sensor_device,
            settings,
            PixelLayout::Rgb24,
            &[PixelLayout::Rgb24],
            "sensor-module",
        )
    }

    /// Generic USB webcam.
    pub fn open_webcam(settings: &CameraSettings) -> Result<Self> {
        Self::open(
            &settings.webcam_device,
            settings,
            PixelLayout::Yuyv,
            &[PixelLayout::Yuyv, PixelLayout::Mjpeg, PixelLayout::Rgb24],
            "webcam",
        )
    }

    fn open(
        path: &str,
        settings: &CameraSettings,
        preferred: PixelLayout,
        accepted: &[PixelLayout],
        backend: &'static str,
    ) -> Result<Self> {
        let device = Device::with_path(path)
            .map_err(|e| TurretError::Camera(format!("failed to open {path}: {e}")))?;

        let mut format = device.format()?;
        format.width = settings.width();
        format.height = settings.height();
        format.fourcc = preferred.fourcc();
        let actual = device.set_format(&format)?;

        let fourcc_str = std::str::from_utf8(&actual.fourcc.repr).unwrap_or("????");
        let layout = PixelLayout::from_fourcc(&actual.fourcc.repr)
            .filter(|layout| accepted.contains(layout))
            .ok_or_else(|| {
                TurretError::Camera(format!("{path} negotiated unsupported format {fourcc_str}"))
            })?;

        if actual.width != settings.width() || actual.height != settings.height() {
            warn!(
                "Camera did not accept requested resolution. Using {}x{} instead of {}x{}",
                actual.width,
                actual.height,
                settings.width(),
                settings.height()
            );
        }

        if let Err(e) = device.set_params(&Parameters::with_fps(settings.framerate)) {
            warn!("Could not set frame rate to {} fps: {e}", settings.framerate);
        }

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| TurretError::Camera(format!("failed to start stream on {path}: {e}")))?;

        info!(
            "{backend}: {}x{} {fourcc_str}, stride {} bytes",
            actual.width, actual.height, actual.stride
        );

        Ok(Self {
            stream: Some(stream),
            _device: device,
            width: actual.width,
            height: actual.height,
            stride: actual.stride,
            layout,
            backend,
        })
    }

    fn decode(&self, buf: &[u8]) -> Option<Frame> {
        match self.layout {
            PixelLayout::Rgb24 => rgb24_to_rgb(buf, self.width, self.height, self.stride),
            PixelLayout::Yuyv => yuyv_to_rgb(buf, self.width, self.height, self.stride),
            PixelLayout::Mjpeg => match image::load_from_memory_with_format(buf, ImageFormat::Jpeg) {
                Ok(img) => Some(img.to_rgb8()),
                Err(e) => {
                    debug!("Dropping undecodable MJPEG frame: {e}");
                    None
                }
            },
        }
    }
}

impl Camera for V4l2Camera {
    fn get_frame(&mut self) -> Option<Frame> {
        let stream = self.stream.as_mut()?;
        let buf = match stream.next() {
            Ok((buf, meta)) => {
                let used = (meta.bytesused as usize).min(buf.len());
                if used == 0 { buf.to_vec() } else { buf[..used].to_vec() }
            }
            Err(e) => {
                warn!("Frame capture failed: {e}");
                return None;
            }
        };
        self.decode(&buf)
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("{} stream stopped", self.backend);
        }
    }

    fn backend_name(&self) -> &'static str {
        self.backend
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        self.close();
    }
}

/// Copy packed RGB24 rows into an image, skipping row padding.
pub fn rgb24_to_rgb(buf: &[u8], width: u32, height: u32, stride: u32) -> Option<RgbImage> {
    let row_bytes = width as usize * 3;
    let stride = (stride as usize).max(row_bytes);
    if buf.len() < stride * (height as usize).saturating_sub(1) + row_bytes {
        return None;
    }
    let mut data = Vec::with_capacity(row_bytes * height as usize);
    for row in buf.chunks(stride).take(height as usize) {
        data.extend_from_slice(&row[..row_bytes]);
    }
    RgbImage::from_raw(width, height, data)
}

/// Convert packed YUYV 4:2:2 (BT.601, limited range) to RGB.
pub fn yuyv_to_rgb(buf: &[u8], width: u32, height: u32, stride: u32) -> Option<RgbImage> {
    let row_bytes = width as usize * 2;
    let stride = (stride as usize).max(row_bytes);
    if width % 2 != 0 || buf.len() < stride * (height as usize).saturating_sub(1) + row_bytes {
        return None;
    }

    let convert = |y: u8, u: u8, v: u8| -> [u8; 3] {
        let c = y as f32 - 16.0;
        let d = u as f32 - 128.0;
        let e = v as f32 - 128.0;
        let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
        [
            clamp(1.164 * c + 1.596 * e),
            clamp(1.164 * c - 0.392 * d - 0.813 * e),
            clamp(1.164 * c + 2.017 * d),
        ]
    };

    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for row in buf.chunks(stride).take(height as usize) {
        for px in row[..row_bytes].chunks_exact(4) {
            let (y0, u, y1, v) = (px[0], px[1], px[2], px[3]);
            data.extend_from_slice(&convert(y0, u, v));
            data.extend_from_slice(&convert(y1, u, v));
        }
    }
    RgbImage::from_raw(width, height, data)
}
