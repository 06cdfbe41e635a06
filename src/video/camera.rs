//! V4L2 camera access.
//!
//! Only `VIDEO_CAPTURE` devices delivering JFIF JPEG or Motion JPEG frames are supported, which
//! covers practically every USB webcam.

use std::{env, time::Instant};

use crate::image::{Image, Resolution};
use crate::num::TotalF32;
use crate::timer::Timer;
use anyhow::{anyhow, bail};
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, Pixelformat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

/// Environment variable selecting the camera device by name.
pub const ENV_VAR_CAMERA_NAME: &str = "HEADCOUNT_CAMERA";

/// Format negotiation wishes.
///
/// Every wish is optional. Formats that satisfy the requested resolution and frame rate are
/// preferred over ones that don't; among those, the largest frame size wins, then the highest
/// frame rate.
#[derive(Debug, Default, Clone)]
pub struct CameraOptions {
    name: Option<String>,
    resolution: Option<Resolution>,
    fps: Option<u32>,
}

impl CameraOptions {
    /// Sets the name of the camera device to open.
    ///
    /// If no camera with the given name can be found, opening the camera will result in an error.
    #[inline]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the minimum acceptable image resolution.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Sets the minimum acceptable frame rate.
    #[inline]
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }
}

#[derive(Clone, Copy)]
struct FrameFormat {
    pixelformat: Pixelformat,
    resolution: Resolution,
    interval: Fract,
}

impl FrameFormat {
    fn fps(&self) -> f32 {
        1.0 / self.interval.as_f32()
    }
}

/// Computes the sort key that decides between two eligible frame formats.
fn format_rank(wish: &CameraOptions, resolution: Resolution, fps: f32) -> (bool, bool, u64, TotalF32) {
    let meets_resolution = wish.resolution.map_or(true, |min| {
        resolution.width() >= min.width() && resolution.height() >= min.height()
    });
    let meets_fps = wish.fps.map_or(true, |min| fps.round() >= min as f32);
    (
        meets_resolution,
        meets_fps,
        resolution.num_pixels(),
        TotalF32(fps),
    )
}

/// Enumerates all discrete JPEG/MJPG frame formats of `dev` and picks the best-ranked one.
fn best_format(dev: &Device, wish: &CameraOptions) -> anyhow::Result<FrameFormat> {
    let mut best: Option<FrameFormat> = None;
    for format in dev.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        let pixelformat = format.pixelformat();
        if pixelformat != Pixelformat::JPEG && pixelformat != Pixelformat::MJPG {
            continue;
        }

        let FrameSizes::Discrete(sizes) = dev.frame_sizes(pixelformat)? else {
            bail!("stepwise and continuous frame sizes are not supported");
        };
        for size in sizes {
            let resolution = Resolution::new(size.width(), size.height());
            let FrameIntervals::Discrete(intervals) =
                dev.frame_intervals(pixelformat, size.width(), size.height())?
            else {
                bail!("stepwise and continuous frame intervals are not supported");
            };

            for interval in intervals {
                let candidate = FrameFormat {
                    pixelformat,
                    resolution,
                    interval: *interval.fract(),
                };
                let better = best.map_or(true, |best| {
                    format_rank(wish, candidate.resolution, candidate.fps())
                        > format_rank(wish, best.resolution, best.fps())
                });
                if better {
                    best = Some(candidate);
                }
            }
        }
    }

    best.ok_or_else(|| anyhow!("device supports no JPEG or MJPG frame format"))
}

/// A camera yielding a stream of [`Image`]s.
pub struct Camera {
    stream: ReadStream,
    width: u32,
    height: u32,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Camera {
    /// Opens the first supported camera found.
    ///
    /// This function can block for a significant amount of time while the camera initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(options: CameraOptions) -> anyhow::Result<Self> {
        let name_filter = options
            .name
            .clone()
            .or_else(|| env::var(ENV_VAR_CAMERA_NAME).ok());
        if let Some(name) = &name_filter {
            log::debug!("restricting camera search to devices named '{name}'");
        }

        for dev in linuxvideo::list()? {
            let dev = match dev {
                Ok(dev) => dev,
                Err(e) => {
                    log::warn!("{e}");
                    continue;
                }
            };
            match Self::open_device(dev, &options, name_filter.as_deref()) {
                Ok(Some(camera)) => return Ok(camera),
                Ok(None) => {}
                Err(e) => log::debug!("skipping device: {e}"),
            }
        }

        bail!("no supported camera device found")
    }

    fn open_device(
        dev: Device,
        options: &CameraOptions,
        name_filter: Option<&str>,
    ) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        if let Some(name) = name_filter {
            if caps.card() != name {
                return Ok(None);
            }
        }
        if !caps
            .device_capabilities()
            .contains(CapabilityFlags::VIDEO_CAPTURE)
        {
            return Ok(None);
        }

        let fmt = best_format(&dev, options)?;
        let capture = dev.video_capture(PixFormat::new(
            fmt.resolution.width(),
            fmt.resolution.height(),
            fmt.pixelformat,
        ))?;
        let interval = capture.set_frame_interval(fmt.interval)?;

        let format = capture.format();
        let (width, height) = (format.width(), format.height());
        log::info!(
            "opened camera {}: {}x{} @ {:.1} fps",
            caps.card(),
            width,
            height,
            1.0 / interval.as_f32(),
        );

        Ok(Some(Self {
            width,
            height,
            stream: capture.into_stream(2)?,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    /// Reads the next frame from the camera.
    ///
    /// If no frame is available, this method will block until one is.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let queued = Instant::now();
        let image = self.stream.dequeue(|buf| {
            self.t_dequeue.record(queued.elapsed());
            let image = self
                .t_decode
                .time(|| Image::decode_jpeg(&buf))
                .unwrap_or_else(|e| {
                    // USB webcams occasionally deliver a truncated MJPG buffer. Substitute a blank
                    // frame; skipping the frame instead causes latency spikes.
                    log::error!("camera decode error: {e}");
                    Image::new(self.width, self.height)
                });
            Ok(image)
        })?;
        Ok(image)
    }

    /// Returns profiling timers for camera access and decoding.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_dequeue, &self.t_decode].into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_wishes_maximize_resolution_then_rate() {
        let wish = CameraOptions::default();
        assert!(
            format_rank(&wish, Resolution::new(1920, 1080), 30.0)
                > format_rank(&wish, Resolution::new(1280, 720), 60.0)
        );
        assert!(
            format_rank(&wish, Resolution::new(1280, 720), 60.0)
                > format_rank(&wish, Resolution::new(1280, 720), 30.0)
        );
    }

    #[test]
    fn frame_rate_wish_beats_pixel_count() {
        let wish = CameraOptions::default().fps(30);
        assert!(
            format_rank(&wish, Resolution::new(640, 480), 30.0)
                > format_rank(&wish, Resolution::new(1920, 1080), 15.0)
        );
    }

    #[test]
    fn resolution_wish_beats_frame_rate() {
        let wish = CameraOptions::default().resolution(Resolution::new(1280, 720));
        assert!(
            format_rank(&wish, Resolution::new(1280, 720), 10.0)
                > format_rank(&wish, Resolution::new(640, 480), 60.0)
        );
    }
}
