use crate::camera::domain::frame_source::{
    DeviceAccessError, FrameReadError, FrameSource, MediaContext,
};
use crate::camera::domain::video_track::VideoTrack;
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::config::CameraConfig;
use crate::shared::frame::Frame;

/// Live camera capture through libavdevice (v4l2 / avfoundation / dshow).
///
/// Each decoded frame is scaled to RGB24 at the configured resolution.
pub struct FfmpegCamera {
    config: CameraConfig,
    media: MediaContext,
    clock: Box<dyn Clock>,
    capture: Option<Capture>,
    track: Option<VideoTrack>,
    frame_index: usize,
}

struct Capture {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
}

// Safety: the ffmpeg contexts are only touched by the thread that owns the
// camera; ownership moves into the detection loop as a whole.
unsafe impl Send for FfmpegCamera {}

impl FfmpegCamera {
    pub fn new(config: CameraConfig, media: MediaContext) -> Self {
        Self {
            config,
            media,
            clock: Box::new(SystemClock),
            capture: None,
            track: None,
            frame_index: 0,
        }
    }

    fn open(&self) -> Result<Capture, DeviceAccessError> {
        let (format_name, device) = platform_input(self.config.device.as_deref());

        ffmpeg_next::init().map_err(|e| DeviceAccessError::Open {
            device: device.clone(),
            reason: e.to_string(),
        })?;
        ffmpeg_next::device::register_all();

        let format = ffmpeg_next::device::input::video()
            .find(|f| f.name() == format_name)
            .ok_or_else(|| DeviceAccessError::NoDevice {
                device: format!("{format_name} input unavailable"),
            })?;

        let mut options = ffmpeg_next::Dictionary::new();
        options.set(
            "video_size",
            &format!("{}x{}", self.config.width, self.config.height),
        );
        options.set("framerate", &self.config.fps.to_string());

        let ictx = ffmpeg_next::format::open_with(&device, &format, options)
            .map_err(|e| classify_open_error(&device, &e))?
            .input();

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| DeviceAccessError::NoDevice {
                device: device.clone(),
            })?;
        let stream_index = stream.index();

        let open_err = |e: ffmpeg_next::Error| DeviceAccessError::Open {
            device: device.clone(),
            reason: e.to_string(),
        };
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(open_err)?;
        let decoder = codec_ctx.decoder().video().map_err(open_err)?;

        let width = self.config.width;
        let height = self.config.height;
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(open_err)?;

        Ok(Capture {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
        })
    }

    /// The source went away: end the track so lockdown can react.
    fn disconnect(&mut self, reason: &str) -> FrameReadError {
        log::warn!("Camera stream lost: {reason}");
        if let Some(track) = &self.track {
            track.end();
        }
        self.capture = None;
        FrameReadError::Disconnected(reason.to_string())
    }
}

impl FrameSource for FfmpegCamera {
    fn start(&mut self) -> Result<(), DeviceAccessError> {
        if self.capture.is_some() {
            return Ok(());
        }
        let capture = self.open()?;
        log::info!(
            "Camera opened at {}x{} @ {} fps",
            capture.width,
            capture.height,
            self.config.fps
        );

        let track = VideoTrack::new(self.config.device.as_deref().unwrap_or("default camera"));
        self.media.tracks.register(track.clone());
        self.media.grant.set(true);
        self.track = Some(track);
        self.capture = Some(capture);
        self.frame_index = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, FrameReadError> {
        let Some(capture) = self.capture.as_mut() else {
            return Err(FrameReadError::NotStarted);
        };

        loop {
            let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
            if capture.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
                capture
                    .scaler
                    .run(&decoded, &mut rgb)
                    .map_err(|e| FrameReadError::Decode(e.to_string()))?;

                let pixels = copy_rgb_rows(&rgb, capture.width, capture.height);
                let frame = Frame::new(
                    pixels,
                    capture.width,
                    capture.height,
                    3,
                    self.frame_index,
                    self.clock.now_ms(),
                );
                self.frame_index += 1;
                return Ok(Some(frame));
            }

            let next = capture
                .ictx
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));
            let Some((stream_index, packet)) = next else {
                break;
            };
            if stream_index != capture.stream_index {
                continue;
            }
            if capture.decoder.send_packet(&packet).is_err() {
                // Partial packet at startup; try the next tick.
                return Ok(None);
            }
        }

        Err(self.disconnect("device stopped delivering packets"))
    }

    fn stop(&mut self) {
        if let Some(track) = self.track.take() {
            track.stop();
            self.media.tracks.unregister(track.id());
        }
        if self.capture.take().is_some() {
            log::info!("Camera released");
        }
        self.media.grant.set(false);
    }

    fn is_started(&self) -> bool {
        self.capture.is_some()
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Input format and device path for the current platform.
fn platform_input(device: Option<&str>) -> (&'static str, String) {
    #[cfg(target_os = "macos")]
    {
        ("avfoundation", device.unwrap_or("0").to_string())
    }
    #[cfg(target_os = "windows")]
    {
        (
            "dshow",
            format!("video={}", device.unwrap_or("Integrated Camera")),
        )
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        ("v4l2", device.unwrap_or("/dev/video0").to_string())
    }
}

fn classify_open_error(device: &str, err: &ffmpeg_next::Error) -> DeviceAccessError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("permission denied") || lower.contains("not authorized") {
        DeviceAccessError::PermissionDenied {
            device: device.to_string(),
        }
    } else if lower.contains("no such file") || lower.contains("no such device") {
        DeviceAccessError::NoDevice {
            device: device.to_string(),
        }
    } else {
        DeviceAccessError::Open {
            device: device.to_string(),
            reason: message,
        }
    }
}

/// Copies packed RGB rows, dropping the per-row stride padding.
fn copy_rgb_rows(frame: &ffmpeg_next::util::frame::video::Video, width: u32, height: u32) -> Vec<u8> {
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_len = width as usize * 3;
    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        pixels.extend_from_slice(&data[start..start + row_len]);
    }
    pixels
}
