use std::path::Path;
use std::sync::Arc;

use crate::camera::domain::frame_source::{
    DeviceAccessError, FrameReadError, FrameSource, MediaContext,
};
use crate::camera::domain::video_track::VideoTrack;
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::frame::Frame;

/// Replays a fixed image as a camera stream.
///
/// Used for dry runs without a webcam and as a deterministic source in
/// tests. With a frame limit set, the source behaves like an unplugged
/// device once the limit is reached.
pub struct StillFrameSource {
    image: image::RgbImage,
    label: String,
    media: MediaContext,
    clock: Arc<dyn Clock>,
    frame_limit: Option<usize>,
    track: Option<VideoTrack>,
    frame_index: usize,
}

impl StillFrameSource {
    pub fn new(image: image::RgbImage, media: MediaContext) -> Self {
        Self {
            image,
            label: "still image".to_string(),
            media,
            clock: Arc::new(SystemClock),
            frame_limit: None,
            track: None,
            frame_index: 0,
        }
    }

    pub fn open(path: &Path, media: MediaContext) -> Result<Self, DeviceAccessError> {
        let image = image::open(path)
            .map_err(|e| match e {
                image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    DeviceAccessError::NoDevice {
                        device: path.display().to_string(),
                    }
                }
                other => DeviceAccessError::Open {
                    device: path.display().to_string(),
                    reason: other.to_string(),
                },
            })?
            .to_rgb8();
        let mut source = Self::new(image, media);
        source.label = path.display().to_string();
        Ok(source)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Ends the track after `limit` frames, as if the device was unplugged.
    pub fn with_frame_limit(mut self, limit: usize) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn track(&self) -> Option<&VideoTrack> {
        self.track.as_ref()
    }
}

impl FrameSource for StillFrameSource {
    fn start(&mut self) -> Result<(), DeviceAccessError> {
        if self.track.is_some() {
            return Ok(());
        }
        let track = VideoTrack::new(&self.label);
        self.media.tracks.register(track.clone());
        self.media.grant.set(true);
        self.track = Some(track);
        self.frame_index = 0;
        log::info!(
            "Still source {} started ({}x{})",
            self.label,
            self.image.width(),
            self.image.height()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, FrameReadError> {
        let Some(track) = &self.track else {
            return Err(FrameReadError::NotStarted);
        };
        if !track.is_live() {
            return Err(FrameReadError::Disconnected(self.label.clone()));
        }
        if self.frame_limit.is_some_and(|limit| self.frame_index >= limit) {
            track.end();
            return Err(FrameReadError::Disconnected(self.label.clone()));
        }
        let frame = Frame::from_rgb_image(self.image.clone(), self.frame_index, self.clock.now_ms());
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn stop(&mut self) {
        if let Some(track) = self.track.take() {
            track.stop();
            self.media.tracks.unregister(track.id());
            self.media.grant.set(false);
        }
    }

    fn is_started(&self) -> bool {
        self.track.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn gray_image() -> image::RgbImage {
        image::RgbImage::from_pixel(8, 6, image::Rgb([90, 90, 90]))
    }

    #[test]
    fn test_start_publishes_track_and_grant() {
        let media = MediaContext::new();
        let mut source = StillFrameSource::new(gray_image(), media.clone());

        source.start().unwrap();

        assert!(media.grant.is_granted());
        assert_eq!(media.tracks.live_tracks().len(), 1);
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (8, 6));
        assert_eq!(frame.index(), 0);
    }

    #[test]
    fn test_frame_limit_ends_track_with_notification() {
        let media = MediaContext::new();
        let mut source = StillFrameSource::new(gray_image(), media.clone()).with_frame_limit(2);
        source.start().unwrap();
        let ended = Arc::new(AtomicUsize::new(0));
        let e = ended.clone();
        let _sub = source.track().unwrap().on_ended(Arc::new(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(matches!(
            source.next_frame(),
            Err(FrameReadError::Disconnected(_))
        ));
        assert!(matches!(
            source.next_frame(),
            Err(FrameReadError::Disconnected(_))
        ));

        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert!(media.tracks.live_tracks().is_empty());
    }

    #[test]
    fn test_stop_releases_everything() {
        let media = MediaContext::new();
        let mut source = StillFrameSource::new(gray_image(), media.clone());
        source.start().unwrap();
        source.stop();
        source.stop();

        assert!(!source.is_started());
        assert!(!media.grant.is_granted());
        assert!(media.tracks.is_empty());
        assert!(matches!(source.next_frame(), Err(FrameReadError::NotStarted)));
    }

    #[test]
    fn test_open_missing_file_is_no_device() {
        let tmp = TempDir::new().unwrap();
        let result = StillFrameSource::open(&tmp.path().join("nope.png"), MediaContext::new());
        assert!(matches!(result, Err(DeviceAccessError::NoDevice { .. })));
    }

    #[test]
    fn test_open_reads_image_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("desk.png");
        gray_image().save(&path).unwrap();

        let mut source = StillFrameSource::open(&path, MediaContext::new()).unwrap();
        source.start().unwrap();

        assert_eq!(source.next_frame().unwrap().unwrap().width(), 8);
    }
}
