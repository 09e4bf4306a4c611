pub mod ffmpeg_camera;
pub mod still_frame_source;
