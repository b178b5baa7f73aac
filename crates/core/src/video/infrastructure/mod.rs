pub mod ffmpeg_source;
pub mod image_file_source;
