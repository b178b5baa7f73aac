use std::path::{Path, PathBuf};

use ffmpeg_next::format::context::{Context, Input};
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;

use crate::shared::frame::Frame;
use crate::video::domain::video_source::VideoSource;

/// Decodes frames from a video file or camera via ffmpeg-next.
///
/// Each decoded picture is converted to RGB24 and handed out as a
/// [`Frame`], one per [`next_frame`](VideoSource::next_frame) call.
pub struct FfmpegSource {
    ictx: Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: scaling::Context,
    width: u32,
    height: u32,
    stream_index: usize,
    fps: Option<f64>,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

// Safety: FfmpegSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    /// Opens a video file.
    pub fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        let ictx = ffmpeg_next::format::input(path)?;
        Self::from_input(ictx)
    }

    /// Opens the platform's default camera.
    pub fn open_camera() -> Result<Self, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        ffmpeg_next::device::register_all();

        let (driver, device) = default_camera();
        let format = ffmpeg_next::device::input::video()
            .find(|f| f.name() == driver)
            .ok_or_else(|| format!("camera input format '{driver}' not available"))?;

        let ictx = match ffmpeg_next::format::open_with(
            &device,
            &format,
            ffmpeg_next::Dictionary::new(),
        )? {
            Context::Input(ictx) => ictx,
            Context::Output(_) => return Err("camera opened as an output".into()),
        };
        log::info!("Opened camera {} via {driver}", device.display());
        Self::from_input(ictx)
    }

    fn from_input(ictx: Input) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;
        let stream_index = stream.index();

        let rate = stream.rate();
        let fps = (rate.denominator() != 0 && rate.numerator() > 0)
            .then(|| rate.numerator() as f64 / rate.denominator() as f64);

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;
        let width = decoder.width();
        let height = decoder.height();

        let scaler = scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            ictx,
            decoder,
            scaler,
            width,
            height,
            stream_index,
            fps,
            frame_index: 0,
            flushing: false,
            done: false,
        })
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let mut decoded = Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb = Video::empty();
        self.scaler.run(&decoded, &mut rgb)?;

        let pixels = packed_rgb(&rgb, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

impl VideoSource for FfmpegSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if self.done {
            return Ok(None);
        }
        if let Some(frame) = self.try_receive()? {
            return Ok(Some(frame));
        }
        if self.flushing {
            self.done = true;
            return Ok(None);
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                let frame = self.try_receive()?;
                self.done = frame.is_none();
                return Ok(frame);
            };
            if stream.index() != self.stream_index {
                continue;
            }
            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("Dropped undecodable packet: {e}");
                continue;
            }
            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
        }
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn close(&mut self) {
        self.done = true;
    }
}

/// Input format name and device path of the default camera.
fn default_camera() -> (&'static str, PathBuf) {
    #[cfg(target_os = "macos")]
    {
        ("avfoundation", PathBuf::from("0"))
    }
    #[cfg(target_os = "windows")]
    {
        ("dshow", PathBuf::from("video=0"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        ("video4linux2,v4l2", PathBuf::from("/dev/video0"))
    }
}

/// Copies an RGB24 picture into a tightly packed buffer, dropping the
/// row padding ffmpeg may add.
fn packed_rgb(rgb: &Video, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb.stride(0);
    let data = rgb.data(0);
    let row_len = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_len]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encodes `num_frames` flat grey MPEG-4 frames at `fps`.
    fn write_test_video(path: &Path, num_frames: usize, width: u32, height: u32, fps: i32) {
        ffmpeg_next::init().unwrap();
        let mut octx = ffmpeg_next::format::output(path).unwrap();
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();
        let mut enc = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        enc.set_width(width);
        enc.set_height(height);
        enc.set_format(ffmpeg_next::format::Pixel::YUV420P);
        enc.set_time_base(ffmpeg_next::Rational(1, fps));
        enc.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            enc.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }
        let mut encoder = enc.open_with(ffmpeg_next::Dictionary::new()).unwrap();
        ost.set_parameters(&encoder);
        octx.write_header().unwrap();
        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut write_packets = |encoder_packets: Vec<ffmpeg_next::Packet>| {
            for mut packet in encoder_packets {
                packet.set_stream(0);
                packet.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
                packet.write_interleaved(&mut octx).unwrap();
            }
        };

        let mut pending = Vec::new();
        for i in 0..num_frames {
            let mut yuv = Video::new(ffmpeg_next::format::Pixel::YUV420P, width, height);
            for plane in 0..3 {
                let fill = if plane == 0 { (i * 40 % 200) as u8 + 16 } else { 128 };
                yuv.data_mut(plane).fill(fill);
            }
            yuv.set_pts(Some(i as i64));
            encoder.send_frame(&yuv).unwrap();
            let mut packet = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut packet).is_ok() {
                pending.push(std::mem::replace(&mut packet, ffmpeg_next::Packet::empty()));
            }
            write_packets(std::mem::take(&mut pending));
        }
        encoder.send_eof().unwrap();
        let mut packet = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut packet).is_ok() {
            pending.push(std::mem::replace(&mut packet, ffmpeg_next::Packet::empty()));
        }
        write_packets(pending);
        octx.write_trailer().unwrap();
    }

    #[test]
    fn test_yields_every_frame_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        write_test_video(&path, 5, 160, 120, 30);

        let mut source = FfmpegSource::open(&path).unwrap();
        let mut indices = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!((frame.width(), frame.height(), frame.channels()), (160, 120, 3));
            assert_eq!(frame.data().len(), 160 * 120 * 3);
            indices.push(frame.index());
        }
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_reports_declared_fps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        write_test_video(&path, 2, 64, 48, 25);

        let source = FfmpegSource::open(&path).unwrap();
        let fps = source.fps().unwrap();
        assert!((fps - 25.0).abs() < 0.5, "fps was {fps}");
    }

    #[test]
    fn test_open_nonexistent_fails() {
        assert!(FfmpegSource::open(Path::new("/nonexistent/clip.mp4")).is_err());
    }

    #[test]
    fn test_close_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        write_test_video(&path, 3, 64, 48, 30);

        let mut source = FfmpegSource::open(&path).unwrap();
        source.close();
        assert!(source.next_frame().unwrap().is_none());
    }
}
