//! Annotated output encoded to an MPEG-4 file with FFmpeg.
//!
//! The encoder is opened on the first frame, once the frame size is known.
//! Frame `n` is stamped `n / fps`, so the output keeps the input timing.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use ffmpeg::Rational;
use image::RgbImage;

use crate::error::WriteError;

use super::video::VideoSink;

/// Target bit rate for the encoded output.
const VIDEO_BIT_RATE: usize = 4_000_000;

/// Writes annotated frames to `<root>/output_<YYYYmmdd_HHMMSS>.mp4`.
pub struct FfmpegVideoWriter {
    path: PathBuf,
    fps: f64,
    encoder: Option<OpenEncoder>,
    frame_count: u64,
}

struct OpenEncoder {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    width: u32,
    height: u32,
}

impl FfmpegVideoWriter {
    pub fn create(
        output_root: &Path,
        started_at: &DateTime<Local>,
        fps: f64,
    ) -> Result<Self, WriteError> {
        ffmpeg::init().map_err(|err| WriteError::video(output_root, err))?;
        fs::create_dir_all(output_root).map_err(|err| WriteError::video(output_root, err))?;
        let base = format!("output_{}", started_at.format("%Y%m%d_%H%M%S"));
        let path = (0u32..)
            .map(|n| match n {
                0 => output_root.join(format!("{base}.mp4")),
                n => output_root.join(format!("{base}_{n}.mp4")),
            })
            .find(|candidate| !candidate.exists())
            .ok_or_else(|| WriteError::video(output_root, "no free output file name"))?;
        log::info!("encoding annotated video to {}", path.display());
        Ok(Self {
            path,
            fps,
            encoder: None,
            frame_count: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn open(&self, width: u32, height: u32) -> Result<OpenEncoder, ffmpeg::Error> {
        let mut output = ffmpeg::format::output(&self.path)?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or(ffmpeg::Error::EncoderNotFound)?;

        let rate = Rational::from(self.fps);
        let encoder_time_base = rate.invert();
        let mut stream = output.add_stream(codec)?;
        let stream_index = stream.index();

        let mut config = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        config.set_width(width);
        config.set_height(height);
        config.set_format(Pixel::YUV420P);
        config.set_time_base(encoder_time_base);
        config.set_frame_rate(Some(rate));
        config.set_bit_rate(VIDEO_BIT_RATE);
        if global_header {
            config.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = config.open_as(codec)?;
        stream.set_parameters(&encoder);
        stream.set_time_base(encoder_time_base);

        output.write_header()?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or(encoder_time_base);

        let scaler = scaling::Context::get(
            Pixel::RGB24,
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            scaling::Flags::BILINEAR,
        )?;

        Ok(OpenEncoder {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            width,
            height,
        })
    }
}

impl OpenEncoder {
    fn encode(&mut self, image: &RgbImage, pts: i64) -> Result<(), ffmpeg::Error> {
        let mut rgb = ffmpeg::frame::Video::new(Pixel::RGB24, self.width, self.height);
        let row_bytes = self.width as usize * 3;
        let stride = rgb.stride(0);
        let plane = rgb.data_mut(0);
        for (row, pixels) in image.as_raw().chunks_exact(row_bytes).enumerate() {
            let start = row * stride;
            let dest = plane
                .get_mut(start..start + row_bytes)
                .ok_or(ffmpeg::Error::InvalidData)?;
            dest.copy_from_slice(pixels);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler.run(&rgb, &mut yuv)?;
        yuv.set_pts(Some(pts));
        self.encoder.send_frame(&yuv)?;
        self.write_packets()
    }

    fn write_packets(&mut self) -> Result<(), ffmpeg::Error> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet.write_interleaved(&mut self.output)?;
        }
        Ok(())
    }

    fn close(mut self) -> Result<(), ffmpeg::Error> {
        self.encoder.send_eof()?;
        self.write_packets()?;
        self.output.write_trailer()
    }
}

impl VideoSink for FfmpegVideoWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), WriteError> {
        if self.encoder.is_none() {
            let (width, height) = frame.dimensions();
            if width % 2 != 0 || height % 2 != 0 {
                return Err(WriteError::video(
                    &self.path,
                    format!("{width}x{height} frames cannot be encoded as 4:2:0 video"),
                ));
            }
            let opened = self
                .open(width, height)
                .map_err(|err| WriteError::video(&self.path, err))?;
            self.encoder = Some(opened);
        }
        let pts = self.frame_count as i64;
        let Some(encoder) = self.encoder.as_mut() else {
            return Err(WriteError::video(&self.path, "encoder is not open"));
        };
        if frame.dimensions() != (encoder.width, encoder.height) {
            return Err(WriteError::video(
                &self.path,
                format!(
                    "frame is {}x{}, video is {}x{}",
                    frame.width(),
                    frame.height(),
                    encoder.width,
                    encoder.height
                ),
            ));
        }
        encoder
            .encode(frame, pts)
            .map_err(|err| WriteError::video(&self.path, err))?;
        self.frame_count += 1;
        Ok(())
    }

    fn finish(self: Box<Self>, complete: bool) -> Result<PathBuf, WriteError> {
        let Self {
            path,
            encoder,
            frame_count,
            ..
        } = *self;
        match encoder {
            Some(encoder) => encoder
                .close()
                .map_err(|err| WriteError::video(&path, err))?,
            None => log::warn!("no frames were written; {} was not created", path.display()),
        }
        log::info!(
            "annotated output: {} frames in {}{}",
            frame_count,
            path.display(),
            if complete { "" } else { " (incomplete)" }
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::Rgb;

    fn started_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 5, 1, 14, 30, 5).unwrap()
    }

    fn count_video_packets(path: &Path) -> usize {
        let mut input = ffmpeg::format::input(&path).unwrap();
        let index = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .unwrap()
            .index();
        input
            .packets()
            .filter(|(stream, _)| stream.index() == index)
            .count()
    }

    #[test]
    fn encoded_file_keeps_every_frame() {
        let root = tempfile::tempdir().unwrap();
        let mut writer = FfmpegVideoWriter::create(root.path(), &started_at(), 10.0).unwrap();
        assert_eq!(writer.path(), root.path().join("output_20260501_143005.mp4"));
        for shade in 0..12u8 {
            writer
                .write_frame(&RgbImage::from_pixel(64, 48, Rgb([shade * 20, 0, 0])))
                .unwrap();
        }
        assert_eq!(writer.frame_count(), 12);
        let path = Box::new(writer).finish(true).unwrap();
        assert!(path.is_file());
        assert_eq!(count_video_packets(&path), 12);
    }

    #[test]
    fn size_change_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let mut writer = FfmpegVideoWriter::create(root.path(), &started_at(), 30.0).unwrap();
        writer.write_frame(&RgbImage::new(32, 16)).unwrap();
        let err = writer.write_frame(&RgbImage::new(16, 16)).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(writer.frame_count(), 1);
        Box::new(writer).finish(false).unwrap();
    }

    #[test]
    fn odd_dimensions_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let mut writer = FfmpegVideoWriter::create(root.path(), &started_at(), 30.0).unwrap();
        assert!(writer.write_frame(&RgbImage::new(33, 16)).is_err());
    }
}
