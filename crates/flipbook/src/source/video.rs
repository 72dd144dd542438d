//! Codec-decoded video source (feature-gated behind `video`).
//!
//! - Opens the container with FFmpeg and picks the first video stream
//! - Decodes packets on the source thread, draining every frame per packet
//! - Converts to RGBA with swscale (bilinear), at viewport size in `Resample` mode
//! - Copies rows through `PixelBuffer::from_strided`, never the padding

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg::util::frame::video::Video as VideoFrame;

use crate::error::{Result, SequenceError};
use crate::frame::{PixelBuffer, PixelFormat};
use crate::queue::FrameSink;
use crate::scaler::Scaler;

use super::FrameProducer;

/// Frame rate assumed when the container does not report one.
const FALLBACK_FRAME_RATE: f64 = 30.0;

/// Stream metadata read before decoding starts.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Reported by the container, or estimated from duration x frame rate.
    pub frame_count: usize,
    pub codec: String,
}

impl VideoInfo {
    /// Frame rate rounded for the playback clock (never zero).
    pub fn clock_rate(&self) -> u32 {
        (self.frame_rate.round() as u32).max(1)
    }
}

fn setup_err(context: &str, err: impl std::fmt::Display) -> SequenceError {
    SequenceError::DecodeSetup(format!("{context}: {err}"))
}

fn open_input(path: &Path) -> Result<(ffmpeg::format::context::Input, usize)> {
    ffmpeg::init().map_err(|e| setup_err("ffmpeg init failed", e))?;
    let input = ffmpeg::format::input(path)
        .map_err(|e| setup_err(&format!("unable to open {}", path.display()), e))?;
    let stream_index = input
        .streams()
        .find(|s| s.parameters().medium() == Type::Video)
        .map(|s| s.index())
        .ok_or_else(|| SequenceError::DecodeSetup("no video stream found".into()))?;
    Ok((input, stream_index))
}

fn open_decoder(stream: &ffmpeg::Stream<'_>) -> Result<ffmpeg::decoder::Video> {
    let parameters = stream.parameters();
    let codec_id = parameters.id();
    let codec = ffmpeg::codec::decoder::find(codec_id)
        .ok_or_else(|| SequenceError::DecodeSetup(format!("unsupported codec {codec_id:?}")))?;
    let context = ffmpeg::codec::context::Context::from_parameters(parameters)
        .map_err(|e| setup_err("couldn't copy codec context", e))?;
    context
        .decoder()
        .open_as(codec)
        .and_then(|opened| opened.video())
        .map_err(|e| setup_err("could not open codec", e))
}

fn rate_to_f64(rate: ffmpeg::Rational) -> Option<f64> {
    if rate.numerator() > 0 && rate.denominator() > 0 {
        Some(rate.numerator() as f64 / rate.denominator() as f64)
    } else {
        None
    }
}

/// Read stream metadata without decoding any frames.
pub fn probe(path: &Path) -> Result<VideoInfo> {
    let (input, stream_index) = open_input(path)?;
    let stream = input
        .stream(stream_index)
        .ok_or_else(|| SequenceError::DecodeSetup("video stream vanished".into()))?;
    let decoder = open_decoder(&stream)?;

    let frame_rate = rate_to_f64(stream.avg_frame_rate())
        .or_else(|| rate_to_f64(stream.rate()))
        .unwrap_or(FALLBACK_FRAME_RATE);
    let duration_secs = if input.duration() > 0 {
        input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
    } else {
        0.0
    };
    let frame_count = estimate_frame_count(stream.frames(), duration_secs, frame_rate);
    let codec = decoder
        .codec()
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    log::info!(
        "Probed {}: {}x{} @ {:.2} fps, {} frames, codec {}",
        path.display(),
        decoder.width(),
        decoder.height(),
        frame_rate,
        frame_count,
        codec
    );

    Ok(VideoInfo {
        width: decoder.width(),
        height: decoder.height(),
        frame_rate,
        frame_count,
        codec,
    })
}

/// Prefer the container's frame count; otherwise estimate from duration.
pub fn estimate_frame_count(reported: i64, duration_secs: f64, frame_rate: f64) -> usize {
    if reported > 0 {
        reported as usize
    } else {
        (duration_secs * frame_rate).round().max(0.0) as usize
    }
}

/// What a `receive_frame` result means for the drain loop.
#[derive(Debug, PartialEq, Eq)]
enum Receive {
    Frame,
    /// Decoder wants more input, or has nothing left: normal flow control.
    Drained,
    /// Anything else; the current packet is abandoned.
    Failed(String),
}

fn classify_receive(result: std::result::Result<(), ffmpeg::Error>) -> Receive {
    match result {
        Ok(()) => Receive::Frame,
        Err(ffmpeg::Error::Eof) => Receive::Drained,
        Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
            Receive::Drained
        }
        Err(e) => Receive::Failed(e.to_string()),
    }
}

/// Decodes one video stream start to end into RGBA frames.
pub struct VideoSource {
    path: PathBuf,
    scaler: Scaler,
    skipped: usize,
}

impl VideoSource {
    pub fn new(path: impl Into<PathBuf>, scaler: Scaler) -> Self {
        Self {
            path: path.into(),
            scaler,
            skipped: 0,
        }
    }

    /// Frames that failed to decode or convert and were skipped.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn skip(&mut self, index: usize, reason: impl Into<String>) {
        self.skipped += 1;
        let err = SequenceError::FrameDecode {
            index,
            reason: reason.into(),
        };
        log::warn!("Skipping: {err}");
    }

    /// Drain every frame the decoder has ready, converting and pushing each.
    fn drain(
        &mut self,
        decoder: &mut ffmpeg::decoder::Video,
        converter: &mut ScalingContext,
        out_size: (u32, u32),
        sink: &FrameSink,
        emitted: &mut usize,
    ) -> Result<()> {
        let mut decoded = VideoFrame::empty();
        let mut rgba = VideoFrame::empty();
        loop {
            match classify_receive(decoder.receive_frame(&mut decoded)) {
                Receive::Frame => {}
                Receive::Drained => return Ok(()),
                Receive::Failed(reason) => {
                    self.skip(*emitted, format!("receive_frame: {reason}"));
                    return Ok(());
                }
            }

            if let Err(e) = converter.run(&decoded, &mut rgba) {
                self.skip(*emitted, format!("pixel conversion: {e}"));
                continue;
            }

            let buffer = PixelBuffer::from_strided(
                out_size.0,
                out_size.1,
                PixelFormat::Rgba8,
                rgba.data(0),
                rgba.stride(0),
            );
            let buffer = match buffer {
                Ok(b) => b,
                Err(e) => {
                    self.skip(*emitted, e.to_string());
                    continue;
                }
            };

            let frame = self.scaler.apply(*emitted, buffer)?;
            sink.push(frame)?;
            log::debug!("Decoded frame {}", *emitted);
            *emitted += 1;
        }
    }
}

impl FrameProducer for VideoSource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn produce(&mut self, sink: &FrameSink) -> Result<usize> {
        // Acquisition order: container, decoder, converter. Released in reverse.
        let (mut input, stream_index) = open_input(&self.path)?;
        let mut decoder = {
            let stream = input
                .stream(stream_index)
                .ok_or_else(|| SequenceError::DecodeSetup("video stream vanished".into()))?;
            open_decoder(&stream)?
        };

        let native = (decoder.width(), decoder.height());
        let out_size = self.scaler.output_dimensions(native);
        let mut converter = ScalingContext::get(
            decoder.format(),
            native.0,
            native.1,
            Pixel::RGBA,
            out_size.0,
            out_size.1,
            ScalingFlags::BILINEAR,
        )
        .map_err(|e| setup_err("couldn't create pixel converter", e))?;

        log::info!(
            "Decoding {}: {}x{} -> {}x{} RGBA",
            self.path.display(),
            native.0,
            native.1,
            out_size.0,
            out_size.1
        );

        let mut emitted = 0usize;
        for (stream, packet) in input.packets() {
            if sink.should_stop() {
                return Err(SequenceError::Stopped);
            }
            if stream.index() != stream_index {
                continue;
            }
            if let Err(e) = decoder.send_packet(&packet) {
                self.skip(emitted, format!("send_packet: {e}"));
                continue;
            }
            self.drain(&mut decoder, &mut converter, out_size, sink, &mut emitted)?;
        }

        // Flush frames the decoder is still holding.
        match decoder.send_eof() {
            Ok(()) => self.drain(&mut decoder, &mut converter, out_size, sink, &mut emitted)?,
            Err(e) => log::warn!("Decoder flush failed: {e}"),
        }

        drop(converter);
        drop(decoder);
        drop(input);

        if self.skipped > 0 {
            log::warn!("{} frame(s) skipped in {}", self.skipped, self.path.display());
        }
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{StopSignal, bounded};
    use crate::scaler::ScaleMode;
    use crate::sequence::{PlaybackSequence, PlaybackState, StallPolicy};
    use crate::source::FrameSource;

    /// 33 wide so a 4-byte-per-pixel row (132 bytes) needs alignment padding.
    const CLIP_SIZE: (u32, u32) = (33, 17);
    const CLIP_FRAMES: usize = 8;
    const CLIP_FPS: i32 = 25;

    fn shade(i: usize) -> [u8; 3] {
        [(i * 30) as u8, 0x40, 0xC0]
    }

    fn write_packets(
        encoder: &mut ffmpeg::encoder::video::Encoder,
        output: &mut ffmpeg::format::context::Output,
        encoder_tb: ffmpeg::Rational,
        stream_tb: ffmpeg::Rational,
    ) -> std::result::Result<(), ffmpeg::Error> {
        let mut packet = ffmpeg::Packet::empty();
        while encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(encoder_tb, stream_tb);
            packet.write_interleaved(output)?;
        }
        Ok(())
    }

    /// Uncompressed RGB24 in NUT: every FFmpeg build can mux and demux it.
    fn write_clip(path: &Path) -> std::result::Result<(), ffmpeg::Error> {
        ffmpeg::init()?;
        let (width, height) = CLIP_SIZE;
        let time_base = ffmpeg::Rational::new(1, CLIP_FPS);

        let mut output = ffmpeg::format::output(path)?;
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::RAWVIDEO)
            .ok_or(ffmpeg::Error::EncoderNotFound)?;
        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(Pixel::RGB24);
        encoder.set_frame_rate(Some(ffmpeg::Rational::new(CLIP_FPS, 1)));
        encoder.set_time_base(time_base);
        let mut encoder = encoder.open_as(codec)?;

        {
            let mut stream = output.add_stream(codec)?;
            stream.set_parameters(&encoder);
            stream.set_time_base(time_base);
        }
        output.write_header()?;
        let stream_tb = output
            .stream(0)
            .ok_or(ffmpeg::Error::StreamNotFound)?
            .time_base();

        for i in 0..CLIP_FRAMES {
            let mut frame = VideoFrame::new(Pixel::RGB24, width, height);
            let stride = frame.stride(0);
            let row_len = width as usize * 3;
            let data = frame.data_mut(0);
            for y in 0..height as usize {
                for px in data[y * stride..y * stride + row_len].chunks_exact_mut(3) {
                    px.copy_from_slice(&shade(i));
                }
            }
            frame.set_pts(Some(i as i64));
            encoder.send_frame(&frame)?;
            write_packets(&mut encoder, &mut output, time_base, stream_tb)?;
        }
        encoder.send_eof()?;
        write_packets(&mut encoder, &mut output, time_base, stream_tb)?;
        output.write_trailer()
    }

    fn clip() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.nut");
        write_clip(&path).unwrap();
        (dir, path)
    }

    fn decode_all(path: &Path, scaler: Scaler) -> (VideoSource, Vec<crate::frame::RenderableFrame>) {
        let mut source = VideoSource::new(path, scaler);
        let (sink, queue) = bounded(64, StopSignal::new());
        let produced = source.produce(&sink).unwrap();
        drop(sink);
        let frames: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(produced, frames.len());
        (source, frames)
    }

    #[test]
    fn probe_reads_stream_metadata() {
        let (_dir, path) = clip();
        let info = probe(&path).unwrap();
        assert_eq!((info.width, info.height), CLIP_SIZE);
        assert_eq!(info.clock_rate(), CLIP_FPS as u32);
        assert_eq!(info.codec, "rawvideo");
    }

    #[test]
    fn draw_transform_decodes_native_frames_without_padding() {
        let (_dir, path) = clip();
        let (source, frames) = decode_all(&path, Scaler::new(ScaleMode::DrawTransform, 66, 34));
        assert_eq!(source.skipped(), 0);
        assert_eq!(frames.len(), CLIP_FRAMES);

        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert_eq!(frame.buffer.dimensions(), CLIP_SIZE);
            assert_eq!(frame.buffer.bytes().len(), 33 * 17 * 4);
            assert!((frame.transform.scale_x - 2.0).abs() < 1e-6);
            assert!((frame.transform.scale_y - 2.0).abs() < 1e-6);

            // Padding would show up as bytes that are not this frame's colour.
            let [r, g, b] = shade(i);
            for row in frame.buffer.bytes().chunks_exact(frame.buffer.row_len()) {
                for px in row.chunks_exact(4) {
                    assert_eq!(px, [r, g, b, 255], "frame {i}");
                }
            }
        }
    }

    #[test]
    fn resample_converts_straight_to_viewport_size() {
        let (_dir, path) = clip();
        assert_eq!(
            Scaler::new(ScaleMode::Resample, 64, 36).output_dimensions(CLIP_SIZE),
            (64, 36)
        );
        let (_, frames) = decode_all(&path, Scaler::new(ScaleMode::Resample, 64, 36));
        assert_eq!(frames.len(), CLIP_FRAMES);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert_eq!(frame.buffer.dimensions(), (64, 36));
            assert!(frame.transform.is_identity());
            // Solid frames stay opaque through the bilinear conversion.
            assert!(frame.buffer.bytes().chunks_exact(4).all(|px| px[3] == 255));
        }
    }

    #[test]
    fn clip_plays_to_its_last_frame() {
        let (_dir, path) = clip();
        let info = probe(&path).unwrap();
        let producer = VideoSource::new(path, Scaler::new(ScaleMode::DrawTransform, 33, 17));
        let source = FrameSource::spawn(producer, 4).unwrap();
        let mut seq =
            PlaybackSequence::start_until_close(source, 0, info.clock_rate(), StallPolicy::Block)
                .unwrap();
        for _ in 0..CLIP_FRAMES * 3 {
            seq.tick(info.clock_rate()).unwrap();
        }
        assert_eq!(seq.state(), PlaybackState::Finished);
        assert_eq!(seq.current_frame_number(), CLIP_FRAMES);
        assert_eq!(seq.current_frame().unwrap().index, CLIP_FRAMES - 1);
    }

    #[test]
    fn skipped_frames_are_counted() {
        let mut source = VideoSource::new("unused.mp4", Scaler::new(ScaleMode::Resample, 4, 4));
        source.skip(3, "send_packet: Invalid data");
        source.skip(4, "pixel conversion: boom");
        assert_eq!(source.skipped(), 2);
    }

    #[test]
    fn eagain_and_eof_are_flow_control() {
        assert_eq!(classify_receive(Ok(())), Receive::Frame);
        assert_eq!(classify_receive(Err(ffmpeg::Error::Eof)), Receive::Drained);
        assert_eq!(
            classify_receive(Err(ffmpeg::Error::Other {
                errno: ffmpeg::util::error::EAGAIN
            })),
            Receive::Drained
        );
        assert!(matches!(
            classify_receive(Err(ffmpeg::Error::InvalidData)),
            Receive::Failed(_)
        ));
    }

    #[test]
    fn frame_count_prefers_container() {
        assert_eq!(estimate_frame_count(250, 100.0, 30.0), 250);
        assert_eq!(estimate_frame_count(0, 10.0, 29.97), 300);
        assert_eq!(estimate_frame_count(-1, 0.0, 30.0), 0);
    }

    #[test]
    fn clock_rate_rounds_and_never_zero() {
        let mut info = VideoInfo {
            width: 1,
            height: 1,
            frame_rate: 29.97,
            frame_count: 1,
            codec: "h264".into(),
        };
        assert_eq!(info.clock_rate(), 30);
        info.frame_rate = 0.2;
        assert_eq!(info.clock_rate(), 1);
    }

    #[test]
    fn missing_file_is_a_setup_error() {
        let mut source = VideoSource::new(
            "/definitely/not/here.mp4",
            Scaler::new(ScaleMode::Resample, 4, 4),
        );
        let (sink, _queue) = bounded(4, StopSignal::new());
        assert!(matches!(
            source.produce(&sink),
            Err(SequenceError::DecodeSetup(_))
        ));
        assert!(matches!(
            probe(Path::new("/definitely/not/here.mp4")),
            Err(SequenceError::DecodeSetup(_))
        ));
    }
}
