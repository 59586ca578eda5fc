/*!
    The stream decode engine.

    A [`StreamDecoder`] owns one demuxer input and one codec context, binds
    to a single elementary stream, and turns its packets into frames one
    read at a time. Decode outcomes are reported as a [`Status`] rather than
    a `Result` because most of them are control flow, not failures: the
    caller's decode loop keys off the status to continue, stop, or rebuild
    the decoder without hardware acceleration.
*/

use std::ffi::c_int;
use std::num::NonZeroUsize;
use std::ptr;
use std::thread;

use ffmpeg_next::format::{sample, Sample};
use ffmpeg_next::packet::Ref as _;
use ffmpeg_next::{codec, ffi, frame, Packet};
use log::{error, info, warn};

use media_types::{AudioFormat, DeviceParams, Error, MediaKind, PixelFormat, Rational, Result};

use crate::config::{AccelPolicy, CodecHandle, DecoderConfig};
use crate::hw::{Accelerator, HardwareAccel};
use crate::input::{av_error_string, InputSource, Read, SelectedStream};
use crate::pace::RateEmulator;
use crate::pcm::{AudioSink, PcmBuffer, Resampler};

/**
    Outcome of a single decode step.

    Only [`ReadError`](Status::ReadError) and the restart request terminate
    a stream: decode errors lose one packet and the loop continues.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// The step made progress without producing a frame
    Success,
    /// A frame was decoded and handed to the callback
    FrameFinished,
    /// End of stream
    Eof,
    /// The demuxer failed; the stream is not recoverable
    ReadError,
    /// The codec rejected a packet; the packet is lost but the stream continues
    DecodeError,
    /// Hardware decoding failed mid-stream; rebuild without acceleration
    RestartRequired,
}

/// Owned codec context, freed on drop.
struct CodecContext {
    ctx: *mut ffi::AVCodecContext,
}

impl CodecContext {
    fn from_parameters(codec: &CodecHandle, params: *const ffi::AVCodecParameters) -> Result<Self> {
        unsafe {
            let mut ctx = ffi::avcodec_alloc_context3(codec.as_ptr());
            if ctx.is_null() {
                return Err(Error::codec("could not allocate codec context"));
            }
            let ret = ffi::avcodec_parameters_to_context(ctx, params);
            if ret < 0 {
                ffi::avcodec_free_context(&mut ctx);
                return Err(Error::codec(format!(
                    "could not copy stream parameters: {}",
                    av_error_string(ret)
                )));
            }
            Ok(Self { ctx })
        }
    }

    fn open(&mut self, codec: &CodecHandle) -> Result<()> {
        let ret = unsafe { ffi::avcodec_open2(self.ctx, codec.as_ptr(), ptr::null_mut()) };
        if ret < 0 {
            return Err(Error::codec(format!(
                "could not open decoder {}: {}",
                codec.name(),
                av_error_string(ret)
            )));
        }
        Ok(())
    }

    fn send(&mut self, packet: *const ffi::AVPacket) -> c_int {
        unsafe { ffi::avcodec_send_packet(self.ctx, packet) }
    }

    fn receive(&mut self, frame: *mut ffi::AVFrame) -> c_int {
        unsafe { ffi::avcodec_receive_frame(self.ctx, frame) }
    }

    fn as_mut_ptr(&mut self) -> *mut ffi::AVCodecContext {
        self.ctx
    }

    fn as_ptr(&self) -> *const ffi::AVCodecContext {
        self.ctx
    }
}

impl Drop for CodecContext {
    fn drop(&mut self) {
        unsafe {
            ffi::avcodec_free_context(&mut self.ctx);
        }
    }
}

/**
    Decodes one elementary stream of a demuxed input.

    Usage is open, setup, then repeated decode calls:

    1. [`open_input`](Self::open_input) opens the demuxer
    2. [`setup_audio`](Self::setup_audio) or [`setup_video`](Self::setup_video)
       binds to a stream and opens its codec
    3. [`decode_audio`](Self::decode_audio) / [`decode_video`](Self::decode_video)
       each consume one packet and report a [`Status`]
*/
pub struct StreamDecoder {
    source: InputSource,
    config: DecoderConfig,
    stream: Option<SelectedStream>,
    kind: Option<MediaKind>,
    codec_ctx: Option<CodecContext>,
    codec_name: Option<String>,
    accel: Option<Box<dyn Accelerator>>,
    pace: RateEmulator,
    resampler: Option<Resampler>,
}

impl StreamDecoder {
    pub fn new(config: DecoderConfig) -> Result<Self> {
        Ok(Self {
            source: InputSource::new()?,
            config,
            stream: None,
            kind: None,
            codec_ctx: None,
            codec_name: None,
            accel: None,
            pace: RateEmulator::new(),
            resampler: None,
        })
    }

    /**
        Open the demuxer input described by `params`.
    */
    pub fn open_input(&mut self, params: &DeviceParams) -> Result<()> {
        self.source.open(params)
    }

    /**
        Install an interrupt callback on the demuxer.

        See [`InputSource::set_interrupt`].
    */
    pub fn set_interrupt(&mut self, callback: impl Fn() -> bool + Send + 'static) {
        self.source.set_interrupt(callback);
    }

    /**
        Bind to the input's audio stream and open its decoder.

        `format` sets the sample rate and channel layout the decoder is asked
        to produce, which also covers streams whose parameters do not carry
        them (common with raw PCM over RTP).
    */
    pub fn setup_audio(&mut self, format: AudioFormat) -> Result<()> {
        let (stream, codec, mut ctx) = self.setup_stream(MediaKind::Audio)?;

        // The decoder is asked to produce consumer-shaped frames; codecs
        // that carry their own parameters override these at open.
        unsafe {
            let raw = ctx.as_mut_ptr();
            ffi::av_channel_layout_default(&mut (*raw).ch_layout, c_int::from(format.channels));
            (*raw).sample_rate = format.sample_rate as c_int;
        }

        self.finish_setup(MediaKind::Audio, stream, codec, ctx)
    }

    /**
        Bind to the input's video stream and open its decoder.

        Hardware acceleration is attached here when the config asks for it
        and a device is available; otherwise decoding falls back to software.
    */
    pub fn setup_video(&mut self) -> Result<()> {
        let (stream, codec, mut ctx) = self.setup_stream(MediaKind::Video)?;

        match self.config.accel {
            AccelPolicy::Hardware => match HardwareAccel::try_new(self.config.hw_device) {
                Some(accel) => {
                    info!("using {} hardware acceleration", accel.name());
                    unsafe {
                        (*ctx.as_mut_ptr()).hw_device_ctx = accel.device_ref();
                    }
                    self.accel = Some(Box::new(accel));
                }
                None => {
                    warn!("hardware acceleration unavailable, decoding in software");
                }
            },
            AccelPolicy::Disabled => {
                warn!("hardware acceleration disabled after earlier failure, decoding in software");
            }
            AccelPolicy::Software => {}
        }

        self.finish_setup(MediaKind::Video, stream, codec, ctx)
    }

    fn setup_stream(
        &mut self,
        kind: MediaKind,
    ) -> Result<(SelectedStream, CodecHandle, CodecContext)> {
        // Tear down any previous binding before probing again.
        self.codec_ctx = None;
        self.codec_name = None;
        self.accel = None;
        self.resampler = None;
        self.stream = None;
        self.kind = None;

        self.source.probe()?;
        let stream = self
            .source
            .select_stream(kind)
            .ok_or(Error::stream_not_found(kind))?;

        let codec = self
            .resolve_decoder(stream.codec_id)
            .ok_or_else(|| Error::codec(format!("no decoder for {:?}", stream.codec_id)))?;
        info!("using decoder {} for {kind} stream {}", codec.name(), stream.index);

        let mut ctx = CodecContext::from_parameters(&codec, stream.params)?;
        unsafe {
            (*ctx.as_mut_ptr()).thread_count = decode_thread_count() as c_int;
        }

        Ok((stream, codec, ctx))
    }

    fn finish_setup(
        &mut self,
        kind: MediaKind,
        stream: SelectedStream,
        codec: CodecHandle,
        mut ctx: CodecContext,
    ) -> Result<()> {
        ctx.open(&codec)?;

        if self.config.rate_emulation {
            self.pace.start();
        }

        self.codec_name = Some(codec.name());
        self.codec_ctx = Some(ctx);
        self.stream = Some(stream);
        self.kind = Some(kind);
        Ok(())
    }

    fn resolve_decoder(&self, id: codec::Id) -> Option<CodecHandle> {
        if let Some(finder) = &self.config.finder {
            if let Some(codec) = finder.find_decoder(id) {
                return Some(codec);
            }
        }
        CodecHandle::by_id(id)
    }

    /**
        Replace the hardware acceleration hook.

        Intended for alternative [`Accelerator`] implementations; passing
        `None` forces the software path.
    */
    pub fn set_accel(&mut self, accel: Option<Box<dyn Accelerator>>) {
        self.accel = accel;
    }

    /**
        Read one packet and decode it, handing any finished frame to the
        callback.
    */
    pub fn decode_video(&mut self, mut callback: impl FnMut(&frame::Video)) -> Status {
        let Some(packet) = self.next_packet_status() else {
            return Status::Success;
        };
        let packet = match packet {
            Ok(packet) => packet,
            Err(status) => return status,
        };

        let accel_failed = self.accel.as_ref().is_some_and(|a| a.has_failed());
        let Some(ctx) = self.codec_ctx.as_mut() else {
            return Status::Success;
        };

        if let Some(status) = classify_send_error(ctx.send(packet.as_ptr()), accel_failed) {
            return status;
        }

        let mut frame = frame::Video::empty();
        let ret = unsafe { ctx.receive(frame.as_mut_ptr()) };
        if let Some(status) = classify_receive_error(ret, accel_failed) {
            return status;
        }

        normalize_frame_pixel_format(&mut frame);

        // A failure discovered at any point during this call means the frame
        // (and any that follow) would stay stuck in device memory.
        if let Some(accel) = self.accel.as_mut() {
            if accel.has_failed() {
                return Status::RestartRequired;
            }
            if accel.extract_data(&mut frame).is_err() || accel.has_failed() {
                return Status::RestartRequired;
            }
        }

        self.pace_frame(unsafe { (*frame.as_ptr()).pts });
        callback(&frame);
        Status::FrameFinished
    }

    /**
        Read one packet and decode it, handing any finished frame to the
        callback.
    */
    pub fn decode_audio(&mut self, mut callback: impl FnMut(&frame::Audio)) -> Status {
        let Some(packet) = self.next_packet_status() else {
            return Status::Success;
        };
        let packet = match packet {
            Ok(packet) => packet,
            Err(status) => return status,
        };

        let Some(ctx) = self.codec_ctx.as_mut() else {
            return Status::Success;
        };

        if let Some(status) = classify_send_error(ctx.send(packet.as_ptr()), false) {
            return status;
        }

        let mut frame = frame::Audio::empty();
        let ret = unsafe { ctx.receive(frame.as_mut_ptr()) };
        if let Some(status) = classify_receive_error(ret, false) {
            return status;
        }

        self.pace_frame(unsafe { (*frame.as_ptr()).pts });
        callback(&frame);
        Status::FrameFinished
    }

    /// Read the next packet for the bound stream. `None` means a packet for
    /// some other stream arrived and was skipped.
    fn next_packet_status(&mut self) -> Option<std::result::Result<Packet, Status>> {
        let index = self.stream.as_ref().map(|s| s.index)?;

        let mut packet = Packet::empty();
        match self.source.read_packet(&mut packet) {
            Read::Packet => {
                if packet.stream() != index {
                    return None;
                }
                Some(Ok(packet))
            }
            Read::Again => None,
            Read::Eof => Some(Err(Status::Eof)),
            Read::Failed(message) => {
                error!("packet read failed: {message}");
                Some(Err(Status::ReadError))
            }
        }
    }

    fn pace_frame(&self, pts: i64) {
        let Some(stream) = self.stream.as_ref() else {
            return;
        };
        let pts = (pts != ffi::AV_NOPTS_VALUE).then_some(pts);
        self.pace.pace(pts, stream.start_time, stream.time_base);
    }

    /**
        Drain the codec of buffered frames at end of stream.

        Extraction of hardware frames is best effort here: a frame that
        cannot be transferred is skipped rather than failing the flush.
    */
    pub fn flush_video(&mut self, mut callback: impl FnMut(&frame::Video)) -> Status {
        let Some(ctx) = self.codec_ctx.as_mut() else {
            return Status::Success;
        };

        // An already-flushed codec reports end of stream here, which ends
        // the drain cleanly.
        if let Some(status) = classify_send_error(ctx.send(ptr::null()), false) {
            return status;
        }

        loop {
            let mut frame = frame::Video::empty();
            let ret = unsafe { ctx.receive(frame.as_mut_ptr()) };
            match classify_receive_error(ret, false) {
                None => {}
                Some(Status::Success) => return Status::Success,
                Some(status) => return status,
            }

            normalize_frame_pixel_format(&mut frame);
            if let Some(accel) = self.accel.as_mut() {
                if accel.extract_data(&mut frame).is_err() {
                    continue;
                }
            }
            callback(&frame);
        }
    }

    /**
        Drain the codec of buffered frames at end of stream.
    */
    pub fn flush_audio(&mut self, mut callback: impl FnMut(&frame::Audio)) -> Status {
        let Some(ctx) = self.codec_ctx.as_mut() else {
            return Status::Success;
        };

        if let Some(status) = classify_send_error(ctx.send(ptr::null()), false) {
            return status;
        }

        loop {
            let mut frame = frame::Audio::empty();
            let ret = unsafe { ctx.receive(frame.as_mut_ptr()) };
            match classify_receive_error(ret, false) {
                None => {}
                Some(Status::Success) => return Status::Success,
                Some(status) => return status,
            }
            callback(&frame);
        }
    }

    /**
        Convert a decoded audio frame to `format` and push it into `sink`.

        A resampler is created on first use and reused for the rest of the
        stream; frames already in the target format bypass it.
    */
    pub fn write_to_ring_buffer(
        &mut self,
        frame: &frame::Audio,
        sink: &mut dyn AudioSink,
        format: AudioFormat,
    ) -> Result<()> {
        let matches_target = frame.rate() == format.sample_rate
            && frame.channels() == format.channels
            && frame.format() == Sample::I16(sample::Type::Packed);

        let pcm = if matches_target {
            PcmBuffer::from_frame(frame)?
        } else {
            if self.resampler.as_ref().is_some_and(|r| r.target() != format) {
                self.resampler = None;
            }
            let resampler = self
                .resampler
                .get_or_insert_with(|| Resampler::new(format));
            let resampled = resampler.resample(frame)?;
            PcmBuffer::from_frame(&resampled)?
        };

        sink.put(&pcm);
        Ok(())
    }

    /// Decoded picture width, once a video stream is set up.
    pub fn width(&self) -> Option<u32> {
        let ctx = self.codec_ctx.as_ref()?;
        let width = unsafe { (*ctx.as_ptr()).width };
        (width > 0).then_some(width as u32)
    }

    /// Decoded picture height, once a video stream is set up.
    pub fn height(&self) -> Option<u32> {
        let ctx = self.codec_ctx.as_ref()?;
        let height = unsafe { (*ctx.as_ptr()).height };
        (height > 0).then_some(height as u32)
    }

    /// Pixel format of decoded pictures, for formats the engine surfaces.
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        let ctx = self.codec_ctx.as_ref()?;
        let format = unsafe { (*ctx.as_ptr()).pix_fmt } as c_int;
        pixel_format_of(format)
    }

    /// Short name of the opened decoder.
    pub fn decoder_name(&self) -> Option<&str> {
        self.codec_name.as_deref()
    }

    /// Average frame rate of the bound stream, when the demuxer knows it.
    pub fn fps(&self) -> Option<Rational> {
        self.stream.as_ref()?.avg_frame_rate
    }

    /// Time base of the bound stream.
    pub fn time_base(&self) -> Option<Rational> {
        Some(self.stream.as_ref()?.time_base)
    }

    /// Kind of the bound stream.
    pub fn kind(&self) -> Option<MediaKind> {
        self.kind
    }
}

// SAFETY: All FFmpeg objects are owned by this decoder and only accessed
// through &mut self; the raw stream parameter pointer lives inside the
// owned format context.
unsafe impl Send for StreamDecoder {}

/// Packet was accepted when this returns `None`; otherwise the status to
/// report. A failed accelerator turns any submission failure into a restart
/// request; end-of-stream on submit means the packet is consumed with no
/// frame, and everything else (including a full codec queue) loses the
/// packet.
fn classify_send_error(ret: c_int, accel_failed: bool) -> Option<Status> {
    if ret >= 0 {
        None
    } else if accel_failed {
        Some(Status::RestartRequired)
    } else if ret == ffi::AVERROR_EOF {
        Some(Status::Success)
    } else {
        Some(Status::DecodeError)
    }
}

/// `None` means a frame is ready. Would-block and end-of-stream are not
/// errors at this step, just "no frame produced"; end of stream is only
/// ever reported from the read path.
fn classify_receive_error(ret: c_int, accel_failed: bool) -> Option<Status> {
    if ret >= 0 {
        None
    } else if ret == ffi::AVERROR(ffi::EAGAIN) || ret == ffi::AVERROR_EOF {
        Some(Status::Success)
    } else if accel_failed {
        Some(Status::RestartRequired)
    } else {
        Some(Status::DecodeError)
    }
}

/// Half the machine, clamped to [1, 8]. Decoding shares the host with the
/// rest of the application.
fn decode_thread_count() -> usize {
    let cores = thread::available_parallelism().map_or(1, NonZeroUsize::get);
    (cores / 2).clamp(1, 8)
}

/// Map full-range JPEG pixel formats to their limited-range equivalents.
fn normalize_pixel_format(format: c_int) -> c_int {
    use ffi::AVPixelFormat::*;
    if format == AV_PIX_FMT_YUVJ420P as c_int {
        AV_PIX_FMT_YUV420P as c_int
    } else if format == AV_PIX_FMT_YUVJ422P as c_int {
        AV_PIX_FMT_YUV422P as c_int
    } else if format == AV_PIX_FMT_YUVJ440P as c_int {
        AV_PIX_FMT_YUV440P as c_int
    } else if format == AV_PIX_FMT_YUVJ444P as c_int {
        AV_PIX_FMT_YUV444P as c_int
    } else {
        format
    }
}

/// Rewrite deprecated YUVJ formats on a decoded frame, preserving the full
/// color range through the explicit range field instead.
fn normalize_frame_pixel_format(frame: &mut frame::Video) {
    unsafe {
        let raw = frame.as_mut_ptr();
        let normalized = normalize_pixel_format((*raw).format);
        if normalized != (*raw).format {
            (*raw).format = normalized;
            (*raw).color_range = ffi::AVColorRange::AVCOL_RANGE_JPEG;
        }
    }
}

fn pixel_format_of(format: c_int) -> Option<PixelFormat> {
    use ffi::AVPixelFormat::*;
    let format = normalize_pixel_format(format);
    if format == AV_PIX_FMT_YUV420P as c_int {
        Some(PixelFormat::Yuv420p)
    } else if format == AV_PIX_FMT_YUV422P as c_int {
        Some(PixelFormat::Yuv422p)
    } else if format == AV_PIX_FMT_YUV440P as c_int {
        Some(PixelFormat::Yuv440p)
    } else if format == AV_PIX_FMT_YUV444P as c_int {
        Some(PixelFormat::Yuv444p)
    } else if format == AV_PIX_FMT_NV12 as c_int {
        Some(PixelFormat::Nv12)
    } else if format == AV_PIX_FMT_RGB24 as c_int {
        Some(PixelFormat::Rgb24)
    } else if format == AV_PIX_FMT_BGR24 as c_int {
        Some(PixelFormat::Bgr24)
    } else if format == AV_PIX_FMT_RGBA as c_int {
        Some(PixelFormat::Rgba)
    } else if format == AV_PIX_FMT_BGRA as c_int {
        Some(PixelFormat::Bgra)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcm::audio_ring_buffer;
    use ringbuf::traits::Observer;
    use std::io::Write;
    use std::time::{Duration, Instant};

    fn eagain() -> c_int {
        ffi::AVERROR(ffi::EAGAIN)
    }

    fn invalid_data() -> c_int {
        ffi::AVERROR_INVALIDDATA
    }

    fn write_test_wav(rate: u32, samples: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let data_len = (samples * 2) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..samples {
            bytes.extend_from_slice(&((i % 128) as i16).to_le_bytes());
        }
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn write_test_yuv(width: usize, height: usize, frames: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yuv").tempfile().unwrap();
        let frame_len = width * height * 3 / 2;
        for i in 0..frames {
            file.write_all(&vec![(16 + i * 10) as u8; frame_len]).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn raw_video_params(path: &std::path::Path, fps: i32) -> DeviceParams {
        DeviceParams {
            input: path.to_string_lossy().into_owned(),
            format: "rawvideo".into(),
            pixel_format: "yuv420p".into(),
            width: 32,
            height: 32,
            framerate: Some(Rational::new(fps, 1)),
            ..DeviceParams::default()
        }
    }

    fn audio_decoder(path: &std::path::Path, format: AudioFormat) -> StreamDecoder {
        let mut decoder = StreamDecoder::new(DecoderConfig::new()).unwrap();
        decoder
            .open_input(&DeviceParams::from_input(path.to_string_lossy()))
            .unwrap();
        decoder.setup_audio(format).unwrap();
        decoder
    }

    /// An accelerator that already latched its failure flag; transfers
    /// still succeed (the frames are software-backed).
    struct FailedAccel;

    impl Accelerator for FailedAccel {
        fn name(&self) -> &str {
            "failed"
        }
        fn has_failed(&self) -> bool {
            true
        }
        fn extract_data(&mut self, _frame: &mut frame::Video) -> Result<()> {
            Ok(())
        }
    }

    /// An accelerator whose transfers fail outright.
    struct FaultyTransfer;

    impl Accelerator for FaultyTransfer {
        fn name(&self) -> &str {
            "faulty"
        }
        fn has_failed(&self) -> bool {
            false
        }
        fn extract_data(&mut self, _frame: &mut frame::Video) -> Result<()> {
            Err(Error::codec("transfer failed"))
        }
    }

    #[test]
    fn send_error_classification() {
        assert_eq!(classify_send_error(0, false), None);
        assert_eq!(classify_send_error(0, true), None);
        // A full codec queue loses the packet
        assert_eq!(
            classify_send_error(eagain(), false),
            Some(Status::DecodeError)
        );
        // End of stream on submit consumes the packet with no frame
        assert_eq!(
            classify_send_error(ffi::AVERROR_EOF, false),
            Some(Status::Success)
        );
        assert_eq!(
            classify_send_error(invalid_data(), false),
            Some(Status::DecodeError)
        );
        // A failed accelerator wins over every other submission failure
        assert_eq!(
            classify_send_error(eagain(), true),
            Some(Status::RestartRequired)
        );
        assert_eq!(
            classify_send_error(ffi::AVERROR_EOF, true),
            Some(Status::RestartRequired)
        );
        assert_eq!(
            classify_send_error(invalid_data(), true),
            Some(Status::RestartRequired)
        );
    }

    #[test]
    fn receive_error_classification() {
        assert_eq!(classify_receive_error(0, false), None);
        // Would-block and end-of-stream both mean "no frame produced";
        // end of stream is only reported from the read path
        assert_eq!(classify_receive_error(eagain(), false), Some(Status::Success));
        assert_eq!(classify_receive_error(eagain(), true), Some(Status::Success));
        assert_eq!(
            classify_receive_error(ffi::AVERROR_EOF, false),
            Some(Status::Success)
        );
        assert_eq!(
            classify_receive_error(ffi::AVERROR_EOF, true),
            Some(Status::Success)
        );
        assert_eq!(
            classify_receive_error(invalid_data(), false),
            Some(Status::DecodeError)
        );
        assert_eq!(
            classify_receive_error(invalid_data(), true),
            Some(Status::RestartRequired)
        );
    }

    #[test]
    fn pixel_format_normalization_is_idempotent() {
        use ffi::AVPixelFormat::*;
        let pairs = [
            (AV_PIX_FMT_YUVJ420P, AV_PIX_FMT_YUV420P),
            (AV_PIX_FMT_YUVJ422P, AV_PIX_FMT_YUV422P),
            (AV_PIX_FMT_YUVJ440P, AV_PIX_FMT_YUV440P),
            (AV_PIX_FMT_YUVJ444P, AV_PIX_FMT_YUV444P),
        ];
        for (jpeg, plain) in pairs {
            let normalized = normalize_pixel_format(jpeg as c_int);
            assert_eq!(normalized, plain as c_int);
            assert_eq!(normalize_pixel_format(normalized), normalized);
        }
        let nv12 = AV_PIX_FMT_NV12 as c_int;
        assert_eq!(normalize_pixel_format(nv12), nv12);
    }

    #[test]
    fn surfaced_pixel_formats() {
        use ffi::AVPixelFormat::*;
        assert_eq!(
            pixel_format_of(AV_PIX_FMT_YUVJ420P as c_int),
            Some(PixelFormat::Yuv420p)
        );
        assert_eq!(
            pixel_format_of(AV_PIX_FMT_BGRA as c_int),
            Some(PixelFormat::Bgra)
        );
        assert_eq!(pixel_format_of(AV_PIX_FMT_VIDEOTOOLBOX as c_int), None);
    }

    #[test]
    fn thread_count_is_clamped() {
        let count = decode_thread_count();
        assert!((1..=8).contains(&count));
    }

    #[test]
    fn open_nonexistent_input() {
        let mut decoder = StreamDecoder::new(DecoderConfig::new()).unwrap();
        let err = decoder
            .open_input(&DeviceParams::from_input("/no/such/input.mp4"))
            .unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
    }

    #[test]
    fn wav_decodes_every_sample() {
        let total = 8000;
        let file = write_test_wav(8000, total);
        let mut decoder = audio_decoder(file.path(), AudioFormat::new(8000, 1));
        assert_eq!(decoder.decoder_name(), Some("pcm_s16le"));

        let mut decoded = 0usize;
        let mut saw_frame = false;
        loop {
            match decoder.decode_audio(|frame| {
                decoded += frame.samples();
            }) {
                Status::FrameFinished => saw_frame = true,
                Status::Success => {}
                Status::Eof => break,
                status => panic!("unexpected status {status:?}"),
            }
        }
        assert!(saw_frame);
        assert_eq!(decoded, total);
        assert_eq!(decoder.flush_audio(|_| {}), Status::Success);
    }

    #[test]
    fn missing_video_stream() {
        let file = write_test_wav(8000, 100);
        let mut decoder = StreamDecoder::new(DecoderConfig::new()).unwrap();
        decoder
            .open_input(&DeviceParams::from_input(file.path().to_string_lossy()))
            .unwrap();
        let err = decoder.setup_video().unwrap_err();
        assert!(matches!(
            err,
            Error::StreamNotFound {
                kind: MediaKind::Video
            }
        ));
        // Failed setup leaves no codec bound
        assert_eq!(decoder.decoder_name(), None);
        assert_eq!(decoder.width(), None);
    }

    #[test]
    fn setup_can_be_repeated() {
        let file = write_test_wav(8000, 400);
        let mut decoder = audio_decoder(file.path(), AudioFormat::new(8000, 1));
        decoder.setup_audio(AudioFormat::new(8000, 1)).unwrap();
        assert_eq!(decoder.decoder_name(), Some("pcm_s16le"));
    }

    #[test]
    fn raw_video_decodes_with_accessors() {
        let file = write_test_yuv(32, 32, 3);
        let mut decoder = StreamDecoder::new(DecoderConfig::new()).unwrap();
        decoder.open_input(&raw_video_params(file.path(), 25)).unwrap();
        decoder.setup_video().unwrap();

        assert_eq!(decoder.width(), Some(32));
        assert_eq!(decoder.height(), Some(32));
        assert_eq!(decoder.pixel_format(), Some(PixelFormat::Yuv420p));
        assert_eq!(decoder.fps(), Some(Rational::new(25, 1)));
        assert!(decoder.time_base().is_some());

        let mut frames = 0usize;
        loop {
            match decoder.decode_video(|frame| {
                assert_eq!(frame.width(), 32);
                frames += 1;
            }) {
                Status::FrameFinished | Status::Success => {}
                Status::Eof => break,
                status => panic!("unexpected status {status:?}"),
            }
        }
        assert_eq!(frames, 3);
        // An already-flushed codec reports end of stream on the flush
        // submit, which is a clean drain, not a decode error
        assert_eq!(decoder.flush_video(|_| {}), Status::Success);
        assert_eq!(decoder.flush_video(|_| {}), Status::Success);
    }

    #[test]
    fn failed_accel_requests_restart_even_when_transfer_succeeds() {
        let file = write_test_yuv(32, 32, 2);
        let mut decoder = StreamDecoder::new(DecoderConfig::new()).unwrap();
        decoder.open_input(&raw_video_params(file.path(), 25)).unwrap();
        decoder.setup_video().unwrap();
        decoder.set_accel(Some(Box::new(FailedAccel)));

        let mut status = Status::Success;
        for _ in 0..16 {
            status = decoder.decode_video(|_| panic!("frame delivered after accel failure"));
            if status != Status::Success {
                break;
            }
        }
        assert_eq!(status, Status::RestartRequired);
    }

    #[test]
    fn failed_transfer_requests_restart() {
        let file = write_test_yuv(32, 32, 2);
        let mut decoder = StreamDecoder::new(DecoderConfig::new()).unwrap();
        decoder.open_input(&raw_video_params(file.path(), 25)).unwrap();
        decoder.setup_video().unwrap();
        decoder.set_accel(Some(Box::new(FaultyTransfer)));

        let mut status = Status::Success;
        for _ in 0..16 {
            status = decoder.decode_video(|_| {});
            if status != Status::Success {
                break;
            }
        }
        assert_eq!(status, Status::RestartRequired);
    }

    #[test]
    fn rate_emulation_paces_file_playback() {
        let file = write_test_yuv(32, 32, 3);
        let config = DecoderConfig {
            rate_emulation: true,
            ..DecoderConfig::new()
        };
        let mut decoder = StreamDecoder::new(config).unwrap();
        decoder.open_input(&raw_video_params(file.path(), 25)).unwrap();
        decoder.setup_video().unwrap();

        let before = Instant::now();
        loop {
            match decoder.decode_video(|_| {}) {
                Status::Eof => break,
                Status::FrameFinished | Status::Success => {}
                status => panic!("unexpected status {status:?}"),
            }
        }
        // Third frame is due 80ms after playback start at 25 fps
        assert!(before.elapsed() >= Duration::from_millis(70));
    }

    #[test]
    fn decoding_without_rate_emulation_is_unpaced() {
        let file = write_test_yuv(32, 32, 3);
        let mut decoder = StreamDecoder::new(DecoderConfig::new()).unwrap();
        decoder.open_input(&raw_video_params(file.path(), 25)).unwrap();
        decoder.setup_video().unwrap();

        let before = Instant::now();
        loop {
            match decoder.decode_video(|_| {}) {
                Status::Eof => break,
                Status::FrameFinished | Status::Success => {}
                status => panic!("unexpected status {status:?}"),
            }
        }
        assert!(before.elapsed() < Duration::from_millis(60));
    }

    #[test]
    fn ring_buffer_write_resamples_to_target() {
        let file = write_test_wav(8000, 1600);
        let mut decoder = audio_decoder(file.path(), AudioFormat::new(8000, 1));
        let target = AudioFormat::new(16_000, 2);
        let (mut sink, consumer) = audio_ring_buffer(1 << 16);

        let mut frames = Vec::new();
        loop {
            match decoder.decode_audio(|frame| {
                frames.push(frame.clone());
            }) {
                Status::Eof => break,
                Status::FrameFinished | Status::Success => {}
                status => panic!("unexpected status {status:?}"),
            }
        }
        for frame in &frames {
            decoder.write_to_ring_buffer(frame, &mut sink, target).unwrap();
        }

        // 1600 samples at 8k mono is 200ms, which is ~3200 samples at 16k,
        // interleaved over two channels; the resampler may hold back a few.
        let expected = 1600 * 2 * 2;
        let occupied = consumer.occupied_len();
        assert!(occupied > expected * 8 / 10 && occupied <= expected);
    }
}
