/*!
    Demuxer input handling.

    Wraps an `AVFormatContext` with the option plumbing that capture devices
    and network sources need: a format hint, an options dictionary built from
    [`DeviceParams`], an interrupt callback for unblocking network reads, and
    custom IO for SDP-over-memory setups.
*/

use std::ffi::{c_char, c_int, c_void, CString};
use std::ptr;

use ffmpeg_next::{codec, ffi, packet::Mut as _, Packet};
use log::warn;

use media_types::{DeviceParams, Error, MediaKind, Rational, Result};

/// Jitter buffer sizing for RTP inputs.
const REORDER_QUEUE_SIZE: &str = "1500";
const MAX_DELAY_US: &str = "50000";

/// Demuxers guess badly on short probes; give them plenty of stream to look at.
const MAX_ANALYZE_DURATION_SECS: i64 = 30;

type InterruptFn = Box<dyn Fn() -> bool + Send>;

/**
    Outcome of a single packet read from the demuxer.
*/
#[derive(Debug)]
pub enum Read {
    /// A packet was read into the caller's buffer
    Packet,
    /// No packet available right now, try again
    Again,
    /// End of stream reached
    Eof,
    /// The demuxer reported an error
    Failed(String),
}

/**
    A demuxer input source.

    Created empty, then opened against a [`DeviceParams`] description. The
    underlying format context survives a failed open so the source can be
    retried with different parameters.
*/
pub struct InputSource {
    ctx: *mut ffi::AVFormatContext,
    interrupt: Option<Box<InterruptFn>>,
    opened: bool,
}

/**
    A stream picked out of an opened input, with everything the decoder
    needs to configure a codec context for it.
*/
pub(crate) struct SelectedStream {
    pub index: usize,
    pub time_base: Rational,
    pub avg_frame_rate: Option<Rational>,
    pub start_time: i64,
    pub codec_id: codec::Id,
    pub params: *mut ffi::AVCodecParameters,
}

impl InputSource {
    /**
        Create a new, unopened input source.
    */
    pub fn new() -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::open(format!("ffmpeg init failed: {e}")))?;

        let ctx = unsafe { ffi::avformat_alloc_context() };
        if ctx.is_null() {
            return Err(Error::open("could not allocate format context"));
        }

        Ok(Self {
            ctx,
            interrupt: None,
            opened: false,
        })
    }

    /**
        Install an interrupt callback.

        The demuxer polls the callback during blocking operations (open,
        packet reads); returning `true` aborts the operation. Used to bound
        how long a stalled network source can hold the decode thread.
    */
    pub fn set_interrupt(&mut self, callback: impl Fn() -> bool + Send + 'static) {
        self.interrupt = Some(Box::new(Box::new(callback)));
        self.install_interrupt();
    }

    /**
        Attach a custom IO context, for inputs whose bytes come from memory
        rather than a URL (e.g. SDP session descriptions).

        # Safety

        `io` must be a valid `AVIOContext` that outlives this source, and
        must not be attached to any other format context.
    */
    pub unsafe fn set_io_context(&mut self, io: *mut ffi::AVIOContext) {
        unsafe {
            (*self.ctx).pb = io;
            (*self.ctx).flags |= ffi::AVFMT_FLAG_CUSTOM_IO as i32;
        }
    }

    /**
        Open the input described by `params`.

        A missing format hint is logged and ignored, falling back to content
        probing. On failure the format context is reallocated so the source
        remains usable.
    */
    pub fn open(&mut self, params: &DeviceParams) -> Result<()> {
        let mut input_format: *const ffi::AVInputFormat = ptr::null();
        if !params.format.is_empty() {
            let name = cstring(&params.format)?;
            input_format = unsafe { ffi::av_find_input_format(name.as_ptr()) };
            if input_format.is_null() {
                warn!("cannot find format \"{}\"", params.format);
            }
        }

        let mut options: *mut ffi::AVDictionary = ptr::null_mut();
        for (key, value) in device_options(params) {
            let key = cstring(&key)?;
            let value = cstring(&value)?;
            unsafe {
                ffi::av_dict_set(&mut options, key.as_ptr(), value.as_ptr(), 0);
            }
        }

        let url = cstring(&params.input)?;
        let ret = unsafe {
            ffi::avformat_open_input(&mut self.ctx, url.as_ptr(), input_format, &mut options)
        };
        unsafe {
            ffi::av_dict_free(&mut options);
        }

        if ret < 0 {
            // avformat_open_input frees and nulls the context on failure;
            // reallocate so the source can be retried.
            self.ctx = unsafe { ffi::avformat_alloc_context() };
            if self.ctx.is_null() {
                return Err(Error::open("could not allocate format context"));
            }
            self.install_interrupt();
            return Err(Error::open(format!(
                "could not open input \"{}\": {}",
                params.input,
                av_error_string(ret)
            )));
        }

        self.opened = true;
        Ok(())
    }

    /**
        Probe the opened input for stream information.
    */
    pub fn probe(&mut self) -> Result<()> {
        let ret = unsafe {
            (*self.ctx).max_analyze_duration = MAX_ANALYZE_DURATION_SECS * ffi::AV_TIME_BASE as i64;
            ffi::avformat_find_stream_info(self.ctx, ptr::null_mut())
        };
        if ret < 0 {
            // Some demuxers report a bare -1 here, which renders as an
            // unrelated errno; substitute the generic invalid-data code.
            let code = if ret == -1 { ffi::AVERROR_INVALIDDATA } else { ret };
            return Err(Error::open(format!(
                "could not find stream info: {}",
                av_error_string(code)
            )));
        }
        Ok(())
    }

    /**
        Find the first stream of the given kind.
    */
    pub(crate) fn select_stream(&self, kind: MediaKind) -> Option<SelectedStream> {
        let wanted = match kind {
            MediaKind::Audio => ffi::AVMediaType::AVMEDIA_TYPE_AUDIO,
            MediaKind::Video => ffi::AVMediaType::AVMEDIA_TYPE_VIDEO,
        };

        unsafe {
            let nb_streams = (*self.ctx).nb_streams as usize;
            for index in 0..nb_streams {
                let stream = *(*self.ctx).streams.add(index);
                let params = (*stream).codecpar;
                if params.is_null() || (*params).codec_type != wanted {
                    continue;
                }

                let start_time = if (*stream).start_time == ffi::AV_NOPTS_VALUE {
                    0
                } else {
                    (*stream).start_time
                };

                return Some(SelectedStream {
                    index,
                    time_base: rational_of((*stream).time_base)
                        .unwrap_or(Rational::new(1, 1_000_000)),
                    avg_frame_rate: rational_of((*stream).avg_frame_rate),
                    start_time,
                    codec_id: codec::Id::from((*params).codec_id),
                    params,
                });
            }
        }

        None
    }

    /**
        Read the next packet from the demuxer into `packet`.
    */
    pub fn read_packet(&mut self, packet: &mut Packet) -> Read {
        let ret = unsafe { ffi::av_read_frame(self.ctx, packet.as_mut_ptr()) };
        if ret >= 0 {
            Read::Packet
        } else if ret == ffi::AVERROR(ffi::EAGAIN) {
            Read::Again
        } else if ret == ffi::AVERROR_EOF {
            Read::Eof
        } else {
            Read::Failed(av_error_string(ret))
        }
    }

    fn install_interrupt(&mut self) {
        if let Some(callback) = &self.interrupt {
            unsafe {
                (*self.ctx).interrupt_callback = ffi::AVIOInterruptCB {
                    callback: Some(interrupt_trampoline),
                    opaque: &**callback as *const InterruptFn as *mut c_void,
                };
            }
        }
    }
}

impl Drop for InputSource {
    fn drop(&mut self) {
        unsafe {
            if self.opened {
                ffi::avformat_close_input(&mut self.ctx);
            } else if !self.ctx.is_null() {
                ffi::avformat_free_context(self.ctx);
            }
        }
    }
}

// SAFETY: The format context is only touched through &mut self, and the
// interrupt callback is required to be Send.
unsafe impl Send for InputSource {}

unsafe extern "C" fn interrupt_trampoline(opaque: *mut c_void) -> c_int {
    let callback = unsafe { &*(opaque as *const InterruptFn) };
    c_int::from(callback())
}

/**
    Build the demuxer options dictionary for a device description.

    Options a demuxer does not understand are ignored by FFmpeg, so the full
    set is always supplied. RTP jitter buffering is sized for lossy networks:
    a deep reorder queue with a short maximum delay.
*/
pub(crate) fn device_options(params: &DeviceParams) -> Vec<(String, String)> {
    let mut options = Vec::new();

    if params.width > 0 && params.height > 0 {
        options.push((
            "video_size".into(),
            format!("{}x{}", params.width, params.height),
        ));
    }

    // The dshow demuxer rejects framerate options that v4l2 accepts.
    #[cfg(not(windows))]
    if let Some(rate) = params.framerate {
        options.push(("framerate".into(), format!("{}/{}", rate.num, rate.den)));
    }

    if params.offset_x != 0 || params.offset_y != 0 {
        options.push(("offset_x".into(), params.offset_x.to_string()));
        options.push(("offset_y".into(), params.offset_y.to_string()));
    }

    if params.channel != 0 {
        options.push(("channel".into(), params.channel.to_string()));
    }

    if !params.loop_mode.is_empty() {
        options.push(("loop".into(), params.loop_mode.clone()));
    }

    if !params.sdp_flags.is_empty() {
        options.push(("sdp_flags".into(), params.sdp_flags.clone()));
    }

    options.push(("reorder_queue_size".into(), REORDER_QUEUE_SIZE.into()));
    options.push(("max_delay".into(), MAX_DELAY_US.into()));

    if !params.pixel_format.is_empty() {
        options.push(("pixel_format".into(), params.pixel_format.clone()));
    }

    options
}

/**
    Render an AV error code as a human-readable string.

    May return an empty string when the code has no registered message.
*/
pub(crate) fn av_error_string(code: c_int) -> String {
    let mut buf = [0u8; 64];
    let ret = unsafe { ffi::av_strerror(code, buf.as_mut_ptr() as *mut c_char, buf.len()) };
    if ret < 0 {
        return format!("error code {code}");
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn rational_of(r: ffi::AVRational) -> Option<Rational> {
    if r.den == 0 {
        None
    } else {
        Some(Rational::new(r.num, r.den))
    }
}

fn cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| Error::open(format!("invalid option string: {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_wav(samples: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let data_len = (samples * 2) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&8000u32.to_le_bytes());
        bytes.extend_from_slice(&16000u32.to_le_bytes()); // byte rate
        bytes.extend_from_slice(&2u16.to_le_bytes()); // block align
        bytes.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..samples {
            bytes.extend_from_slice(&((i % 100) as i16).to_le_bytes());
        }
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn options_for_empty_params() {
        let options = device_options(&DeviceParams::default());
        let keys: Vec<&str> = options.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["reorder_queue_size", "max_delay"]);
        assert_eq!(options[0].1, "1500");
        assert_eq!(options[1].1, "50000");
    }

    #[test]
    fn options_for_capture_device() {
        let params = DeviceParams {
            input: "/dev/video0".into(),
            format: "v4l2".into(),
            width: 640,
            height: 480,
            framerate: Some(Rational::new(30, 1)),
            offset_x: 10,
            offset_y: 0,
            channel: 2,
            ..DeviceParams::default()
        };
        let options = device_options(&params);
        let get = |key: &str| {
            options
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("video_size"), Some("640x480"));
        assert_eq!(get("framerate"), Some("30/1"));
        assert_eq!(get("offset_x"), Some("10"));
        assert_eq!(get("offset_y"), Some("0"));
        assert_eq!(get("channel"), Some("2"));
        assert_eq!(get("loop"), None);
    }

    #[test]
    fn options_skip_partial_geometry() {
        let params = DeviceParams {
            width: 640,
            height: 0,
            ..DeviceParams::default()
        };
        let options = device_options(&params);
        assert!(!options.iter().any(|(k, _)| k == "video_size"));
    }

    #[test]
    fn open_nonexistent_input_fails() {
        let mut source = InputSource::new().unwrap();
        let params = DeviceParams::from_input("/definitely/not/a/real/file.mkv");
        let err = source.open(&params).unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
    }

    #[test]
    fn open_succeeds_on_wav() {
        let file = write_test_wav(8000);
        let mut source = InputSource::new().unwrap();
        let params = DeviceParams::from_input(file.path().to_string_lossy());
        source.open(&params).unwrap();
        source.probe().unwrap();
        let stream = source.select_stream(MediaKind::Audio).unwrap();
        assert_eq!(stream.index, 0);
        assert!(source.select_stream(MediaKind::Video).is_none());
    }

    #[test]
    fn interrupt_aborts_open() {
        let file = write_test_wav(100);
        let mut source = InputSource::new().unwrap();
        source.set_interrupt(|| true);
        let params = DeviceParams::from_input(file.path().to_string_lossy());
        assert!(source.open(&params).is_err());
    }

    #[test]
    fn source_reusable_after_failed_open() {
        let file = write_test_wav(100);
        let mut source = InputSource::new().unwrap();
        let bad = DeviceParams::from_input("/definitely/not/a/real/file.wav");
        assert!(source.open(&bad).is_err());
        let good = DeviceParams::from_input(file.path().to_string_lossy());
        source.open(&good).unwrap();
    }

    #[test]
    fn error_string_rendering() {
        let msg = av_error_string(ffi::AVERROR_EOF);
        assert!(!msg.is_empty());
    }
}
