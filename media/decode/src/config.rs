/*!
    Decoder configuration types.
*/

use std::ffi::CStr;
use std::fmt;
use std::sync::Arc;

use ffmpeg_next::{codec, ffi};

/**
    Hardware device type for hardware-accelerated decoding.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum HwDevice {
    /// VideoToolbox (macOS)
    VideoToolbox,
    /// VAAPI (Linux - AMD, Intel)
    Vaapi,
    /// CUDA/NVDEC (NVIDIA)
    Cuda,
    /// Quick Sync Video (Intel)
    Qsv,
}

/**
    Hardware acceleration policy for a decoder.

    `Disabled` is sticky for the lifetime of a decoder: callers set it when a
    previous decoder reported that hardware decoding failed mid-stream, so the
    replacement stays on the software path.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccelPolicy {
    /// Never attach hardware acceleration (prior failure)
    Disabled,
    /// Software decoding by caller preference
    #[default]
    Software,
    /// Try hardware acceleration, fall back to software if unavailable
    Hardware,
}

/**
    A resolved decoder implementation.

    Wraps the codec descriptor that `avcodec_open2` will be called with.
*/
#[derive(Clone, Copy)]
pub struct CodecHandle(*const ffi::AVCodec);

impl CodecHandle {
    /**
        Look up the default decoder for a codec id.
    */
    pub fn by_id(id: codec::Id) -> Option<Self> {
        let ptr = unsafe { ffi::avcodec_find_decoder(id.into()) };
        if ptr.is_null() {
            None
        } else {
            Some(Self(ptr))
        }
    }

    /**
        Look up a decoder by its registered name.
    */
    pub fn by_name(name: &CStr) -> Option<Self> {
        let ptr = unsafe { ffi::avcodec_find_decoder_by_name(name.as_ptr()) };
        if ptr.is_null() {
            None
        } else {
            Some(Self(ptr))
        }
    }

    /**
        The registered short name of this decoder.
    */
    pub fn name(&self) -> String {
        unsafe {
            let name = (*self.0).name;
            if name.is_null() {
                String::new()
            } else {
                CStr::from_ptr(name).to_string_lossy().into_owned()
            }
        }
    }

    pub(crate) fn as_ptr(&self) -> *const ffi::AVCodec {
        self.0
    }
}

impl fmt::Debug for CodecHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CodecHandle").field(&self.name()).finish()
    }
}

// SAFETY: AVCodec descriptors are static, immutable tables registered by
// libavcodec at load time.
unsafe impl Send for CodecHandle {}
unsafe impl Sync for CodecHandle {}

/**
    Hook for overriding decoder resolution.

    When set on a [`DecoderConfig`], the finder is consulted before the
    default lookup; returning `None` falls through to the codec id's default
    decoder. Used to select alternative implementations such as `libdav1d`
    over the built-in AV1 decoder.
*/
pub trait DecoderFinder: Send + Sync {
    fn find_decoder(&self, id: codec::Id) -> Option<CodecHandle>;
}

/**
    Configuration for a stream decoder.
*/
#[derive(Clone, Default)]
pub struct DecoderConfig {
    /// Hardware acceleration policy.
    pub accel: AccelPolicy,
    /// Specific hardware device to use (None = auto-detect).
    pub hw_device: Option<HwDevice>,
    /// Pace file playback at the stream's presentation rate.
    pub rate_emulation: bool,
    /// Optional decoder resolution override.
    pub finder: Option<Arc<dyn DecoderFinder>>,
}

impl DecoderConfig {
    /**
        Create a new config with default settings (software decoding).
    */
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Create a config that prefers hardware acceleration.
    */
    pub fn with_hw_accel() -> Self {
        Self {
            accel: AccelPolicy::Hardware,
            ..Self::default()
        }
    }

    /**
        Create a config with a specific hardware device.
    */
    pub fn with_hw_device(device: HwDevice) -> Self {
        Self {
            accel: AccelPolicy::Hardware,
            hw_device: Some(device),
            ..Self::default()
        }
    }
}

impl fmt::Debug for DecoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderConfig")
            .field("accel", &self.accel)
            .field("hw_device", &self.hw_device)
            .field("rate_emulation", &self.rate_emulation)
            .field("finder", &self.finder.as_ref().map(|_| ".."))
            .finish()
    }
}
