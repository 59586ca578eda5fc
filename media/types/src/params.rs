/*!
    Input source description.
*/

use static_assertions::assert_impl_all;

use crate::Rational;

/**
    Describes how to open a media source.

    The `input` field is a path or URI understood by the demuxer. The `format`
    field is an optional short name hint for the input format (e.g. `"v4l2"`,
    `"rawvideo"`, `"sdp"`); when empty, the demuxer probes the format from the
    content.

    Geometry, frame rate, and capture fields only apply to sources that accept
    them (capture devices, raw video); the demuxer ignores options it does not
    understand.
*/
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceParams {
    /// Path or URI of the input
    pub input: String,
    /// Input format short name hint, empty to autodetect
    pub format: String,
    /// Pixel format name for raw inputs, empty when not applicable
    pub pixel_format: String,
    /// Requested capture width in pixels, 0 when unspecified
    pub width: u32,
    /// Requested capture height in pixels, 0 when unspecified
    pub height: u32,
    /// Horizontal capture offset in pixels
    pub offset_x: i32,
    /// Vertical capture offset in pixels
    pub offset_y: i32,
    /// Requested frame rate, `None` when unspecified
    pub framerate: Option<Rational>,
    /// Capture channel (e.g. TV tuner input), 0 when unspecified
    pub channel: u32,
    /// Loop behavior option passed through to the demuxer, empty when unset
    pub loop_mode: String,
    /// SDP demuxer flags, empty when unset
    pub sdp_flags: String,
}

impl DeviceParams {
    /**
        Create parameters for a plain file or URI input with format
        autodetection.
    */
    pub fn from_input(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }
}

assert_impl_all!(DeviceParams: Send, Sync);
