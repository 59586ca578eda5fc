/*!
    Stream decoding for the media crate ecosystem.

    This crate opens a demuxed media source, selects one elementary stream,
    and turns its encoded packets into raw frames. It handles demuxer setup,
    codec resolution, hardware acceleration with software fallback, playback
    rate emulation for file sources, and audio post-processing into a ring
    buffer.

    # Example

    ```ignore
    use media_decode::{DecoderConfig, Status, StreamDecoder};
    use media_types::DeviceParams;

    // Open an input and bind to its video stream
    let mut decoder = StreamDecoder::new(DecoderConfig::with_hw_accel())?;
    decoder.open_input(&DeviceParams::from_input("video.mp4"))?;
    decoder.setup_video()?;

    // Pull decoded frames until end of stream
    loop {
        match decoder.decode_video(|frame| {
            // Process frame
        }) {
            Status::Success | Status::FrameFinished => continue,
            Status::Eof => break,
            Status::RestartRequired => {
                // Recreate the decoder with hardware acceleration disabled
                break;
            }
            status => {
                log::warn!("decode error: {status:?}");
                continue;
            }
        }
    }
    ```

    # Hardware Acceleration

    Hardware decoding is opt-in and degrades gracefully: if a hardware frame
    cannot be transferred back to system memory, the decoder reports
    [`Status::RestartRequired`] and the caller rebuilds it with
    [`AccelPolicy::Disabled`] to continue in software.
*/

pub use media_types::{
    AudioFormat, DeviceParams, Error, MediaKind, PixelFormat, Pts, Rational, Result,
};

mod config;
mod decoder;
mod hw;
mod input;
mod pace;
mod pcm;

pub use config::{AccelPolicy, CodecHandle, DecoderConfig, DecoderFinder, HwDevice};
pub use decoder::{Status, StreamDecoder};
pub use hw::{Accelerator, HardwareAccel};
pub use input::{InputSource, Read};
pub use pcm::{audio_ring_buffer, AudioSink, PcmBuffer, RingBufferSink};
