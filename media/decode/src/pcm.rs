/*!
    Audio post-processing.

    Decoded audio frames are converted to signed 16-bit PCM, resampled to
    the consumer's format when needed, and pushed into a lock-free ring
    buffer for the playout side to drain.
*/

use ffmpeg_next::format::{sample, Sample};
use ffmpeg_next::software::resampling;
use ffmpeg_next::{frame, ChannelLayout};
use log::debug;
use ringbuf::traits::{Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use media_types::{AudioFormat, Error, Result};

/**
    A block of decoded PCM audio, stored per channel.
*/
#[derive(Clone, Debug, Default)]
pub struct PcmBuffer {
    sample_rate: u32,
    channels: Vec<Vec<i16>>,
}

impl PcmBuffer {
    /**
        Convert a decoded audio frame into PCM.

        Handles packed and planar 16-bit integer and 32-bit float input.
        Other sample formats are rejected as unsupported.
    */
    pub fn from_frame(frame: &frame::Audio) -> Result<Self> {
        let samples = frame.samples();
        let channel_count = usize::from(frame.channels());
        let mut channels = vec![Vec::with_capacity(samples); channel_count];

        match frame.format() {
            Sample::I16(sample::Type::Packed) => {
                let data = bytes_to_i16(frame.data(0), samples * channel_count);
                for (i, &value) in data.iter().enumerate() {
                    channels[i % channel_count].push(value);
                }
            }
            Sample::I16(sample::Type::Planar) => {
                for (ch, channel) in channels.iter_mut().enumerate() {
                    channel.extend(bytes_to_i16(frame.data(ch), samples));
                }
            }
            Sample::F32(sample::Type::Packed) => {
                let data = bytes_to_f32(frame.data(0), samples * channel_count);
                for (i, value) in data.enumerate() {
                    channels[i % channel_count].push(f32_to_i16(value));
                }
            }
            Sample::F32(sample::Type::Planar) => {
                for (ch, channel) in channels.iter_mut().enumerate() {
                    channel.extend(bytes_to_f32(frame.data(ch), samples).map(f32_to_i16));
                }
            }
            other => {
                return Err(Error::unsupported_format(format!(
                    "audio sample format {other:?}"
                )));
            }
        }

        Ok(Self {
            sample_rate: frame.rate(),
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn samples(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, index: usize) -> Option<&[i16]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /**
        Interleave all channels into a single sample vector.
    */
    pub fn interleaved(&self) -> Vec<i16> {
        let samples = self.samples();
        let mut out = Vec::with_capacity(samples * self.channels.len());
        for i in 0..samples {
            for channel in &self.channels {
                out.push(channel[i]);
            }
        }
        out
    }
}

/**
    Destination for decoded PCM audio.
*/
pub trait AudioSink {
    fn put(&mut self, buffer: &PcmBuffer);
}

/**
    An [`AudioSink`] that interleaves samples into a lock-free ring buffer.

    Samples that do not fit are dropped; the playout side is expected to
    drain the buffer faster than the decoder fills it.
*/
pub struct RingBufferSink {
    producer: HeapProd<i16>,
}

impl AudioSink for RingBufferSink {
    fn put(&mut self, buffer: &PcmBuffer) {
        let samples = buffer.interleaved();
        let pushed = self.producer.push_slice(&samples);
        if pushed < samples.len() {
            debug!(
                "audio ring buffer full, dropped {} samples",
                samples.len() - pushed
            );
        }
    }
}

impl RingBufferSink {
    /// Interleaved samples currently buffered.
    pub fn occupied(&self) -> usize {
        self.producer.occupied_len()
    }
}

/**
    Create a ring buffer of `capacity` interleaved samples, returning the
    decode-side sink and the playout-side consumer.
*/
pub fn audio_ring_buffer(capacity: usize) -> (RingBufferSink, HeapCons<i16>) {
    let (producer, consumer) = HeapRb::new(capacity).split();
    (RingBufferSink { producer }, consumer)
}

/**
    Lazily-initialized audio resampler.

    The conversion context is built from the first frame and rebuilt if the
    input format changes mid-stream. Output is always packed 16-bit PCM in
    the target format.
*/
pub(crate) struct Resampler {
    ctx: Option<resampling::Context>,
    input_key: (Sample, u32, u16),
    target: AudioFormat,
}

impl Resampler {
    pub fn target(&self) -> AudioFormat {
        self.target
    }

    pub fn new(target: AudioFormat) -> Self {
        Self {
            ctx: None,
            input_key: (Sample::None, 0, 0),
            target,
        }
    }

    /**
        Resample a frame to the target format.
    */
    pub fn resample(&mut self, input: &frame::Audio) -> Result<frame::Audio> {
        let key = (input.format(), input.rate(), input.channels());
        if self.ctx.is_none() || self.input_key != key {
            let ctx = resampling::Context::get(
                input.format(),
                input.channel_layout(),
                input.rate(),
                Sample::I16(sample::Type::Packed),
                layout_for(self.target.channels),
                self.target.sample_rate,
            )
            .map_err(|e| Error::unsupported_format(format!("resampler setup failed: {e}")))?;
            self.ctx = Some(ctx);
            self.input_key = key;
        }

        let estimated = (input.samples() as u64 * u64::from(self.target.sample_rate))
            .div_ceil(u64::from(input.rate().max(1))) as usize
            + 32;
        let mut output = frame::Audio::new(
            Sample::I16(sample::Type::Packed),
            estimated,
            layout_for(self.target.channels),
        );
        output.set_rate(self.target.sample_rate);

        if let Some(ctx) = self.ctx.as_mut() {
            ctx.run(input, &mut output)
                .map_err(|e| Error::codec(format!("resampling failed: {e}")))?;
        }

        Ok(output)
    }
}

fn layout_for(channels: u16) -> ChannelLayout {
    match channels {
        1 => ChannelLayout::MONO,
        _ => ChannelLayout::STEREO,
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

fn bytes_to_i16(data: &[u8], count: usize) -> Vec<i16> {
    data[..count * 2]
        .chunks_exact(2)
        .map(|b| i16::from_ne_bytes([b[0], b[1]]))
        .collect()
}

fn bytes_to_f32(data: &[u8], count: usize) -> impl Iterator<Item = f32> + '_ {
    data[..count * 4]
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
}
