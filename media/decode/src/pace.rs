/*!
    Playback rate emulation.

    File sources demux as fast as the disk allows; when a consumer wants
    frames at presentation speed (e.g. piping a file into a call), the
    decoder sleeps each frame until its presentation time relative to the
    moment decoding started.
*/

use std::thread;
use std::time::{Duration, Instant};

use media_types::{Pts, Rational};

/**
    Paces decoded frames at their stream presentation rate.

    Inactive until [`start`](Self::start) is called; an inactive emulator
    never sleeps.
*/
#[derive(Debug, Default)]
pub(crate) struct RateEmulator {
    origin: Option<Instant>,
}

impl RateEmulator {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Mark the current instant as the playback origin.

        Called when the decoder binds to a stream, so the first frame is due
        immediately.
    */
    pub fn start(&mut self) {
        self.origin = Some(Instant::now());
    }

    pub fn is_active(&self) -> bool {
        self.origin.is_some()
    }

    /**
        Block until the frame with the given PTS is due.

        Frames without a timestamp, or timestamped before the stream start,
        are passed through without delay.
    */
    pub fn pace(&self, pts: Option<i64>, stream_start: i64, time_base: Rational) {
        let Some(origin) = self.origin else {
            return;
        };
        let Some(offset) = presentation_offset(pts, stream_start, time_base) else {
            return;
        };

        let due = origin + offset;
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
    }
}

/**
    Presentation offset of a frame relative to the stream start.
*/
fn presentation_offset(
    pts: Option<i64>,
    stream_start: i64,
    time_base: Rational,
) -> Option<Duration> {
    Pts(pts?).offset_from(stream_start, time_base)
}
