/*!
    Shared types for the media decode crate ecosystem.

    This crate defines the vocabulary of the ecosystem — the types that cross
    crate boundaries. It has no dependency on FFmpeg, making it lightweight and
    enabling consumers to depend on it without pulling in FFmpeg bindings.

    # Core Types

    - [`Rational`] - Rational numbers for time bases and frame rates
    - [`Pts`] - Presentation timestamps in time_base units
    - [`AudioFormat`] - Target sample rate and channel count for audio output
    - [`PixelFormat`] - Video pixel formats surfaced to consumers
    - [`MediaKind`] - Audio or video elementary-stream kind

    # Input Description

    - [`DeviceParams`] - How to open a media source (path/URI, format hint,
      geometry, frame rate, capture options)

    # Error Handling

    - [`Error`] and [`Result`] - Common error types
*/

mod error;
mod format;
mod params;
mod time;

pub use error::{Error, Result};
pub use format::{AudioFormat, MediaKind, PixelFormat};
pub use params::DeviceParams;
pub use time::{Pts, Rational};
