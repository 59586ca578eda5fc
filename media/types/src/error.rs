/*!
    Error types for the media decode crate ecosystem.
*/

use std::fmt;

use crate::MediaKind;

/**
    Error type for the media decode crate ecosystem.

    Variants follow the failure taxonomy of the decode engine: configuration
    errors are fatal to the setup call that produced them, codec errors leave
    the decoder open but lose the offending packet, and end-of-stream is part
    of control flow rather than a real error.
*/
#[derive(Debug)]
pub enum Error {
    /// I/O error (file not found, network error, etc.)
    Io(std::io::Error),
    /// Demuxer error (input could not be opened or probed)
    Open { message: String },
    /// Codec error (decoder resolution, open, or decode failure)
    Codec { message: String },
    /// No stream of the requested kind exists in the input
    StreamNotFound { kind: MediaKind },
    /// Unsupported format (valid but not handled)
    UnsupportedFormat { message: String },
    /// End of stream (not really an error, but part of control flow)
    Eof,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Open { message } => write!(f, "open error: {message}"),
            Self::Codec { message } => write!(f, "codec error: {message}"),
            Self::StreamNotFound { kind } => write!(f, "no {kind} stream found"),
            Self::UnsupportedFormat { message } => write!(f, "unsupported format: {message}"),
            Self::Eof => write!(f, "end of stream"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl Error {
    /**
        Create an open error with the given message.

        The message may embed a rendered AV error string, which can be empty
        when the underlying error code cannot be rendered.
    */
    pub fn open(message: impl Into<String>) -> Self {
        Self::Open {
            message: message.into(),
        }
    }

    /**
        Create a codec error with the given message.
    */
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /**
        Create a stream-not-found error for the given media kind.
    */
    pub fn stream_not_found(kind: MediaKind) -> Self {
        Self::StreamNotFound { kind }
    }

    /**
        Create an unsupported format error with the given message.
    */
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }

    /**
        Returns true if this is an EOF error.
    */
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

/**
    Result type alias for the media decode crate ecosystem.
*/
pub type Result<T> = std::result::Result<T, Error>;
