use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("input file {path}: {source}")]
    InputIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("output file {path}: {source}")]
    OutputIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
}

impl DispatcherError {
    pub fn input_io(path: &Path, source: std::io::Error) -> Self {
        Self::InputIo {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn output_io(path: &Path, source: std::io::Error) -> Self {
        Self::OutputIo {
            path: path.display().to_string(),
            source,
        }
    }

    /// True for errors that must abort the process: I/O failures on the
    /// authoritative files, where continuing would break the line-for-line
    /// correspondence between input and output.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InputIo { .. } | Self::OutputIo { .. } | Self::Bind { .. } | Self::Serve(_)
        )
    }
}
