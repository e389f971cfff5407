//! Errors of the terminal screens.

use std::{error::Error, fmt::Display, io};

/// Failures of the terminal screens.
#[derive(Debug)]
pub enum GuiError {
    /// The terminal could not be set up, drawn on, or read from.
    IoError(io::Error),
    /// There was nothing for the user to choose from.
    NoDevices,
    /// The background worker panicked.
    JoinError,
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuiError::IoError(e) => write!(f, "terminal error: {}", e),
            GuiError::NoDevices => write!(f, "no serial devices found"),
            GuiError::JoinError => write!(f, "worker panicked"),
        }
    }
}

impl Error for GuiError {}

impl From<io::Error> for GuiError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert() {
        let err: GuiError = io::Error::new(io::ErrorKind::Other, "no tty").into();
        assert!(matches!(err, GuiError::IoError(_)));
        assert_eq!(err.to_string(), "terminal error: no tty");
    }
}
