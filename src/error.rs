use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum PosError {
    InvalidConfiguration(String),
    /// The headless renderer cannot be used at all (missing binary, failed launch).
    RendererUnavailable(String),
    RenderTimeout(Duration),
    Render(String),
    Asset(String),
    Stream(String),
    Pdf(String),
    Io(std::io::Error),
}

impl fmt::Display for PosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PosError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            PosError::RendererUnavailable(message) => {
                write!(f, "html renderer unavailable: {}", message)
            }
            PosError::RenderTimeout(limit) => {
                write!(f, "html conversion exceeded {} ms", limit.as_millis())
            }
            PosError::Render(message) => write!(f, "render error: {}", message),
            PosError::Asset(message) => write!(f, "asset error: {}", message),
            PosError::Stream(message) => write!(f, "narrative stream error: {}", message),
            PosError::Pdf(message) => write!(f, "pdf error: {}", message),
            PosError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for PosError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PosError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PosError {
    fn from(value: std::io::Error) -> Self {
        PosError::Io(value)
    }
}

pub type Result<T> = std::result::Result<T, PosError>;
