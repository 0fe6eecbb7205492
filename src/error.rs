use std::fmt;

#[derive(Debug)]
pub enum DuplicationError {
    /// The native duplication library could not be loaded.
    LibraryLoad(String),

    /// A required export was missing from the native library.
    MissingSymbol(&'static str),

    NotInitialized,

    InvalidMonitor(i32),

    /// Pixel readback was requested on a monitor that has not opted in via
    /// [`Monitor::set_use_get_pixels`](crate::monitor::Monitor::set_use_get_pixels).
    PixelReadDisabled(i32),

    BufferTooSmall {
        required: usize,
        actual: usize,
    },

    PixelReadFailed(i32),

    TextureAllocation(String),

    InvalidConfig(String),

    BackendUnavailable(String),

    Platform(anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicationErrorClass {
    InvalidInput,
    Unsupported,
    Transient,
    Fatal,
}

impl DuplicationError {
    pub fn class(&self) -> DuplicationErrorClass {
        match self {
            Self::InvalidMonitor(_)
            | Self::PixelReadDisabled(_)
            | Self::BufferTooSmall { .. }
            | Self::InvalidConfig(_) => DuplicationErrorClass::InvalidInput,
            Self::BackendUnavailable(_) | Self::MissingSymbol(_) => {
                DuplicationErrorClass::Unsupported
            }
            Self::NotInitialized | Self::PixelReadFailed(_) | Self::TextureAllocation(_) => {
                DuplicationErrorClass::Transient
            }
            Self::LibraryLoad(_) | Self::Platform(_) => DuplicationErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), DuplicationErrorClass::Transient)
    }
}

impl fmt::Display for DuplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LibraryLoad(message) => {
                write!(f, "failed to load desktop duplication library: {message}")
            }
            Self::MissingSymbol(name) => {
                write!(f, "desktop duplication library does not export `{name}`")
            }
            Self::NotInitialized => write!(f, "desktop duplication engine is not initialized"),
            Self::InvalidMonitor(id) => write!(f, "monitor {id} does not exist"),
            Self::PixelReadDisabled(id) => write!(
                f,
                "pixel readback is disabled for monitor {id}; enable it with set_use_get_pixels"
            ),
            Self::BufferTooSmall { required, actual } => write!(
                f,
                "pixel buffer too small: {actual} pixels given, {required} required"
            ),
            Self::PixelReadFailed(id) => write!(f, "pixel readback failed for monitor {id}"),
            Self::TextureAllocation(message) => {
                write!(f, "failed to allocate capture texture: {message}")
            }
            Self::InvalidConfig(message) => {
                write!(f, "invalid duplication configuration: {message}")
            }
            Self::BackendUnavailable(message) => {
                write!(f, "no available duplication engine: {message}")
            }
            Self::Platform(inner) => write!(f, "{inner}"),
        }
    }
}

impl std::error::Error for DuplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Platform(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for DuplicationError {
    fn from(inner: anyhow::Error) -> Self {
        Self::Platform(inner)
    }
}

pub type DuplicationResult<T> = Result<T, DuplicationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_mistakes_are_invalid_input() {
        assert_eq!(
            DuplicationError::BufferTooSmall {
                required: 4,
                actual: 1
            }
            .class(),
            DuplicationErrorClass::InvalidInput
        );
        assert_eq!(
            DuplicationError::PixelReadDisabled(0).class(),
            DuplicationErrorClass::InvalidInput
        );
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(DuplicationError::PixelReadFailed(1).is_retryable());
        assert!(!DuplicationError::LibraryLoad("missing".into()).is_retryable());
        assert!(!DuplicationError::MissingSymbol("Update").is_retryable());
    }

    #[test]
    fn platform_errors_expose_their_source() {
        use std::error::Error;
        let err = DuplicationError::from(anyhow::anyhow!("boom"));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "boom");
    }
}
