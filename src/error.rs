use std::any::Any;
use std::borrow::Cow;
use std::{error, fmt};

pub(crate) type BoxedError = Box<dyn error::Error + Send + Sync + 'static>;

/// Errors returned by [`DispatchService`](`crate::DispatchService`).
#[non_exhaustive]
pub enum Error {
    /// A required argument was absent. Raised before anything is dispatched.
    InvalidArgument {
        /// The name of the missing argument.
        name: &'static str,
    },
    /// There is no thread-affine dispatch target to send work to.
    ///
    /// Resolution is attempted again on the next call,
    /// so retrying later may succeed.
    DispatchUnavailable(ResolveError),
    /// The work item panicked while running on the target thread.
    /// Contains the panic payload, which can be passed to
    /// [`std::panic::resume_unwind`] to continue unwinding on the caller's thread.
    WorkItemPanicked(Box<dyn Any + Send + 'static>),
    /// The target discarded the work item without running it,
    /// for example because its event loop shut down.
    WorkItemDropped,
    /// The native dispatch primitive reported an error.
    Platform(BoxedError),
}

impl Error {
    /// Returns the panic payload if this is a [`Error::WorkItemPanicked`] error.
    pub fn into_panic(self) -> Result<Box<dyn Any + Send + 'static>, Self> {
        match self {
            Error::WorkItemPanicked(payload) => Ok(payload),
            other => Err(other),
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Error::WorkItemPanicked(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::DispatchUnavailable(_))
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument { name } => f
                .debug_struct("InvalidArgument")
                .field("name", name)
                .finish(),
            Error::DispatchUnavailable(e) => f.debug_tuple("DispatchUnavailable").field(e).finish(),
            Error::WorkItemPanicked(payload) => f
                .debug_tuple("WorkItemPanicked")
                .field(&panic_message(payload.as_ref()))
                .finish(),
            Error::WorkItemDropped => f.write_str("WorkItemDropped"),
            Error::Platform(e) => f.debug_tuple("Platform").field(e).finish(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument { name } => write!(f, "argument `{name}` must not be absent"),
            Error::DispatchUnavailable(e) => write!(f, "no dispatch target available: {e}"),
            Error::WorkItemPanicked(payload) => write!(
                f,
                "work item panicked: {}",
                panic_message(payload.as_ref()).unwrap_or("Box<dyn Any>")
            ),
            Error::WorkItemDropped => f.write_str("work item was dropped before it ran"),
            Error::Platform(e) => write!(f, "native dispatch failed: {e}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::DispatchUnavailable(e) => Some(e),
            Error::Platform(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<ResolveError> for Error {
    fn from(value: ResolveError) -> Self {
        Error::DispatchUnavailable(value)
    }
}

/// Explains why no [`DispatchTarget`](`crate::DispatchTarget`) could be resolved.
#[derive(Debug)]
pub struct ResolveError {
    reason: Cow<'static, str>,
    source: Option<BoxedError>,
}

impl ResolveError {
    pub fn new(reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn with_source(
        reason: impl Into<Cow<'static, str>>,
        source: impl Into<Box<dyn error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {source}", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

impl error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn error::Error + 'static))
    }
}

/// Extracts the message of a panic payload created by `panic!`.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn displays_panic_message() {
        let error = Error::WorkItemPanicked(Box::new("boom"));
        assert_eq!("work item panicked: boom", error.to_string());
    }

    #[test]
    fn displays_formatted_panic_message() {
        let error = Error::WorkItemPanicked(Box::new(format!("boom {}", 42)));
        assert_eq!("work item panicked: boom 42", error.to_string());
    }

    #[test]
    fn into_panic_returns_payload() {
        let payload = Error::WorkItemPanicked(Box::new(7_u32))
            .into_panic()
            .expect("error is a panic");
        assert_eq!(Some(&7), payload.downcast_ref::<u32>());
    }

    #[test]
    fn into_panic_keeps_other_errors() {
        let error = Error::WorkItemDropped.into_panic().expect_err("not a panic");
        assert!(matches!(error, Error::WorkItemDropped));
    }

    #[test]
    fn unavailable_exposes_resolve_error_as_source() {
        let error = Error::from(ResolveError::new("no event loop"));
        assert!(error.is_unavailable());
        assert_eq!("no event loop", error.source().expect("has source").to_string());
    }

    #[test]
    fn resolve_error_includes_source() {
        let io = std::io::Error::other("not attached");
        let error = ResolveError::with_source("jvm unavailable", io);
        assert_eq!("jvm unavailable: not attached", error.to_string());
        assert_eq!("jvm unavailable", error.reason());
    }
}
