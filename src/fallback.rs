//! Platforms without a native backend dispatch to the installed [`MainLoop`].
//!
//! [`MainLoop`]: `crate::pump::MainLoop`

pub(crate) use crate::pump::resolve;

pub(crate) const BACKEND: &str = "pump";
