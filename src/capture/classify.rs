//! Maps low-level camera failures to user-facing capture errors.

use std::fmt;

use super::types::CaptureError;

/// Failure reported by a camera device when a stream cannot be started.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceFailure {
    /// Failure identifier, e.g. `NotAllowedError`. Empty when the device gave none.
    pub name: String,
    pub message: Option<String>,
}

impl DeviceFailure {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: Some(message.into()),
        }
    }

    /// A failure with neither identifier nor message.
    pub fn unknown() -> Self {
        Self::default()
    }
}

impl fmt::Display for DeviceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.message) {
            (name, Some(message)) if !name.is_empty() => write!(f, "{name}: {message}"),
            (name, None) if !name.is_empty() => f.write_str(name),
            (_, Some(message)) => f.write_str(message),
            _ => f.write_str("unknown device failure"),
        }
    }
}

#[derive(Clone, Copy)]
enum Category {
    PermissionDenied,
    DeviceNotFound,
    DeviceBusy,
    ApiUnsupported,
}

/// Failure identifiers per category, in match priority order.
const FAILURE_TABLE: &[(Category, &[&str])] = &[
    (
        Category::PermissionDenied,
        &["NotAllowedError", "PermissionDeniedError"],
    ),
    (
        Category::DeviceNotFound,
        &["NotFoundError", "DevicesNotFoundError"],
    ),
    (Category::DeviceBusy, &["NotReadableError", "TrackStartError"]),
    (Category::ApiUnsupported, &["NotSupportedError"]),
];

/// Classify a device failure. The first matching table entry wins; unmapped
/// failures fall back to their message, then to a generic error.
pub fn classify(failure: &DeviceFailure) -> CaptureError {
    let category = FAILURE_TABLE
        .iter()
        .find(|(_, names)| names.contains(&failure.name.as_str()))
        .map(|(category, _)| *category);

    match category {
        Some(Category::PermissionDenied) => CaptureError::PermissionDenied,
        Some(Category::DeviceNotFound) => CaptureError::DeviceNotFound,
        Some(Category::DeviceBusy) => CaptureError::DeviceBusy,
        Some(Category::ApiUnsupported) => CaptureError::ApiUnsupported,
        None => match failure.message.as_deref().map(str::trim) {
            Some(message) if !message.is_empty() => CaptureError::CameraError(message.to_string()),
            _ => CaptureError::GenericUnknown,
        },
    }
}
