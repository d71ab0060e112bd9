//! Argument checks for the parameter setters. All run before any side effect.

use super::error::ControllerError;

pub const MIN_GAIN: f64 = 0.0;
pub const MAX_GAIN: f64 = 1.5;
pub const MAX_SPOTIFY_NAME_CHARS: usize = 64;
/// Device names accepted verbatim.
pub const ACCEPTED_DEVICE_NAMES: &[&str] = &["auto", "default"];
pub const ACCEPTED_DEVICE_PREFIXES: &[&str] = &["hw:", "plughw:"];

pub fn gain(gain: f64) -> Result<f64, ControllerError> {
    if gain.is_finite() && (MIN_GAIN..=MAX_GAIN).contains(&gain) {
        Ok(gain)
    } else {
        Err(ControllerError::InvalidArgument(format!(
            "volume {} outside {}..={}",
            gain, MIN_GAIN, MAX_GAIN
        )))
    }
}

pub fn linein_device(device: &str) -> Result<String, ControllerError> {
    let device = device.trim();
    let accepted = ACCEPTED_DEVICE_NAMES.contains(&device)
        || ACCEPTED_DEVICE_PREFIXES
            .iter()
            .any(|prefix| device.starts_with(prefix));
    if accepted {
        Ok(device.to_string())
    } else {
        Err(ControllerError::InvalidArgument(format!(
            "capture device '{}' must be {} or start with {}",
            device,
            ACCEPTED_DEVICE_NAMES.join(" or "),
            ACCEPTED_DEVICE_PREFIXES.join(" or ")
        )))
    }
}

pub fn spotify_name(name: &str) -> Result<String, ControllerError> {
    let name = name.trim();
    let chars = name.chars().count();
    if chars == 0 || chars > MAX_SPOTIFY_NAME_CHARS {
        return Err(ControllerError::InvalidArgument(format!(
            "spotify name must be 1..={} characters",
            MAX_SPOTIFY_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}
