use super::error::ControllerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The logical audio origin. At most one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Spotify,
    LineIn,
    #[default]
    Off,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Spotify => "spotify",
            Source::LineIn => "linein",
            Source::Off => "off",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spotify" => Ok(Source::Spotify),
            "linein" | "line-in" | "line_in" => Ok(Source::LineIn),
            "off" => Ok(Source::Off),
            other => Err(ControllerError::InvalidArgument(format!(
                "unknown source '{}' (expected spotify, linein or off)",
                other
            ))),
        }
    }
}
