//! Instructions: one named option directive with ordered string arguments
//!
//! Textual form is `name:arg1:arg2`. Path segments, query pairs and preset
//! definitions all reduce to this one type before they reach the setters.

use std::fmt;
use std::str::FromStr;

use crate::error::ProcessingError;

/// Closed set of option names understood by the setters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionName {
    Resize,
    Size,
    ResizingType,
    Width,
    Height,
    Gravity,
    Enlarge,
    Format,
    Quality,
    Background,
    Blur,
    Sharpen,
    Dpr,
    Watermark,
    Preset,
    CacheBuster,
}

impl OptionName {
    /// Canonical (long) name, used in error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resize => "resize",
            Self::Size => "size",
            Self::ResizingType => "resizing_type",
            Self::Width => "width",
            Self::Height => "height",
            Self::Gravity => "gravity",
            Self::Enlarge => "enlarge",
            Self::Format => "format",
            Self::Quality => "quality",
            Self::Background => "background",
            Self::Blur => "blur",
            Self::Sharpen => "sharpen",
            Self::Dpr => "dpr",
            Self::Watermark => "watermark",
            Self::Preset => "preset",
            Self::CacheBuster => "cachebuster",
        }
    }
}

impl FromStr for OptionName {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resize" | "rs" => Ok(Self::Resize),
            "size" | "s" => Ok(Self::Size),
            "resizing_type" | "rt" => Ok(Self::ResizingType),
            "width" | "w" => Ok(Self::Width),
            "height" | "h" => Ok(Self::Height),
            "gravity" | "g" => Ok(Self::Gravity),
            "enlarge" | "el" => Ok(Self::Enlarge),
            "format" | "f" | "ext" => Ok(Self::Format),
            "quality" | "q" => Ok(Self::Quality),
            "background" | "bg" => Ok(Self::Background),
            "blur" | "bl" => Ok(Self::Blur),
            "sharpen" | "sh" => Ok(Self::Sharpen),
            "dpr" => Ok(Self::Dpr),
            "watermark" | "wm" => Ok(Self::Watermark),
            "preset" | "pr" => Ok(Self::Preset),
            "cachebuster" | "cb" => Ok(Self::CacheBuster),
            _ => Err(ProcessingError::UnknownOption(s.to_string())),
        }
    }
}

/// A single option directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub name: String,
    pub args: Vec<String>,
}

impl Instruction {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Resolve the name (or alias) against the option table
    pub fn option(&self) -> Result<OptionName, ProcessingError> {
        self.name.parse()
    }

    pub fn is_preset(&self) -> bool {
        matches!(self.option(), Ok(OptionName::Preset))
    }

    /// Parse a `/`-separated instruction list such as `rt:fill/q:80`.
    /// Empty segments are skipped.
    pub fn parse_list(list: &str) -> Result<Vec<Instruction>, ProcessingError> {
        list.split('/')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(|segment| segment.parse::<Instruction>())
            .collect()
    }
}

impl FromStr for Instruction {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(ProcessingError::invalid_path(format!(
                "option without a name: '{}'",
                s
            )));
        }

        Ok(Self::new(name, parts))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            write!(f, ":{}", arg)?;
        }
        Ok(())
    }
}
