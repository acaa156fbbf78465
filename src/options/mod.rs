//! Processing options: the typed result of interpreting a request
//!
//! `ProcessingOptions` is a plain struct of explicit fields. Every tracked
//! field remembers the [`Precedence`] of the source that last wrote it, so a
//! lower-precedence source (a preset, a client hint) can never overwrite a
//! value an explicit instruction already set, whatever the order in which
//! sources are applied.

pub mod instruction;
pub mod preset;
mod setters;

use std::str::FromStr;

use serde::Serialize;

use crate::config::PresetConfig;
use crate::constants::{DEFAULT_BACKGROUND, DEFAULT_DPR, DEFAULT_WATERMARK_OPACITY};
use crate::error::ProcessingError;

pub use instruction::{Instruction, OptionName};
pub use preset::PresetTable;

/// How the image is fitted into the target box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeType {
    /// Scale to fit within the box, preserving aspect ratio
    #[default]
    Fit,
    /// Scale to cover the box, cropping the overflow
    Fill,
    /// Crop to the box without scaling
    Crop,
    /// Stretch to the box exactly (may distort)
    Force,
}

impl ResizeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fit => "fit",
            Self::Fill => "fill",
            Self::Crop => "crop",
            Self::Force => "force",
        }
    }
}

impl FromStr for ResizeType {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fit" => Ok(ResizeType::Fit),
            "fill" => Ok(ResizeType::Fill),
            "crop" => Ok(ResizeType::Crop),
            "force" => Ok(ResizeType::Force),
            _ => Err(ProcessingError::invalid_arg(
                "resizing_type",
                format!("unknown resizing type: {}", s),
            )),
        }
    }
}

/// Gravity/anchor point for cropping and watermark placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GravityType {
    #[default]
    Center,
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
    /// Content-aware smart crop
    Smart,
    /// Explicit point given by `Gravity::x` / `Gravity::y`
    FocusPoint,
}

impl GravityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Center => "ce",
            Self::North => "no",
            Self::South => "so",
            Self::East => "ea",
            Self::West => "we",
            Self::NorthEast => "noea",
            Self::NorthWest => "nowe",
            Self::SouthEast => "soea",
            Self::SouthWest => "sowe",
            Self::Smart => "sm",
            Self::FocusPoint => "fp",
        }
    }
}

impl FromStr for GravityType {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ce" | "c" | "center" => Ok(GravityType::Center),
            "no" | "n" | "north" => Ok(GravityType::North),
            "so" | "s" | "south" => Ok(GravityType::South),
            "ea" | "e" | "east" => Ok(GravityType::East),
            "we" | "w" | "west" => Ok(GravityType::West),
            "noea" | "ne" | "northeast" => Ok(GravityType::NorthEast),
            "nowe" | "nw" | "northwest" => Ok(GravityType::NorthWest),
            "soea" | "se" | "southeast" => Ok(GravityType::SouthEast),
            "sowe" | "sw" | "southwest" => Ok(GravityType::SouthWest),
            "sm" | "smart" => Ok(GravityType::Smart),
            "fp" => Ok(GravityType::FocusPoint),
            _ => Err(ProcessingError::invalid_arg(
                "gravity",
                format!("unknown gravity: {}", s),
            )),
        }
    }
}

/// Gravity with an optional focus point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Gravity {
    #[serde(rename = "type")]
    pub kind: GravityType,
    /// Horizontal focus point in [0, 1], only meaningful for `FocusPoint`
    pub x: f64,
    /// Vertical focus point in [0, 1], only meaningful for `FocusPoint`
    pub y: f64,
}

impl Gravity {
    pub fn new(kind: GravityType) -> Self {
        Self { kind, x: 0.0, y: 0.0 }
    }

    pub fn focus_point(x: f64, y: f64) -> Self {
        Self {
            kind: GravityType::FocusPoint,
            x,
            y,
        }
    }
}

/// Output container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Jpeg,
    Png,
    Webp,
    Gif,
    Ico,
    Svg,
    Heic,
    Bmp,
    Tiff,
    Avif,
}

impl ImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Ico => "ico",
            Self::Svg => "svg",
            Self::Heic => "heic",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Avif => "avif",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Ico => "image/x-icon",
            Self::Svg => "image/svg+xml",
            Self::Heic => "image/heif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Avif => "image/avif",
        }
    }
}

impl FromStr for ImageType {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageType::Jpeg),
            "png" => Ok(ImageType::Png),
            "webp" => Ok(ImageType::Webp),
            "gif" => Ok(ImageType::Gif),
            "ico" => Ok(ImageType::Ico),
            "svg" => Ok(ImageType::Svg),
            "heic" | "heif" => Ok(ImageType::Heic),
            "bmp" => Ok(ImageType::Bmp),
            "tiff" | "tif" => Ok(ImageType::Tiff),
            "avif" => Ok(ImageType::Avif),
            _ => Err(ProcessingError::invalid_arg(
                "format",
                format!("unknown format: {}", s),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `RRGGBB` (no leading `#`)
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl Default for Rgb {
    fn default() -> Self {
        let (r, g, b) = DEFAULT_BACKGROUND;
        Self::new(r, g, b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WatermarkOptions {
    pub enabled: bool,
    pub opacity: f64,
    pub gravity: GravityType,
    pub offset_x: i32,
    pub offset_y: i32,
    /// Watermark size relative to the image; 0 keeps its own size
    pub scale: f64,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            opacity: DEFAULT_WATERMARK_OPACITY,
            gravity: GravityType::Center,
            offset_x: 0,
            offset_y: 0,
            scale: 0.0,
        }
    }
}

/// Fields whose origin is tracked for precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Resize,
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
    CacheBuster,
}

impl Field {
    pub const COUNT: usize = 13;
}

/// Source of a field value, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Precedence {
    #[default]
    Default,
    /// `Width`, `Viewport-Width` and `DPR` request headers
    ClientHint,
    /// The implicit `default` preset and presets nested in it
    DefaultPreset,
    /// `@ext` suffix of a plain URL or `.ext` suffix of an encoded URL
    UrlExtension,
    /// Presets requested by path or query
    Preset,
    /// Width and height from legacy positional segments
    PositionalSize,
    /// Flat query parameters
    Query,
    /// Advanced path instructions and legacy resize type/gravity/enlarge
    Path,
}

impl Precedence {
    /// Level at which instructions of a preset requested at `self` apply
    pub fn for_nested_preset(self) -> Self {
        match self {
            Precedence::Default | Precedence::DefaultPreset => Precedence::DefaultPreset,
            _ => Precedence::Preset,
        }
    }
}

/// Fully resolved processing instructions for one request
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOptions {
    pub resize: ResizeType,
    pub width: u32,
    pub height: u32,
    pub gravity: Gravity,
    pub enlarge: bool,
    /// `None` keeps the source format
    pub format: Option<ImageType>,
    /// 0 means the format default
    pub quality: u8,
    pub background: Rgb,
    pub flatten: bool,
    pub blur: f32,
    pub sharpen: f32,
    pub dpr: f64,
    pub watermark: WatermarkOptions,
    pub cache_buster: String,
    pub prefer_webp: bool,
    pub enforce_webp: bool,
    pub used_presets: Vec<String>,

    #[serde(skip)]
    origins: [Precedence; Field::COUNT],
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            resize: ResizeType::Fit,
            width: 0,
            height: 0,
            gravity: Gravity::default(),
            enlarge: false,
            format: None,
            quality: 0,
            background: Rgb::default(),
            flatten: false,
            blur: 0.0,
            sharpen: 0.0,
            dpr: DEFAULT_DPR,
            watermark: WatermarkOptions::default(),
            cache_buster: String::new(),
            prefer_webp: false,
            enforce_webp: false,
            used_presets: Vec::new(),
            origins: [Precedence::Default; Field::COUNT],
        }
    }
}

impl ProcessingOptions {
    /// Source that last wrote `field`
    pub fn origin(&self, field: Field) -> Precedence {
        self.origins[field as usize]
    }

    /// Whether anything other than the seeded default wrote `field`
    pub fn is_set(&self, field: Field) -> bool {
        self.origin(field) > Precedence::Default
    }

    /// Run `write` if `level` is at least the field's current precedence.
    /// Returns whether the write happened.
    pub(crate) fn assign(
        &mut self,
        field: Field,
        level: Precedence,
        write: impl FnOnce(&mut Self),
    ) -> bool {
        let current = self.origins[field as usize];
        if current > level {
            tracing::trace!(
                field = ?field,
                current = ?current,
                attempted = ?level,
                "keeping higher precedence value"
            );
            return false;
        }

        self.origins[field as usize] = level;
        write(self);
        true
    }

    /// Expand and apply the named presets at `level`
    pub fn apply_presets(
        &mut self,
        names: &[String],
        level: Precedence,
        presets: &PresetConfig,
    ) -> Result<(), ProcessingError> {
        if names.is_empty() || names.iter().any(|name| name.is_empty()) {
            return Err(ProcessingError::invalid_arg(
                OptionName::Preset.as_str(),
                "preset names must not be empty",
            ));
        }

        let expanded =
            presets
                .definitions
                .expand(names, &mut self.used_presets, presets.ignore_unknown)?;

        for instruction in &expanded {
            self.apply(instruction, level)?;
        }
        Ok(())
    }

    /// Cache key suffix describing every non-default option
    pub fn cache_key(&self) -> String {
        let mut parts = Vec::new();

        if self.resize != ResizeType::Fit {
            parts.push(format!("rt{}", self.resize.as_str()));
        }
        if self.width != 0 {
            parts.push(format!("w{}", self.width));
        }
        if self.height != 0 {
            parts.push(format!("h{}", self.height));
        }
        if self.gravity.kind == GravityType::FocusPoint {
            parts.push(format!("gfp{}x{}", self.gravity.x, self.gravity.y));
        } else if self.gravity.kind != GravityType::Center {
            parts.push(format!("g{}", self.gravity.kind.as_str()));
        }
        if self.enlarge {
            parts.push("el".to_string());
        }
        if let Some(format) = self.format {
            parts.push(format!("f{}", format.as_str()));
        }
        if self.quality != 0 {
            parts.push(format!("q{}", self.quality));
        }
        if self.flatten {
            let Rgb { r, g, b } = self.background;
            parts.push(format!("bg{:02x}{:02x}{:02x}", r, g, b));
        }
        if self.blur != 0.0 {
            parts.push(format!("blur{}", self.blur));
        }
        if self.sharpen != 0.0 {
            parts.push(format!("sharp{}", self.sharpen));
        }
        if self.dpr != DEFAULT_DPR {
            parts.push(format!("dpr{}", self.dpr));
        }
        if self.watermark.enabled {
            let wm = &self.watermark;
            parts.push(format!(
                "wm{}_{}_{}_{}_{}",
                wm.opacity,
                wm.gravity.as_str(),
                wm.offset_x,
                wm.offset_y,
                wm.scale
            ));
        }
        if self.enforce_webp {
            parts.push("webp!".to_string());
        } else if self.prefer_webp {
            parts.push("webp".to_string());
        }
        if !self.cache_buster.is_empty() {
            parts.push(format!("cb{}", self.cache_buster));
        }

        if parts.is_empty() {
            "default".to_string()
        } else {
            parts.join("_")
        }
    }
}
