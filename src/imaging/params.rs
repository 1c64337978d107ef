//! Parameter types for image operations.
//!
//! These describe *what* to do; [`calculations`](super::calculations) turns
//! them into pixel geometry and [`operations`](super::operations) does the
//! pixel work.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1–100, default 95). Clamped on construction.
//! - [`Size`]: resize bounds `(width, height, force)`; written `[w, h, force]` in config.
//! - [`CropAnchor`]: which edge survives a forced resize (`top` / `middle` / `bottom`).
//! - [`Scale`], [`Position`], [`Rotation`]: watermark placement specs.

use crate::error::MediaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(95)
    }
}

impl From<u8> for Quality {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

/// Resize bounds. `force = true` crops to exactly `width × height`;
/// `force = false` fits within the bounds preserving aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32, bool)", into = "(u32, u32, bool)")]
pub struct Size {
    pub width: u32,
    pub height: u32,
    pub force: bool,
}

impl Size {
    pub const fn new(width: u32, height: u32, force: bool) -> Self {
        Self {
            width,
            height,
            force,
        }
    }

    pub fn dimensions(self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// A zero width or height; nothing can be resized to it.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<(u32, u32, bool)> for Size {
    fn from((width, height, force): (u32, u32, bool)) -> Self {
        Self::new(width, height, force)
    }
}

impl From<Size> for (u32, u32, bool) {
    fn from(size: Size) -> Self {
        (size.width, size.height, size.force)
    }
}

/// Which part of the image is kept when a forced resize has excess.
///
/// Vertical excess is cropped from the named edge's opposite side; for
/// horizontal excess `top` keeps the left edge and `bottom` the right one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropAnchor {
    Top,
    #[default]
    Middle,
    Bottom,
}

impl FromStr for CropAnchor {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top" => Ok(Self::Top),
            "middle" => Ok(Self::Middle),
            "bottom" => Ok(Self::Bottom),
            other => Err(MediaError::invalid(format!(
                "invalid crop anchor {other:?} (expected top, middle or bottom)"
            ))),
        }
    }
}

/// Watermark scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SpecValue", into = "SpecValue")]
pub enum Scale {
    /// Multiply the mark's size by this factor.
    Factor(f64),
    /// As large as possible while still fitting inside the target (`"F"`).
    Fit,
    /// A fixed percentage of the fit scale (`"R"`).
    Relative,
}

impl Default for Scale {
    fn default() -> Self {
        Self::Factor(1.0)
    }
}

impl FromStr for Scale {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "F" | "f" => Ok(Self::Fit),
            "R" | "r" => Ok(Self::Relative),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(Self::Factor)
                .ok_or_else(|| {
                    MediaError::invalid(format!(
                        "invalid watermark scale {other:?}: use \"F\", \"R\" or a number >= 0"
                    ))
                }),
        }
    }
}

/// Watermark rotation in degrees, counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "SpecValue", into = "SpecValue")]
pub enum Rotation {
    #[default]
    None,
    Degrees(i32),
    /// A random angle in 0..360 per application (`"r"`).
    Random,
}

impl FromStr for Rotation {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "r" | "R" => Ok(Self::Random),
            other => other
                .parse::<i32>()
                .map(|deg| if deg == 0 { Self::None } else { Self::Degrees(deg) })
                .map_err(|_| MediaError::invalid(format!("invalid watermark rotation {other:?}"))),
        }
    }
}

/// One axis of an `XxY` position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coord {
    Absolute(i64),
    /// Fraction (0.0–1.0) of the free space on that axis.
    Percent(f64),
}

impl FromStr for Coord {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = match s.strip_suffix('%') {
            Some(pct) => pct.trim().parse::<f64>().ok().map(|p| Self::Percent(p / 100.0)),
            None => s.parse::<i64>().ok().map(Self::Absolute),
        };
        parsed.ok_or_else(|| MediaError::invalid(format!("invalid watermark coordinate {s:?}")))
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(px) => write!(f, "{px}"),
            Self::Percent(frac) => write!(f, "{}%", frac * 100.0),
        }
    }
}

/// Where the watermark goes on the target.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Position {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
    Center,
    #[default]
    Random,
    /// `XxY`, each axis absolute pixels or a percentage.
    At(Coord, Coord),
}

impl FromStr for Position {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "tl" => Ok(Self::TopLeft),
            "tr" => Ok(Self::TopRight),
            "br" => Ok(Self::BottomRight),
            "bl" => Ok(Self::BottomLeft),
            "c" => Ok(Self::Center),
            "r" | "" => Ok(Self::Random),
            other => match other.split_once('x') {
                Some((x, y)) => Ok(Self::At(x.parse()?, y.parse()?)),
                None => Err(MediaError::invalid(format!(
                    "invalid watermark position {s:?}: use tl, tr, br, bl, c, r or XxY"
                ))),
            },
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopLeft => f.write_str("tl"),
            Self::TopRight => f.write_str("tr"),
            Self::BottomRight => f.write_str("br"),
            Self::BottomLeft => f.write_str("bl"),
            Self::Center => f.write_str("c"),
            Self::Random => f.write_str("r"),
            Self::At(x, y) => write!(f, "{x}x{y}"),
        }
    }
}

impl TryFrom<String> for Position {
    type Error = MediaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Position> for String {
    fn from(position: Position) -> Self {
        position.to_string()
    }
}

/// Config representation shared by [`Scale`] and [`Rotation`]: either a
/// number or a one-letter keyword.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SpecValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl TryFrom<SpecValue> for Scale {
    type Error = MediaError;

    fn try_from(value: SpecValue) -> Result<Self, Self::Error> {
        match value {
            SpecValue::Integer(i) => i.to_string().parse(),
            SpecValue::Float(f) => f.to_string().parse(),
            SpecValue::Text(s) => s.parse(),
        }
    }
}

impl From<Scale> for SpecValue {
    fn from(scale: Scale) -> Self {
        match scale {
            Scale::Factor(f) => SpecValue::Float(f),
            Scale::Fit => SpecValue::Text("F".into()),
            Scale::Relative => SpecValue::Text("R".into()),
        }
    }
}

impl TryFrom<SpecValue> for Rotation {
    type Error = MediaError;

    fn try_from(value: SpecValue) -> Result<Self, Self::Error> {
        match value {
            SpecValue::Integer(i) => i.to_string().parse(),
            SpecValue::Float(f) => Err(MediaError::invalid(format!(
                "watermark rotation must be whole degrees, got {f}"
            ))),
            SpecValue::Text(s) => s.parse(),
        }
    }
}

impl From<Rotation> for SpecValue {
    fn from(rotation: Rotation) -> Self {
        match rotation {
            Rotation::Degrees(deg) => SpecValue::Integer(i64::from(deg)),
            Rotation::None => SpecValue::Integer(0),
            Rotation::Random => SpecValue::Text("r".into()),
        }
    }
}
