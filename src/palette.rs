use crate::HeatmapError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// `#RRGGBB`
    pub fn hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }

    fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let channel = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgb(
            channel(self.0, other.0),
            channel(self.1, other.1),
            channel(self.2, other.2),
        )
    }
}

/// Color for cells whose day does not exist in the month.
pub const MISSING_DAY_COLOR: Rgb = Rgb(0x80, 0x80, 0x80);

/// The color schemes available for the heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    Rocket,
    Mako,
    Viridis,
    Magma,
    Inferno,
    Blues,
    Greens,
}

impl Scheme {
    pub const ALL: [Scheme; 7] = [
        Scheme::Rocket,
        Scheme::Mako,
        Scheme::Viridis,
        Scheme::Magma,
        Scheme::Inferno,
        Scheme::Blues,
        Scheme::Greens,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scheme::Rocket => "rocket",
            Scheme::Mako => "mako",
            Scheme::Viridis => "viridis",
            Scheme::Magma => "magma",
            Scheme::Inferno => "inferno",
            Scheme::Blues => "blues",
            Scheme::Greens => "greens",
        }
    }

    /// Evenly spaced color stops from low to high.
    fn stops(&self) -> &'static [Rgb] {
        match self {
            Scheme::Rocket => &[
                Rgb(0x03, 0x05, 0x1A),
                Rgb(0x4C, 0x1D, 0x4B),
                Rgb(0xA1, 0x1A, 0x5B),
                Rgb(0xE8, 0x3F, 0x3F),
                Rgb(0xF6, 0x9C, 0x73),
                Rgb(0xFA, 0xEB, 0xDD),
            ],
            Scheme::Mako => &[
                Rgb(0x0B, 0x04, 0x05),
                Rgb(0x38, 0x2A, 0x54),
                Rgb(0x39, 0x5D, 0x9C),
                Rgb(0x34, 0x97, 0xA9),
                Rgb(0x60, 0xCE, 0xAC),
                Rgb(0xDE, 0xF5, 0xE5),
            ],
            Scheme::Viridis => &[
                Rgb(0x44, 0x01, 0x54),
                Rgb(0x3B, 0x52, 0x8B),
                Rgb(0x21, 0x91, 0x8C),
                Rgb(0x5E, 0xC9, 0x62),
                Rgb(0xFD, 0xE7, 0x25),
            ],
            Scheme::Magma => &[
                Rgb(0x00, 0x00, 0x04),
                Rgb(0x51, 0x12, 0x7C),
                Rgb(0xB7, 0x37, 0x79),
                Rgb(0xFC, 0x89, 0x61),
                Rgb(0xFC, 0xFD, 0xBF),
            ],
            Scheme::Inferno => &[
                Rgb(0x00, 0x00, 0x04),
                Rgb(0x56, 0x10, 0x6E),
                Rgb(0xBB, 0x37, 0x54),
                Rgb(0xF9, 0x8C, 0x0A),
                Rgb(0xFC, 0xFF, 0xA4),
            ],
            Scheme::Blues => &[
                Rgb(0xF7, 0xFB, 0xFF),
                Rgb(0xC6, 0xDB, 0xEF),
                Rgb(0x6B, 0xAE, 0xD6),
                Rgb(0x21, 0x71, 0xB5),
                Rgb(0x08, 0x30, 0x6B),
            ],
            Scheme::Greens => &[
                Rgb(0xF7, 0xFC, 0xF5),
                Rgb(0xC7, 0xE9, 0xC0),
                Rgb(0x74, 0xC4, 0x76),
                Rgb(0x23, 0x8B, 0x45),
                Rgb(0x00, 0x44, 0x1B),
            ],
        }
    }
}

/// A color scheme, optionally reversed (`_r` suffix, as in `rocket_r`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Palette {
    pub scheme: Scheme,
    pub reversed: bool,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            scheme: Scheme::Rocket,
            reversed: true,
        }
    }
}

impl Palette {
    pub fn new(scheme: Scheme, reversed: bool) -> Self {
        Self { scheme, reversed }
    }

    /// Color for a normalized intensity; `t` is clamped to [0, 1].
    pub fn color_at(&self, t: f64) -> Rgb {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let t = if self.reversed { 1.0 - t } else { t };

        let stops = self.scheme.stops();
        let segments = (stops.len() - 1) as f64;
        let position = t * segments;
        let index = (position.floor() as usize).min(stops.len() - 2);
        stops[index].lerp(stops[index + 1], position - index as f64)
    }

    /// Gradient stops from low to high, for drawing a colorbar.
    pub fn gradient(&self, steps: usize) -> Vec<(f64, Rgb)> {
        let steps = steps.max(2);
        (0..steps)
            .map(|i| {
                let t = i as f64 / (steps - 1) as f64;
                (t, self.color_at(t))
            })
            .collect()
    }
}

impl fmt::Display for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scheme.name())?;
        if self.reversed {
            write!(f, "_r")?;
        }
        Ok(())
    }
}

impl FromStr for Palette {
    type Err = HeatmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let (base, reversed) = match name.strip_suffix("_r") {
            Some(base) => (base, true),
            None => (name.as_str(), false),
        };

        Scheme::ALL
            .iter()
            .find(|scheme| scheme.name() == base)
            .map(|&scheme| Palette::new(scheme, reversed))
            .ok_or_else(|| HeatmapError::UnknownPalette(s.to_string()))
    }
}
