//! Color schemes, categorical palettes and color name parsing.

use serde::Deserialize;
use std::fmt;

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);
    /// Fill used for records whose value is missing.
    pub const MISSING: Self = Self::new(211, 211, 211);
    /// Default single-color fill ("C0").
    pub const DEFAULT_FILL: Self = Self::new(31, 119, 180);

    /// Parse `#rrggbb`, `rrggbb`, or a basic color name (`k`, `black`, `red`, ...).
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let named = match text.to_ascii_lowercase().as_str() {
            "k" | "black" => Some(Self::BLACK),
            "w" | "white" => Some(Self::WHITE),
            "r" | "red" => Some(Self::new(255, 0, 0)),
            "g" | "green" => Some(Self::new(0, 128, 0)),
            "b" | "blue" => Some(Self::new(0, 0, 255)),
            "c" | "cyan" => Some(Self::new(0, 191, 191)),
            "m" | "magenta" => Some(Self::new(191, 0, 191)),
            "y" | "yellow" => Some(Self::new(191, 191, 0)),
            "gray" | "grey" => Some(Self::new(128, 128, 128)),
            "lightgray" | "lightgrey" => Some(Self::MISSING),
            _ => None,
        };
        named.or_else(|| Self::from_hex(text))
    }

    fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self::new(r, g, b))
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgb::parse(&value).ok_or_else(|| format!("unrecognized color '{value}'"))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A color stop: position in [0, 1] mapped to an RGB color.
#[derive(Debug, Clone, Copy)]
pub struct ColorStop {
    pub t: f64,
    pub color: Rgb,
}

impl ColorStop {
    pub const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self {
            t,
            color: Rgb::new(r, g, b),
        }
    }
}

/// Continuous color schemes for choropleths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    /// Dark purple -> teal -> yellow
    #[default]
    Viridis,
    /// Black -> White
    Greys,
}

const VIRIDIS_STOPS: &[ColorStop] = &[
    ColorStop::new(0.0, 68, 1, 84),
    ColorStop::new(0.1, 72, 36, 117),
    ColorStop::new(0.2, 65, 68, 135),
    ColorStop::new(0.3, 53, 95, 141),
    ColorStop::new(0.4, 42, 120, 142),
    ColorStop::new(0.5, 33, 145, 140),
    ColorStop::new(0.6, 34, 168, 132),
    ColorStop::new(0.7, 68, 191, 112),
    ColorStop::new(0.8, 122, 209, 81),
    ColorStop::new(0.9, 189, 223, 38),
    ColorStop::new(1.0, 253, 231, 37),
];

const GREYS_STOPS: &[ColorStop] = &[ColorStop::new(0.0, 0, 0, 0), ColorStop::new(1.0, 255, 255, 255)];

/// Ten-color qualitative palette used for categorical columns.
pub const CATEGORICAL: &[Rgb] = &[
    Rgb::new(31, 119, 180),
    Rgb::new(255, 127, 14),
    Rgb::new(44, 160, 44),
    Rgb::new(214, 39, 40),
    Rgb::new(148, 103, 189),
    Rgb::new(140, 86, 75),
    Rgb::new(227, 119, 194),
    Rgb::new(127, 127, 127),
    Rgb::new(188, 189, 34),
    Rgb::new(23, 190, 207),
];

impl ColorScheme {
    fn stops(&self) -> &'static [ColorStop] {
        match self {
            ColorScheme::Viridis => VIRIDIS_STOPS,
            ColorScheme::Greys => GREYS_STOPS,
        }
    }
}

/// Evaluate `scheme` at `t`, clamped to [0, 1].
pub fn evaluate(scheme: ColorScheme, t: f64) -> Rgb {
    let stops = scheme.stops();
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };

    let upper = stops
        .iter()
        .position(|s| s.t >= t)
        .unwrap_or(stops.len() - 1)
        .max(1);
    let (lo, hi) = (stops[upper - 1], stops[upper]);
    let span = hi.t - lo.t;
    let f = if span > 0.0 { (t - lo.t) / span } else { 0.0 };

    let lerp = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * f).round() as u8;
    Rgb::new(
        lerp(lo.color.r, hi.color.r),
        lerp(lo.color.g, hi.color.g),
        lerp(lo.color.b, hi.color.b),
    )
}

/// Palette color for the `index`-th category, cycling.
pub fn categorical(index: usize) -> Rgb {
    CATEGORICAL[index % CATEGORICAL.len()]
}
