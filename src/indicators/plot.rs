//! Plot Metadata
//!
//! Rendering hints fixed at indicator construction. They never affect
//! computation; downstream chart consumers read them out of the encoded
//! keys in `BarProcessed.indicators`.

use serde::{Deserialize, Serialize};

/// Panel 0 is the price panel; higher ids are subpanels.
pub const PRICE_PANEL: u8 = 0;

/// Reserved sentinel panel: indicators placed here are omitted from the
/// `BarProcessed` mapping entirely (used by the raw OHLCV identities).
pub const HIDDEN_PANEL: u8 = 99;

/// How an indicator series is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlotStyle {
    Line,
    Histogram,
    Dots,
    Dash1,
    Dash2,
    Dash3,
    Background1,
    Background2,
}

impl PlotStyle {
    /// One-letter code used in the encoded indicator key.
    pub fn letter(&self) -> char {
        match self {
            PlotStyle::Line => 'L',
            PlotStyle::Histogram => 'H',
            PlotStyle::Dots => 'D',
            PlotStyle::Dash1 => 'A',
            PlotStyle::Dash2 => 'B',
            PlotStyle::Dash3 => 'C',
            PlotStyle::Background1 => 'X',
            PlotStyle::Background2 => 'Y',
        }
    }
}

/// Fixed rendering palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlotColor {
    Blue,
    Orange,
    Green,
    Red,
    Purple,
    Gray,
    Yellow,
    Cyan,
}

impl PlotColor {
    /// One-letter code used in the encoded indicator key.
    pub fn letter(&self) -> char {
        match self {
            PlotColor::Blue => 'b',
            PlotColor::Orange => 'o',
            PlotColor::Green => 'g',
            PlotColor::Red => 'r',
            PlotColor::Purple => 'p',
            PlotColor::Gray => 'k',
            PlotColor::Yellow => 'y',
            PlotColor::Cyan => 'c',
        }
    }
}

/// Where and how an indicator is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotSpec {
    pub panel: u8,
    pub style: PlotStyle,
    pub color: PlotColor,
}

impl Default for PlotSpec {
    fn default() -> Self {
        Self {
            panel: PRICE_PANEL,
            style: PlotStyle::Line,
            color: PlotColor::Blue,
        }
    }
}

impl PlotSpec {
    pub fn new(panel: u8, style: PlotStyle, color: PlotColor) -> Self {
        Self {
            panel,
            style,
            color,
        }
    }

    /// Spec for indicators that are never rendered.
    pub fn hidden() -> Self {
        Self {
            panel: HIDDEN_PANEL,
            ..Self::default()
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.panel == HIDDEN_PANEL
    }
}

/// Encode the plot metadata into the `BarProcessed.indicators` key:
/// two decimal digits of panel, one style letter, one color letter, an
/// underscore, then the canonical indicator name.
pub fn encode_key(spec: &PlotSpec, name: &str) -> String {
    format!(
        "{:02}{}{}_{}",
        spec.panel,
        spec.style.letter(),
        spec.color.letter(),
        name
    )
}
