//! Count-to-colour mapping shared by every renderer.

use serde::Serialize;

pub const NEUTRAL_CSS: &str = "#f3f4f6";
pub const NEUTRAL_RGB: (u8, u8, u8) = (0xf3, 0xf4, 0xf6);

const HUE: f64 = 0.0;
const SATURATION: f64 = 0.85;
const GRADIENT_STEPS: u32 = 20;

pub fn intensity(count: u32, max: u32) -> f64 {
    if max == 0 {
        0.0
    } else {
        f64::from(count) / f64::from(max)
    }
}

pub fn lightness(t: f64) -> f64 {
    95.0 - 70.0 * t
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CellShade {
    Neutral,
    Heat { lightness: f64, light_text: bool },
}

impl CellShade {
    fn from_intensity(t: f64) -> Self {
        let lightness = lightness(t);
        Self::Heat {
            lightness,
            light_text: lightness < 60.0,
        }
    }

    pub fn css(&self) -> String {
        match self {
            Self::Neutral => NEUTRAL_CSS.to_owned(),
            Self::Heat { lightness, .. } => format!("hsl(0, 85%, {lightness}%)"),
        }
    }

    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            Self::Neutral => NEUTRAL_RGB,
            Self::Heat { lightness, .. } => hsl_to_rgb(HUE, SATURATION, lightness / 100.0),
        }
    }

    pub fn light_text(&self) -> bool {
        matches!(self, Self::Heat { light_text: true, .. })
    }
}

/// Zero counts are always neutral, whatever the scale.
pub fn cell_shade(count: u32, max: u32) -> CellShade {
    if count == 0 {
        CellShade::Neutral
    } else {
        CellShade::from_intensity(intensity(count, max))
    }
}

/// 21 evenly spaced stops from `t = 0` to `t = 1`.
pub fn legend_gradient() -> Vec<CellShade> {
    (0..=GRADIENT_STEPS)
        .map(|i| CellShade::from_intensity(f64::from(i) / f64::from(GRADIENT_STEPS)))
        .collect()
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = (h / 60.0).rem_euclid(6.0);
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (channel(r), channel(g), channel(b))
}
