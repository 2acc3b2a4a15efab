//! CSS color parsing.
//!
//! Two entry points exist on purpose: [`Rgba::parse_legacy`] understands the
//! sRGB syntaxes every rasterizer supports (hex, `rgb()`, `hsl()`, named
//! colors) while [`Rgba::parse`] additionally converts the modern color-space
//! functions (`oklch()`, `oklab()`, `lab()`, `lch()`, `color()`) to sRGB the
//! way a browser's computed style would.

use std::f32::consts::PI;

/// Modern color functions that legacy rasterizers reject.
pub const MODERN_COLOR_FUNCTIONS: [&str; 5] = ["oklch", "oklab", "lab", "lch", "color"];

/// Straight-alpha sRGB color with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_u8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    pub fn to_u8(self) -> [u8; 4] {
        let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        [channel(self.r), channel(self.g), channel(self.b), channel(self.a)]
    }

    pub fn with_alpha(self, alpha: f32) -> Self {
        Self { a: alpha, ..self }
    }

    pub fn is_transparent(&self) -> bool {
        self.a <= f32::EPSILON
    }

    pub fn lerp(self, other: Rgba, t: f32) -> Rgba {
        let t = t.clamp(0.0, 1.0);
        Rgba::new(
            self.r + (other.r - self.r) * t,
            self.g + (other.g - self.g) * t,
            self.b + (other.b - self.b) * t,
            self.a + (other.a - self.a) * t,
        )
    }

    /// Serialises as `rgba(r, g, b, a)`, the form every consumer accepts.
    pub fn to_css(self) -> String {
        let [r, g, b, _] = self.to_u8();
        let alpha = (self.a.clamp(0.0, 1.0) * 1000.0).round() / 1000.0;
        format!("rgba({r}, {g}, {b}, {alpha})")
    }

    /// Parses any supported CSS color, converting modern color spaces.
    pub fn parse(input: &str) -> Option<Rgba> {
        let value = input.trim().to_ascii_lowercase();
        if let Some(color) = parse_basic(&value) {
            return Some(color);
        }
        let (name, args) = split_function(&value)?;
        match name {
            "oklch" => parse_oklch(args),
            "oklab" => parse_oklab(args),
            "lab" => parse_lab(args),
            "lch" => parse_lch(args),
            "color" => parse_color_function(args),
            _ => None,
        }
    }

    /// Parses only legacy sRGB syntaxes; modern color functions yield `None`.
    pub fn parse_legacy(input: &str) -> Option<Rgba> {
        parse_basic(&input.trim().to_ascii_lowercase())
    }
}

fn parse_basic(value: &str) -> Option<Rgba> {
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(color) = named_color(value) {
        return Some(color);
    }
    let (name, args) = split_function(value)?;
    match name {
        "rgb" | "rgba" => parse_rgb(args),
        "hsl" | "hsla" => parse_hsl(args),
        _ => None,
    }
}

fn split_function(value: &str) -> Option<(&str, &str)> {
    let open = value.find('(')?;
    let inner = value[open + 1..].strip_suffix(')')?;
    Some((value[..open].trim(), inner))
}

/// Splits function arguments on commas, whitespace, and the alpha slash.
///
/// Returns the channel components and the optional alpha component.
fn components(args: &str) -> (Vec<&str>, Option<&str>) {
    let (channels, alpha) = match args.split_once('/') {
        Some((channels, alpha)) => (channels, Some(alpha.trim())),
        None => (args, None),
    };
    let mut parts: Vec<&str> = channels
        .split(|ch: char| ch == ',' || ch.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect();
    // Legacy comma syntax carries alpha as a fourth component.
    let alpha = match alpha {
        Some(alpha) => Some(alpha),
        None if parts.len() == 4 => parts.pop(),
        None => None,
    };
    (parts, alpha)
}

fn parse_number(token: &str) -> Option<f32> {
    if token == "none" {
        return Some(0.0);
    }
    token.parse::<f32>().ok().filter(|value| value.is_finite())
}

/// Parses a number or percentage; percentages are mapped onto `percent_scale`.
fn parse_scaled(token: &str, percent_scale: f32) -> Option<f32> {
    match token.strip_suffix('%') {
        Some(percent) => parse_number(percent).map(|value| value / 100.0 * percent_scale),
        None => parse_number(token),
    }
}

fn parse_alpha(token: Option<&str>) -> Option<f32> {
    match token {
        None => Some(1.0),
        Some(token) => parse_scaled(token, 1.0).map(|value| value.clamp(0.0, 1.0)),
    }
}

/// Parses a hue in degrees, honouring `deg`, `rad`, `grad`, and `turn` units.
pub(crate) fn parse_hue(token: &str) -> Option<f32> {
    if let Some(value) = token.strip_suffix("deg") {
        parse_number(value)
    } else if let Some(value) = token.strip_suffix("grad") {
        parse_number(value).map(|grad| grad * 0.9)
    } else if let Some(value) = token.strip_suffix("rad") {
        parse_number(value).map(|rad| rad.to_degrees())
    } else if let Some(value) = token.strip_suffix("turn") {
        parse_number(value).map(|turn| turn * 360.0)
    } else {
        parse_number(token)
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |index: usize| u8::from_str_radix(&hex[index..index + 1], 16).ok();
    let byte = |index: usize| u8::from_str_radix(&hex[index..index + 2], 16).ok();
    match hex.len() {
        3 | 4 => {
            let r = nibble(0)? * 17;
            let g = nibble(1)? * 17;
            let b = nibble(2)? * 17;
            let a = if hex.len() == 4 { nibble(3)? * 17 } else { 255 };
            Some(Rgba::from_u8(r, g, b, a))
        }
        6 | 8 => {
            let a = if hex.len() == 8 { byte(6)? } else { 255 };
            Some(Rgba::from_u8(byte(0)?, byte(2)?, byte(4)?, a))
        }
        _ => None,
    }
}

fn parse_rgb(args: &str) -> Option<Rgba> {
    let (parts, alpha) = components(args);
    if parts.len() != 3 {
        return None;
    }
    let channel = |token: &str| parse_scaled(token, 255.0).map(|v| (v / 255.0).clamp(0.0, 1.0));
    Some(Rgba::new(
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
        parse_alpha(alpha)?,
    ))
}

fn parse_hsl(args: &str) -> Option<Rgba> {
    let (parts, alpha) = components(args);
    if parts.len() != 3 {
        return None;
    }
    let hue = parse_hue(parts[0])?.rem_euclid(360.0) / 360.0;
    let saturation = parse_scaled(parts[1], 1.0)?.clamp(0.0, 1.0);
    let lightness = parse_scaled(parts[2], 1.0)?.clamp(0.0, 1.0);
    let (r, g, b) = hsl_to_rgb(hue, saturation, lightness);
    Some(Rgba::new(r, g, b, parse_alpha(alpha)?))
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s <= 0.0 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let channel = |mut t: f32| {
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };
    (channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0))
}

fn parse_oklab(args: &str) -> Option<Rgba> {
    let (parts, alpha) = components(args);
    if parts.len() != 3 {
        return None;
    }
    let l = parse_scaled(parts[0], 1.0)?;
    let a = parse_scaled(parts[1], 0.4)?;
    let b = parse_scaled(parts[2], 0.4)?;
    Some(from_linear(oklab_to_linear_srgb(l, a, b), parse_alpha(alpha)?))
}

fn parse_oklch(args: &str) -> Option<Rgba> {
    let (parts, alpha) = components(args);
    if parts.len() != 3 {
        return None;
    }
    let l = parse_scaled(parts[0], 1.0)?;
    let chroma = parse_scaled(parts[1], 0.4)?.max(0.0);
    let hue = parse_hue(parts[2])? * PI / 180.0;
    let (a, b) = (chroma * hue.cos(), chroma * hue.sin());
    Some(from_linear(oklab_to_linear_srgb(l, a, b), parse_alpha(alpha)?))
}

fn parse_lab(args: &str) -> Option<Rgba> {
    let (parts, alpha) = components(args);
    if parts.len() != 3 {
        return None;
    }
    let l = parse_scaled(parts[0], 100.0)?;
    let a = parse_scaled(parts[1], 125.0)?;
    let b = parse_scaled(parts[2], 125.0)?;
    Some(from_linear(lab_to_linear_srgb(l, a, b), parse_alpha(alpha)?))
}

fn parse_lch(args: &str) -> Option<Rgba> {
    let (parts, alpha) = components(args);
    if parts.len() != 3 {
        return None;
    }
    let l = parse_scaled(parts[0], 100.0)?;
    let chroma = parse_scaled(parts[1], 150.0)?.max(0.0);
    let hue = parse_hue(parts[2])? * PI / 180.0;
    Some(from_linear(
        lab_to_linear_srgb(l, chroma * hue.cos(), chroma * hue.sin()),
        parse_alpha(alpha)?,
    ))
}

fn parse_color_function(args: &str) -> Option<Rgba> {
    let (parts, alpha) = components(args);
    if parts.len() != 4 {
        return None;
    }
    let channel = |token: &str| parse_scaled(token, 1.0);
    let (r, g, b) = (channel(parts[1])?, channel(parts[2])?, channel(parts[3])?);
    let alpha = parse_alpha(alpha)?;
    match parts[0] {
        "srgb" => Some(Rgba::new(
            r.clamp(0.0, 1.0),
            g.clamp(0.0, 1.0),
            b.clamp(0.0, 1.0),
            alpha,
        )),
        "srgb-linear" => Some(from_linear([r, g, b], alpha)),
        "display-p3" => {
            let linear = [to_linear(r), to_linear(g), to_linear(b)];
            let xyz = mul3(&P3_TO_XYZ_D65, linear);
            Some(from_linear(mul3(&XYZ_D65_TO_LINEAR_SRGB, xyz), alpha))
        }
        _ => None,
    }
}

const XYZ_D65_TO_LINEAR_SRGB: [[f32; 3]; 3] = [
    [3.240_97, -1.537_383, -0.498_610_76],
    [-0.969_243_6, 1.875_967_5, 0.041_555_06],
    [0.055_630_08, -0.203_976_96, 1.056_971_5],
];

const D50_TO_D65: [[f32; 3]; 3] = [
    [0.955_473_4, -0.023_098_537, 0.063_259_31],
    [-0.028_369_706, 1.009_995_5, 0.021_041_399],
    [0.012_314_002, -0.020_507_697, 1.330_366],
];

const P3_TO_XYZ_D65: [[f32; 3]; 3] = [
    [0.486_570_95, 0.265_667_7, 0.198_217_29],
    [0.228_974_56, 0.691_738_5, 0.079_286_91],
    [0.0, 0.045_113_38, 1.043_944_4],
];

fn mul3(matrix: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    let row = |r: &[f32; 3]| r[0] * v[0] + r[1] * v[1] + r[2] * v[2];
    [row(&matrix[0]), row(&matrix[1]), row(&matrix[2])]
}

fn oklab_to_linear_srgb(l: f32, a: f32, b: f32) -> [f32; 3] {
    let l_ = l + 0.396_337_78 * a + 0.215_803_76 * b;
    let m_ = l - 0.105_561_346 * a - 0.063_854_17 * b;
    let s_ = l - 0.089_484_18 * a - 1.291_485_5 * b;
    let (l3, m3, s3) = (l_ * l_ * l_, m_ * m_ * m_, s_ * s_ * s_);
    [
        4.076_741_7 * l3 - 3.307_711_6 * m3 + 0.230_969_94 * s3,
        -1.268_438 * l3 + 2.609_757_4 * m3 - 0.341_319_38 * s3,
        -0.004_196_086_3 * l3 - 0.703_418_6 * m3 + 1.707_614_7 * s3,
    ]
}

fn lab_to_linear_srgb(l: f32, a: f32, b: f32) -> [f32; 3] {
    const EPSILON: f32 = 216.0 / 24389.0;
    const KAPPA: f32 = 24389.0 / 27.0;
    const WHITE_D50: [f32; 3] = [0.964_22, 1.0, 0.825_21];

    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;
    let x = if fx.powi(3) > EPSILON {
        fx.powi(3)
    } else {
        (116.0 * fx - 16.0) / KAPPA
    };
    let y = if l > KAPPA * EPSILON {
        fy.powi(3)
    } else {
        l / KAPPA
    };
    let z = if fz.powi(3) > EPSILON {
        fz.powi(3)
    } else {
        (116.0 * fz - 16.0) / KAPPA
    };
    let xyz_d50 = [x * WHITE_D50[0], y * WHITE_D50[1], z * WHITE_D50[2]];
    mul3(&XYZ_D65_TO_LINEAR_SRGB, mul3(&D50_TO_D65, xyz_d50))
}

fn to_linear(channel: f32) -> f32 {
    let magnitude = channel.abs();
    let linear = if magnitude <= 0.040_45 {
        magnitude / 12.92
    } else {
        ((magnitude + 0.055) / 1.055).powf(2.4)
    };
    linear.copysign(channel)
}

fn to_gamma(channel: f32) -> f32 {
    let channel = channel.clamp(0.0, 1.0);
    if channel <= 0.003_130_8 {
        channel * 12.92
    } else {
        1.055 * channel.powf(1.0 / 2.4) - 0.055
    }
}

fn from_linear(rgb: [f32; 3], alpha: f32) -> Rgba {
    Rgba::new(to_gamma(rgb[0]), to_gamma(rgb[1]), to_gamma(rgb[2]), alpha)
}

fn named_color(name: &str) -> Option<Rgba> {
    let (r, g, b) = match name {
        "transparent" => return Some(Rgba::TRANSPARENT),
        "black" => (0, 0, 0),
        "white" => (255, 255, 255),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "lime" => (0, 255, 0),
        "blue" => (0, 0, 255),
        "yellow" => (255, 255, 0),
        "cyan" | "aqua" => (0, 255, 255),
        "magenta" | "fuchsia" => (255, 0, 255),
        "gray" | "grey" => (128, 128, 128),
        "silver" => (192, 192, 192),
        "lightgray" | "lightgrey" => (211, 211, 211),
        "darkgray" | "darkgrey" => (169, 169, 169),
        "whitesmoke" => (245, 245, 245),
        "maroon" => (128, 0, 0),
        "olive" => (128, 128, 0),
        "teal" => (0, 128, 128),
        "navy" => (0, 0, 128),
        "purple" => (128, 0, 128),
        "rebeccapurple" => (102, 51, 153),
        "orange" => (255, 165, 0),
        "pink" => (255, 192, 203),
        "brown" => (165, 42, 42),
        "gold" => (255, 215, 0),
        "indigo" => (75, 0, 130),
        "violet" => (238, 130, 238),
        "skyblue" => (135, 206, 235),
        "salmon" => (250, 128, 114),
        "coral" => (255, 127, 80),
        "tomato" => (255, 99, 71),
        "beige" => (245, 245, 220),
        "slategray" | "slategrey" => (112, 128, 144),
        _ => return None,
    };
    Some(Rgba::from_u8(r, g, b, 255))
}

/// Returns true when `text` contains a call to a modern color function.
pub fn contains_modern_color(text: &str) -> bool {
    find_modern_call(&text.to_ascii_lowercase(), 0).is_some()
}

/// Replaces every modern color function call in `text` with an `rgba()`
/// equivalent. Returns `None` when nothing was replaced.
///
/// Calls that fail to parse are replaced with `rgba(0, 0, 0, 0)` so the
/// result never contains syntax a legacy consumer would reject.
pub fn replace_modern_colors(text: &str) -> Option<String> {
    let lowered = text.to_ascii_lowercase();
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut replaced = false;
    while let Some((start, end)) = find_modern_call(&lowered, cursor) {
        output.push_str(&text[cursor..start]);
        let color = Rgba::parse(&lowered[start..end]).unwrap_or(Rgba::TRANSPARENT);
        output.push_str(&color.to_css());
        cursor = end;
        replaced = true;
    }
    if !replaced {
        return None;
    }
    output.push_str(&text[cursor..]);
    Some(output)
}

/// Locates the next `name(...)` span of a modern color function at or after
/// `from`, returning byte offsets covering the name and closing parenthesis.
fn find_modern_call(lowered: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = lowered.as_bytes();
    let mut index = from;
    while index < bytes.len() {
        let is_boundary = index == 0 || !is_ident_byte(bytes[index - 1]);
        if is_boundary {
            for name in MODERN_COLOR_FUNCTIONS {
                let open = index + name.len();
                if bytes[index..].starts_with(name.as_bytes()) && bytes.get(open) == Some(&b'(') {
                    if let Some(close) = matching_paren(bytes, open) {
                        return Some((index, close + 1));
                    }
                }
            }
        }
        index += 1;
    }
    None
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_'
}

fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, byte) in bytes[open..].iter().enumerate() {
        match byte {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(color: Rgba, expected: [u8; 4]) {
        let actual = color.to_u8();
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!(
                (*a as i32 - *e as i32).abs() <= 2,
                "expected {expected:?}, got {actual:?}"
            );
        }
    }

    #[test]
    fn parses_hex_forms() {
        assert_eq!(Rgba::parse("#fff").unwrap().to_u8(), [255, 255, 255, 255]);
        assert_eq!(Rgba::parse("#00000080").unwrap().to_u8(), [0, 0, 0, 128]);
        assert_eq!(Rgba::parse("#1e90ff").unwrap().to_u8(), [30, 144, 255, 255]);
        assert!(Rgba::parse("#12345").is_none());
    }

    #[test]
    fn parses_rgb_comma_and_space_syntax() {
        assert_close(Rgba::parse("rgb(10, 20, 30)").unwrap(), [10, 20, 30, 255]);
        assert_close(
            Rgba::parse("rgba(10, 20, 30, 0.5)").unwrap(),
            [10, 20, 30, 128],
        );
        assert_close(
            Rgba::parse("rgb(100% 0% 0% / 25%)").unwrap(),
            [255, 0, 0, 64],
        );
    }

    #[test]
    fn parses_hsl() {
        assert_close(Rgba::parse("hsl(120, 100%, 50%)").unwrap(), [0, 255, 0, 255]);
        assert_close(Rgba::parse("hsl(0.5turn 100% 50%)").unwrap(), [0, 255, 255, 255]);
    }

    #[test]
    fn converts_oklch_and_oklab() {
        assert_close(Rgba::parse("oklch(1 0 0)").unwrap(), [255, 255, 255, 255]);
        assert_close(Rgba::parse("oklch(0% 0 0)").unwrap(), [0, 0, 0, 255]);
        // Pure sRGB red expressed in OKLCH.
        assert_close(
            Rgba::parse("oklch(62.8% 0.2577 29.23)").unwrap(),
            [255, 0, 0, 255],
        );
        assert_close(
            Rgba::parse("oklab(0.628 0.2249 0.1258 / 0.5)").unwrap(),
            [255, 0, 0, 128],
        );
    }

    #[test]
    fn converts_lab_and_lch() {
        assert_close(Rgba::parse("lab(100 0 0)").unwrap(), [255, 255, 255, 255]);
        assert_close(Rgba::parse("lch(0 0 0)").unwrap(), [0, 0, 0, 255]);
        assert_close(
            Rgba::parse("lab(54.29 80.8 69.89)").unwrap(),
            [255, 0, 0, 255],
        );
    }

    #[test]
    fn converts_color_function() {
        assert_close(
            Rgba::parse("color(srgb 1 0.5 0)").unwrap(),
            [255, 128, 0, 255],
        );
        assert_close(
            Rgba::parse("color(display-p3 1 1 1)").unwrap(),
            [255, 255, 255, 255],
        );
    }

    #[test]
    fn legacy_parser_rejects_modern_functions() {
        assert!(Rgba::parse_legacy("oklch(0.7 0.1 200)").is_none());
        assert!(Rgba::parse_legacy("rgb(1, 2, 3)").is_some());
    }

    #[test]
    fn replaces_modern_calls_inside_gradients() {
        let input = "linear-gradient(90deg, oklch(1 0 0) 0%, #000 100%)";
        let replaced = replace_modern_colors(input).expect("replacement");
        assert_eq!(
            replaced,
            "linear-gradient(90deg, rgba(255, 255, 255, 1) 0%, #000 100%)"
        );
        assert!(replace_modern_colors("rgb(1, 2, 3)").is_none());
        assert!(contains_modern_color("LAB(50 0 0)"));
        assert!(!contains_modern_color("color: red"));
    }
}
