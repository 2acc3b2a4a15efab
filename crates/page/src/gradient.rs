//! `linear-gradient()` / `radial-gradient()` parsing and stop resolution.

use crate::color::{parse_hue, Rgba};
use crate::geometry::Rect;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopPosition {
    Percent(f32),
    Px(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorStop {
    pub color: Rgba,
    pub position: Option<StopPosition>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradientDirection {
    /// CSS angle: `0deg` points up, angles grow clockwise.
    Angle(f32),
    /// `to <vertical> <horizontal>`; signs are `-1` (top/left) or `1` (bottom/right).
    Corner { horizontal: i8, vertical: i8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearGradient {
    pub direction: GradientDirection,
    pub stops: Vec<ColorStop>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadialShape {
    Circle,
    Ellipse,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadialGradient {
    pub shape: RadialShape,
    /// Center as fractions of the box.
    pub center: (f32, f32),
    pub stops: Vec<ColorStop>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Gradient {
    Linear(LinearGradient),
    Radial(RadialGradient),
}

impl Gradient {
    /// Parses the first gradient found in a `background-image` value.
    ///
    /// `color_parser` decides which color syntaxes are accepted so callers can
    /// choose between legacy-only and full parsing.
    pub fn parse_with(value: &str, color_parser: fn(&str) -> Option<Rgba>) -> Option<Gradient> {
        let value = value.trim();
        let lowered = value.to_ascii_lowercase();
        let start = lowered.find("gradient(")?;
        let name_start = lowered[..start]
            .rfind(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-'))
            .map(|index| index + 1)
            .unwrap_or(0);
        let name = &lowered[name_start..start];
        let open = start + "gradient".len();
        let close = matching_paren(&lowered, open)?;
        let args = &value[open + 1..close];
        match name {
            "linear-" | "repeating-linear-" => parse_linear(args, color_parser).map(Gradient::Linear),
            "radial-" | "repeating-radial-" => parse_radial(args, color_parser).map(Gradient::Radial),
            _ => None,
        }
    }

    pub fn parse(value: &str) -> Option<Gradient> {
        Self::parse_with(value, Rgba::parse)
    }

    pub fn stops(&self) -> &[ColorStop] {
        match self {
            Gradient::Linear(linear) => &linear.stops,
            Gradient::Radial(radial) => &radial.stops,
        }
    }
}

impl LinearGradient {
    pub fn parse(value: &str) -> Option<LinearGradient> {
        match Gradient::parse(value)? {
            Gradient::Linear(linear) => Some(linear),
            Gradient::Radial(_) => None,
        }
    }

    /// Resolves the direction to a CSS angle (degrees) for a box of the given size.
    pub fn angle_for(&self, width: f32, height: f32) -> f32 {
        match self.direction {
            GradientDirection::Angle(angle) => angle,
            GradientDirection::Corner {
                horizontal,
                vertical,
            } => {
                let diagonal = height.max(f32::EPSILON).atan2(width.max(f32::EPSILON)).to_degrees();
                match (horizontal, vertical) {
                    (1, -1) => diagonal,
                    (1, _) => 180.0 - diagonal,
                    (_, 1) => 180.0 + diagonal,
                    _ => 360.0 - diagonal,
                }
            }
        }
    }

    /// Start and end points of the gradient line for `rect`.
    pub fn line(&self, rect: &Rect) -> ((f32, f32), (f32, f32)) {
        let angle = self.angle_for(rect.width, rect.height).to_radians();
        let (sin, cos) = angle.sin_cos();
        let length = (rect.width * sin).abs() + (rect.height * cos).abs();
        let (cx, cy) = rect.center();
        let (dx, dy) = (sin * length * 0.5, -cos * length * 0.5);
        ((cx - dx, cy - dy), (cx + dx, cy + dy))
    }

    pub fn line_length(&self, rect: &Rect) -> f32 {
        let ((x0, y0), (x1, y1)) = self.line(rect);
        ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt()
    }
}

/// Resolves stop positions to offsets in `0.0..=1.0`.
///
/// Missing first/last positions become 0 and 1, positions never decrease,
/// and runs of unpositioned stops are spread evenly between their neighbours.
pub fn resolve_stops(stops: &[ColorStop], line_length: f32) -> Vec<(f32, Rgba)> {
    if stops.is_empty() {
        return Vec::new();
    }
    let length = line_length.max(f32::EPSILON);
    let mut offsets: Vec<Option<f32>> = stops
        .iter()
        .map(|stop| {
            stop.position.map(|position| match position {
                StopPosition::Percent(percent) => percent / 100.0,
                StopPosition::Px(px) => px / length,
            })
        })
        .collect();

    let last = offsets.len() - 1;
    if offsets[0].is_none() {
        offsets[0] = Some(0.0);
    }
    if offsets[last].is_none() {
        offsets[last] = Some(1.0);
    }

    let mut previous = f32::MIN;
    for offset in offsets.iter_mut().flatten() {
        if *offset < previous {
            *offset = previous;
        }
        previous = *offset;
    }

    let mut index = 0;
    while index < offsets.len() {
        if offsets[index].is_some() {
            index += 1;
            continue;
        }
        let run_start = index - 1;
        let mut run_end = index;
        while offsets[run_end].is_none() {
            run_end += 1;
        }
        let from = offsets[run_start].unwrap_or(0.0);
        let to = offsets[run_end].unwrap_or(1.0);
        let steps = (run_end - run_start) as f32;
        for (step, slot) in offsets[index..run_end].iter_mut().enumerate() {
            *slot = Some(from + (to - from) * (step as f32 + 1.0) / steps);
        }
        index = run_end;
    }

    offsets
        .into_iter()
        .zip(stops.iter())
        .map(|(offset, stop)| (offset.unwrap_or(0.0), stop.color))
        .collect()
}

fn parse_linear(args: &str, color_parser: fn(&str) -> Option<Rgba>) -> Option<LinearGradient> {
    let parts = split_top_level(args, ',');
    let mut iter = parts.iter().map(|part| part.trim()).peekable();
    let mut direction = GradientDirection::Angle(180.0);
    if let Some(first) = iter.peek() {
        if let Some(parsed) = parse_direction(first) {
            direction = parsed;
            iter.next();
        }
    }
    let stops = parse_stops(iter, color_parser)?;
    Some(LinearGradient { direction, stops })
}

fn parse_radial(args: &str, color_parser: fn(&str) -> Option<Rgba>) -> Option<RadialGradient> {
    let parts = split_top_level(args, ',');
    let mut iter = parts.iter().map(|part| part.trim()).peekable();
    let mut shape = RadialShape::Ellipse;
    let mut center = (0.5, 0.5);
    if let Some(first) = iter.peek() {
        let lowered = first.to_ascii_lowercase();
        if color_parser(first).is_none() && parse_stop_tokens(first, color_parser).is_none() {
            if lowered.contains("circle") {
                shape = RadialShape::Circle;
            }
            if let Some((_, position)) = lowered.split_once("at ") {
                center = parse_position(position);
            }
            iter.next();
        }
    }
    let stops = parse_stops(iter, color_parser)?;
    Some(RadialGradient {
        shape,
        center,
        stops,
    })
}

fn parse_position(value: &str) -> (f32, f32) {
    let mut x = 0.5;
    let mut y = 0.5;
    let tokens: Vec<&str> = value.split_whitespace().collect();
    for (index, token) in tokens.iter().enumerate() {
        match *token {
            "left" => x = 0.0,
            "right" => x = 1.0,
            "top" => y = 0.0,
            "bottom" => y = 1.0,
            "center" => {}
            other => {
                if let Some(percent) = other.strip_suffix('%').and_then(|v| v.parse::<f32>().ok()) {
                    if index == 0 {
                        x = percent / 100.0;
                    } else {
                        y = percent / 100.0;
                    }
                }
            }
        }
    }
    (x, y)
}

fn parse_direction(token: &str) -> Option<GradientDirection> {
    let lowered = token.to_ascii_lowercase();
    if let Some(sides) = lowered.strip_prefix("to ") {
        let mut horizontal = 0i8;
        let mut vertical = 0i8;
        for side in sides.split_whitespace() {
            match side {
                "left" => horizontal = -1,
                "right" => horizontal = 1,
                "top" => vertical = -1,
                "bottom" => vertical = 1,
                _ => return None,
            }
        }
        return match (horizontal, vertical) {
            (0, 0) => None,
            (0, -1) => Some(GradientDirection::Angle(0.0)),
            (1, 0) => Some(GradientDirection::Angle(90.0)),
            (0, 1) => Some(GradientDirection::Angle(180.0)),
            (-1, 0) => Some(GradientDirection::Angle(270.0)),
            (horizontal, vertical) => Some(GradientDirection::Corner {
                horizontal,
                vertical,
            }),
        };
    }
    let has_unit = ["deg", "rad", "turn", "grad"]
        .iter()
        .any(|unit| lowered.ends_with(unit));
    if has_unit || lowered == "0" {
        return parse_hue(&lowered).map(GradientDirection::Angle);
    }
    None
}

fn parse_stops<'a>(
    parts: impl Iterator<Item = &'a str>,
    color_parser: fn(&str) -> Option<Rgba>,
) -> Option<Vec<ColorStop>> {
    let mut stops = Vec::new();
    for part in parts {
        if part.is_empty() {
            continue;
        }
        let parsed = parse_stop_tokens(part, color_parser)?;
        stops.extend(parsed);
    }
    if stops.len() < 2 {
        return None;
    }
    Some(stops)
}

/// Parses `color [pos [pos]]`, yielding one stop per position.
fn parse_stop_tokens(part: &str, color_parser: fn(&str) -> Option<Rgba>) -> Option<Vec<ColorStop>> {
    let tokens = split_top_level(part, ' ');
    let tokens: Vec<&str> = tokens.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).collect();
    let (color_token, positions) = tokens.split_first()?;
    let color = color_parser(color_token)?;
    if positions.is_empty() {
        return Some(vec![ColorStop {
            color,
            position: None,
        }]);
    }
    positions
        .iter()
        .map(|token| {
            parse_stop_position(token).map(|position| ColorStop {
                color,
                position: Some(position),
            })
        })
        .collect()
}

fn parse_stop_position(token: &str) -> Option<StopPosition> {
    if let Some(percent) = token.strip_suffix('%') {
        return percent.parse().ok().map(StopPosition::Percent);
    }
    if let Some(px) = token.strip_suffix("px") {
        return px.parse().ok().map(StopPosition::Px);
    }
    if token == "0" {
        return Some(StopPosition::Px(0.0));
    }
    None
}

/// Splits on `separator` while ignoring separators nested in parentheses.
pub(crate) fn split_top_level(value: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (index, ch) in value.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ if ch == separator && depth == 0 => {
                parts.push(&value[start..index]);
                start = index + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

fn matching_paren(value: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (offset, ch) in value[open..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
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
