use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A declaration block keyed by lower-case property name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Style {
    properties: BTreeMap<String, String>,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `prop: value; prop: value`. Malformed declarations are dropped.
    pub fn parse(block: &str) -> Self {
        let mut style = Style::new();
        for declaration in split_declarations(block) {
            if let Some((name, value)) = declaration.split_once(':') {
                let name = name.trim();
                let value = value.trim();
                if !name.is_empty() && !value.is_empty() {
                    style.set(name, value);
                }
            }
        }
        style
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.properties
            .get(&property.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Sets a property, returning the previous value.
    pub fn set(&mut self, property: &str, value: impl Into<String>) -> Option<String> {
        self.properties
            .insert(property.trim().to_ascii_lowercase(), value.into())
    }

    pub fn remove(&mut self, property: &str) -> Option<String> {
        self.properties.remove(&property.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn to_css(&self) -> String {
        self.iter()
            .map(|(name, value)| format!("{name}: {value};"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Style {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut style = Style::new();
        for (name, value) in iter {
            style.set(&name.into(), value);
        }
        style
    }
}

fn split_declarations(block: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (index, ch) in block.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            ';' if depth == 0 => {
                parts.push(&block[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&block[start..]);
    parts
}

/// Initial value used when neither the node nor any style sheet declares a property.
pub fn initial_value(property: &str) -> &'static str {
    match property {
        "opacity" => "1",
        "background-color" => "transparent",
        "background-image" | "box-shadow" | "transform" | "backdrop-filter" | "clip-path"
        | "transition" | "filter" => "none",
        "z-index" | "pointer-events" => "auto",
        "position" => "static",
        "visibility" => "visible",
        "display" => "block",
        "color" => "#000",
        "border-radius" | "border-width" => "0",
        "border-color" => "currentcolor",
        "border-style" => "none",
        "font" => "16px sans-serif",
        "overflow" => "visible",
        _ => "",
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    Px(f32),
    Percent(f32),
}

impl Length {
    /// Accepts `px`, unitless numbers and percentages.
    pub fn parse(value: &str) -> Option<Length> {
        let value = value.trim();
        if let Some(percent) = value.strip_suffix('%') {
            return percent.trim().parse().ok().map(Length::Percent);
        }
        let number = value.strip_suffix("px").unwrap_or(value);
        number.trim().parse().ok().map(Length::Px)
    }

    pub fn resolve(self, reference: f32) -> f32 {
        match self {
            Length::Px(px) => px,
            Length::Percent(percent) => reference * percent / 100.0,
        }
    }
}

/// Resolves the first component of a `border-radius` value against a box.
///
/// Percentages resolve against the shorter side. The result is clamped to
/// half the shorter side.
pub fn resolve_border_radius(value: &str, width: f32, height: f32) -> f32 {
    let shorter = width.min(height).max(0.0);
    let first = value
        .split('/')
        .next()
        .and_then(|horizontal| horizontal.split_whitespace().next())
        .and_then(Length::parse)
        .map(|length| length.resolve(shorter))
        .unwrap_or(0.0);
    first.clamp(0.0, shorter * 0.5)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub italic: bool,
    pub weight: u16,
    pub size_px: f32,
    pub line_height_px: f32,
    pub family: String,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            italic: false,
            weight: 400,
            size_px: 16.0,
            line_height_px: 16.0 * 1.2,
            family: "sans-serif".to_string(),
        }
    }
}

impl FontSpec {
    /// Parses `[style] [weight] size[/line-height] family`.
    pub fn parse(shorthand: &str) -> Option<FontSpec> {
        let mut spec = FontSpec::default();
        let tokens: Vec<&str> = shorthand.split_whitespace().collect();
        let mut index = 0;
        while index < tokens.len() {
            let token = tokens[index].to_ascii_lowercase();
            match token.as_str() {
                "italic" | "oblique" => spec.italic = true,
                "normal" | "small-caps" => {}
                "bold" | "bolder" => spec.weight = 700,
                "lighter" => spec.weight = 300,
                other => {
                    if let Ok(weight) = other.parse::<u16>() {
                        if (1..=1000).contains(&weight) {
                            spec.weight = weight;
                            index += 1;
                            continue;
                        }
                    }
                    break;
                }
            }
            index += 1;
        }

        let size_token = tokens.get(index)?;
        let (size, line_height) = match size_token.split_once('/') {
            Some((size, line_height)) => (size, Some(line_height)),
            None => (*size_token, None),
        };
        spec.size_px = match Length::parse(size)? {
            Length::Px(px) => px,
            Length::Percent(percent) => 16.0 * percent / 100.0,
        };
        spec.line_height_px = match line_height {
            Some(value) if value.ends_with("px") => Length::parse(value)?.resolve(spec.size_px),
            Some(value) if value.ends_with('%') => Length::parse(value)?.resolve(spec.size_px),
            Some(value) => value.parse::<f32>().ok()? * spec.size_px,
            None => spec.size_px * 1.2,
        };
        let family = tokens[index + 1..].join(" ");
        if !family.is_empty() {
            spec.family = family.replace(['"', '\''], "");
        }
        Some(spec)
    }

    pub fn to_css(&self) -> String {
        format!(
            "{}{} {}px/{}px {}",
            if self.italic { "italic " } else { "" },
            self.weight,
            self.size_px,
            self.line_height_px,
            self.family
        )
    }
}
