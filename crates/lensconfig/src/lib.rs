use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use scheduler::Curve;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RevealSetting {
    #[default]
    Fade,
    #[serde(rename = "none", alias = "instant")]
    Instant,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LensConfig {
    pub version: u32,
    #[serde(default)]
    pub renderer: RendererSettings,
    #[serde(default)]
    pub lens: LensOverrides,
    /// Per-selector overrides, applied over `lens` in selector specificity order.
    #[serde(default)]
    pub presets: BTreeMap<String, LensOverrides>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RendererSettings {
    #[serde(default = "default_capture_target")]
    pub capture_target: String,
    #[serde(default = "default_resolution")]
    pub resolution: f32,
    #[serde(default = "default_max_dpr")]
    pub max_dpr: f32,
    #[serde(default = "default_true")]
    pub external_rasterizer: bool,
    /// Pixels added around scissor clears under mirrored lenses.
    #[serde(default = "default_scissor_expand")]
    pub scissor_expand: u32,
    #[serde(
        default = "default_resize_debounce",
        deserialize_with = "deserialize_duration"
    )]
    pub resize_debounce: Duration,
    #[serde(
        default = "default_scroll_settle",
        deserialize_with = "deserialize_duration"
    )]
    pub scroll_settle: Duration,
    #[serde(
        default = "default_reveal_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub reveal_duration: Duration,
    #[serde(default)]
    pub reveal_curve: Curve,
    #[serde(
        default = "default_tilt_reset",
        deserialize_with = "deserialize_duration"
    )]
    pub tilt_reset: Duration,
    #[serde(
        default = "default_mirror_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub mirror_teardown_timeout: Duration,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            capture_target: default_capture_target(),
            resolution: default_resolution(),
            max_dpr: default_max_dpr(),
            external_rasterizer: true,
            scissor_expand: default_scissor_expand(),
            resize_debounce: default_resize_debounce(),
            scroll_settle: default_scroll_settle(),
            reveal_duration: default_reveal_duration(),
            reveal_curve: Curve::default(),
            tilt_reset: default_tilt_reset(),
            mirror_teardown_timeout: default_mirror_timeout(),
        }
    }
}

/// Optional lens fields; unset fields fall through to the next layer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LensOverrides {
    pub refraction: Option<f32>,
    pub bevel_depth: Option<f32>,
    pub bevel_width: Option<f32>,
    pub frost: Option<f32>,
    pub shadow: Option<bool>,
    pub specular: Option<bool>,
    pub reveal: Option<RevealSetting>,
    pub tilt: Option<bool>,
    pub tilt_factor: Option<f32>,
    pub magnify: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedLens {
    pub refraction: f32,
    pub bevel_depth: f32,
    pub bevel_width: f32,
    pub frost: f32,
    pub shadow: bool,
    pub specular: bool,
    pub reveal: RevealSetting,
    pub tilt: bool,
    pub tilt_factor: f32,
    pub magnify: f32,
}

impl Default for ResolvedLens {
    fn default() -> Self {
        Self {
            refraction: 0.69,
            bevel_depth: 0.052,
            bevel_width: 0.211,
            frost: 0.0,
            shadow: true,
            specular: true,
            reveal: RevealSetting::Fade,
            tilt: false,
            tilt_factor: 5.0,
            magnify: 1.0,
        }
    }
}

impl LensOverrides {
    pub fn apply(&self, base: ResolvedLens) -> ResolvedLens {
        ResolvedLens {
            refraction: self.refraction.unwrap_or(base.refraction),
            bevel_depth: self.bevel_depth.unwrap_or(base.bevel_depth),
            bevel_width: self.bevel_width.unwrap_or(base.bevel_width),
            frost: self.frost.unwrap_or(base.frost),
            shadow: self.shadow.unwrap_or(base.shadow),
            specular: self.specular.unwrap_or(base.specular),
            reveal: self.reveal.unwrap_or(base.reveal),
            tilt: self.tilt.unwrap_or(base.tilt),
            tilt_factor: self.tilt_factor.unwrap_or(base.tilt_factor),
            magnify: self.magnify.unwrap_or(base.magnify),
        }
    }

    fn validate(&self, scope: &str) -> Result<(), ConfigError> {
        let non_negative = [
            ("refraction", self.refraction),
            ("frost", self.frost),
            ("tilt_factor", self.tilt_factor),
        ];
        for (name, value) in non_negative {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "{scope}.{name} must be >= 0"
                    )));
                }
            }
        }
        let unit = [
            ("bevel_depth", self.bevel_depth),
            ("bevel_width", self.bevel_width),
        ];
        for (name, value) in unit {
            if let Some(value) = value {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ConfigError::Invalid(format!(
                        "{scope}.{name} must be within 0..=1"
                    )));
                }
            }
        }
        if let Some(magnify) = self.magnify {
            if !magnify.is_finite() || magnify <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{scope}.magnify must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            version: 1,
            renderer: RendererSettings::default(),
            lens: LensOverrides::default(),
            presets: BTreeMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_capture_target() -> String {
    "body".to_string()
}

fn default_resolution() -> f32 {
    2.0
}

fn default_max_dpr() -> f32 {
    2.0
}

fn default_scissor_expand() -> u32 {
    2
}

fn default_resize_debounce() -> Duration {
    Duration::from_millis(250)
}

fn default_scroll_settle() -> Duration {
    Duration::from_millis(200)
}

fn default_reveal_duration() -> Duration {
    Duration::from_millis(1000)
}

fn default_tilt_reset() -> Duration {
    Duration::from_millis(400)
}

fn default_mirror_timeout() -> Duration {
    Duration::from_millis(600)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() || !v.is_finite() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl LensConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: LensConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Lens defaults with the `[lens]` table applied.
    pub fn lens_defaults(&self) -> ResolvedLens {
        self.lens.apply(ResolvedLens::default())
    }

    /// Presets ordered `*`, tag, class, id so later entries win like CSS specificity.
    pub fn presets_by_specificity(&self) -> Vec<(&str, &LensOverrides)> {
        let mut presets: Vec<(&str, &LensOverrides)> = self
            .presets
            .iter()
            .map(|(selector, overrides)| (selector.as_str(), overrides))
            .collect();
        presets.sort_by_key(|(selector, _)| selector_rank(selector));
        presets
    }

    /// Resolves a lens whose host matches the given preset selectors.
    pub fn resolve_lens<'a>(&self, matching: impl IntoIterator<Item = &'a str>) -> ResolvedLens {
        let matching: Vec<&str> = matching.into_iter().collect();
        self.presets_by_specificity()
            .into_iter()
            .filter(|(selector, _)| matching.contains(selector))
            .fold(self.lens_defaults(), |lens, (_, overrides)| {
                overrides.apply(lens)
            })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let renderer = &self.renderer;
        if renderer.capture_target.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "renderer.capture_target may not be empty".into(),
            ));
        }
        validate_selector(&renderer.capture_target)?;
        if !renderer.resolution.is_finite() || renderer.resolution <= 0.0 {
            return Err(ConfigError::Invalid(
                "renderer.resolution must be greater than zero".into(),
            ));
        }
        if !(1.0..=4.0).contains(&renderer.max_dpr) {
            return Err(ConfigError::Invalid(
                "renderer.max_dpr must be within 1..=4".into(),
            ));
        }
        if renderer.tilt_reset.is_zero() {
            return Err(ConfigError::Invalid(
                "renderer.tilt_reset must be greater than zero".into(),
            ));
        }
        if renderer.mirror_teardown_timeout < renderer.tilt_reset {
            return Err(ConfigError::Invalid(
                "renderer.mirror_teardown_timeout must not be shorter than tilt_reset".into(),
            ));
        }

        self.lens.validate("lens")?;
        for (selector, overrides) in &self.presets {
            validate_selector(selector)?;
            overrides.validate(&format!("presets.\"{selector}\""))?;
        }
        Ok(())
    }
}

fn selector_rank(selector: &str) -> u8 {
    if selector == "*" {
        0
    } else if selector.starts_with('#') {
        3
    } else if selector.starts_with('.') {
        2
    } else {
        1
    }
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    let name = selector
        .strip_prefix('#')
        .or_else(|| selector.strip_prefix('.'))
        .unwrap_or(selector);
    let valid = selector == "*"
        || (!name.is_empty()
            && name
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "selector '{selector}' is invalid; expected '*', 'tag', '.class' or '#id'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
version = 1

[renderer]
capture_target = "#app"
resolution = 1.5
resize_debounce = "300ms"
reveal_duration = 2
reveal_curve = "smoothstep"

[lens]
frost = 1.5

[presets."*"]
magnify = 1.1

[presets.".card"]
tilt = true
reveal = "none"

[presets."#hero"]
tilt_factor = 8.0
"##;

    #[test]
    fn parses_sample_config() {
        let config = LensConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.renderer.capture_target, "#app");
        assert_eq!(config.renderer.resize_debounce, Duration::from_millis(300));
        assert_eq!(config.renderer.reveal_duration, Duration::from_secs(2));
        assert_eq!(config.renderer.reveal_curve, Curve::Smoothstep);
        assert_eq!(config.renderer.scroll_settle, Duration::from_millis(200));
        assert_eq!(config.renderer.max_dpr, 2.0);
    }

    #[test]
    fn presets_apply_in_specificity_order() {
        let config = LensConfig::from_toml_str(SAMPLE).unwrap();
        let plain = config.resolve_lens(["*"]);
        assert_eq!(plain.frost, 1.5);
        assert_eq!(plain.magnify, 1.1);
        assert!(!plain.tilt);

        let hero = config.resolve_lens(["#hero", ".card", "*"]);
        assert!(hero.tilt);
        assert_eq!(hero.reveal, RevealSetting::Instant);
        assert_eq!(hero.tilt_factor, 8.0);
        assert_eq!(hero.refraction, 0.69);
    }

    #[test]
    fn defaults_without_tables() {
        let config = LensConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config.renderer.resolution, 2.0);
        assert_eq!(config.renderer.reveal_duration, Duration::from_secs(1));
        assert_eq!(config.lens_defaults(), ResolvedLens::default());
    }

    #[test]
    fn rejects_bad_values() {
        let cases = [
            "version = 2",
            "version = 1\n[renderer]\nresolution = 0",
            "version = 1\n[renderer]\nmax_dpr = 8.0",
            "version = 1\n[renderer]\ncapture_target = \"div > p\"",
            "version = 1\n[lens]\nbevel_width = 1.5",
            "version = 1\n[lens]\nmagnify = 0.0",
            "version = 1\n[presets.\"a b\"]\nfrost = 1.0",
            "version = 1\n[renderer]\ntilt_reset = \"1s\"\nmirror_teardown_timeout = \"500ms\"",
        ];
        for case in cases {
            let err = LensConfig::from_toml_str(case).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{case}");
        }
        assert!(matches!(
            LensConfig::from_toml_str("version = 1\n[renderer]\nresize_debounce = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
