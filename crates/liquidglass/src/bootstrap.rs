use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use lensconfig::{LensConfig, RendererSettings, ResolvedLens, RevealSetting};
use page::{NodeId, Page, PageDescription, Viewport};
use renderer::{LensOptions, RendererConfig, RevealMode};
use serde_json::{json, Value};
use tracing::{debug, info};

pub fn load_config(path: Option<&Path>) -> Result<LensConfig> {
    let Some(path) = path else {
        debug!("no configuration supplied; using defaults");
        return Ok(LensConfig {
            version: 1,
            renderer: RendererSettings::default(),
            lens: Default::default(),
            presets: BTreeMap::new(),
        });
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration {}", path.display()))?;
    let config = LensConfig::from_toml_str(&text)
        .with_context(|| format!("invalid configuration {}", path.display()))?;
    info!(
        path = %path.display(),
        presets = config.presets.len(),
        "loaded lens configuration"
    );
    Ok(config)
}

pub fn load_page(path: &Path) -> Result<Page> {
    let description = PageDescription::load(path)
        .with_context(|| format!("failed to load page description {}", path.display()))?;
    let page = description
        .build()
        .with_context(|| format!("failed to build page from {}", path.display()))?;
    Ok(page)
}

/// Applies CLI viewport overrides, keeping whatever the description set.
pub fn override_viewport(page: &mut Page, size: Option<(u32, u32)>, dpr: Option<f32>) -> Result<()> {
    if size.is_none() && dpr.is_none() {
        return Ok(());
    }
    let current = page.viewport();
    let (width, height) = size
        .map(|(width, height)| (width as f32, height as f32))
        .unwrap_or((current.width, current.height));
    let dpr = dpr.unwrap_or(current.device_pixel_ratio);
    if !dpr.is_finite() || dpr <= 0.0 {
        bail!("device pixel ratio must be positive, got {dpr}");
    }
    page.set_viewport(Viewport::new(width, height, dpr));
    debug!(width, height, dpr, "viewport overridden from the command line");
    Ok(())
}

pub fn renderer_config(settings: &RendererSettings) -> RendererConfig {
    RendererConfig {
        capture_target: settings.capture_target.clone(),
        resolution: settings.resolution,
        max_dpr: settings.max_dpr,
        external_rasterizer: settings.external_rasterizer,
        scissor_expand: settings.scissor_expand,
        resize_debounce: settings.resize_debounce,
        scroll_settle: settings.scroll_settle,
        reveal_duration: settings.reveal_duration,
        reveal_curve: settings.reveal_curve,
        tilt_reset: settings.tilt_reset,
        mirror_teardown_timeout: settings.mirror_teardown_timeout,
    }
}

pub fn lens_options(resolved: &ResolvedLens) -> LensOptions {
    LensOptions {
        refraction: resolved.refraction,
        bevel_depth: resolved.bevel_depth,
        bevel_width: resolved.bevel_width,
        frost: resolved.frost,
        shadow: resolved.shadow,
        specular: resolved.specular,
        reveal: match resolved.reveal {
            RevealSetting::Fade => RevealMode::Fade,
            RevealSetting::Instant => RevealMode::Instant,
        },
        tilt: resolved.tilt,
        tilt_factor: resolved.tilt_factor,
        magnify: resolved.magnify,
    }
}

/// Preset selectors a node can match: `*`, its tag, `.class` and `#id`.
pub fn node_selectors(page: &Page, node: NodeId) -> Result<Vec<String>> {
    let data = page.node(node)?;
    let mut selectors = vec!["*".to_string(), data.tag.clone()];
    selectors.extend(data.classes.iter().map(|class| format!(".{class}")));
    selectors.extend(data.id.as_ref().map(|id| format!("#{id}")));
    Ok(selectors)
}

/// One glass host with its resolved options.
#[derive(Debug, Clone)]
pub struct PlannedLens {
    pub node: NodeId,
    pub selectors: Vec<String>,
    pub resolved: ResolvedLens,
}

impl PlannedLens {
    pub fn options(&self) -> LensOptions {
        lens_options(&self.resolved)
    }

    pub fn summary(&self) -> Value {
        let lens = &self.resolved;
        json!({
            "node": self.node.index(),
            "selectors": self.selectors,
            "refraction": lens.refraction,
            "bevel_depth": lens.bevel_depth,
            "bevel_width": lens.bevel_width,
            "frost": lens.frost,
            "shadow": lens.shadow,
            "specular": lens.specular,
            "reveal": lens.reveal,
            "tilt": lens.tilt,
            "tilt_factor": lens.tilt_factor,
            "magnify": lens.magnify,
        })
    }
}

/// Every node flagged as glass, with presets resolved over the lens defaults.
pub fn plan_lenses(page: &Page, config: &LensConfig) -> Result<Vec<PlannedLens>> {
    let root = page.root();
    let mut planned = Vec::new();
    for node in page.descendants(root) {
        if node == root || !page.node(node)?.glass_surface {
            continue;
        }
        let selectors = node_selectors(page, node)?;
        let resolved = config.resolve_lens(selectors.iter().map(String::as_str));
        planned.push(PlannedLens {
            node,
            selectors,
            resolved,
        });
    }
    Ok(planned)
}
