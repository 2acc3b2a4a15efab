//! Serializable page descriptions used to build a [`Page`] from TOML or JSON.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::color::Rgba;
use crate::error::PageError;
use crate::geometry::{Rect, Viewport};
use crate::style::Style;
use crate::stylesheet::{SheetOrigin, StyleSheet};
use crate::tree::{DeviceProfile, NodeId, Page};
use crate::video::{TestPattern, VideoElement};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PageDescription {
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub device: DeviceProfile,
    #[serde(default)]
    pub scroll_y: f32,
    #[serde(default)]
    pub stylesheets: Vec<SheetDescription>,
    #[serde(default)]
    pub body: NodeDescription,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SheetDescription {
    #[serde(default)]
    pub origin: SheetOrigin,
    pub css: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NodeDescription {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub class: Vec<String>,
    #[serde(default)]
    pub rect: Option<Rect>,
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ignore: bool,
    #[serde(default)]
    pub glass: bool,
    #[serde(default)]
    pub video: Option<VideoDescription>,
    #[serde(default)]
    pub children: Vec<NodeDescription>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoDescription {
    #[serde(default = "default_ready_state")]
    pub ready_state: u8,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub colors: Vec<String>,
}

fn default_ready_state() -> u8 {
    4
}

impl PageDescription {
    pub fn from_toml_str(text: &str) -> Result<Self, PageError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, PageError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Loads a description, choosing the format by file extension.
    pub fn load(path: &Path) -> Result<Self, PageError> {
        let text = std::fs::read_to_string(path).map_err(|source| PageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("json") => Self::from_json_str(&text),
            _ => Err(PageError::Format(path.to_path_buf())),
        }
    }

    pub fn build(&self) -> Result<Page, PageError> {
        let mut page = Page::new(self.viewport);
        page.set_device(self.device);
        for sheet in &self.stylesheets {
            page.add_style_sheet(StyleSheet::parse(sheet.origin, &sheet.css)?);
        }
        let root = page.root();
        apply_node(&mut page, root, &self.body)?;
        for child in &self.body.children {
            build_subtree(&mut page, root, child)?;
        }
        page.scroll_to(0.0, self.scroll_y);
        tracing::debug!(
            nodes = page.descendants(root).len(),
            sheets = page.style_sheets().len(),
            "built page from description"
        );
        Ok(page)
    }
}

fn build_subtree(
    page: &mut Page,
    parent: NodeId,
    description: &NodeDescription,
) -> Result<(), PageError> {
    let tag = description.tag.as_deref().unwrap_or("div");
    let id = page.create_element(tag);
    apply_node(page, id, description)?;
    page.append_child(parent, id)?;
    for child in &description.children {
        build_subtree(page, id, child)?;
    }
    Ok(())
}

fn apply_node(page: &mut Page, id: NodeId, description: &NodeDescription) -> Result<(), PageError> {
    let video = match &description.video {
        Some(video) => Some(build_video(video)?),
        None => None,
    };
    let node = page.node_mut(id)?;
    if let Some(rect) = description.rect {
        node.rect = rect;
    }
    node.id = description.id.clone();
    node.classes = description.class.clone();
    node.base_style = description.style.clone();
    node.text = description.text.clone();
    node.ignore = description.ignore;
    node.glass_surface = description.glass;
    node.video = video;
    Ok(())
}

fn build_video(description: &VideoDescription) -> Result<VideoElement, PageError> {
    let colors = description
        .colors
        .iter()
        .map(|color| {
            Rgba::parse(color).ok_or_else(|| PageError::Invalid(format!("bad video color `{color}`")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let source = TestPattern::new(description.width, description.height, colors);
    Ok(VideoElement::new(description.ready_state, Arc::new(source)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
scroll_y = 100.0

[viewport]
width = 640.0
height = 480.0

[device]
mobile = true

[[stylesheets]]
css = ".panel { border-radius: 24px }"

[body]
style = { background-color = "#102030" }

[[body.children]]
class = ["panel"]
glass = true
rect = { x = 40.0, y = 40.0, width = 200.0, height = 120.0 }

[[body.children]]
tag = "video"
rect = { x = 0.0, y = 300.0, width = 320.0, height = 800.0 }
video = { width = 32, height = 18, colors = ["red", "oklch(0.7 0.1 200)"] }
"##;

    #[test]
    fn builds_page_from_toml() {
        let description = PageDescription::from_toml_str(SAMPLE).expect("parse");
        let page = description.build().expect("build");
        let root = page.root();
        assert_eq!(page.viewport().device_pixel_ratio, 1.0);
        assert!(page.device().mobile);
        assert_eq!(page.computed_style(root, "background-color"), "#102030");

        let panel = page.query_selector(".panel").unwrap().expect("panel");
        let node = page.node(panel).unwrap();
        assert!(node.glass_surface);
        assert_eq!(page.computed_style(panel, "border-radius"), "24px");

        let video = page.query_selector("video").unwrap().expect("video");
        assert!(page.node(video).unwrap().video.is_some());
        assert_eq!(page.scroll_offset(), (0.0, 100.0));
    }

    #[test]
    fn json_and_bad_colors() {
        let json = r#"{ "body": { "children": [ { "video": { "width": 4, "height": 4, "colors": ["nope"] } } ] } }"#;
        let description = PageDescription::from_json_str(json).expect("parse");
        assert!(matches!(description.build(), Err(PageError::Invalid(_))));
    }
}
