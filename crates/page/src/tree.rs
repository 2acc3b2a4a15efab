use serde::{Deserialize, Serialize};

use crate::color::Rgba;
use crate::error::PageError;
use crate::geometry::{Rect, Viewport};
use crate::listeners::ListenerRegistry;
use crate::style::{initial_value, Style};
use crate::stylesheet::{Selector, StyleSheet};
use crate::video::VideoElement;

const INHERITED: [&str; 3] = ["color", "font", "visibility"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Host device characteristics relevant to capture sizing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceProfile {
    #[serde(default)]
    pub mobile: bool,
    /// Reported device memory in GiB, when known.
    #[serde(default)]
    pub memory_gib: Option<f32>,
}

impl DeviceProfile {
    pub fn is_memory_constrained(&self) -> bool {
        self.mobile && self.memory_gib.map_or(true, |memory| memory <= 4.0)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    /// Layout rectangle in document coordinates, or viewport coordinates
    /// for fixed-position subtrees.
    pub rect: Rect,
    pub base_style: Style,
    pub inline_style: Style,
    pub text: Option<String>,
    pub video: Option<VideoElement>,
    /// Excluded from snapshot capture.
    pub ignore: bool,
    /// Hosts a glass lens.
    pub glass_surface: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attached: bool,
}

impl Node {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            id: None,
            classes: Vec::new(),
            rect: Rect::ZERO,
            base_style: Style::new(),
            inline_style: Style::new(),
            text: None,
            video: None,
            ignore: false,
            glass_surface: false,
            parent: None,
            children: Vec::new(),
            attached: false,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// A leaf whose only content is a single text run.
    pub fn is_text_leaf(&self) -> bool {
        self.children.is_empty() && self.text.as_deref().is_some_and(|text| !text.trim().is_empty())
    }
}

/// An in-process styled document: the node tree plus viewport, scroll,
/// style sheets and listener bookkeeping.
#[derive(Debug, Clone)]
pub struct Page {
    nodes: Vec<Node>,
    root: NodeId,
    viewport: Viewport,
    scroll: (f32, f32),
    sheets: Vec<StyleSheet>,
    listeners: ListenerRegistry,
    device: DeviceProfile,
}

impl Page {
    pub fn new(viewport: Viewport) -> Self {
        let mut root = Node::new("body");
        root.rect = viewport.rect();
        root.attached = true;
        Self {
            nodes: vec![root],
            root: NodeId(0),
            viewport,
            scroll: (0.0, 0.0),
            sheets: Vec::new(),
            listeners: ListenerRegistry::default(),
            device: DeviceProfile::default(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        let (x, y) = self.scroll;
        self.scroll_to(x, y);
    }

    pub fn device(&self) -> DeviceProfile {
        self.device
    }

    pub fn set_device(&mut self, device: DeviceProfile) {
        self.device = device;
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn listeners_mut(&mut self) -> &mut ListenerRegistry {
        &mut self.listeners
    }

    pub fn style_sheets(&self) -> &[StyleSheet] {
        &self.sheets
    }

    pub fn style_sheets_mut(&mut self) -> &mut [StyleSheet] {
        &mut self.sheets
    }

    pub fn add_style_sheet(&mut self, sheet: StyleSheet) -> usize {
        self.sheets.push(sheet);
        self.sheets.len() - 1
    }

    /// Creates a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes.push(Node::new(tag));
        NodeId(self.nodes.len() - 1)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), PageError> {
        self.node(parent)?;
        self.node(child)?;
        if parent == child || self.ancestors(parent).any(|ancestor| ancestor == child) {
            return Err(PageError::Invalid(format!(
                "cannot append {child:?} inside itself"
            )));
        }
        self.detach(child);
        let attached = self.nodes[parent.0].attached;
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        self.set_attached(child, attached);
        Ok(())
    }

    /// Detaches `id` and its subtree from the document.
    pub fn remove(&mut self, id: NodeId) -> Result<(), PageError> {
        self.node(id)?;
        if id == self.root {
            return Err(PageError::Invalid("cannot remove the root".into()));
        }
        self.detach(id);
        Ok(())
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != id);
        }
        self.set_attached(id, false);
    }

    fn set_attached(&mut self, id: NodeId, attached: bool) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current.0];
            node.attached = attached;
            stack.extend(node.children.iter().copied());
        }
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        self.nodes.get(id.0).is_some_and(|node| node.attached)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, PageError> {
        self.nodes.get(id.0).ok_or(PageError::UnknownNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, PageError> {
        self.nodes.get_mut(id.0).ok_or(PageError::UnknownNode(id))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Strict ancestors, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /// `id` followed by its descendants in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.nodes.get(current.0).is_none() {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    pub fn inline_style(&self, id: NodeId, property: &str) -> Option<&str> {
        self.nodes
            .get(id.0)
            .and_then(|node| node.inline_style.get(property))
    }

    /// Returns the previous inline value.
    pub fn set_inline_style(
        &mut self,
        id: NodeId,
        property: &str,
        value: impl Into<String>,
    ) -> Result<Option<String>, PageError> {
        Ok(self.node_mut(id)?.inline_style.set(property, value))
    }

    pub fn remove_inline_style(
        &mut self,
        id: NodeId,
        property: &str,
    ) -> Result<Option<String>, PageError> {
        Ok(self.node_mut(id)?.inline_style.remove(property))
    }

    /// Restores an inline property to a previously captured value.
    pub fn restore_inline_style(
        &mut self,
        id: NodeId,
        property: &str,
        previous: Option<String>,
    ) -> Result<(), PageError> {
        match previous {
            Some(value) => self.set_inline_style(id, property, value)?,
            None => self.remove_inline_style(id, property)?,
        };
        Ok(())
    }

    /// Inline, then base, then the last matching sheet rule, then inherited
    /// or initial value.
    pub fn computed_style(&self, id: NodeId, property: &str) -> String {
        let property = property.to_ascii_lowercase();
        let Some(node) = self.nodes.get(id.0) else {
            return initial_value(&property).to_string();
        };
        if let Some(value) = node.inline_style.get(&property) {
            return value.to_string();
        }
        if let Some(value) = node.base_style.get(&property) {
            return value.to_string();
        }
        let from_sheet = self
            .sheets
            .iter()
            .flat_map(|sheet| sheet.cascade_rules())
            .filter(|rule| {
                rule.selectors
                    .iter()
                    .any(|selector| self.matches(node, selector))
            })
            .filter_map(|rule| rule.declarations.get(&property))
            .last();
        if let Some(value) = from_sheet {
            return value.to_string();
        }
        if INHERITED.contains(&property.as_str()) {
            if let Some(parent) = node.parent {
                return self.computed_style(parent, &property);
            }
        }
        initial_value(&property).to_string()
    }

    /// Computed color property with `currentcolor` resolved.
    pub fn computed_color(&self, id: NodeId, property: &str) -> Option<Rgba> {
        let value = self.computed_style(id, property);
        if value.trim().eq_ignore_ascii_case("currentcolor") {
            if property.eq_ignore_ascii_case("color") {
                return self.parent(id).and_then(|parent| self.computed_color(parent, "color"));
            }
            return self.computed_color(id, "color");
        }
        Rgba::parse(&value)
    }

    pub fn opacity(&self, id: NodeId) -> f32 {
        self.computed_style(id, "opacity")
            .trim()
            .parse::<f32>()
            .map(|value| value.clamp(0.0, 1.0))
            .unwrap_or(1.0)
    }

    /// Rendered at all: displayed, not hidden, not fully transparent, non-empty.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(id.0) else {
            return false;
        };
        node.attached
            && !node.rect.is_empty()
            && self.computed_style(id, "display") != "none"
            && self.computed_style(id, "visibility") != "hidden"
            && self.opacity(id) > 0.0
    }

    /// True when the node or one of its ancestors is `position: fixed`.
    pub fn is_fixed(&self, id: NodeId) -> bool {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .any(|node| self.computed_style(node, "position") == "fixed")
    }

    pub fn set_rect(&mut self, id: NodeId, rect: Rect) -> Result<(), PageError> {
        self.node_mut(id)?.rect = rect;
        Ok(())
    }

    /// Viewport-relative rectangle of a node.
    pub fn bounding_rect(&self, id: NodeId) -> Rect {
        let Some(node) = self.nodes.get(id.0) else {
            return Rect::ZERO;
        };
        if self.is_fixed(id) {
            node.rect
        } else {
            node.rect.translate(-self.scroll.0, -self.scroll.1)
        }
    }

    /// Rectangle in document coordinates; fixed subtrees follow the scroll.
    pub fn document_rect(&self, id: NodeId) -> Rect {
        let Some(node) = self.nodes.get(id.0) else {
            return Rect::ZERO;
        };
        if self.is_fixed(id) {
            node.rect.translate(self.scroll.0, self.scroll.1)
        } else {
            node.rect
        }
    }

    /// Full scrollable extent of a node measured from its own origin.
    pub fn scroll_size(&self, id: NodeId) -> (f32, f32) {
        let Some(node) = self.nodes.get(id.0) else {
            return (0.0, 0.0);
        };
        let origin = node.rect;
        let mut right = origin.right();
        let mut bottom = origin.bottom();
        for descendant in self.descendants(id) {
            if descendant == id || self.is_fixed(descendant) {
                continue;
            }
            let rect = self.nodes[descendant.0].rect;
            if rect.is_empty() {
                continue;
            }
            right = right.max(rect.right());
            bottom = bottom.max(rect.bottom());
        }
        ((right - origin.x).max(0.0), (bottom - origin.y).max(0.0))
    }

    pub fn scroll_offset(&self) -> (f32, f32) {
        self.scroll
    }

    /// Scrolls the document, clamped to its scrollable range.
    pub fn scroll_to(&mut self, x: f32, y: f32) {
        let (width, height) = self.scroll_size(self.root);
        let max_x = (width - self.viewport.width).max(0.0);
        let max_y = (height - self.viewport.height).max(0.0);
        self.scroll = (x.clamp(0.0, max_x), y.clamp(0.0, max_y));
    }

    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, PageError> {
        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, PageError> {
        let selector = Selector::parse(selector)?;
        Ok(self
            .descendants(self.root)
            .into_iter()
            .filter(|id| self.matches(&self.nodes[id.0], &selector))
            .collect())
    }

    fn matches(&self, node: &Node, selector: &Selector) -> bool {
        selector.matches(&node.tag, node.id.as_deref(), &node.classes)
    }
}
