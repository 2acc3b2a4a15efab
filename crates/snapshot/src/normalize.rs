//! Scoped page preparation for the external rasterizer, which only
//! understands legacy sRGB color syntax.

use page::color::{contains_modern_color, replace_modern_colors};
use page::stylesheet::{SheetOrigin, StyleRule};
use page::{NodeId, Page};

/// Properties rewritten when they carry a modern color function.
pub const COLOR_PROPERTIES: [&str; 8] = [
    "color",
    "background-color",
    "border-color",
    "outline-color",
    "fill",
    "stroke",
    "text-decoration-color",
    "background-image",
];

/// Holds the page in its capture-ready state and undoes every change on drop.
pub struct CaptureGuard<'a> {
    page: &'a mut Page,
    saved_inline: Vec<(NodeId, &'static str, Option<String>)>,
    removed_rules: Vec<(usize, usize, StyleRule)>,
}

impl<'a> CaptureGuard<'a> {
    /// Hides `hidden`, rewrites modern colors under `target` and strips
    /// same-origin rules that mention modern color functions.
    pub fn apply(page: &'a mut Page, target: NodeId, hidden: &[NodeId]) -> Self {
        let mut guard = Self {
            page,
            saved_inline: Vec::new(),
            removed_rules: Vec::new(),
        };
        for node in hidden {
            guard.override_inline(*node, "display", "none".to_string());
        }
        guard.rewrite_colors(target);
        guard.strip_rules();
        tracing::debug!(
            overrides = guard.saved_inline.len(),
            stripped_rules = guard.removed_rules.len(),
            "prepared page for rasterizer"
        );
        guard
    }

    pub fn page(&self) -> &Page {
        self.page
    }

    pub fn override_count(&self) -> usize {
        self.saved_inline.len()
    }

    pub fn stripped_rule_count(&self) -> usize {
        self.removed_rules.len()
    }

    fn override_inline(&mut self, node: NodeId, property: &'static str, value: String) {
        match self.page.set_inline_style(node, property, value) {
            Ok(previous) => self.saved_inline.push((node, property, previous)),
            Err(err) => tracing::debug!(?node, property, error = %err, "skipping override"),
        }
    }

    fn rewrite_colors(&mut self, target: NodeId) {
        let mut pending = Vec::new();
        for node in self.page.descendants(target) {
            for property in COLOR_PROPERTIES {
                let value = self.page.computed_style(node, property);
                if !contains_modern_color(&value) {
                    continue;
                }
                if let Some(replacement) = replace_modern_colors(&value) {
                    pending.push((node, property, replacement));
                }
            }
        }
        for (node, property, replacement) in pending {
            self.override_inline(node, property, replacement);
        }
    }

    fn strip_rules(&mut self) {
        for sheet_index in 0..self.page.style_sheets().len() {
            let sheet = &mut self.page.style_sheets_mut()[sheet_index];
            if sheet.origin() == SheetOrigin::CrossOrigin {
                tracing::debug!(sheet = sheet_index, "cannot inspect cross-origin sheet");
                continue;
            }
            let doomed: Vec<usize> = match sheet.rules() {
                Ok(rules) => rules
                    .iter()
                    .enumerate()
                    .filter(|(_, rule)| contains_modern_color(&rule.css_text()))
                    .map(|(index, _)| index)
                    .collect(),
                Err(_) => continue,
            };
            for index in doomed.into_iter().rev() {
                match sheet.delete_rule(index) {
                    Ok(rule) => self.removed_rules.push((sheet_index, index, rule)),
                    Err(err) => tracing::debug!(sheet = sheet_index, index, error = %err, "rule not removed"),
                }
            }
        }
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        while let Some((sheet_index, index, rule)) = self.removed_rules.pop() {
            if let Some(sheet) = self.page.style_sheets_mut().get_mut(sheet_index) {
                if let Err(err) = sheet.insert_rule(index, rule) {
                    tracing::warn!(sheet = sheet_index, index, error = %err, "failed to restore rule");
                }
            }
        }
        while let Some((node, property, previous)) = self.saved_inline.pop() {
            if let Err(err) = self.page.restore_inline_style(node, property, previous) {
                tracing::warn!(?node, property, error = %err, "failed to restore inline style");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use page::{Rect, StyleSheet, Viewport};

    #[test]
    fn rewrites_then_restores_everything() {
        let mut page = Page::new(Viewport::default());
        let root = page.root();
        let card = page.create_element("div");
        page.append_child(root, card).unwrap();
        page.set_rect(card, Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        page.set_inline_style(card, "color", "oklch(62.8% 0.2577 29.23)")
            .unwrap();
        let overlay = page.create_element("canvas");
        page.append_child(root, overlay).unwrap();
        page.add_style_sheet(
            StyleSheet::parse(
                SheetOrigin::SameOrigin,
                "div { background-color: lab(50 20 30) } p { color: red }",
            )
            .unwrap(),
        );
        page.add_style_sheet(
            StyleSheet::parse(SheetOrigin::CrossOrigin, "span { color: oklab(0.5 0 0) }").unwrap(),
        );
        let before = page.clone();

        {
            let guard = CaptureGuard::apply(&mut page, root, &[overlay]);
            let view = guard.page();
            assert_eq!(view.computed_style(overlay, "display"), "none");
            assert!(view.computed_style(card, "color").starts_with("rgba("));
            assert!(view
                .computed_style(card, "background-color")
                .starts_with("rgba("));
            assert_eq!(view.style_sheets()[0].rules().unwrap().len(), 1);
            assert_eq!(guard.stripped_rule_count(), 1);
        }

        assert_eq!(page.inline_style(overlay, "display"), None);
        assert_eq!(
            page.inline_style(card, "color"),
            before.inline_style(card, "color")
        );
        assert_eq!(page.inline_style(card, "background-color"), None);
        assert_eq!(page.style_sheets(), before.style_sheets());
    }
}
