use crate::tree::{NodeId, Page};

/// Stacking level of a node: the `z-index` of the nearest ancestor-or-self
/// that is positioned (non-static) and has a non-`auto` z-index. Defaults to 0.
pub fn effective_z(page: &Page, node: NodeId) -> i32 {
    std::iter::once(node)
        .chain(page.ancestors(node))
        .find_map(|current| {
            let position = page.computed_style(current, "position");
            if position.trim() == "static" {
                return None;
            }
            page.computed_style(current, "z-index").trim().parse::<i32>().ok()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Viewport;

    #[test]
    fn walks_to_nearest_positioned_ancestor() {
        let mut page = Page::new(Viewport::default());
        let outer = page.create_element("section");
        let inner = page.create_element("div");
        let leaf = page.create_element("p");
        page.append_child(page.root(), outer).unwrap();
        page.append_child(outer, inner).unwrap();
        page.append_child(inner, leaf).unwrap();

        assert_eq!(effective_z(&page, leaf), 0);

        page.set_inline_style(outer, "position", "relative").unwrap();
        page.set_inline_style(outer, "z-index", "5").unwrap();
        assert_eq!(effective_z(&page, leaf), 5);

        // static positioning ignores z-index
        page.set_inline_style(inner, "z-index", "9").unwrap();
        assert_eq!(effective_z(&page, leaf), 5);

        page.set_inline_style(inner, "position", "absolute").unwrap();
        assert_eq!(effective_z(&page, leaf), 9);

        page.set_inline_style(leaf, "position", "fixed").unwrap();
        page.set_inline_style(leaf, "z-index", "auto").unwrap();
        assert_eq!(effective_z(&page, leaf), 9);
    }
}
