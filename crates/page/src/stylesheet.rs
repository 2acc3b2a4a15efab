use serde::{Deserialize, Serialize};

use crate::error::PageError;
use crate::style::Style;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SheetOrigin {
    #[default]
    SameOrigin,
    CrossOrigin,
}

/// Simple selectors only: `*`, `tag`, `#id`, `.class`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Universal,
    Tag(String),
    Id(String),
    Class(String),
}

impl Selector {
    pub fn parse(text: &str) -> Result<Selector, PageError> {
        let text = text.trim();
        let valid_name = |name: &str| {
            !name.is_empty()
                && name
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        };
        let selector = if text == "*" {
            Selector::Universal
        } else if let Some(id) = text.strip_prefix('#') {
            Selector::Id(id.to_string())
        } else if let Some(class) = text.strip_prefix('.') {
            Selector::Class(class.to_string())
        } else {
            Selector::Tag(text.to_ascii_lowercase())
        };
        match &selector {
            Selector::Id(name) | Selector::Class(name) | Selector::Tag(name)
                if !valid_name(name) =>
            {
                Err(PageError::Selector(text.to_string()))
            }
            _ => Ok(selector),
        }
    }

    pub fn matches(&self, tag: &str, id: Option<&str>, classes: &[String]) -> bool {
        match self {
            Selector::Universal => true,
            Selector::Tag(name) => tag.eq_ignore_ascii_case(name),
            Selector::Id(name) => id == Some(name.as_str()),
            Selector::Class(name) => classes.iter().any(|class| class == name),
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Universal => f.write_str("*"),
            Selector::Tag(name) => f.write_str(name),
            Selector::Id(name) => write!(f, "#{name}"),
            Selector::Class(name) => write!(f, ".{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    pub selectors: Vec<Selector>,
    pub declarations: Style,
}

impl StyleRule {
    pub fn css_text(&self) -> String {
        let selectors = self
            .selectors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{selectors} {{ {} }}", self.declarations.to_css())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleSheet {
    origin: SheetOrigin,
    rules: Vec<StyleRule>,
}

impl StyleSheet {
    pub fn new(origin: SheetOrigin) -> Self {
        Self {
            origin,
            rules: Vec::new(),
        }
    }

    /// Parses `selector[, selector] { declarations }` blocks.
    pub fn parse(origin: SheetOrigin, text: &str) -> Result<StyleSheet, PageError> {
        let mut sheet = StyleSheet::new(origin);
        let mut rest = text;
        while let Some(open) = rest.find('{') {
            let close = rest[open..]
                .find('}')
                .map(|offset| open + offset)
                .ok_or_else(|| PageError::Selector(rest.trim().to_string()))?;
            let selectors = rest[..open]
                .split(',')
                .map(Selector::parse)
                .collect::<Result<Vec<_>, _>>()?;
            sheet.rules.push(StyleRule {
                selectors,
                declarations: Style::parse(&rest[open + 1..close]),
            });
            rest = &rest[close + 1..];
        }
        Ok(sheet)
    }

    pub fn origin(&self) -> SheetOrigin {
        self.origin
    }

    pub fn push_rule(&mut self, rule: StyleRule) {
        self.rules.push(rule);
    }

    /// Script-visible rule list; cross-origin sheets refuse access.
    pub fn rules(&self) -> Result<&[StyleRule], PageError> {
        match self.origin {
            SheetOrigin::SameOrigin => Ok(&self.rules),
            SheetOrigin::CrossOrigin => Err(PageError::CrossOriginSheet),
        }
    }

    pub fn delete_rule(&mut self, index: usize) -> Result<StyleRule, PageError> {
        if self.origin == SheetOrigin::CrossOrigin {
            return Err(PageError::CrossOriginSheet);
        }
        if index >= self.rules.len() {
            return Err(PageError::RuleIndex(index));
        }
        Ok(self.rules.remove(index))
    }

    pub fn insert_rule(&mut self, index: usize, rule: StyleRule) -> Result<(), PageError> {
        if self.origin == SheetOrigin::CrossOrigin {
            return Err(PageError::CrossOriginSheet);
        }
        if index > self.rules.len() {
            return Err(PageError::RuleIndex(index));
        }
        self.rules.insert(index, rule);
        Ok(())
    }

    /// All rules regardless of origin; used by the style cascade.
    pub(crate) fn cascade_rules(&self) -> &[StyleRule] {
        &self.rules
    }
}
