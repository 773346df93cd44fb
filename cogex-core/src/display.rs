//! Retained element tree that trials mutate and the renderer draws.
//!
//! The tree is an arena: removed elements leave an empty slot so ids handed
//! out earlier never alias a newer element.

use std::collections::BTreeMap;

use tiny_skia::Pixmap;

use crate::error::{Result, TrialError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

/// How a container arranges its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Children stacked vertically, each centered.
    #[default]
    Block,
    /// Fixed grid, filled row by row.
    Grid { rows: usize, columns: usize },
    /// Single wrapping row.
    Flex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone)]
pub enum ElementKind {
    Container,
    Canvas(Pixmap),
    Button { label: String },
    /// Markup shown as text; the renderer strips tags.
    Html(String),
    Select {
        options: Vec<SelectOption>,
        selected: Option<usize>,
    },
}

#[derive(Debug, Clone)]
pub struct Element {
    pub kind: ElementKind,
    pub dom_id: Option<String>,
    pub classes: Vec<String>,
    pub data: BTreeMap<String, String>,
    pub layout: Layout,
    pub disabled: bool,
    pub hidden: bool,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            dom_id: None,
            classes: Vec::new(),
            data: BTreeMap::new(),
            layout: Layout::Block,
            disabled: false,
            hidden: false,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn container() -> Self {
        Self::new(ElementKind::Container)
    }

    pub fn button(label: impl Into<String>) -> Self {
        Self::new(ElementKind::Button {
            label: label.into(),
        })
    }

    pub fn html(markup: impl Into<String>) -> Self {
        Self::new(ElementKind::Html(markup.into()))
    }

    pub fn select() -> Self {
        Self::new(ElementKind::Select {
            options: Vec::new(),
            selected: None,
        })
    }

    pub fn canvas(pixmap: Pixmap) -> Self {
        Self::new(ElementKind::Canvas(pixmap))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.dom_id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    pub fn is_button(&self) -> bool {
        matches!(self.kind, ElementKind::Button { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Display {
    slots: Vec<Option<Element>>,
    root: ElementId,
}

impl Display {
    pub fn new() -> Self {
        Self {
            slots: vec![Some(Element::container())],
            root: ElementId(0),
        }
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    fn element_mut(&mut self, id: ElementId) -> Result<&mut Element> {
        self.get_mut(id)
            .ok_or_else(|| TrialError::MissingElement(format!("{:?}", id)))
    }

    /// Appends `element` as the last child of `parent`.
    pub fn append(&mut self, parent: ElementId, mut element: Element) -> Result<ElementId> {
        if self.get(parent).is_none() {
            return Err(TrialError::MissingElement(format!("{:?}", parent)));
        }
        let id = ElementId(self.slots.len());
        element.parent = Some(parent);
        element.children.clear();
        self.slots.push(Some(element));
        self.element_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Removes every descendant of `id`, keeping `id` itself.
    pub fn clear_children(&mut self, id: ElementId) -> Result<()> {
        let children = std::mem::take(&mut self.element_mut(id)?.children);
        let mut stack = children;
        while let Some(next) = stack.pop() {
            if let Some(removed) = self.slots.get_mut(next.0).and_then(Option::take) {
                stack.extend(removed.children);
            }
        }
        Ok(())
    }

    /// Empties the whole surface.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut().skip(1) {
            *slot = None;
        }
        let root = self.root;
        if let Some(el) = self.get_mut(root) {
            el.children.clear();
        }
    }

    pub fn query_id(&self, dom_id: &str) -> Option<ElementId> {
        self.descendants(self.root)
            .find(|id| self.get(*id).and_then(|e| e.dom_id.as_deref()) == Some(dom_id))
    }

    /// First descendant of `scope` whose data attribute `key` equals `value`.
    pub fn query_data(&self, scope: ElementId, key: &str, value: &str) -> Option<ElementId> {
        self.descendants(scope).find(|id| {
            self.get(*id)
                .and_then(|e| e.data.get(key))
                .map(String::as_str)
                == Some(value)
        })
    }

    /// Pre-order walk of the subtree below `scope` (excluding `scope`).
    pub fn descendants(&self, scope: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        let mut stack: Vec<ElementId> = self
            .get(scope)
            .map(|e| e.children.iter().rev().copied().collect())
            .unwrap_or_default();
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            if let Some(el) = self.get(next) {
                stack.extend(el.children.iter().rev().copied());
            }
            Some(next)
        })
    }

    pub fn set_hidden(&mut self, id: ElementId, hidden: bool) -> Result<()> {
        self.element_mut(id)?.hidden = hidden;
        Ok(())
    }

    pub fn set_disabled(&mut self, id: ElementId, disabled: bool) -> Result<()> {
        self.element_mut(id)?.disabled = disabled;
        Ok(())
    }

    pub fn add_class(&mut self, id: ElementId, class: &str) -> Result<()> {
        let el = self.element_mut(id)?;
        if !el.has_class(class) {
            el.classes.push(class.to_string());
        }
        Ok(())
    }

    /// True if `id` or any ancestor is hidden.
    pub fn is_hidden(&self, id: ElementId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.get(current) {
                Some(el) if el.hidden => return true,
                Some(el) => cursor = el.parent,
                None => return true,
            }
        }
        false
    }

    /// Buttons and selects that are enabled can receive input.
    pub fn is_interactive(&self, id: ElementId) -> bool {
        match self.get(id) {
            Some(el) => {
                matches!(el.kind, ElementKind::Button { .. } | ElementKind::Select { .. })
                    && !el.disabled
            }
            None => false,
        }
    }

    pub fn canvas_mut(&mut self, id: ElementId) -> Result<&mut Pixmap> {
        match &mut self.element_mut(id)?.kind {
            ElementKind::Canvas(pixmap) => Ok(pixmap),
            _ => Err(TrialError::MissingElement(format!("canvas {:?}", id))),
        }
    }

    /// Replaces the options of a select. The current selection survives when
    /// its value is still offered; otherwise the first option is selected.
    pub fn set_options(&mut self, id: ElementId, new_options: Vec<SelectOption>) -> Result<()> {
        match &mut self.element_mut(id)?.kind {
            ElementKind::Select { options, selected } => {
                let previous = selected
                    .and_then(|i| options.get(i))
                    .map(|o| o.value.clone());
                *selected = previous
                    .and_then(|v| new_options.iter().position(|o| o.value == v))
                    .or(if new_options.is_empty() { None } else { Some(0) });
                *options = new_options;
                Ok(())
            }
            _ => Err(TrialError::MissingElement(format!("select {:?}", id))),
        }
    }

    pub fn select_index(&mut self, id: ElementId, index: usize) -> Result<()> {
        match &mut self.element_mut(id)?.kind {
            ElementKind::Select { options, selected } if index < options.len() => {
                *selected = Some(index);
                Ok(())
            }
            ElementKind::Select { .. } => Err(TrialError::Config(format!(
                "option {} out of range for {:?}",
                index, id
            ))),
            _ => Err(TrialError::MissingElement(format!("select {:?}", id))),
        }
    }

    /// Current value of a select, `None` when it offers no options.
    pub fn select_value(&self, id: ElementId) -> Option<&str> {
        match &self.get(id)?.kind {
            ElementKind::Select { options, selected } => {
                selected.and_then(|i| options.get(i)).map(|o| o.value.as_str())
            }
            _ => None,
        }
    }

    pub fn select_options(&self, id: ElementId) -> &[SelectOption] {
        match self.get(id).map(|e| &e.kind) {
            Some(ElementKind::Select { options, .. }) => options,
            _ => &[],
        }
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(v: &str) -> SelectOption {
        SelectOption {
            value: v.into(),
            label: v.to_uppercase(),
        }
    }

    #[test]
    fn append_and_query() {
        let mut display = Display::new();
        let group = display
            .append(display.root(), Element::container().with_id("group"))
            .unwrap();
        let b0 = display
            .append(group, Element::button("A").with_data("choice", "0"))
            .unwrap();
        let b1 = display
            .append(group, Element::button("B").with_data("choice", "1"))
            .unwrap();
        assert_eq!(display.query_id("group"), Some(group));
        assert_eq!(display.query_data(group, "choice", "1"), Some(b1));
        assert_eq!(display.get(group).unwrap().children(), &[b0, b1]);
        assert_eq!(display.get(b0).unwrap().parent(), Some(group));
    }

    #[test]
    fn clear_invalidates_old_ids() {
        let mut display = Display::new();
        let b = display.append(display.root(), Element::button("x")).unwrap();
        display.clear();
        assert!(display.get(b).is_none());
        assert!(display.get(display.root()).unwrap().children().is_empty());
        let c = display.append(display.root(), Element::button("y")).unwrap();
        assert_ne!(b, c);
        assert_eq!(display.descendants(display.root()).collect::<Vec<_>>(), vec![c]);
    }

    #[test]
    fn clear_children_removes_subtree() {
        let mut display = Display::new();
        let outer = display.append(display.root(), Element::container()).unwrap();
        let inner = display.append(outer, Element::container()).unwrap();
        let leaf = display.append(inner, Element::button("x")).unwrap();
        display.clear_children(outer).unwrap();
        assert!(display.get(inner).is_none());
        assert!(display.get(leaf).is_none());
        assert!(display.get(outer).is_some());
    }

    #[test]
    fn hidden_propagates_to_descendants() {
        let mut display = Display::new();
        let outer = display.append(display.root(), Element::container()).unwrap();
        let leaf = display.append(outer, Element::button("x")).unwrap();
        assert!(!display.is_hidden(leaf));
        display.set_hidden(outer, true).unwrap();
        assert!(display.is_hidden(leaf));
    }

    #[test]
    fn disabled_buttons_are_not_interactive() {
        let mut display = Display::new();
        let b = display.append(display.root(), Element::button("x")).unwrap();
        let text = display.append(display.root(), Element::html("<p>hi</p>")).unwrap();
        assert!(display.is_interactive(b));
        assert!(!display.is_interactive(text));
        display.set_disabled(b, true).unwrap();
        assert!(!display.is_interactive(b));
    }

    #[test]
    fn set_options_keeps_selection_by_value() {
        let mut display = Display::new();
        let s = display.append(display.root(), Element::select()).unwrap();
        assert_eq!(display.select_value(s), None);
        display.set_options(s, vec![option("a"), option("b")]).unwrap();
        assert_eq!(display.select_value(s), Some("a"));
        display.select_index(s, 1).unwrap();
        display.set_options(s, vec![option("c"), option("b")]).unwrap();
        assert_eq!(display.select_value(s), Some("b"));
        display.set_options(s, vec![option("d")]).unwrap();
        assert_eq!(display.select_value(s), Some("d"));
        display.set_options(s, vec![]).unwrap();
        assert_eq!(display.select_value(s), None);
    }

    #[test]
    fn select_index_out_of_range_is_rejected() {
        let mut display = Display::new();
        let s = display.append(display.root(), Element::select()).unwrap();
        display.set_options(s, vec![option("a")]).unwrap();
        assert!(display.select_index(s, 3).is_err());
        assert_eq!(display.select_value(s), Some("a"));
    }
}
