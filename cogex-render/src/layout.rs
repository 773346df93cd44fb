//! Box geometry for a [`Display`]: block flow, button grids and flex rows.

use std::collections::HashMap;

use cogex_core::{Display, ElementId, ElementKind, Layout};
use tiny_skia::Rect;

pub const BUTTON_HEIGHT: f32 = 40.0;
pub const BUTTON_PADDING_X: f32 = 14.0;
pub const MIN_BUTTON_WIDTH: f32 = 64.0;
pub const SELECT_HEIGHT: f32 = 32.0;
pub const MIN_SELECT_WIDTH: f32 = 160.0;
pub const GAP: f32 = 8.0;
pub const BLOCK_SPACING: f32 = 16.0;
pub const BUTTON_TEXT_SIZE: f32 = 16.0;
pub const BODY_TEXT_SIZE: f32 = 18.0;
pub const LINE_HEIGHT: f32 = 1.4;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Bounds {
        Bounds::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn to_rect(&self) -> Option<Rect> {
        Rect::from_xywh(self.x, self.y, self.width, self.height)
    }
}

/// Measures a single line of text at a pixel size.
pub trait TextMeasure {
    fn measure(&self, text: &str, size: f32) -> (f32, f32);
}

/// Fixed-advance estimate used when no font is loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxMeasure;

impl TextMeasure for ApproxMeasure {
    fn measure(&self, text: &str, size: f32) -> (f32, f32) {
        (text.chars().count() as f32 * size * 0.55, size * 1.2)
    }
}

/// Cells of a grid with `columns` equal columns, filled row by row, relative
/// to the grid origin. Extra rows are added when `count` overflows.
pub fn grid_cells(columns: usize, count: usize, cell: (f32, f32), gap: f32) -> Vec<Bounds> {
    let columns = columns.max(1);
    (0..count)
        .map(|i| {
            let (row, col) = (i / columns, i % columns);
            Bounds::new(
                col as f32 * (cell.0 + gap),
                row as f32 * (cell.1 + gap),
                cell.0,
                cell.1,
            )
        })
        .collect()
}

/// Overall size of a grid. Declared `rows` are reserved even when `count`
/// leaves some of them empty.
pub fn grid_size(
    rows: usize,
    columns: usize,
    count: usize,
    cell: (f32, f32),
    gap: f32,
) -> (f32, f32) {
    if count == 0 {
        return (0.0, 0.0);
    }
    let columns = columns.max(1);
    let used_columns = columns.min(count);
    let rows = rows.max(count.div_ceil(columns));
    (
        used_columns as f32 * cell.0 + (used_columns - 1) as f32 * gap,
        rows as f32 * cell.1 + (rows - 1) as f32 * gap,
    )
}

/// Lays `sizes` out left to right, wrapping before an item that would cross
/// `max_width`. Each line is centered within the widest line. Returns the
/// item boxes relative to the origin and the overall size.
pub fn flex_wrap(sizes: &[(f32, f32)], max_width: f32, gap: f32) -> (Vec<Bounds>, (f32, f32)) {
    let mut lines: Vec<Vec<usize>> = Vec::new();
    let mut line_width = 0.0f32;
    for (i, (w, _)) in sizes.iter().enumerate() {
        let needed = if line_width > 0.0 { line_width + gap + w } else { *w };
        match lines.last_mut() {
            Some(line) if !line.is_empty() && needed <= max_width => {
                line.push(i);
                line_width = needed;
            }
            _ => {
                lines.push(vec![i]);
                line_width = *w;
            }
        }
    }

    let widths: Vec<f32> = lines
        .iter()
        .map(|line| {
            line.iter().map(|&i| sizes[i].0).sum::<f32>() + gap * (line.len() - 1) as f32
        })
        .collect();
    let total_width = widths.iter().cloned().fold(0.0, f32::max);

    let mut out = vec![Bounds::default(); sizes.len()];
    let mut y = 0.0;
    for (line, width) in lines.iter().zip(&widths) {
        let height = line.iter().map(|&i| sizes[i].1).fold(0.0, f32::max);
        let mut x = (total_width - width) * 0.5;
        for &i in line {
            out[i] = Bounds::new(x, y, sizes[i].0, sizes[i].1);
            x += sizes[i].0 + gap;
        }
        y += height + gap;
    }
    let total_height = if lines.is_empty() { 0.0 } else { y - gap };
    (out, (total_width, total_height))
}

/// Splits markup into display lines: tags are dropped, block-level tags and
/// `<br>` break lines, and the common entities are decoded.
pub fn html_lines(markup: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut rest = markup;

    while let Some(start) = rest.find('<') {
        current.push_str(&rest[..start]);
        let Some(end) = rest[start..].find('>') else {
            current.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let tag = rest[start + 1..start + end]
            .trim_start_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_end_matches('/')
            .to_ascii_lowercase();
        if matches!(tag.as_str(), "br" | "p" | "div" | "h1" | "h2" | "h3" | "li") {
            push_line(&mut lines, &mut current);
        }
        rest = &rest[start + end + 1..];
    }
    current.push_str(rest);
    push_line(&mut lines, &mut current);
    lines
}

fn push_line(lines: &mut Vec<String>, current: &mut String) {
    let collapsed = current.split_whitespace().collect::<Vec<_>>().join(" ");
    current.clear();
    if !collapsed.is_empty() {
        lines.push(decode_entities(&collapsed));
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Computed boxes for every element of a display, in viewport coordinates.
#[derive(Debug, Clone, Default)]
pub struct LayoutTree {
    boxes: HashMap<ElementId, Bounds>,
}

impl LayoutTree {
    /// Lays out the display centered in `viewport`.
    pub fn compute(display: &Display, viewport: (f32, f32), measure: &dyn TextMeasure) -> Self {
        let mut sizes = HashMap::new();
        let root = display.root();
        let (w, h) = intrinsic_size(display, root, viewport.0, measure, &mut sizes);
        let origin = (
            ((viewport.0 - w) * 0.5).max(0.0),
            ((viewport.1 - h) * 0.5).max(0.0),
        );
        let mut tree = LayoutTree::default();
        tree.place(display, root, Bounds::new(origin.0, origin.1, w, h), viewport.0, &sizes);
        tree
    }

    pub fn bounds(&self, id: ElementId) -> Option<Bounds> {
        self.boxes.get(&id).copied()
    }

    /// Deepest visible button or select under the point.
    pub fn hit_test(&self, display: &Display, x: f32, y: f32) -> Option<ElementId> {
        display.descendants(display.root()).filter(|id| {
            display
                .get(*id)
                .map(|e| matches!(e.kind, ElementKind::Button { .. } | ElementKind::Select { .. }))
                .unwrap_or(false)
                && !display.is_hidden(*id)
                && self.bounds(*id).map(|b| b.contains(x, y)).unwrap_or(false)
        })
        .last()
    }

    fn place(
        &mut self,
        display: &Display,
        id: ElementId,
        bounds: Bounds,
        available: f32,
        sizes: &HashMap<ElementId, (f32, f32)>,
    ) {
        self.boxes.insert(id, bounds);
        let Some(el) = display.get(id) else {
            return;
        };
        let children = el.children();
        if children.is_empty() {
            return;
        }
        let size_of = |c: &ElementId| sizes.get(c).copied().unwrap_or((0.0, 0.0));

        match el.layout {
            Layout::Block => {
                let mut y = bounds.y;
                for child in children {
                    let (w, h) = size_of(child);
                    let x = bounds.x + (bounds.width - w) * 0.5;
                    self.place(display, *child, Bounds::new(x, y, w, h), available, sizes);
                    y += h + BLOCK_SPACING;
                }
            }
            Layout::Grid { columns, .. } => {
                let cell = max_size(children.iter().map(size_of));
                let cells = grid_cells(columns, children.len(), cell, GAP);
                for (child, cell) in children.iter().zip(cells) {
                    self.place(
                        display,
                        *child,
                        cell.translate(bounds.x, bounds.y),
                        available,
                        sizes,
                    );
                }
            }
            Layout::Flex => {
                let child_sizes: Vec<_> = children.iter().map(size_of).collect();
                let (boxes, _) = flex_wrap(&child_sizes, available, GAP);
                for (child, b) in children.iter().zip(boxes) {
                    self.place(display, *child, b.translate(bounds.x, bounds.y), available, sizes);
                }
            }
        }
    }
}

fn max_size(sizes: impl Iterator<Item = (f32, f32)>) -> (f32, f32) {
    sizes.fold((0.0, 0.0), |(mw, mh), (w, h)| (mw.max(w), mh.max(h)))
}

fn intrinsic_size(
    display: &Display,
    id: ElementId,
    available: f32,
    measure: &dyn TextMeasure,
    sizes: &mut HashMap<ElementId, (f32, f32)>,
) -> (f32, f32) {
    let Some(el) = display.get(id) else {
        return (0.0, 0.0);
    };
    let size = match &el.kind {
        ElementKind::Canvas(pixmap) => (pixmap.width() as f32, pixmap.height() as f32),
        ElementKind::Button { label } => {
            let (tw, _) = measure.measure(label, BUTTON_TEXT_SIZE);
            ((tw + 2.0 * BUTTON_PADDING_X).max(MIN_BUTTON_WIDTH), BUTTON_HEIGHT)
        }
        ElementKind::Html(markup) => {
            let lines = html_lines(markup);
            let width = lines
                .iter()
                .map(|l| measure.measure(l, BODY_TEXT_SIZE).0)
                .fold(0.0, f32::max);
            (width, lines.len() as f32 * BODY_TEXT_SIZE * LINE_HEIGHT)
        }
        ElementKind::Select { options, .. } => {
            let widest = options
                .iter()
                .map(|o| measure.measure(&o.label, BUTTON_TEXT_SIZE).0)
                .fold(0.0, f32::max);
            ((widest + 48.0).max(MIN_SELECT_WIDTH), SELECT_HEIGHT)
        }
        ElementKind::Container => {
            let child_sizes: Vec<(f32, f32)> = el
                .children()
                .iter()
                .map(|c| intrinsic_size(display, *c, available, measure, sizes))
                .collect();
            match el.layout {
                Layout::Block => {
                    let width = child_sizes.iter().map(|s| s.0).fold(0.0, f32::max);
                    let height = child_sizes.iter().map(|s| s.1).sum::<f32>()
                        + BLOCK_SPACING * child_sizes.len().saturating_sub(1) as f32;
                    (width, height)
                }
                Layout::Grid { rows, columns } => {
                    let cell = max_size(child_sizes.iter().copied());
                    grid_size(rows, columns, child_sizes.len(), cell, GAP)
                }
                Layout::Flex => flex_wrap(&child_sizes, available, GAP).1,
            }
        }
    };
    sizes.insert(id, size);
    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogex_core::Element;
    use proptest::prelude::*;

    #[test]
    fn grid_fills_rows_first() {
        let cells = grid_cells(2, 3, (100.0, 40.0), 8.0);
        assert_eq!(cells[0], Bounds::new(0.0, 0.0, 100.0, 40.0));
        assert_eq!(cells[1], Bounds::new(108.0, 0.0, 100.0, 40.0));
        assert_eq!(cells[2], Bounds::new(0.0, 48.0, 100.0, 40.0));
        assert_eq!(grid_size(1, 2, 3, (100.0, 40.0), 8.0), (208.0, 88.0));
    }

    #[test]
    fn grid_reserves_declared_rows() {
        assert_eq!(grid_size(3, 1, 2, (100.0, 40.0), 8.0), (100.0, 136.0));

        let mut display = Display::new();
        let group = display
            .append(
                display.root(),
                Element::container().with_layout(Layout::Grid { rows: 3, columns: 1 }),
            )
            .unwrap();
        display.append(group, Element::button("A")).unwrap();
        let b = display.append(group, Element::button("B")).unwrap();
        let tree = LayoutTree::compute(&display, (800.0, 600.0), &ApproxMeasure);

        let grid = tree.bounds(group).unwrap();
        let cell = tree.bounds(b).unwrap();
        assert!((grid.height - (3.0 * cell.height + 2.0 * GAP)).abs() < 0.01);
    }

    #[test]
    fn flex_wraps_when_row_is_full() {
        let (boxes, size) = flex_wrap(&[(100.0, 40.0), (100.0, 40.0), (100.0, 40.0)], 250.0, 10.0);
        assert_eq!(boxes[0].y, 0.0);
        assert_eq!(boxes[1].y, 0.0);
        assert_eq!(boxes[2].y, 50.0);
        // Second line is centered under the first.
        assert_eq!(boxes[2].x, 55.0);
        assert_eq!(size, (210.0, 90.0));
    }

    #[test]
    fn oversized_item_gets_its_own_line() {
        let (boxes, size) = flex_wrap(&[(400.0, 40.0), (50.0, 40.0)], 300.0, 10.0);
        assert_eq!(boxes[0].y, 0.0);
        assert_eq!(boxes[1].y, 50.0);
        assert_eq!(size.0, 400.0);
    }

    #[test]
    fn html_lines_strip_tags_and_break_blocks() {
        assert_eq!(
            html_lines("<p>Please select the microphone</p><p>you would&nbsp;like &amp; use.</p>"),
            vec!["Please select the microphone", "you would like & use."]
        );
        assert_eq!(html_lines("one<br/>two"), vec!["one", "two"]);
        assert!(html_lines("<div></div>").is_empty());
    }

    #[test]
    fn hit_test_finds_buttons_inside_grid() {
        let mut display = Display::new();
        let group = display
            .append(
                display.root(),
                Element::container().with_layout(Layout::Grid { rows: 1, columns: 2 }),
            )
            .unwrap();
        let a = display.append(group, Element::button("A")).unwrap();
        let b = display.append(group, Element::button("B")).unwrap();
        let tree = LayoutTree::compute(&display, (800.0, 600.0), &ApproxMeasure);

        let ba = tree.bounds(a).unwrap();
        let bb = tree.bounds(b).unwrap();
        assert!(!ba.intersects(&bb));
        assert_eq!(ba.y, bb.y);
        assert_eq!(
            tree.hit_test(&display, ba.x + 1.0, ba.y + 1.0),
            Some(a)
        );
        assert_eq!(
            tree.hit_test(&display, bb.right() - 1.0, bb.bottom() - 1.0),
            Some(b)
        );
        assert_eq!(tree.hit_test(&display, 0.0, 0.0), None);

        display.set_hidden(group, true).unwrap();
        assert_eq!(tree.hit_test(&display, ba.x + 1.0, ba.y + 1.0), None);
    }

    #[test]
    fn content_is_centered_in_viewport() {
        let mut display = Display::new();
        let b = display.append(display.root(), Element::button("go")).unwrap();
        let tree = LayoutTree::compute(&display, (800.0, 600.0), &ApproxMeasure);
        let bounds = tree.bounds(b).unwrap();
        assert!((bounds.x + bounds.width * 0.5 - 400.0).abs() < 0.01);
        assert!((bounds.y + bounds.height * 0.5 - 300.0).abs() < 0.01);
    }

    proptest! {
        #[test]
        fn grid_cells_stay_inside_and_never_overlap(
            rows in 0usize..6,
            columns in 1usize..6,
            count in 0usize..24,
            w in 10.0f32..200.0,
            h in 10.0f32..80.0,
        ) {
            let cells = grid_cells(columns, count, (w, h), GAP);
            let (gw, gh) = grid_size(rows, columns, count, (w, h), GAP);
            prop_assert_eq!(cells.len(), count);
            let grid = Bounds::new(0.0, 0.0, gw, gh);
            for (i, c) in cells.iter().enumerate() {
                prop_assert!(c.x >= grid.x && c.right() <= grid.right() + 1e-3);
                prop_assert!(c.y >= grid.y && c.bottom() <= grid.bottom() + 1e-3);
                for other in &cells[i + 1..] {
                    prop_assert!(!c.intersects(other));
                }
            }
        }

        #[test]
        fn flex_lines_fit_unless_single_item_is_wider(
            widths in proptest::collection::vec(10.0f32..300.0, 0..16),
            max_width in 100.0f32..800.0,
        ) {
            let sizes: Vec<_> = widths.iter().map(|w| (*w, 40.0)).collect();
            let (boxes, (total_w, _)) = flex_wrap(&sizes, max_width, GAP);
            let widest = widths.iter().cloned().fold(0.0, f32::max);
            prop_assert!(total_w <= max_width.max(widest) + 1e-3);
            for (i, a) in boxes.iter().enumerate() {
                for b in &boxes[i + 1..] {
                    prop_assert!(!a.intersects(b));
                }
            }
        }
    }
}
