use ab_glyph::{point, Font, FontArc, Glyph, PxScale, ScaleFont};
use anyhow::{anyhow, Result};
use cogex_cache::{intern_label, LabelId};
use cogex_core::{Display, ElementId, ElementKind};
use cogex_timing::Timer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tiny_skia::{
    Color, FillRule, Paint, PathBuilder, Pixmap, PixmapPaint, PremultipliedColorU8, Stroke,
    Transform,
};

use crate::layout::{
    html_lines, ApproxMeasure, Bounds, LayoutTree, TextMeasure, BODY_TEXT_SIZE, BUTTON_TEXT_SIZE,
    LINE_HEIGHT,
};

const BACKGROUND: [u8; 4] = [0, 0, 0, 255];
const TEXT: [u8; 4] = [255, 255, 255, 255];
const BUTTON_FILL: [u8; 4] = [230, 230, 230, 255];
const BUTTON_FILL_DISABLED: [u8; 4] = [110, 110, 110, 255];
const BUTTON_TEXT: [u8; 4] = [20, 20, 20, 255];
const BUTTON_TEXT_DISABLED: [u8; 4] = [60, 60, 60, 255];
const BORDER: [u8; 4] = [160, 160, 160, 255];

fn color([r, g, b, a]: [u8; 4]) -> Color {
    Color::from_rgba8(r, g, b, a)
}

fn solid(c: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color(c));
    paint
}

struct FontMeasure<'a>(&'a FontArc);

impl TextMeasure for FontMeasure<'_> {
    fn measure(&self, text: &str, size: f32) -> (f32, f32) {
        let sf = self.0.as_scaled(PxScale::from(size));
        let mut width = 0.0f32;
        let mut prev = None;
        for ch in text.chars() {
            let id = self.0.glyph_id(ch);
            if let Some(prev) = prev {
                width += sf.kern(prev, id);
            }
            width += sf.h_advance(id);
            prev = Some(id);
        }
        (width, sf.height())
    }
}

/// Rasterises one line of text into a tightly cropped, premultiplied pixmap.
pub fn render_text_pixmap(text: &str, font_size: f32, font: &FontArc, rgba: [u8; 4]) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    let outlines: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| font.outline_glyph(g))
        .collect();
    if outlines.is_empty() {
        return None;
    }

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for out in &outlines {
        let b = out.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;
    let stride = w as usize;
    let dst = pm.pixels_mut();

    for out in &outlines {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i32;
            let iy = (y as f32 + b.min.y - min_y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            // Premultiply by coverage, then composite over what is there.
            let a = (cov * rgba[3] as f32 / 255.0).clamp(0.0, 1.0);
            let inv = 1.0 - a;
            let bg = dst[i];
            let r = (rgba[0] as f32 * a) as u8;
            let g = (rgba[1] as f32 * a) as u8;
            let bl = (rgba[2] as f32 * a) as u8;
            let al = (a * 255.0) as u8;
            let blended = PremultipliedColorU8::from_rgba(
                r.saturating_add((bg.red() as f32 * inv) as u8),
                g.saturating_add((bg.green() as f32 * inv) as u8),
                bl.saturating_add((bg.blue() as f32 * inv) as u8),
                al.saturating_add((bg.alpha() as f32 * inv) as u8),
            );
            if let Some(px) = blended {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}

pub struct FrameStats {
    pub layout: Duration,
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
    pub element_count: usize,
}

type TextKey = (LabelId, u32, [u8; 4]);

/// Draws a [`Display`] into an RGBA frame buffer.
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    font: Option<FontArc>,
    text_cache: HashMap<TextKey, Option<Arc<Pixmap>>>,
    canvas: Pixmap,
    layout: LayoutTree,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32, font: Option<FontArc>) -> Result<Self> {
        let canvas = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("cannot allocate a {}x{} canvas", width, height))?;
        if font.is_none() {
            log::warn!("no font loaded; labels and prompts will not be drawn");
        }
        Ok(Self {
            width,
            height,
            font,
            text_cache: HashMap::new(),
            canvas,
            layout: LayoutTree::default(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.canvas = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("cannot allocate a {}x{} canvas", width, height))?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }

    /// Layout of the most recently rendered frame.
    pub fn layout(&self) -> &LayoutTree {
        &self.layout
    }

    pub fn hit_test(&self, display: &Display, x: f32, y: f32) -> Option<ElementId> {
        self.layout.hit_test(display, x, y)
    }

    pub fn render_frame<T: Timer>(
        &mut self,
        display: &Display,
        frame_buffer: &mut [u8],
        timer: &T,
    ) -> Result<FrameStats> {
        let t0 = timer.now_ns();
        let viewport = (self.width as f32, self.height as f32);
        self.layout = match &self.font {
            Some(font) => LayoutTree::compute(display, viewport, &FontMeasure(font)),
            None => LayoutTree::compute(display, viewport, &ApproxMeasure),
        };
        let t_layout = timer.elapsed(t0);

        let t1 = timer.now_ns();
        self.canvas.fill(color(BACKGROUND));
        let mut element_count = 0;
        let ids: Vec<ElementId> = display.descendants(display.root()).collect();
        for id in ids {
            if display.is_hidden(id) {
                continue;
            }
            if let Some(bounds) = self.layout.bounds(id) {
                self.draw_element(display, id, bounds);
                element_count += 1;
            }
        }
        let t_draw = timer.elapsed(t1);

        let t2 = timer.now_ns();
        let data = self.canvas.data();
        if frame_buffer.len() != data.len() {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {}",
                frame_buffer.len(),
                data.len()
            ));
        }
        frame_buffer.copy_from_slice(data);
        let t_copy = timer.elapsed(t2);

        Ok(FrameStats {
            layout: t_layout,
            draw: t_draw,
            copy: t_copy,
            total: t_layout + t_draw + t_copy,
            element_count,
        })
    }

    fn draw_element(&mut self, display: &Display, id: ElementId, bounds: Bounds) {
        let Some(el) = display.get(id) else {
            return;
        };
        match &el.kind {
            ElementKind::Container => {}
            ElementKind::Canvas(pixmap) => {
                self.canvas.draw_pixmap(
                    bounds.x.round() as i32,
                    bounds.y.round() as i32,
                    pixmap.as_ref(),
                    &PixmapPaint::default(),
                    Transform::identity(),
                    None,
                );
            }
            ElementKind::Button { label } => {
                let (fill, text) = if el.disabled {
                    (BUTTON_FILL_DISABLED, BUTTON_TEXT_DISABLED)
                } else {
                    (BUTTON_FILL, BUTTON_TEXT)
                };
                self.draw_box(bounds, fill);
                self.draw_text_centered(label, BUTTON_TEXT_SIZE, text, bounds);
            }
            ElementKind::Html(markup) => {
                let line_height = BODY_TEXT_SIZE * LINE_HEIGHT;
                for (i, line) in html_lines(markup).iter().enumerate() {
                    let row = Bounds::new(
                        bounds.x,
                        bounds.y + i as f32 * line_height,
                        bounds.width,
                        line_height,
                    );
                    self.draw_text_centered(line, BODY_TEXT_SIZE, TEXT, row);
                }
            }
            ElementKind::Select { options, selected } => {
                self.draw_box(bounds, [255, 255, 255, 255]);
                let label = selected
                    .and_then(|i| options.get(i))
                    .map(|o| o.label.as_str())
                    .unwrap_or("");
                let text_area = Bounds::new(bounds.x, bounds.y, bounds.width - 24.0, bounds.height);
                self.draw_text_centered(label, BUTTON_TEXT_SIZE, BUTTON_TEXT, text_area);
                self.draw_chevron(bounds);
            }
        }
    }

    fn draw_box(&mut self, bounds: Bounds, fill: [u8; 4]) {
        let Some(rect) = bounds.to_rect() else {
            return;
        };
        self.canvas
            .fill_rect(rect, &solid(fill), Transform::identity(), None);
        let path = PathBuilder::from_rect(rect);
        let stroke = Stroke {
            width: 1.0,
            ..Stroke::default()
        };
        self.canvas
            .stroke_path(&path, &solid(BORDER), &stroke, Transform::identity(), None);
    }

    fn draw_chevron(&mut self, bounds: Bounds) {
        let cx = bounds.right() - 14.0;
        let cy = bounds.y + bounds.height * 0.5;
        let mut pb = PathBuilder::new();
        pb.move_to(cx - 5.0, cy - 3.0);
        pb.line_to(cx + 5.0, cy - 3.0);
        pb.line_to(cx, cy + 4.0);
        pb.close();
        if let Some(path) = pb.finish() {
            self.canvas.fill_path(
                &path,
                &solid(BUTTON_TEXT),
                FillRule::Winding,
                Transform::identity(),
                None,
            );
        }
    }

    fn text_pixmap(&mut self, text: &str, size: f32, rgba: [u8; 4]) -> Option<Arc<Pixmap>> {
        let font = self.font.as_ref()?;
        let key = (intern_label(text), size.to_bits(), rgba);
        self.text_cache
            .entry(key)
            .or_insert_with(|| render_text_pixmap(text, size, font, rgba).map(Arc::new))
            .clone()
    }

    fn draw_text_centered(&mut self, text: &str, size: f32, rgba: [u8; 4], area: Bounds) {
        if text.is_empty() {
            return;
        }
        let Some(cached) = self.text_pixmap(text, size, rgba) else {
            return;
        };
        let pm: &Pixmap = &cached;
        let x = area.x + (area.width - pm.width() as f32) * 0.5;
        let y = area.y + (area.height - pm.height() as f32) * 0.5;
        self.canvas.draw_pixmap(
            x.round() as i32,
            y.round() as i32,
            pm.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }
}
