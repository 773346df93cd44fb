use serde::{Deserialize, Serialize};
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Transform};

/// Draws a stimulus onto a freshly created canvas.
///
/// Invoked exactly once per trial, before any input can be handled.
pub trait DrawStimulus: Send {
    fn draw(&self, canvas: &mut Pixmap);
}

impl<F> DrawStimulus for F
where
    F: Fn(&mut Pixmap) + Send,
{
    fn draw(&self, canvas: &mut Pixmap) {
        self(canvas)
    }
}

/// Built-in stimulus shapes, drawn centered on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum StimulusType {
    Circle {
        radius: f32,
        color: [u8; 4],
    },
    Rectangle {
        width: f32,
        height: f32,
        color: [u8; 4],
    },
    Arrow {
        direction: ArrowDirection,
        size: f32,
        color: [u8; 4],
    },
    FixationCross {
        size: f32,
        thickness: f32,
        color: [u8; 4],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrowDirection {
    Up,
    Down,
    Left,
    Right,
}

fn paint(color: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.anti_alias = false;
    paint.set_color(Color::from_rgba8(color[0], color[1], color[2], color[3]));
    paint
}

impl DrawStimulus for StimulusType {
    fn draw(&self, canvas: &mut Pixmap) {
        let cx = canvas.width() as f32 * 0.5;
        let cy = canvas.height() as f32 * 0.5;

        match self {
            StimulusType::Circle { radius, color } => {
                if let Some(path) = PathBuilder::from_circle(cx, cy, *radius) {
                    canvas.fill_path(
                        &path,
                        &paint(*color),
                        FillRule::Winding,
                        Transform::identity(),
                        None,
                    );
                }
            }
            StimulusType::Rectangle {
                width,
                height,
                color,
            } => {
                if let Some(rect) = Rect::from_xywh(cx - width * 0.5, cy - height * 0.5, *width, *height)
                {
                    canvas.fill_rect(rect, &paint(*color), Transform::identity(), None);
                }
            }
            StimulusType::Arrow {
                direction,
                size,
                color,
            } => {
                let s = *size;
                let mut pb = PathBuilder::new();
                match direction {
                    ArrowDirection::Right => {
                        pb.move_to(cx + s, cy);
                        pb.line_to(cx, cy - s);
                        pb.line_to(cx, cy + s);
                    }
                    ArrowDirection::Left => {
                        pb.move_to(cx - s, cy);
                        pb.line_to(cx, cy - s);
                        pb.line_to(cx, cy + s);
                    }
                    ArrowDirection::Up => {
                        pb.move_to(cx, cy - s);
                        pb.line_to(cx - s, cy);
                        pb.line_to(cx + s, cy);
                    }
                    ArrowDirection::Down => {
                        pb.move_to(cx, cy + s);
                        pb.line_to(cx - s, cy);
                        pb.line_to(cx + s, cy);
                    }
                }
                pb.close();
                if let Some(path) = pb.finish() {
                    canvas.fill_path(
                        &path,
                        &paint(*color),
                        FillRule::Winding,
                        Transform::identity(),
                        None,
                    );
                }
            }
            StimulusType::FixationCross {
                size,
                thickness,
                color,
            } => {
                let p = paint(*color);
                let bars = [
                    Rect::from_xywh(cx - size * 0.5, cy - thickness * 0.5, *size, *thickness),
                    Rect::from_xywh(cx - thickness * 0.5, cy - size * 0.5, *thickness, *size),
                ];
                for bar in bars.into_iter().flatten() {
                    canvas.fill_rect(bar, &p, Transform::identity(), None);
                }
            }
        }
    }
}
