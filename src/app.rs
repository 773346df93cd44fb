use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ab_glyph::FontArc;
use anyhow::{Context, Result};
use cogex_core::{ElementId, ElementKind};
use cogex_experiment::ExperimentConfig;
use cogex_render::SkiaRenderer;
use cogex_timing::{FrameTimes, Timer};
use pixels::{Pixels, SurfaceTexture};
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Icon, Window, WindowId},
};

use crate::Runtime;

pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SkiaRenderer>,
    runtime: Runtime,
    config: ExperimentConfig,
    font: Option<FontArc>,
    icon: Option<Icon>,
    cursor: Option<PhysicalPosition<f64>>,
    scale_factor: f64,
    refresh_rate: Option<f64>,
    frame_times: FrameTimes,
    last_frame_ns: Option<u64>,
    error: Option<anyhow::Error>,
    saved: bool,
    should_exit: bool,
}

impl App {
    pub fn new(config: ExperimentConfig, runtime: Runtime) -> Result<Self> {
        let font = config.font_path.as_deref().map(load_font).transpose()?;
        let icon = config.icon_path.as_deref().map(load_icon).transpose()?;

        Ok(Self {
            window: None,
            pixels: None,
            renderer: None,
            runtime,
            config,
            font,
            icon,
            cursor: None,
            scale_factor: 1.0,
            refresh_rate: None,
            frame_times: FrameTimes::default(),
            last_frame_ns: None,
            error: None,
            saved: false,
            should_exit: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        log::info!(
            "platform {} ({}); ESC aborts the experiment",
            std::env::consts::OS,
            std::env::consts::ARCH
        );

        event_loop.run_app(&mut self)?;
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow::anyhow!("No monitor available"))?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let mut window_attributes = Window::default_attributes()
            .with_title(self.config.window_title.clone())
            .with_resizable(!self.config.fullscreen)
            .with_window_icon(self.icon.clone());
        if self.config.fullscreen {
            window_attributes = window_attributes
                .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor))));
        }

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();
        self.scale_factor = window.scale_factor();

        log::info!(
            "display {}x{} at scale {:.2}, {}",
            physical_size.width,
            physical_size.height,
            self.scale_factor,
            self.refresh_rate
                .map_or("unknown refresh rate".to_string(), |hz| format!("{hz:.1} Hz"))
        );

        let surface_texture =
            SurfaceTexture::new(physical_size.width, physical_size.height, window.clone());
        self.pixels = Some(Pixels::new(
            physical_size.width,
            physical_size.height,
            surface_texture,
        )?);
        self.renderer = Some(SkiaRenderer::new(
            physical_size.width,
            physical_size.height,
            self.font.clone(),
        )?);

        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };
        let stats = renderer.render_frame(
            self.runtime.display(),
            pixels.frame_mut(),
            self.runtime.timer(),
        )?;
        pixels.render()?;

        let now = self.runtime.timer().now_ns();
        if let Some(last) = self.last_frame_ns.replace(now) {
            self.frame_times.record(Duration::from_nanos(now - last));
        }

        log::trace!(
            "layout {:.3}ms, draw {:.3}ms, copy {:.3}ms, total {:.3}ms, {} elements",
            stats.layout.as_secs_f64() * 1e3,
            stats.draw.as_secs_f64() * 1e3,
            stats.copy.as_secs_f64() * 1e3,
            stats.total.as_secs_f64() * 1e3,
            stats.element_count,
        );
        Ok(())
    }

    /// Logs a runtime failure and ends the session with it.
    fn check<T>(
        &mut self,
        result: cogex_experiment::Result<T>,
        event_loop: &ActiveEventLoop,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                log::error!("{err}");
                self.error = Some(anyhow::Error::new(err).context("experiment stopped"));
                self.cleanup_and_exit(event_loop);
                None
            }
        }
    }

    fn handle_click(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(pos), Some(renderer)) = (self.cursor, self.renderer.as_ref()) else {
            return;
        };
        let Some(target) = renderer.hit_test(self.runtime.display(), pos.x as f32, pos.y as f32)
        else {
            return;
        };
        let is_select = self
            .runtime
            .display()
            .get(target)
            .is_some_and(|e| matches!(e.kind, ElementKind::Select { .. }));
        let result = if is_select {
            self.step_selection(target, 1)
        } else {
            self.runtime.click(target)
        };
        self.check(result, event_loop);
    }

    fn handle_input(&mut self, key: PhysicalKey, event_loop: &ActiveEventLoop) {
        let PhysicalKey::Code(code) = key else {
            return;
        };
        let delta = match code {
            KeyCode::Escape => {
                self.runtime.abort();
                self.cleanup_and_exit(event_loop);
                return;
            }
            KeyCode::ArrowUp => -1,
            KeyCode::ArrowDown => 1,
            _ => return,
        };
        if let Some(list) = self.focused_select() {
            let result = self.step_selection(list, delta);
            self.check(result, event_loop);
        }
    }

    fn focused_select(&self) -> Option<ElementId> {
        let display = self.runtime.display();
        display.descendants(display.root()).find(|id| {
            display
                .get(*id)
                .is_some_and(|e| matches!(e.kind, ElementKind::Select { .. }))
        })
    }

    /// Moves a selection list by `delta` options, wrapping at either end.
    fn step_selection(&mut self, list: ElementId, delta: isize) -> cogex_experiment::Result<bool> {
        let next = match self.runtime.display().get(list).map(|e| &e.kind) {
            Some(ElementKind::Select { options, selected }) if !options.is_empty() => {
                let current = selected.unwrap_or(0) as isize;
                (current + delta).rem_euclid(options.len() as isize) as usize
            }
            _ => return Ok(false),
        };
        self.runtime.select(list, next)
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                log::error!("failed to resize surface: {e}");
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                log::error!("failed to resize buffer: {e}");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(new_size.width, new_size.height) {
                log::error!("failed to resize canvas: {e}");
            }
        }
        log::debug!(
            "display resized to {}x{} at scale {:.2}",
            new_size.width,
            new_size.height,
            self.scale_factor
        );
    }

    fn save_results(&mut self) {
        if self.saved {
            return;
        }
        self.saved = true;
        if let Err(e) = self.runtime.save_results(&self.config.results_path) {
            log::error!("{e}");
            if self.error.is_none() {
                self.error = Some(e.into());
            }
        }
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        self.save_results();
        if !self.frame_times.is_empty() {
            let pacing = self.frame_times.stats();
            log::info!(
                "frame pacing: mean {:.3}ms, jitter {:.3}ms, max {:.3}ms ({:.1} fps)",
                pacing.average_frame_time_ns / 1e6,
                pacing.jitter_ns / 1e6,
                pacing.max_frame_time_ns / 1e6,
                pacing.effective_fps,
            );
        }
        log::info!(
            "{} trial results recorded",
            self.runtime.results().len()
        );
        self.should_exit = true;
        event_loop.exit();
    }
}

fn load_font(path: &Path) -> Result<FontArc> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    FontArc::try_from_vec(bytes).with_context(|| format!("parsing font {}", path.display()))
}

fn load_icon(path: &Path) -> Result<Icon> {
    let image = image::open(path)
        .with_context(|| format!("loading icon {}", path.display()))?
        .into_rgba8();
    let (width, height) = image.dimensions();
    Icon::from_rgba(image.into_raw(), width, height)
        .with_context(|| format!("bad icon {}", path.display()))
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.create_window_and_surface(event_loop) {
            log::error!("failed to create window and surface: {e:#}");
            self.error = Some(e);
            self.should_exit = true;
            event_loop.exit();
            return;
        }
        let started = self.runtime.start();
        self.check(started, event_loop);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.runtime.abort();
                self.cleanup_and_exit(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let updated = self.runtime.update();
                if self.check(updated, event_loop).is_none() {
                    return;
                }
                if let Err(e) = self.render() {
                    log::error!("render failed: {e:#}");
                    self.error = Some(e);
                    self.cleanup_and_exit(event_loop);
                    return;
                }
                if let Some(win) = &self.window {
                    win.request_redraw();
                }
            }
            WindowEvent::CursorMoved { position, .. } => self.cursor = Some(position),
            WindowEvent::CursorLeft { .. } => self.cursor = None,
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.handle_click(event_loop),
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                self.handle_input(event.physical_key, event_loop);
            }
            WindowEvent::Resized(sz) => self.handle_resize(sz),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = scale_factor;
                if let Some(window) = &self.window {
                    self.handle_resize(window.inner_size());
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if !self.should_exit && self.runtime.is_finished() {
            log::info!("experiment completed");
            self.cleanup_and_exit(event_loop);
        }
        if self.should_exit {
            event_loop.exit();
        }
    }
}

