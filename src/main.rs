// =============================================================================
// TRIANGLE ENGINE - Minimal Vulkan renderer
// =============================================================================
//
// Opens one fixed-size window and draws a hard-coded triangle with Vulkan,
// as fast as the present mode allows, until the window is closed or ESC is
// pressed.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (App)                                         │
// │    └── Engine                                                   │
// │          ├── GraphicsContext (instance, surface, device)        │
// │          ├── Swapchain + Pipeline + Framebuffers                │
// │          ├── Command buffers (recorded once)                    │
// │          └── FrameScheduler (fences, semaphores)                │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Wait for the fence of the current frame slot
// 2. Acquire swapchain image
// 3. Submit pre-recorded commands to GPU
// 4. Present rendered image to screen
//
// =============================================================================

mod backend;
mod config;
mod engine;
mod error;
mod frame;

use anyhow::{Context, Result};
use config::Config;
use engine::Engine;
use frame::FpsCounter;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let (config, config_error) = Config::load();

    init_logging(&config);
    if let Some(e) = config_error {
        log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
    }
    log::info!("Starting triangle engine");
    log::info!(
        "Window: {}x{} at ({}, {})",
        config.window.width,
        config.window.height,
        config.window.x,
        config.window.y
    );

    let event_loop = EventLoop::new()?;
    // Render continuously, no waiting for input
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Initialize logging, optionally into a file instead of stderr
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    // RUST_LOG still wins
    builder.parse_default_env();

    if config.debug.log_to_file {
        match File::create(&config.debug.log_file) {
            Ok(mut file) => {
                let _ = writeln!(file, "=== Triangle Engine Log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!(
                    "Warning: cannot open log file {}: {}. Logging to stderr.",
                    config.debug.log_file, e
                );
            }
        }
    }

    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// IMPORTANT: the engine holds a surface created from the window, so it is
/// dropped first (see Drop below).
struct App {
    config: Config,
    engine: Option<Engine>,
    window: Option<Arc<Window>>,

    /// First fatal error; ends the event loop and becomes main's result
    error: Option<anyhow::Error>,

    fps: FpsCounter,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            engine: None,
            window: None,
            error: None,
            fps: FpsCounter::default(),
            last_frame_time: Instant::now(),
        }
    }

    fn create_window(&self, event_loop: &ActiveEventLoop) -> Result<Arc<Window>> {
        let window_config = &self.config.window;

        // Resizing would need a swapchain/pipeline rebuild, which this engine doesn't do
        let window_attributes = WindowAttributes::default()
            .with_title(&window_config.title)
            .with_inner_size(PhysicalSize::new(window_config.width, window_config.height))
            .with_position(PhysicalPosition::new(window_config.x, window_config.y))
            .with_resizable(false);

        let window = event_loop
            .create_window(window_attributes)
            .context("Failed to create window")?;
        Ok(Arc::new(window))
    }

    fn init_engine(&self, window: &Window) -> Result<Engine> {
        let surface_factory = backend::surface::factory_for(window)?;
        let size = window.inner_size();

        let engine = Engine::new(&self.config, surface_factory.as_ref(), size.width, size.height)
            .context("Failed to initialize Vulkan")?;
        engine.log_summary();
        Ok(engine)
    }

    /// Record a fatal error and stop the event loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    fn render_frame(&mut self) -> Result<()> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };

        let frame = engine.draw_frame().context("Frame failed")?;
        log::trace!("Frame slot {} image {}", frame.slot, frame.image_index);

        self.update_fps();
        Ok(())
    }

    fn update_fps(&mut self) {
        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time);
        self.last_frame_time = now;

        let Some(fps) = self.fps.tick(frame_time) else {
            return;
        };

        if self.config.debug.show_fps {
            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    1000.0 / fps
                ));
            }
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(ref engine) = self.engine {
            if let Err(e) = engine.wait_idle() {
                log::error!("Wait idle on shutdown failed: {}", e);
            }
        }
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.error.is_some() {
            return;
        }

        let window = match self.create_window(event_loop) {
            Ok(window) => window,
            Err(e) => return self.fail(event_loop, e),
        };

        match self.init_engine(&window) {
            Ok(engine) => {
                self.engine = Some(engine);
                self.window = Some(window);
                self.last_frame_time = Instant::now();
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render_frame() {
                    self.fail(event_loop, e);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    /// One frame per loop iteration.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        // Engine first: its surface was created from the window
        self.engine = None;
        self.window = None;
        log::info!("Cleanup complete");
    }
}
