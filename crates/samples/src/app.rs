use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use gfx_hal::InstanceConfig;
use renderer::{RendererConfig, RendererError, SurfaceDescBuilderError, VulkanRenderer};
use resource_manager::ResourceManagerError;
use tracing::{debug, error, info};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    window::{Window, WindowId},
};

use crate::{samples::SampleScene, Args};

const ENGINE_NAME: &str = "Vulkan Samples";
const WINDOW_SIZE: LogicalSize<u32> = LogicalSize::new(1280, 720);

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Window Creation Error: {0}")]
    WindowCreation(#[from] winit::error::OsError),
    #[error("Renderer Error: {0}")]
    Renderer(#[from] RendererError),
    #[error("Invalid surface description: {0}")]
    SurfaceDesc(#[from] SurfaceDescBuilderError),
    #[error("Resource Manager Error: {0}")]
    ResourceManager(#[from] ResourceManagerError),
    #[error("Scene Error: {0}")]
    Scene(#[from] scene::SceneError),
}

/// Everything one running sample owns.
///
/// `renderer` is declared before `window` so it is dropped while the window still exists.
struct Application {
    renderer: VulkanRenderer,
    scene: SampleScene,
    window: Arc<Window>,

    frame_count: u32,
    last_fps_update_time: Instant,
}

impl Application {
    fn new(event_loop: &ActiveEventLoop, args: &Args) -> Result<Self, AppError> {
        let window = Arc::new(
            event_loop.create_window(
                Window::default_attributes()
                    .with_title(format!("{} - {}", ENGINE_NAME, args.sample.title()))
                    .with_inner_size(WINDOW_SIZE),
            )?,
        );

        let size = window.inner_size();
        let mut config = RendererConfig {
            instance: InstanceConfig {
                application_name: args.sample.title().to_string(),
                engine_name: ENGINE_NAME.to_string(),
                enable_validation: args.validation,
                ..Default::default()
            },
            ..Default::default()
        };
        config.swapchain.extent.width = size.width;
        config.swapchain.extent.height = size.height;

        let mut renderer = VulkanRenderer::new(config);
        renderer.init(window.as_ref())?;

        let scene = args.sample.setup(&mut renderer, args)?;
        renderer.construct_render_pass()?;
        info!(
            "Sample '{}' ready with {} surface(s).",
            args.sample.title(),
            renderer.surfaces().len()
        );

        Ok(Self {
            renderer,
            scene,
            window,
            frame_count: 0,
            last_fps_update_time: Instant::now(),
        })
    }

    /// Returns `Ok(false)` once the window asked to close.
    fn handle_event(&mut self, event: &WindowEvent) -> Result<bool, AppError> {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested. Exiting...");
                return Ok(false);
            }
            WindowEvent::Resized(physical_size) => {
                info!(
                    "Window resized to: {}x{}",
                    physical_size.width, physical_size.height
                );
                self.renderer
                    .resize(physical_size.width, physical_size.height);
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                debug!("Scale factor changed: {}", scale_factor);
                let size = self.window.inner_size();
                self.renderer.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                self.scene.update(&mut self.renderer);
                self.renderer.render_frame()?;
                self.update_title();
                self.window.request_redraw();
            }
            _ => {}
        }
        Ok(true)
    }

    fn update_title(&mut self) {
        self.frame_count += 1;
        let elapsed = self.last_fps_update_time.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frame_count as f64 / elapsed.as_secs_f64();
            self.window.set_title(&format!(
                "{} - {} - {:.0} FPS",
                ENGINE_NAME,
                self.scene.sample().title(),
                fps
            ));
            self.frame_count = 0;
            self.last_fps_update_time = Instant::now();
        }
    }
}

/// Owns the application context and forwards winit callbacks to it.
pub struct ApplicationWrapper {
    args: Args,
    app: Option<Application>,
    error: Option<AppError>,
}

impl ApplicationWrapper {
    pub fn new(args: Args) -> Self {
        Self {
            args,
            app: None,
            error: None,
        }
    }

    /// The error that stopped the event loop, if it did not exit cleanly.
    pub fn take_error(&mut self) -> Option<AppError> {
        self.error.take()
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop, error: Option<AppError>) {
        if let Some(e) = &error {
            error!("{}", e);
        }
        self.error = error;
        if let Some(mut app) = self.app.take() {
            app.renderer.terminate();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for ApplicationWrapper {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.app.is_some() {
            return;
        }
        match Application::new(event_loop, &self.args) {
            Ok(app) => {
                app.window.request_redraw();
                self.app = Some(app);
            }
            Err(e) => self.shutdown(event_loop, Some(e)),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(app) = &mut self.app else {
            return;
        };
        match app.handle_event(&event) {
            Ok(true) => {}
            Ok(false) => self.shutdown(event_loop, None),
            Err(e) => self.shutdown(event_loop, Some(e)),
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut app) = self.app.take() {
            app.renderer.terminate();
        }
    }
}
