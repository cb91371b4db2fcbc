// =============================================================================
// CUBE ENGINE - minimal Vulkan renderer with a free-fly camera
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  AppWindow (winit, pumped once per frame)                       │
// │    └── InputState -> Camera                                     │
// │  FrameScheduler (slot state machine, rebuild decisions)         │
// │    └── Renderer (FrameBackend)                                  │
// │          ├── VulkanDevice (instance, surface, queues)           │
// │          ├── static geometry, frame slots, descriptors          │
// │          └── FrameTargets (swapchain, depth, pipeline)          │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Pump window events, fold input into the camera
// 2. Wait for the slot's fence
// 3. Acquire swapchain image
// 4. Record, write uniforms, submit
// 5. Present; rebuild the swapchain if it went stale or the window resized
// 6. Advance to the next slot
//
// =============================================================================

mod backend;
mod camera;
mod config;
mod geometry;
mod input;
mod renderer;
mod scheduler;
mod window;

use anyhow::Result;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use backend::uniform::UniformBufferObject;
use camera::Camera;
use config::Config;
use renderer::Renderer;
use scheduler::{FrameBackend, FrameScheduler, FrameStatus, SurfaceProvider};
use window::AppWindow;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> ExitCode {
    let config = Config::load();
    init_logging(&config);

    log::info!("Starting cube engine");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Requested present mode: {}", config.graphics.present_mode);

    match run(&config) {
        Ok(()) => {
            log::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Fatal error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// LOGGING
// =============================================================================

/// Writes every record to stderr and to the log file
struct LogTee {
    file: File,
}

impl Write for LogTee {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        self.file.flush()
    }
}

fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    // RUST_LOG overrides the default level
    builder.parse_env("RUST_LOG");

    let mut file_error = None;
    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== Cube Engine Log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(LogTee { file })));
            }
            Err(e) => file_error = Some(e),
        }
    }

    builder.init();

    if let Some(e) = file_error {
        log::warn!("Could not open log file {:?}: {}", config.debug.log_file, e);
    }
}

// =============================================================================
// MAIN LOOP
// =============================================================================

fn run(config: &Config) -> Result<()> {
    // Declared before the renderer so the surface is destroyed while the
    // window still exists
    let mut window = AppWindow::new(&config.window, config.controls.bindings())?;
    let mut renderer = Renderer::new(config, &window)?;
    let mut scheduler = FrameScheduler::new();
    let mut camera = Camera::from_config(&config.camera);
    let mut fps = FpsCounter::new(Instant::now());

    log::info!("Swapchain images: {}", renderer.image_count());
    log::info!("Controls: WASD move, Space/Ctrl up/down, M or right mouse to capture, scroll to zoom");

    let start = Instant::now();
    let mut last_frame = start;

    while !window.should_close() {
        window.poll_events();
        if window.should_close() {
            break;
        }

        let now = Instant::now();
        let delta_time = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;

        camera::apply_input(&mut camera, window.input_mut(), delta_time);

        let elapsed = now.duration_since(start).as_secs_f32();
        let status = scheduler.run_frame(&mut renderer, &mut window, |extent| {
            frame_uniforms(&camera, elapsed, extent)
        })?;

        if status == FrameStatus::Drawn && config.debug.show_fps {
            if let Some((rate, frame_ms)) = fps.tick(Instant::now()) {
                let mode = if window.is_fullscreen() { "fullscreen" } else { "windowed" };
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{}]",
                    config.window.title, rate, frame_ms, mode
                ));
            }
        }
    }

    // Drain the GPU before anything starts dropping
    renderer.wait_idle()?;

    log::info!(
        "Rendered {} frames, {} swapchain rebuilds",
        scheduler.frames_drawn(),
        scheduler.rebuilds()
    );
    log::debug!(
        "Final camera: yaw {:.1}, pitch {:.1}, fov {:.1}",
        camera.yaw(),
        camera.pitch(),
        camera.zoom()
    );
    Ok(())
}

fn frame_uniforms(camera: &Camera, elapsed: f32, (width, height): (u32, u32)) -> UniformBufferObject {
    let aspect = if height == 0 { 1.0 } else { width as f32 / height as f32 };
    UniformBufferObject {
        model: camera::model_rotation(elapsed),
        view: camera.view_matrix(),
        proj: camera.projection_matrix(aspect),
    }
}

// =============================================================================
// FPS TRACKING
// =============================================================================

struct FpsCounter {
    frames: u32,
    last_frame: Instant,
    last_report: Instant,
}

impl FpsCounter {
    fn new(now: Instant) -> Self {
        Self {
            frames: 0,
            last_frame: now,
            last_report: now,
        }
    }

    /// Count a frame; once per second returns (frames per second, last frame
    /// time in ms)
    fn tick(&mut self, now: Instant) -> Option<(f32, f32)> {
        let frame_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.frames += 1;

        let since_report = now.duration_since(self.last_report);
        if since_report < Duration::from_secs(1) {
            return None;
        }

        let rate = self.frames as f32 / since_report.as_secs_f32();
        self.frames = 0;
        self.last_report = now;
        Some((rate, frame_time * 1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_reports_once_per_second() {
        let start = Instant::now();
        let mut fps = FpsCounter::new(start);

        for i in 1..60 {
            assert!(fps.tick(start + Duration::from_millis(i * 16)).is_none());
        }
        let (rate, frame_ms) = fps.tick(start + Duration::from_millis(1000)).unwrap();
        assert!((rate - 60.0).abs() < 1e-3);
        assert!((frame_ms - 56.0).abs() < 1e-3);
        assert!(fps.tick(start + Duration::from_millis(1016)).is_none());
    }

    #[test]
    fn uniforms_use_extent_aspect() {
        let camera = Camera::from_config(&config::CameraConfig::default());
        let wide = frame_uniforms(&camera, 0.0, (1600, 800));
        let square = frame_uniforms(&camera, 0.0, (800, 800));
        assert!((square.proj.x_axis.x / wide.proj.x_axis.x - 2.0).abs() < 1e-4);
        assert_eq!(wide.model, glam::Mat4::IDENTITY);

        // Minimized extents never divide by zero
        assert!(frame_uniforms(&camera, 0.0, (0, 0)).proj.is_finite());
    }
}
