// =============================================================================
// WINDOW - native window, event pump, resize flag, cursor capture
// =============================================================================
//
// winit owns the event loop; we drive it with pump_app_events so the render
// loop stays in our hands. Poll with a zero timeout every frame, block with
// no timeout while minimized.

use anyhow::{Context, Result};
use std::time::Duration;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{CursorGrabMode, Fullscreen, Window, WindowAttributes, WindowId};

use crate::config::{KeyBindings, WindowConfig};
use crate::input::{InputState, Key, MouseButton};
use crate::scheduler::SurfaceProvider;

/// Pixel scroll deltas (touchpads) are converted to wheel lines with this
const PIXELS_PER_LINE: f64 = 20.0;

/// How long to keep pumping for the initial window before giving up
const CREATE_ATTEMPTS: usize = 100;

/// Event-side state; everything the handler touches lives here
struct WindowState {
    attributes: WindowAttributes,
    window: Option<Window>,
    create_error: Option<String>,
    created: bool,
    input: InputState,
    bindings: KeyBindings,
    resized: bool,
    close_requested: bool,
    pending_capture: Option<bool>,
    pending_fullscreen_toggle: bool,
}

impl WindowState {
    fn on_key(&mut self, key: Key, pressed: bool, repeat: bool) {
        self.input.set_key(key, pressed);
        if !pressed || repeat {
            return;
        }

        if key == self.bindings.quit {
            log::info!("{:?} pressed, exiting...", key);
            self.close_requested = true;
        } else if key == self.bindings.capture {
            self.pending_capture = Some(!self.input.is_captured());
        } else if key == self.bindings.fullscreen {
            self.pending_fullscreen_toggle = true;
        }
    }

    /// Right click captures the cursor; releasing is left to the capture key
    fn on_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        self.input.set_mouse_button(button, pressed);
        if button == MouseButton::Right && self.input.is_mouse_button_down(button) && !self.input.is_captured() {
            self.pending_capture = Some(true);
        }
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.created {
            return;
        }
        self.created = true;

        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => self.window = Some(window),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.create_error = Some(e.to_string());
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.close_requested = true;
            }

            // Sticky until the frame scheduler reads it; 0x0 means minimized
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.resized = true;
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    if let Some(key) = Key::from_keycode(code) {
                        self.on_key(key, event.state.is_pressed(), event.repeat);
                    }
                }
            }

            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(button) = MouseButton::from_winit(button) {
                    self.on_mouse_button(button, state.is_pressed());
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.input.cursor_moved(position.x, position.y);
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => (pos.y / PIXELS_PER_LINE) as f32,
                };
                self.input.scrolled(lines);
            }

            // Release events for held keys will not arrive while unfocused
            WindowEvent::Focused(false) => {
                self.input.release_all();
                if self.input.is_captured() {
                    self.pending_capture = Some(false);
                }
            }

            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        // Raw motion keeps working while the cursor is locked
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.input.mouse_motion(dx, dy);
        }
    }
}

/// The application window and its event loop
pub struct AppWindow {
    window: Window,
    event_loop: EventLoop<()>,
    state: WindowState,
    fullscreen: bool,
}

impl AppWindow {
    pub fn new(config: &WindowConfig, bindings: KeyBindings) -> Result<Self> {
        let mut event_loop = EventLoop::new().context("Failed to create event loop")?;

        let mut attributes = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height));
        if config.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let mut state = WindowState {
            attributes,
            window: None,
            create_error: None,
            created: false,
            input: InputState::new(),
            bindings,
            resized: false,
            close_requested: false,
            pending_capture: None,
            pending_fullscreen_toggle: false,
        };

        for _ in 0..CREATE_ATTEMPTS {
            if state.window.is_some() || state.create_error.is_some() {
                break;
            }
            if let PumpStatus::Exit(code) = event_loop.pump_app_events(Some(Duration::from_millis(10)), &mut state) {
                anyhow::bail!("Event loop exited with code {} before the window was created", code);
            }
        }

        if let Some(error) = state.create_error.take() {
            anyhow::bail!("Failed to create window: {}", error);
        }
        let window = state.window.take().context("Window was not created")?;

        // The first frame builds the swapchain from the current size anyway
        state.resized = false;

        let size = window.inner_size();
        log::info!("Window created: {}x{} ({})", size.width, size.height, config.title);

        Ok(Self {
            window,
            event_loop,
            state,
            fullscreen: config.fullscreen,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.state.input
    }

    pub fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// Process pending events without blocking
    pub fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            log::info!("Event loop exited with code {}", code);
            self.state.close_requested = true;
        }
        self.apply_pending();
    }

    /// Cursor and fullscreen changes need the window, which the handler does
    /// not own; they are queued by the handler and applied here
    fn apply_pending(&mut self) {
        if let Some(capture) = self.state.pending_capture.take() {
            self.set_capture(capture);
        }
        if std::mem::take(&mut self.state.pending_fullscreen_toggle) {
            self.toggle_fullscreen();
        }
    }

    fn set_capture(&mut self, capture: bool) {
        if !self.state.input.set_captured(capture) {
            return;
        }

        if capture {
            let grabbed = self
                .window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined));
            if let Err(e) = grabbed {
                log::warn!("Cursor grab unavailable: {}", e);
            }
            self.window.set_cursor_visible(false);
            log::info!("Mouse captured at {}", self.state.input.cursor_position());
        } else {
            if let Err(e) = self.window.set_cursor_grab(CursorGrabMode::None) {
                log::warn!("Failed to release cursor: {}", e);
            }
            self.window.set_cursor_visible(true);
            log::info!("Mouse released");
        }
    }

    fn toggle_fullscreen(&mut self) {
        self.fullscreen = !self.fullscreen;

        if self.fullscreen {
            self.window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            log::info!("Entered fullscreen mode");
        } else {
            self.window.set_fullscreen(None);
            log::info!("Exited fullscreen mode");
        }

        self.state.resized = true;
    }
}

impl SurfaceProvider for AppWindow {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.state.resized)
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }
}
