// =============================================================================
// WINDOW - Polling winit window and per-frame input state
// =============================================================================
//
// The editor owns its frame loop, so the event loop is pumped once per frame
// with a zero timeout instead of handing control to `run_app`. Everything the
// event handler learns is folded into an `InputState`, which is plain data
// and unit tested without a display.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Fullscreen, WindowAttributes, WindowId};

pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;

use crate::backend::{Surface, VulkanDevice};
use crate::error::WindowError;

/// Pumps needed at most before the platform hands out the first `resumed`
const INIT_PUMPS: usize = 16;

// =============================================================================
// INPUT STATE
// =============================================================================

/// Keyboard, mouse and window state accumulated between two `step` calls
#[derive(Debug, Default)]
pub struct InputState {
    keys_down: HashSet<KeyCode>,
    /// Keys that went down since the last `begin_frame`
    keys_pressed: HashSet<KeyCode>,
    mouse_down: HashSet<MouseButton>,
    cursor: Option<(f64, f64)>,
    cursor_delta: (f64, f64),
    resized: Option<(u32, u32)>,
    close_requested: bool,
}

impl InputState {
    /// Forget edge-triggered state from the previous frame
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.cursor_delta = (0.0, 0.0);
    }

    pub fn key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            // Auto-repeat arrives as further presses of a key already down
            if self.keys_down.insert(key) {
                self.keys_pressed.insert(key);
            }
        } else {
            self.keys_down.remove(&key);
        }
    }

    pub fn mouse_button(&mut self, button: MouseButton, pressed: bool) {
        if pressed {
            self.mouse_down.insert(button);
        } else {
            self.mouse_down.remove(&button);
        }
    }

    pub fn cursor_moved(&mut self, x: f64, y: f64) {
        if let Some((px, py)) = self.cursor {
            self.cursor_delta.0 += x - px;
            self.cursor_delta.1 += y - py;
        }
        self.cursor = Some((x, y));
    }

    /// The next move after re-entering must not produce a jump
    pub fn cursor_left(&mut self) {
        self.cursor = None;
    }

    pub fn resized(&mut self, width: u32, height: u32) {
        self.resized = Some((width, height));
    }

    /// Released keys are never reported to an unfocused window
    pub fn focus_lost(&mut self) {
        self.keys_down.clear();
        self.mouse_down.clear();
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    pub fn was_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn is_mouse_down(&self, button: MouseButton) -> bool {
        self.mouse_down.contains(&button)
    }

    pub fn cursor_position(&self) -> Option<(f64, f64)> {
        self.cursor
    }

    pub fn cursor_delta(&self) -> (f64, f64) {
        self.cursor_delta
    }

    /// Latest size since the previous call, reported once
    pub fn take_resized(&mut self) -> Option<(u32, u32)> {
        self.resized.take()
    }
}

// =============================================================================
// EVENT HANDLER
// =============================================================================

struct WindowState {
    attributes: WindowAttributes,
    window: Option<Arc<winit::window::Window>>,
    create_error: Option<winit::error::OsError>,
    input: InputState,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                self.create_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.input.request_close();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.input.resized(size.width, size.height);
            }
            WindowEvent::Focused(false) => self.input.focus_lost(),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.input.key(key, event.state == ElementState::Pressed);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.input.mouse_button(button, state == ElementState::Pressed);
            }
            WindowEvent::CursorMoved { position, .. } => self.input.cursor_moved(position.x, position.y),
            WindowEvent::CursorLeft { .. } => self.input.cursor_left(),
            _ => {}
        }
    }
}

// =============================================================================
// WINDOW
// =============================================================================

pub struct Window {
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl Window {
    /// Create the event loop and the window, pumping until the platform
    /// delivers it
    pub fn init(width: u32, height: u32, title: &str) -> Result<Self, WindowError> {
        let event_loop = EventLoop::new()?;
        let attributes = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(winit::dpi::PhysicalSize::new(width, height));

        let mut window = Self {
            state: WindowState {
                attributes,
                window: None,
                create_error: None,
                input: InputState::default(),
            },
            event_loop,
        };

        for _ in 0..INIT_PUMPS {
            let status = window.pump();
            if let Some(e) = window.state.create_error.take() {
                return Err(WindowError::Os(e));
            }
            if window.state.window.is_some() {
                log::info!("Window: {}x{} ({})", width, height, title);
                return Ok(window);
            }
            if matches!(status, PumpStatus::Exit(_)) {
                break;
            }
        }
        Err(WindowError::NotCreated)
    }

    fn pump(&mut self) -> PumpStatus {
        self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.state)
    }

    /// Process pending events without blocking. Returns false once the
    /// window was closed or Escape was pressed.
    pub fn step(&mut self) -> bool {
        self.state.input.begin_frame();
        if let PumpStatus::Exit(code) = self.pump() {
            log::info!("Event loop exited with code {}", code);
            return false;
        }
        if self.state.input.close_requested() {
            return false;
        }
        if self.state.input.was_key_pressed(KeyCode::Escape) {
            log::info!("ESC pressed, exiting...");
            return false;
        }
        if self.state.input.was_key_pressed(KeyCode::F11) {
            self.toggle_fullscreen();
        }
        true
    }

    fn handle(&self) -> Result<&Arc<winit::window::Window>, WindowError> {
        self.state.window.as_ref().ok_or(WindowError::NotCreated)
    }

    fn toggle_fullscreen(&self) {
        if let Some(window) = &self.state.window {
            let fullscreen = window.fullscreen().is_none();
            window.set_fullscreen(fullscreen.then_some(Fullscreen::Borderless(None)));
            log::info!("Fullscreen: {}", if fullscreen { "ON" } else { "OFF" });
        }
    }

    pub fn set_title(&self, title: &str) {
        if let Some(window) = &self.state.window {
            window.set_title(title);
        }
    }

    /// Drawable size in pixels; (0, 0) while minimized
    pub fn framebuffer_size(&self) -> (u32, u32) {
        self.state
            .window
            .as_ref()
            .map(|w| {
                let size = w.inner_size();
                (size.width, size.height)
            })
            .unwrap_or((0, 0))
    }

    pub fn display_handle(&self) -> Result<RawDisplayHandle, WindowError> {
        Ok(self.handle()?.display_handle()?.as_raw())
    }

    pub fn create_surface(&self, device: &Arc<VulkanDevice>) -> Result<Surface, WindowError> {
        let window = self.handle()?;
        let display = window.display_handle()?.as_raw();
        let raw = window.window_handle()?.as_raw();
        Ok(Surface::new(device, display, raw)?)
    }

    pub fn input(&self) -> &InputState {
        &self.state.input
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.state.input.is_key_down(key)
    }

    pub fn was_key_pressed(&self, key: KeyCode) -> bool {
        self.state.input.was_key_pressed(key)
    }

    pub fn is_mouse_down(&self, button: MouseButton) -> bool {
        self.state.input.is_mouse_down(button)
    }

    pub fn cursor_position(&self) -> Option<(f64, f64)> {
        self.state.input.cursor_position()
    }

    pub fn cursor_delta(&self) -> (f64, f64) {
        self.state.input.cursor_delta()
    }

    pub fn take_resized(&mut self) -> Option<(u32, u32)> {
        self.state.input.take_resized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_press_is_edge_triggered() {
        let mut input = InputState::default();
        input.key(KeyCode::KeyM, true);
        assert!(input.was_key_pressed(KeyCode::KeyM));
        assert!(input.is_key_down(KeyCode::KeyM));

        // Held across a frame: still down, no new press
        input.begin_frame();
        input.key(KeyCode::KeyM, true);
        assert!(!input.was_key_pressed(KeyCode::KeyM));
        assert!(input.is_key_down(KeyCode::KeyM));

        input.key(KeyCode::KeyM, false);
        assert!(!input.is_key_down(KeyCode::KeyM));
        input.key(KeyCode::KeyM, true);
        assert!(input.was_key_pressed(KeyCode::KeyM));
    }

    #[test]
    fn cursor_delta_accumulates_within_a_frame() {
        let mut input = InputState::default();
        input.cursor_moved(10.0, 10.0);
        assert_eq!(input.cursor_delta(), (0.0, 0.0));

        input.cursor_moved(15.0, 8.0);
        input.cursor_moved(20.0, 4.0);
        assert_eq!(input.cursor_delta(), (10.0, -6.0));
        assert_eq!(input.cursor_position(), Some((20.0, 4.0)));

        input.begin_frame();
        assert_eq!(input.cursor_delta(), (0.0, 0.0));
    }

    #[test]
    fn reentering_cursor_does_not_jump() {
        let mut input = InputState::default();
        input.cursor_moved(0.0, 0.0);
        input.cursor_left();
        input.cursor_moved(500.0, 300.0);
        assert_eq!(input.cursor_delta(), (0.0, 0.0));
    }

    #[test]
    fn resize_is_reported_once_with_latest_size() {
        let mut input = InputState::default();
        input.resized(800, 600);
        input.resized(1024, 768);
        assert_eq!(input.take_resized(), Some((1024, 768)));
        assert_eq!(input.take_resized(), None);
    }

    #[test]
    fn losing_focus_releases_everything() {
        let mut input = InputState::default();
        input.key(KeyCode::KeyW, true);
        input.mouse_button(MouseButton::Right, true);
        input.focus_lost();
        assert!(!input.is_key_down(KeyCode::KeyW));
        assert!(!input.is_mouse_down(MouseButton::Right));
    }
}
