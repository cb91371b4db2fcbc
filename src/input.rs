// Polled keyboard / mouse state
//
// The window layer feeds raw events in; the camera glue reads the state once
// per frame. Keys and buttons form closed enumerations so the state arrays are
// indexed by a validated discriminant instead of a raw platform code.

use glam::Vec2;
use winit::event::MouseButton as WinitMouseButton;
use winit::keyboard::KeyCode;

macro_rules! key_table {
    ($($key:ident => $code:ident, $name:literal;)*) => {
        /// Keys the engine reacts to
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Key {
            $($key,)*
        }

        impl Key {
            pub const ALL: &'static [Key] = &[$(Key::$key,)*];
            pub const COUNT: usize = Self::ALL.len();

            pub fn from_keycode(code: KeyCode) -> Option<Key> {
                match code {
                    $(KeyCode::$code => Some(Key::$key),)*
                    _ => None,
                }
            }

            /// Case-insensitive lookup by the name used in config.toml
            pub fn from_name(name: &str) -> Option<Key> {
                $(if name.eq_ignore_ascii_case($name) {
                    return Some(Key::$key);
                })*
                None
            }

            fn index(self) -> usize {
                self as usize
            }
        }
    };
}

key_table! {
    W => KeyW, "W";
    A => KeyA, "A";
    S => KeyS, "S";
    D => KeyD, "D";
    Q => KeyQ, "Q";
    E => KeyE, "E";
    M => KeyM, "M";
    Space => Space, "Space";
    LeftControl => ControlLeft, "LeftControl";
    RightControl => ControlRight, "RightControl";
    LeftShift => ShiftLeft, "LeftShift";
    Escape => Escape, "Escape";
    F11 => F11, "F11";
}

/// Mouse buttons the engine tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub const COUNT: usize = 3;

    pub fn from_winit(button: WinitMouseButton) -> Option<MouseButton> {
        match button {
            WinitMouseButton::Left => Some(MouseButton::Left),
            WinitMouseButton::Right => Some(MouseButton::Right),
            WinitMouseButton::Middle => Some(MouseButton::Middle),
            _ => None,
        }
    }
}

/// Accumulated input since the last frame
#[derive(Debug)]
pub struct InputState {
    keys: [bool; Key::COUNT],
    mouse_buttons: [bool; MouseButton::COUNT],
    cursor: Vec2,
    mouse_delta: Vec2,
    scroll: f32,
    captured: bool,
    /// Set on (re)capture; the next motion sample is dropped
    skip_next_motion: bool,
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

impl InputState {
    pub fn new() -> Self {
        Self {
            keys: [false; Key::COUNT],
            mouse_buttons: [false; MouseButton::COUNT],
            cursor: Vec2::ZERO,
            mouse_delta: Vec2::ZERO,
            scroll: 0.0,
            captured: false,
            skip_next_motion: true,
        }
    }

    pub fn set_key(&mut self, key: Key, pressed: bool) {
        self.keys[key.index()] = pressed;
    }

    pub fn is_key_down(&self, key: Key) -> bool {
        self.keys[key.index()]
    }

    pub fn set_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        self.mouse_buttons[button as usize] = pressed;
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons[button as usize]
    }

    pub fn cursor_moved(&mut self, x: f64, y: f64) {
        self.cursor = Vec2::new(x as f32, y as f32);
    }

    pub fn cursor_position(&self) -> Vec2 {
        self.cursor
    }

    /// Raw pointer motion in device units (y grows downward).
    ///
    /// Stored with y flipped so positive y means "look up".
    pub fn mouse_motion(&mut self, dx: f64, dy: f64) {
        if !self.captured {
            return;
        }
        if self.skip_next_motion {
            self.skip_next_motion = false;
            return;
        }
        self.mouse_delta += Vec2::new(dx as f32, -(dy as f32));
    }

    pub fn scrolled(&mut self, lines: f32) {
        self.scroll += lines;
    }

    pub fn is_captured(&self) -> bool {
        self.captured
    }

    /// Returns true when the capture state actually changed
    pub fn set_captured(&mut self, captured: bool) -> bool {
        if self.captured == captured {
            return false;
        }
        self.captured = captured;
        self.skip_next_motion = true;
        self.mouse_delta = Vec2::ZERO;
        true
    }

    pub fn take_mouse_delta(&mut self) -> Vec2 {
        std::mem::take(&mut self.mouse_delta)
    }

    pub fn take_scroll(&mut self) -> f32 {
        std::mem::take(&mut self.scroll)
    }

    /// Drop held keys and buttons, e.g. when focus is lost and release
    /// events will never arrive
    pub fn release_all(&mut self) {
        self.keys = [false; Key::COUNT];
        self.mouse_buttons = [false; MouseButton::COUNT];
    }
}
