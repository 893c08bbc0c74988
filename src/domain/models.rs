use serde::{Deserialize, Serialize};
use std::fmt;

/// One raw angular-velocity sample, in device axes, unscaled.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MotionSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Relative pointer movement in pixels. Never transmitted when both axes are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerDelta {
    pub dx: i32,
    pub dy: i32,
}

impl PointerDelta {
    pub fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonId {
    Left,
    Right,
}

impl ButtonId {
    /// Bit in the HID button byte
    pub fn bit(self) -> u8 {
        match self {
            Self::Left => 0x01,
            Self::Right => 0x02,
        }
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "LEFT"),
            Self::Right => write!(f, "RIGHT"),
        }
    }
}

/// Current physical button state. Bit 0 = left, bit 1 = right.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonMask(u8);

impl ButtonMask {
    pub const EMPTY: Self = Self(0);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, button: ButtonId) -> bool {
        self.0 & button.bit() != 0
    }

    pub fn with(self, button: ButtonId, pressed: bool) -> Self {
        if pressed {
            Self(self.0 | button.bit())
        } else {
            Self(self.0 & !button.bit())
        }
    }
}

/// A single button transition that actually changed the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonChange {
    pub button: ButtonId,
    pub pressed: bool,
    pub mask: ButtonMask,
}

/// Semantic input event, transport agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Move(PointerDelta),
    Buttons(ButtonChange),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Network,
    Hid,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "Network"),
            Self::Hid => write!(f, "Bluetooth HID"),
        }
    }
}

/// Physical keys the handheld exposes as pointer buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalKey {
    VolumeDown,
    VolumeUp,
}

impl PhysicalKey {
    pub fn button(self) -> ButtonId {
        match self {
            Self::VolumeDown => ButtonId::Left,
            Self::VolumeUp => ButtonId::Right,
        }
    }
}

/// What an input source delivers to the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Motion(MotionSample),
    Button { id: ButtonId, pressed: bool },
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    ConnectionStatus(ConnectionStatus),
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
