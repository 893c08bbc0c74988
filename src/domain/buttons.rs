use crate::domain::models::{ButtonChange, ButtonId, ButtonMask};

/// Level-set of the two pointer buttons.
///
/// No debouncing is done here; the input source owns that if it needs it.
#[derive(Debug, Default)]
pub struct ButtonEdgeTracker {
    mask: ButtonMask,
}

impl ButtonEdgeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mask(&self) -> ButtonMask {
        self.mask
    }

    pub fn reset(&mut self) {
        self.mask = ButtonMask::EMPTY;
    }

    /// Apply an edge and return the resulting full mask.
    /// Repeating the same edge leaves the mask unchanged.
    pub fn on_button(&mut self, id: ButtonId, pressed: bool) -> ButtonMask {
        self.mask = self.mask.with(id, pressed);
        self.mask
    }

    /// Like [`on_button`](Self::on_button), but only reports edges that changed the level
    pub fn edge(&mut self, id: ButtonId, pressed: bool) -> Option<ButtonChange> {
        let previous = self.mask;
        let mask = self.on_button(id, pressed);
        if mask == previous {
            return None;
        }
        Some(ButtonChange {
            button: id,
            pressed,
            mask,
        })
    }
}
