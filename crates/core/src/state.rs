//! Controller state model.
//!
//! The mutable [`StateModel`] is owned by the read pump and mutated only by
//! the decoder; everything else reads point-in-time [`ControllerState`]
//! snapshots. The live sequences are never handed out by reference.

use bitflags::bitflags;

bitflags! {
    /// Hat switch direction set.
    ///
    /// Diagonals are two flags at once; a centered hat is `Hat::empty()`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Hat: u8 {
        const UP = 1 << 0;
        const DOWN = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
    }
}

/// Raw logical hat value → direction set. Values follow the conventional
/// clockwise-from-north encoding; 8..15 cover null/centered states.
pub const HAT_LOOKUP: [Hat; 16] = [
    Hat::UP,
    Hat::UP.union(Hat::RIGHT),
    Hat::RIGHT,
    Hat::DOWN.union(Hat::RIGHT),
    Hat::DOWN,
    Hat::DOWN.union(Hat::LEFT),
    Hat::LEFT,
    Hat::UP.union(Hat::LEFT),
    Hat::empty(),
    Hat::empty(),
    Hat::empty(),
    Hat::empty(),
    Hat::empty(),
    Hat::empty(),
    Hat::empty(),
    Hat::empty(),
];

impl Hat {
    /// Map a raw logical hat value through the lookup table.
    pub fn from_raw(raw: i32) -> Hat {
        HAT_LOOKUP[(raw & 0x0F) as usize]
    }
}

/// Point-in-time copy of the decoded controller state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerState {
    /// Physical buttons first, then four synthetic slots per hat
    /// (Up, Down, Left, Right) in hat-index order.
    pub buttons: Vec<bool>,
    /// Normalized axis values.
    pub axes: Vec<f64>,
    pub hats: Vec<Hat>,
}

/// Mutable semantic state, sized by capability detection and updated in
/// place by the report decoder.
#[derive(Debug, Default)]
pub struct StateModel {
    buttons: Vec<bool>,
    axes: Vec<f64>,
    hats: Vec<Hat>,
}

impl StateModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear and zero-fill to the detected capability sizes. Runs at every
    /// activation; capabilities are not assumed stable across reconnects.
    pub fn apply_capabilities(&mut self, cap: &crate::capability::DeviceCapability) {
        self.buttons.clear();
        self.axes.clear();
        self.hats.clear();
        self.buttons.resize(cap.buttons, false);
        self.axes.resize(cap.axes, 0.0);
        self.hats.resize(cap.hats, Hat::empty());
    }

    /// Grow the button sequence to hold at least `len` entries. Never
    /// shrinks.
    pub fn ensure_buttons(&mut self, len: usize) {
        if self.buttons.len() < len {
            self.buttons.resize(len, false);
        }
    }

    pub fn ensure_axes(&mut self, len: usize) {
        if self.axes.len() < len {
            self.axes.resize(len, 0.0);
        }
    }

    pub fn ensure_hats(&mut self, len: usize) {
        if self.hats.len() < len {
            self.hats.resize(len, Hat::empty());
        }
    }

    pub fn set_button(&mut self, index: usize, pressed: bool) {
        self.ensure_buttons(index + 1);
        self.buttons[index] = pressed;
    }

    pub fn set_axis(&mut self, index: usize, value: f64) {
        self.ensure_axes(index + 1);
        self.axes[index] = value;
    }

    pub fn set_hat(&mut self, index: usize, hat: Hat) {
        self.ensure_hats(index + 1);
        self.hats[index] = hat;
    }

    /// Rewrite the trailing synthetic button slots from the current hat
    /// flags: four per hat, Up/Down/Left/Right, in hat-index order.
    pub fn mirror_hat_buttons(&mut self) {
        let needed = 4 * self.hats.len();
        self.ensure_buttons(needed);
        let mut idx = self.buttons.len() - needed;
        for i in 0..self.hats.len() {
            let hat = self.hats[i];
            self.buttons[idx] = hat.contains(Hat::UP);
            self.buttons[idx + 1] = hat.contains(Hat::DOWN);
            self.buttons[idx + 2] = hat.contains(Hat::LEFT);
            self.buttons[idx + 3] = hat.contains(Hat::RIGHT);
            idx += 4;
        }
    }

    /// Copy out the current state.
    pub fn snapshot(&self) -> ControllerState {
        ControllerState {
            buttons: self.buttons.clone(),
            axes: self.axes.clone(),
            hats: self.hats.clone(),
        }
    }
}
