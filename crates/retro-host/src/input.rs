//! Per-port device state shared between the host thread and the core.
//!
//! The host writes readings once per tick; the core reads them from the
//! emulation thread through the input-state callback. Every scalar is an
//! atomic, so neither side ever takes a lock on the hot path. Mouse deltas
//! are the only fields the emulation thread writes back (read-and-clear).

use std::sync::atomic::{
    AtomicBool, AtomicI16, AtomicI32, AtomicU16, AtomicU32, AtomicU64, Ordering,
};

use parking_lot::Mutex;
use rust_libretro_sys::{
    RETRO_DEVICE_ANALOG, RETRO_DEVICE_ID_JOYPAD_MASK, RETRO_DEVICE_ID_LIGHTGUN_IS_OFFSCREEN,
    RETRO_DEVICE_ID_LIGHTGUN_SCREEN_X, RETRO_DEVICE_ID_LIGHTGUN_SCREEN_Y,
    RETRO_DEVICE_ID_MOUSE_X, RETRO_DEVICE_ID_MOUSE_Y, RETRO_DEVICE_JOYPAD, RETRO_DEVICE_KEYBOARD, RETRO_DEVICE_LIGHTGUN, RETRO_DEVICE_MASK,
    RETRO_DEVICE_MOUSE, RETRO_DEVICE_POINTER,
};
use tracing::{debug, trace};

pub const MAX_PORTS: usize = 8;

const POINTER_X: u32 = 0;
const POINTER_Y: u32 = 1;
const POINTER_PRESSED: u32 = 2;
const POINTER_COUNT: u32 = 3;
/// Keyboard bitmap size; covers every `RETROK_*` code.
pub const KEYBOARD_KEYS: usize = 512;
const KEY_WORDS: usize = KEYBOARD_KEYS / 64;

/// Devices the frontend can feed, as reported by GET_INPUT_DEVICE_CAPABILITIES.
pub const DEVICE_CAPABILITIES: u64 = (1 << RETRO_DEVICE_JOYPAD)
    | (1 << RETRO_DEVICE_MOUSE)
    | (1 << RETRO_DEVICE_KEYBOARD)
    | (1 << RETRO_DEVICE_LIGHTGUN)
    | (1 << RETRO_DEVICE_ANALOG)
    | (1 << RETRO_DEVICE_POINTER);

/// Which stick an analog reading belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stick {
    Left = 0,
    Right = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RumbleMotor {
    Strong = 0,
    Weak = 1,
}

/// One entry of a core's SET_INPUT_DESCRIPTORS array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDescriptor {
    pub port: u32,
    pub device: u32,
    pub index: u32,
    pub id: u32,
    pub description: String,
}

/// A device type a core accepts on one port (SET_CONTROLLER_INFO).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerType {
    pub name: String,
    pub id: u32,
}

/// A key event queued for delivery to the core's keyboard callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub down: bool,
    pub keycode: u32,
    pub character: u32,
    pub modifiers: u16,
}

#[derive(Default)]
struct PortState {
    joypad: AtomicU16,
    mouse_dx: AtomicI32,
    mouse_dy: AtomicI32,
    mouse_buttons: AtomicU32,
    keys: [AtomicU64; KEY_WORDS],
    lightgun_x: AtomicI16,
    lightgun_y: AtomicI16,
    lightgun_offscreen: AtomicBool,
    lightgun_buttons: AtomicU32,
    pointer_x: AtomicI16,
    pointer_y: AtomicI16,
    pointer_pressed: AtomicBool,
    pointer_count: AtomicI16,
    /// Left x, left y, right x, right y.
    analog: [AtomicI16; 4],
    rumble: [AtomicU16; 2],
}

#[inline]
fn bit(mask: u32, id: u32) -> i16 {
    if id < 32 {
        i16::from(mask & (1 << id) != 0)
    } else {
        0
    }
}

#[inline]
fn clamp_axis(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Latest device readings for every port.
#[derive(Default)]
pub struct InputState {
    ports: [PortState; MAX_PORTS],
    descriptors: Mutex<Vec<InputDescriptor>>,
    controllers: Mutex<Vec<Vec<ControllerType>>>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    fn port(&self, port: u32) -> Option<&PortState> {
        self.ports.get(port as usize)
    }

    /// Answers the core's input-state query.
    pub fn query(&self, port: u32, device: u32, index: u32, id: u32) -> i16 {
        let Some(state) = self.port(port) else {
            return 0;
        };
        match device & RETRO_DEVICE_MASK {
            RETRO_DEVICE_JOYPAD => {
                let mask = state.joypad.load(Ordering::Acquire);
                if id == RETRO_DEVICE_ID_JOYPAD_MASK {
                    mask as i16
                } else if id < 16 {
                    (mask & (1 << id)) as i16
                } else {
                    0
                }
            }
            RETRO_DEVICE_MOUSE => match id {
                RETRO_DEVICE_ID_MOUSE_X => clamp_axis(state.mouse_dx.swap(0, Ordering::AcqRel)),
                RETRO_DEVICE_ID_MOUSE_Y => clamp_axis(state.mouse_dy.swap(0, Ordering::AcqRel)),
                _ => bit(state.mouse_buttons.load(Ordering::Acquire), id),
            },
            RETRO_DEVICE_KEYBOARD => {
                let key = id as usize;
                if key >= KEYBOARD_KEYS {
                    return 0;
                }
                let word = state.keys[key / 64].load(Ordering::Acquire);
                i16::from(word & (1 << (key % 64)) != 0)
            }
            RETRO_DEVICE_LIGHTGUN => match id {
                RETRO_DEVICE_ID_LIGHTGUN_SCREEN_X => state.lightgun_x.load(Ordering::Acquire),
                RETRO_DEVICE_ID_LIGHTGUN_SCREEN_Y => state.lightgun_y.load(Ordering::Acquire),
                RETRO_DEVICE_ID_LIGHTGUN_IS_OFFSCREEN => {
                    i16::from(state.lightgun_offscreen.load(Ordering::Acquire))
                }
                _ => bit(state.lightgun_buttons.load(Ordering::Acquire), id),
            },
            RETRO_DEVICE_POINTER => match id {
                POINTER_X => state.pointer_x.load(Ordering::Acquire),
                POINTER_Y => state.pointer_y.load(Ordering::Acquire),
                POINTER_PRESSED => {
                    i16::from(state.pointer_pressed.load(Ordering::Acquire))
                }
                POINTER_COUNT => state.pointer_count.load(Ordering::Acquire),
                _ => 0,
            },
            RETRO_DEVICE_ANALOG => {
                // index 0/1 are the sticks, id 0/1 the axes; analog buttons are not fed.
                if index > 1 || id > 1 {
                    return 0;
                }
                state.analog[(index * 2 + id) as usize].load(Ordering::Acquire)
            }
            other => {
                trace!(port, device = other, id, "input query for unhandled device");
                0
            }
        }
    }

    pub fn set_joypad(&self, port: u32, mask: u16) {
        if let Some(state) = self.port(port) {
            state.joypad.store(mask, Ordering::Release);
        }
    }

    pub fn joypad(&self, port: u32) -> u16 {
        self.port(port)
            .map_or(0, |state| state.joypad.load(Ordering::Acquire))
    }

    /// Adds relative motion; it accumulates until the core reads it.
    pub fn add_mouse_motion(&self, port: u32, dx: i32, dy: i32) {
        if let Some(state) = self.port(port) {
            state.mouse_dx.fetch_add(dx, Ordering::AcqRel);
            state.mouse_dy.fetch_add(dy, Ordering::AcqRel);
        }
    }

    /// Bit `n` is mouse button id `n` (`RETRO_DEVICE_ID_MOUSE_LEFT` = 2, ...).
    pub fn set_mouse_buttons(&self, port: u32, buttons: u32) {
        if let Some(state) = self.port(port) {
            state.mouse_buttons.store(buttons, Ordering::Release);
        }
    }

    pub fn set_key(&self, port: u32, keycode: u32, pressed: bool) {
        let key = keycode as usize;
        let Some(state) = self.port(port) else {
            return;
        };
        if key >= KEYBOARD_KEYS {
            return;
        }
        let mask = 1u64 << (key % 64);
        if pressed {
            state.keys[key / 64].fetch_or(mask, Ordering::AcqRel);
        } else {
            state.keys[key / 64].fetch_and(!mask, Ordering::AcqRel);
        }
    }

    pub fn clear_keys(&self, port: u32) {
        if let Some(state) = self.port(port) {
            for word in &state.keys {
                word.store(0, Ordering::Release);
            }
        }
    }

    pub fn set_lightgun(&self, port: u32, x: i32, y: i32, offscreen: bool) {
        if let Some(state) = self.port(port) {
            state.lightgun_x.store(clamp_axis(x), Ordering::Release);
            state.lightgun_y.store(clamp_axis(y), Ordering::Release);
            state.lightgun_offscreen.store(offscreen, Ordering::Release);
        }
    }

    pub fn set_lightgun_buttons(&self, port: u32, buttons: u32) {
        if let Some(state) = self.port(port) {
            state.lightgun_buttons.store(buttons, Ordering::Release);
        }
    }

    pub fn set_pointer(&self, port: u32, x: i32, y: i32, pressed: bool, count: i16) {
        if let Some(state) = self.port(port) {
            state.pointer_x.store(clamp_axis(x), Ordering::Release);
            state.pointer_y.store(clamp_axis(y), Ordering::Release);
            state.pointer_pressed.store(pressed, Ordering::Release);
            state.pointer_count.store(count, Ordering::Release);
        }
    }

    pub fn set_analog(&self, port: u32, stick: Stick, x: i32, y: i32) {
        if let Some(state) = self.port(port) {
            let base = stick as usize * 2;
            state.analog[base].store(clamp_axis(x), Ordering::Release);
            state.analog[base + 1].store(clamp_axis(y), Ordering::Release);
        }
    }

    /// Same as [`set_analog`](Self::set_analog) with axes in `[-1.0, 1.0]`.
    pub fn set_analog_normalized(&self, port: u32, stick: Stick, x: f32, y: f32) {
        let scale = |v: f32| (v.clamp(-1.0, 1.0) * 32767.0).round() as i32;
        self.set_analog(port, stick, scale(x), scale(y));
    }

    pub(crate) fn set_rumble(&self, port: u32, motor: RumbleMotor, strength: u16) -> bool {
        match self.port(port) {
            Some(state) => {
                state.rumble[motor as usize].store(strength, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Last rumble strength the core requested for `port`.
    pub fn rumble(&self, port: u32, motor: RumbleMotor) -> u16 {
        self.port(port)
            .map_or(0, |state| state.rumble[motor as usize].load(Ordering::Acquire))
    }

    pub(crate) fn replace_descriptors(&self, descriptors: Vec<InputDescriptor>) {
        debug!(count = descriptors.len(), "input descriptors registered");
        *self.descriptors.lock() = descriptors;
    }

    pub fn descriptors(&self) -> Vec<InputDescriptor> {
        self.descriptors.lock().clone()
    }

    pub(crate) fn replace_controllers(&self, controllers: Vec<Vec<ControllerType>>) {
        debug!(ports = controllers.len(), "controller info registered");
        *self.controllers.lock() = controllers;
    }

    /// Device types the core accepts, one list per port.
    pub fn controllers(&self) -> Vec<Vec<ControllerType>> {
        self.controllers.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_libretro_sys::{
        RETRO_DEVICE_ID_JOYPAD_A, RETRO_DEVICE_ID_LIGHTGUN_TRIGGER, RETRO_DEVICE_ID_MOUSE_LEFT,
        RETRO_DEVICE_INDEX_ANALOG_RIGHT, RETRO_DEVICE_ID_ANALOG_Y,
    };

    #[test]
    fn mouse_motion_accumulates_and_is_consumed_once() {
        let input = InputState::new();
        for _ in 0..5 {
            input.add_mouse_motion(0, 3, -2);
        }
        assert_eq!(input.query(0, RETRO_DEVICE_MOUSE, 0, RETRO_DEVICE_ID_MOUSE_X), 15);
        assert_eq!(input.query(0, RETRO_DEVICE_MOUSE, 0, RETRO_DEVICE_ID_MOUSE_X), 0);
        assert_eq!(input.query(0, RETRO_DEVICE_MOUSE, 0, RETRO_DEVICE_ID_MOUSE_Y), -10);
        assert_eq!(input.query(0, RETRO_DEVICE_MOUSE, 0, RETRO_DEVICE_ID_MOUSE_Y), 0);
    }

    #[test]
    fn mouse_delta_saturates_to_axis_range() {
        let input = InputState::new();
        input.add_mouse_motion(1, 40_000, -40_000);
        assert_eq!(
            input.query(1, RETRO_DEVICE_MOUSE, 0, RETRO_DEVICE_ID_MOUSE_X),
            i16::MAX
        );
        assert_eq!(
            input.query(1, RETRO_DEVICE_MOUSE, 0, RETRO_DEVICE_ID_MOUSE_Y),
            i16::MIN
        );
    }

    #[test]
    fn level_state_is_not_consumed() {
        let input = InputState::new();
        input.set_mouse_buttons(0, 1 << RETRO_DEVICE_ID_MOUSE_LEFT);
        input.set_lightgun(0, 100, -50, false);
        input.set_lightgun_buttons(0, 1 << RETRO_DEVICE_ID_LIGHTGUN_TRIGGER);
        for _ in 0..3 {
            assert_eq!(
                input.query(0, RETRO_DEVICE_MOUSE, 0, RETRO_DEVICE_ID_MOUSE_LEFT),
                1
            );
            assert_eq!(
                input.query(0, RETRO_DEVICE_LIGHTGUN, 0, RETRO_DEVICE_ID_LIGHTGUN_SCREEN_X),
                100
            );
            assert_eq!(
                input.query(0, RETRO_DEVICE_LIGHTGUN, 0, RETRO_DEVICE_ID_LIGHTGUN_TRIGGER),
                1
            );
        }
    }

    #[test]
    fn keyboard_bitmap_covers_high_keycodes() {
        let input = InputState::new();
        input.set_key(0, 300, true);
        input.set_key(0, 97, true);
        assert_eq!(input.query(0, RETRO_DEVICE_KEYBOARD, 0, 300), 1);
        assert_eq!(input.query(0, RETRO_DEVICE_KEYBOARD, 0, 97), 1);
        assert_eq!(input.query(0, RETRO_DEVICE_KEYBOARD, 0, 98), 0);
        input.set_key(0, 300, false);
        assert_eq!(input.query(0, RETRO_DEVICE_KEYBOARD, 0, 300), 0);
        assert_eq!(input.query(0, RETRO_DEVICE_KEYBOARD, 0, 9000), 0);
    }

    #[test]
    fn analog_axes_are_clamped_and_indexed_by_stick() {
        let input = InputState::new();
        input.set_analog(2, Stick::Right, 10, 99_999);
        assert_eq!(
            input.query(
                2,
                RETRO_DEVICE_ANALOG,
                RETRO_DEVICE_INDEX_ANALOG_RIGHT,
                RETRO_DEVICE_ID_ANALOG_Y
            ),
            i16::MAX
        );
        assert_eq!(input.query(2, RETRO_DEVICE_ANALOG, 0, 0), 0);
        input.set_analog_normalized(2, Stick::Left, -1.0, 0.5);
        assert_eq!(input.query(2, RETRO_DEVICE_ANALOG, 0, 0), -32767);
        assert_eq!(input.query(2, RETRO_DEVICE_ANALOG, 0, 1), 16384);
    }

    #[test]
    fn out_of_range_ports_read_zero_and_ignore_writes() {
        let input = InputState::new();
        input.set_joypad(MAX_PORTS as u32, 0xFFFF);
        assert_eq!(
            input.query(MAX_PORTS as u32, RETRO_DEVICE_JOYPAD, 0, RETRO_DEVICE_ID_JOYPAD_MASK),
            0
        );
    }

    #[test]
    fn device_subclasses_are_masked() {
        let input = InputState::new();
        input.set_joypad(0, 1 << RETRO_DEVICE_ID_JOYPAD_A);
        let subclass = (1 + 1) << 8 | RETRO_DEVICE_JOYPAD;
        assert_ne!(input.query(0, subclass, 0, RETRO_DEVICE_ID_JOYPAD_A), 0);
    }

    proptest! {
        #[test]
        fn joypad_mask_equals_or_of_single_bits(mask in any::<u16>(), port in 0u32..MAX_PORTS as u32) {
            let input = InputState::new();
            input.set_joypad(port, mask);
            let full = input.query(port, RETRO_DEVICE_JOYPAD, 0, RETRO_DEVICE_ID_JOYPAD_MASK);
            let mut combined = 0i16;
            for id in 0..16 {
                combined |= input.query(port, RETRO_DEVICE_JOYPAD, 0, id);
            }
            prop_assert_eq!(full, combined);
            prop_assert_eq!(full as u16, mask);
        }
    }
}
