//! Static key tables
//!
//! Which physical keys play which MIDI notes, which of them light an LED on
//! the keyboard, and which key flips between typewriter and MIDI mode.
//! The tables are built once at startup and never change afterwards.

use crate::error::{Error, Result};
use evdev::{Key, LedType};

/// Default velocity for note-on messages
pub const DEFAULT_VELOCITY: u8 = 64;

/// Key that switches modes when released
pub const TOGGLE_KEY: Key = Key::KEY_TAB;

/// A key mapping entry: physical key -> MIDI note, optionally with an LED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMapping {
    /// The physical key
    pub key: Key,
    /// MIDI note number (0-127)
    pub note: u8,
    /// Indicator lit while the note sounds
    pub led: Option<LedType>,
}

impl KeyMapping {
    pub const fn new(key: Key, note: u8) -> Self {
        Self { key, note, led: None }
    }

    pub const fn with_led(key: Key, note: u8, led: LedType) -> Self {
        Self { key, note, led: Some(led) }
    }
}

/// Immutable lookup tables consulted for every key event
#[derive(Debug, Clone)]
pub struct KeyMap {
    mappings: Vec<KeyMapping>,
    toggle_key: Key,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::reference()
    }
}

impl KeyMap {
    /// Build a key map, rejecting duplicate keys, out-of-range notes and a
    /// toggle key that is also mapped to a note.
    pub fn new(mappings: Vec<KeyMapping>, toggle_key: Key) -> Result<Self> {
        for (i, mapping) in mappings.iter().enumerate() {
            if mapping.note > 127 {
                return Err(Error::Config(format!(
                    "note {} for {:?} is outside 0-127",
                    mapping.note, mapping.key
                )));
            }
            if mapping.key == toggle_key {
                return Err(Error::Config(format!(
                    "{:?} is the toggle key and cannot play a note",
                    mapping.key
                )));
            }
            if mappings[..i].iter().any(|m| m.key == mapping.key) {
                return Err(Error::Config(format!("{:?} is mapped twice", mapping.key)));
            }
        }
        Ok(Self { mappings, toggle_key })
    }

    /// The prototype board layout
    ///
    /// ```text
    ///  KEY_A  KEY_B  KEY_C  KEY_D  KEY_E  KEY_SPACE
    ///  C4     D4     E4     F4     G4     A4
    ///  NumL   CapsL  ScrollL
    /// ```
    pub fn reference() -> Self {
        Self {
            mappings: vec![
                KeyMapping::with_led(Key::KEY_A, 60, LedType::LED_NUML),
                KeyMapping::with_led(Key::KEY_B, 62, LedType::LED_CAPSL),
                KeyMapping::with_led(Key::KEY_C, 64, LedType::LED_SCROLLL),
                KeyMapping::new(Key::KEY_D, 65),
                KeyMapping::new(Key::KEY_E, 67),
                KeyMapping::new(Key::KEY_SPACE, 69),
            ],
            toggle_key: TOGGLE_KEY,
        }
    }

    /// Get the mapping for a given key
    pub fn get_mapping(&self, key: Key) -> Option<&KeyMapping> {
        self.mappings.iter().find(|m| m.key == key)
    }

    /// Get the MIDI note for a given key
    pub fn note_for(&self, key: Key) -> Option<u8> {
        self.get_mapping(key).map(|m| m.note)
    }

    /// Get the LED for a given key
    pub fn led_for(&self, key: Key) -> Option<LedType> {
        self.get_mapping(key).and_then(|m| m.led)
    }

    pub fn toggle_key(&self) -> Key {
        self.toggle_key
    }

    pub fn is_toggle_key(&self, key: Key) -> bool {
        key == self.toggle_key
    }

    /// All mappings in table order
    pub fn mappings(&self) -> &[KeyMapping] {
        &self.mappings
    }
}

/// Convert a MIDI note number to a note name
pub fn note_name(note: u8) -> String {
    let names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i8 - 1;
    let name = names[(note % 12) as usize];
    format!("{}{}", name, octave)
}
