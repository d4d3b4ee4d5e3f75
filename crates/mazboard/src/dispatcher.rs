//! Key event dispatch
//!
//! Decides what a single key event means for the current mode and performs
//! the resulting MIDI, LED and grab requests.

use crate::device::{switch_led, GrabControl, KeySource, LedControl};
use crate::error::Result;
use crate::keymap::{note_name, KeyMap, DEFAULT_VELOCITY};
use crate::midi::MidiOutput;
use crate::mode::{Mode, ModeChange, ModeController};
use evdev::Key;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How long the event loop waits for input before re-checking for a stop request
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Direction of a key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    Pressed,
    Released,
}

/// A key press or release from the input source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub transition: KeyTransition,
}

impl KeyEvent {
    pub fn pressed(key: Key) -> Self {
        Self { key, transition: KeyTransition::Pressed }
    }

    pub fn released(key: Key) -> Self {
        Self { key, transition: KeyTransition::Released }
    }

    /// Build from an evdev key value: 1 is a press, 0 a release.
    /// Auto-repeat (2) and anything else yields `None`.
    pub fn from_raw(key: Key, value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::pressed(key)),
            0 => Some(Self::released(key)),
            _ => None,
        }
    }
}

/// What handling one event did
#[derive(Debug)]
pub enum Dispatch {
    /// No observable effect
    Ignored,
    /// A note started sounding
    NoteOn { key: Key, note: u8 },
    /// A sounding note stopped
    NoteOff { key: Key, note: u8 },
    /// The toggle key was released
    Toggled(ModeChange),
}

/// Classifies key events and drives the collaborators
#[derive(Debug, Clone)]
pub struct KeyEventDispatcher {
    keymap: KeyMap,
    controller: ModeController,
    channel: u8,
    velocity: u8,
}

impl Default for KeyEventDispatcher {
    fn default() -> Self {
        Self::new(KeyMap::reference())
    }
}

impl KeyEventDispatcher {
    /// Create a dispatcher on channel 0 with the default velocity
    pub fn new(keymap: KeyMap) -> Self {
        Self {
            keymap,
            controller: ModeController::new(),
            channel: 0,
            velocity: DEFAULT_VELOCITY,
        }
    }

    /// Set the MIDI channel (clamped to 0-15)
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel.min(15);
        self
    }

    /// Set the note-on velocity (clamped to 1-127)
    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity = velocity.clamp(1, 127);
        self
    }

    pub fn mode(&self) -> Mode {
        self.controller.mode()
    }

    pub fn controller(&self) -> &ModeController {
        &self.controller
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// Handle one key event to completion
    pub fn handle<M, D>(&mut self, event: KeyEvent, midi: &mut M, device: &mut D) -> Dispatch
    where
        M: MidiOutput + ?Sized,
        D: GrabControl + LedControl + ?Sized,
    {
        let KeyEvent { key, transition } = event;

        if transition == KeyTransition::Released && self.keymap.is_toggle_key(key) {
            let change = self.controller.toggle_mode(&self.keymap, self.channel, midi, device);
            return Dispatch::Toggled(change);
        }

        // In typewriter mode the ungrabbed device already types for us
        if self.controller.mode() != Mode::Midi {
            return Dispatch::Ignored;
        }
        let Some(mapping) = self.keymap.get_mapping(key).copied() else {
            return Dispatch::Ignored;
        };

        match transition {
            KeyTransition::Pressed => {
                if !self.controller.press(key) {
                    return Dispatch::Ignored;
                }
                midi.note_on(self.channel, mapping.note, self.velocity);
                if let Some(led) = mapping.led {
                    switch_led(device, key, led, true);
                }
                log::debug!("Key pressed: {:?}, MIDI note: {} ({})", key, mapping.note, note_name(mapping.note));
                Dispatch::NoteOn { key, note: mapping.note }
            }
            KeyTransition::Released => {
                if !self.controller.release(key) {
                    return Dispatch::Ignored;
                }
                midi.note_off(self.channel, mapping.note);
                if let Some(led) = mapping.led {
                    switch_led(device, key, led, false);
                }
                log::debug!("Key released: {:?}, MIDI note: {} ({})", key, mapping.note, note_name(mapping.note));
                Dispatch::NoteOff { key, note: mapping.note }
            }
        }
    }

    /// Leave MIDI mode on the way out so no note keeps sounding and the
    /// keyboard is not left grabbed. Does nothing in typewriter mode.
    pub fn shutdown<M, D>(&mut self, midi: &mut M, device: &mut D) -> Option<ModeChange>
    where
        M: MidiOutput + ?Sized,
        D: GrabControl + LedControl + ?Sized,
    {
        match self.controller.mode() {
            Mode::Midi => Some(self.controller.toggle_mode(&self.keymap, self.channel, midi, device)),
            Mode::Typewriter => None,
        }
    }

    /// Process events from `source` until `quit` is set, then shut down
    ///
    /// `quit` is checked at least every `poll_interval`, with or without key
    /// activity. A read error from the source ends the loop without the
    /// shutdown flush.
    pub fn run<S, M>(&mut self, source: &mut S, midi: &mut M, quit: &AtomicBool, poll_interval: Duration) -> Result<()>
    where
        S: KeySource + ?Sized,
        M: MidiOutput + ?Sized,
    {
        while !quit.load(Ordering::Relaxed) {
            for event in source.poll_key_events(poll_interval)? {
                if let Dispatch::Toggled(change) = self.handle(event, midi, source) {
                    if !change.released.is_empty() {
                        log::info!("Released {} sounding note(s)", change.released.len());
                    }
                }
            }
        }

        self.shutdown(midi, source);
        log::info!("Exiting...");
        Ok(())
    }
}
