//! Mode state and the transition protocol
//!
//! [`ModeController`] is the only owner of the current [`Mode`] and of the
//! set of keys whose note is sounding. Leaving MIDI mode always flushes every
//! sounding note (note off + LED off) before typing is handed back.

use crate::device::{switch_led, GrabControl, LedControl};
use crate::error::Error;
use crate::keymap::{note_name, KeyMap};
use crate::midi::MidiOutput;
use evdev::Key;
use std::collections::HashSet;

/// What key events currently mean
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Keys type normally, the device is not grabbed
    #[default]
    Typewriter,
    /// Mapped keys play notes, the device is grabbed
    Midi,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Mode::Typewriter => Mode::Midi,
            Mode::Midi => Mode::Typewriter,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Typewriter => write!(f, "typewriter"),
            Mode::Midi => write!(f, "midi"),
        }
    }
}

/// Report of one mode transition
#[derive(Debug)]
pub struct ModeChange {
    /// Mode before the toggle
    pub from: Mode,
    /// Mode after the toggle
    pub to: Mode,
    /// Notes switched off by the flush, in no particular order
    pub released: Vec<u8>,
    /// Grab or ungrab failure; the mode flipped anyway
    pub typing_error: Option<Error>,
}

/// Owner of the mode and the sounding-notes set
#[derive(Debug, Clone, Default)]
pub struct ModeController {
    mode: Mode,
    sounding: HashSet<Key>,
}

impl ModeController {
    /// Start in typewriter mode with nothing sounding
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Keys whose note is currently on
    pub fn sounding(&self) -> &HashSet<Key> {
        &self.sounding
    }

    pub fn is_sounding(&self, key: Key) -> bool {
        self.sounding.contains(&key)
    }

    /// Mark a key as sounding. Returns false if it already was, in which case
    /// no note on must be sent.
    pub(crate) fn press(&mut self, key: Key) -> bool {
        debug_assert_eq!(self.mode, Mode::Midi);
        self.sounding.insert(key)
    }

    /// Unmark a key. Returns false if it was not sounding.
    pub(crate) fn release(&mut self, key: Key) -> bool {
        self.sounding.remove(&key)
    }

    /// Flip the mode
    ///
    /// Midi → Typewriter: every sounding note gets a note off and its LED is
    /// switched off, the set is cleared, then the device is ungrabbed.
    /// Typewriter → Midi: the device is grabbed.
    ///
    /// A refused grab or ungrab is logged and returned in the report. The
    /// mode change and the flush are kept regardless.
    pub fn toggle_mode<M, D>(&mut self, keymap: &KeyMap, channel: u8, midi: &mut M, device: &mut D) -> ModeChange
    where
        M: MidiOutput + ?Sized,
        D: GrabControl + LedControl + ?Sized,
    {
        let from = self.mode;
        let mut released = Vec::with_capacity(self.sounding.len());

        let typing = match from {
            Mode::Midi => {
                for key in self.sounding.drain() {
                    let Some(mapping) = keymap.get_mapping(key) else {
                        continue;
                    };
                    midi.note_off(channel, mapping.note);
                    if let Some(led) = mapping.led {
                        switch_led(device, key, led, false);
                    }
                    log::debug!("Released MIDI note {} for key: {:?}", note_name(mapping.note), key);
                    released.push(mapping.note);
                }
                self.mode = Mode::Typewriter;
                device.ungrab().map(|()| "Typewriter mode: typing enabled.")
            }
            Mode::Typewriter => {
                self.mode = Mode::Midi;
                device.grab().map(|()| "MIDI mode: typing disabled.")
            }
        };

        let typing_error = match typing {
            Ok(message) => {
                log::info!("{}", message);
                None
            }
            Err(e) => {
                log::error!("{}", e);
                Some(e)
            }
        };
        log::info!("Switched to mode: {}", self.mode);

        ModeChange {
            from,
            to: self.mode,
            released,
            typing_error,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Result;
    use crate::midi::MidiMessage;
    use evdev::LedType;

    /// Records every MIDI message sent
    #[derive(Default)]
    pub(crate) struct RecordingMidi {
        pub(crate) sent: Vec<MidiMessage>,
    }

    impl RecordingMidi {
        pub(crate) fn note_ons(&self) -> Vec<u8> {
            self.sent
                .iter()
                .filter_map(|m| match m {
                    MidiMessage::NoteOn { note, .. } => Some(*note),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn note_offs(&self) -> Vec<u8> {
            self.sent
                .iter()
                .filter_map(|m| match m {
                    MidiMessage::NoteOff { note, .. } => Some(*note),
                    _ => None,
                })
                .collect()
        }
    }

    impl MidiOutput for RecordingMidi {
        fn send(&mut self, message: MidiMessage) -> Result<()> {
            self.sent.push(message);
            Ok(())
        }

        fn port_name(&self) -> &str {
            "recording"
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum DeviceCall {
        Grab,
        Ungrab,
        Led(LedType, bool),
    }

    /// Records grab and LED requests, optionally refusing grabs
    #[derive(Default)]
    pub(crate) struct RecordingDevice {
        pub(crate) calls: Vec<DeviceCall>,
        pub(crate) refuse_grab: bool,
        pub(crate) refuse_led: bool,
    }

    impl RecordingDevice {
        pub(crate) fn refusing() -> Self {
            Self {
                refuse_grab: true,
                ..Self::default()
            }
        }

        pub(crate) fn grabs(&self) -> Vec<DeviceCall> {
            self.calls
                .iter()
                .copied()
                .filter(|c| matches!(c, DeviceCall::Grab | DeviceCall::Ungrab))
                .collect()
        }

        pub(crate) fn leds(&self) -> Vec<(LedType, bool)> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    DeviceCall::Led(led, on) => Some((*led, *on)),
                    _ => None,
                })
                .collect()
        }
    }

    impl GrabControl for RecordingDevice {
        fn grab(&mut self) -> Result<()> {
            self.calls.push(DeviceCall::Grab);
            if self.refuse_grab {
                return Err(Error::Grab(std::io::Error::from_raw_os_error(16)));
            }
            Ok(())
        }

        fn ungrab(&mut self) -> Result<()> {
            self.calls.push(DeviceCall::Ungrab);
            if self.refuse_grab {
                return Err(Error::Ungrab(std::io::Error::from_raw_os_error(22)));
            }
            Ok(())
        }
    }

    impl LedControl for RecordingDevice {
        fn set_led(&mut self, led: LedType, on: bool) -> Result<()> {
            self.calls.push(DeviceCall::Led(led, on));
            if self.refuse_led {
                return Err(Error::Led(std::io::Error::from_raw_os_error(5)));
            }
            Ok(())
        }
    }

    #[test]
    fn test_starts_in_typewriter() {
        let controller = ModeController::new();
        assert_eq!(controller.mode(), Mode::Typewriter);
        assert!(controller.sounding().is_empty());
    }

    #[test]
    fn test_toggle_into_midi_grabs() {
        let keymap = KeyMap::reference();
        let mut controller = ModeController::new();
        let mut midi = RecordingMidi::default();
        let mut device = RecordingDevice::default();

        let change = controller.toggle_mode(&keymap, 0, &mut midi, &mut device);
        assert_eq!(change.from, Mode::Typewriter);
        assert_eq!(change.to, Mode::Midi);
        assert!(change.released.is_empty());
        assert!(change.typing_error.is_none());
        assert_eq!(controller.mode(), Mode::Midi);
        assert_eq!(device.calls, vec![DeviceCall::Grab]);
        assert!(midi.sent.is_empty());
    }

    #[test]
    fn test_toggle_out_of_midi_flushes_notes() {
        let keymap = KeyMap::reference();
        let mut controller = ModeController::new();
        let mut midi = RecordingMidi::default();
        let mut device = RecordingDevice::default();

        controller.toggle_mode(&keymap, 0, &mut midi, &mut device);
        assert!(controller.press(Key::KEY_A));
        assert!(controller.press(Key::KEY_D));
        device.calls.clear();

        let change = controller.toggle_mode(&keymap, 3, &mut midi, &mut device);
        assert_eq!(change.to, Mode::Typewriter);
        assert!(controller.sounding().is_empty());

        let mut released = change.released.clone();
        released.sort();
        assert_eq!(released, vec![60, 65]);

        let mut offs = midi.note_offs();
        offs.sort();
        assert_eq!(offs, vec![60, 65]);
        assert!(midi
            .sent
            .iter()
            .all(|m| matches!(m, MidiMessage::NoteOff { channel: 3, .. })));

        // Only KEY_A has an LED; ungrab comes after the flush
        assert_eq!(
            device.calls,
            vec![DeviceCall::Led(LedType::LED_NUML, false), DeviceCall::Ungrab]
        );
    }

    #[test]
    fn test_refused_grab_still_flips_mode() {
        let keymap = KeyMap::reference();
        let mut controller = ModeController::new();
        let mut midi = RecordingMidi::default();
        let mut device = RecordingDevice::refusing();

        let change = controller.toggle_mode(&keymap, 0, &mut midi, &mut device);
        assert!(matches!(change.typing_error, Some(Error::Grab(_))));
        assert_eq!(controller.mode(), Mode::Midi);

        controller.press(Key::KEY_B);
        let change = controller.toggle_mode(&keymap, 0, &mut midi, &mut device);
        assert!(matches!(change.typing_error, Some(Error::Ungrab(_))));
        assert_eq!(controller.mode(), Mode::Typewriter);
        assert!(controller.sounding().is_empty());
        assert_eq!(midi.note_offs(), vec![62]);
    }

    #[test]
    fn test_double_toggle_round_trips() {
        let keymap = KeyMap::reference();
        let mut controller = ModeController::new();
        let mut midi = RecordingMidi::default();
        let mut device = RecordingDevice::default();

        controller.toggle_mode(&keymap, 0, &mut midi, &mut device);
        controller.toggle_mode(&keymap, 0, &mut midi, &mut device);
        assert_eq!(controller.mode(), Mode::Typewriter);
        assert!(controller.sounding().is_empty());
        assert!(midi.sent.is_empty());
        assert_eq!(device.grabs(), vec![DeviceCall::Grab, DeviceCall::Ungrab]);
    }

    #[test]
    fn test_press_is_idempotent() {
        let mut controller = ModeController::new();
        controller.mode = Mode::Midi;
        assert!(controller.press(Key::KEY_A));
        assert!(!controller.press(Key::KEY_A));
        assert_eq!(controller.sounding().len(), 1);
        assert!(controller.release(Key::KEY_A));
        assert!(!controller.release(Key::KEY_A));
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::Typewriter.to_string(), "typewriter");
        assert_eq!(Mode::Midi.to_string(), "midi");
        assert_eq!(Mode::Midi.toggled(), Mode::Typewriter);
    }
}
