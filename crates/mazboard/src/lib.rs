//! mazboard - Keyboard to MIDI with a typewriter mode
//!
//! Reads a physical keyboard through evdev and, depending on the mode, either
//! lets it type normally or turns mapped keys into MIDI notes:
//!
//! - Releasing Tab toggles between typewriter and MIDI mode
//! - In MIDI mode the keyboard is grabbed so nothing is typed
//! - Lock-key LEDs mirror the notes that are sounding
//! - Leaving MIDI mode switches every sounding note off
//! - Output to a virtual ALSA port or to JACK
//!
//! # Usage as a Library
//!
//! ```no_run
//! use mazboard::{KeyEventDispatcher, KeyMap, KeyboardDevice, POLL_INTERVAL};
//! use mazboard::midi::DummyMidiOutput;
//! use std::sync::atomic::AtomicBool;
//!
//! let mut device = KeyboardDevice::find(0x258a, 0x0026)?;
//! let mut midi = DummyMidiOutput;
//! let mut dispatcher = KeyEventDispatcher::new(KeyMap::reference());
//!
//! // Runs until `quit` is set, then flushes notes and ungrabs
//! let quit = AtomicBool::new(false);
//! dispatcher.run(&mut device, &mut midi, &quit, POLL_INTERVAL)?;
//! # Ok::<(), mazboard::Error>(())
//! ```

pub mod config;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod keymap;
pub mod midi;
pub mod mode;

// Re-export main types
pub use config::{Config, DeviceSettings, MidiSettings};
pub use device::{list_devices, DeviceInfo, GrabControl, KeySource, KeyboardDevice, LedControl};
pub use dispatcher::{Dispatch, KeyEvent, KeyEventDispatcher, KeyTransition, POLL_INTERVAL};
pub use error::{Error, Result};
pub use keymap::{note_name, KeyMap, KeyMapping, DEFAULT_VELOCITY, TOGGLE_KEY};
pub use midi::{MidiBackend, MidiMessage, MidiOutput};
pub use mode::{Mode, ModeChange, ModeController};
