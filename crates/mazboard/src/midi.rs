//! MIDI output backends
//!
//! A virtual ALSA sequencer port (via midir) is the default, JACK MIDI is
//! available for JACK setups, and a dummy backend only logs.

use crate::config::MidiSettings;
use crate::error::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

/// MIDI backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MidiBackend {
    /// Virtual ALSA sequencer port
    #[default]
    Alsa,
    /// JACK MIDI output
    Jack,
    /// No MIDI output (log only)
    None,
}

impl std::fmt::Display for MidiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MidiBackend::Alsa => write!(f, "ALSA"),
            MidiBackend::Jack => write!(f, "JACK"),
            MidiBackend::None => write!(f, "none"),
        }
    }
}

/// MIDI message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note on: channel, note, velocity
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note off: channel, note
    NoteOff { channel: u8, note: u8 },
}

impl MidiMessage {
    /// Convert to raw MIDI bytes
    pub fn to_bytes(&self) -> [u8; 3] {
        match self {
            MidiMessage::NoteOn { channel, note, velocity } => {
                [0x90 | (channel & 0x0F), *note & 0x7F, *velocity & 0x7F]
            }
            MidiMessage::NoteOff { channel, note } => [0x80 | (channel & 0x0F), *note & 0x7F, 0],
        }
    }
}

/// MIDI output trait
///
/// Backends implement [`MidiOutput::send`]. The note helpers are
/// fire-and-forget: a failed send is logged and dropped.
pub trait MidiOutput {
    /// Send one message to the backend
    fn send(&mut self, message: MidiMessage) -> Result<()>;

    /// Get the port name
    fn port_name(&self) -> &str;

    /// Send a note on message
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        if let Err(e) = self.send(MidiMessage::NoteOn { channel, note, velocity }) {
            log::warn!("Failed to send note on {}: {}", note, e);
        }
    }

    /// Send a note off message
    fn note_off(&mut self, channel: u8, note: u8) {
        if let Err(e) = self.send(MidiMessage::NoteOff { channel, note }) {
            log::warn!("Failed to send note off {}: {}", note, e);
        }
    }
}

/// Open the backend selected in the settings
pub fn open_output(settings: &MidiSettings) -> Result<Box<dyn MidiOutput>> {
    let output: Box<dyn MidiOutput> = match settings.backend {
        MidiBackend::Alsa => Box::new(AlsaMidiOutput::new(&settings.client_name, &settings.port_name)?),
        MidiBackend::Jack => Box::new(JackMidiOutput::new(&settings.client_name, &settings.port_name)?),
        MidiBackend::None => Box::new(DummyMidiOutput),
    };
    log::info!("{} MIDI output opened: {}", settings.backend, output.port_name());
    Ok(output)
}

/// Virtual ALSA sequencer output port
pub struct AlsaMidiOutput {
    connection: midir::MidiOutputConnection,
    port_name: String,
}

impl AlsaMidiOutput {
    /// Create a virtual output port other applications can subscribe to
    pub fn new(client_name: &str, port_name: &str) -> Result<Self> {
        use midir::os::unix::VirtualOutput;

        let output = midir::MidiOutput::new(client_name).map_err(|e| Error::Midi(e.to_string()))?;
        let connection = output
            .create_virtual(port_name)
            .map_err(|e| Error::Midi(format!("Failed to create virtual port {}: {}", port_name, e)))?;

        Ok(Self {
            connection,
            port_name: format!("{}:{}", client_name, port_name),
        })
    }
}

impl MidiOutput for AlsaMidiOutput {
    fn send(&mut self, message: MidiMessage) -> Result<()> {
        self.connection
            .send(&message.to_bytes())
            .map_err(|e| Error::Midi(e.to_string()))
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// JACK MIDI output
pub struct JackMidiOutput {
    /// Sender for MIDI messages to the JACK process callback
    tx: Sender<MidiMessage>,
    port_name: String,
    /// Keep the client alive
    _client: jack::AsyncClient<(), JackMidiHandler>,
}

impl JackMidiOutput {
    /// Create a new JACK MIDI output
    pub fn new(client_name: &str, port_name: &str) -> Result<Self> {
        let (client, _status) = jack::Client::new(client_name, jack::ClientOptions::NO_START_SERVER)?;
        let midi_out = client.register_port(port_name, jack::MidiOut::default())?;

        let (tx, rx) = unbounded();
        let handler = JackMidiHandler { midi_out, rx };
        let active_client = client.activate_async((), handler)?;

        Ok(Self {
            tx,
            port_name: format!("{}:{}", client_name, port_name),
            _client: active_client,
        })
    }
}

impl MidiOutput for JackMidiOutput {
    fn send(&mut self, message: MidiMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::Midi("JACK process handler is gone".to_string()))
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// JACK process handler for MIDI output
struct JackMidiHandler {
    midi_out: jack::Port<jack::MidiOut>,
    rx: Receiver<MidiMessage>,
}

impl jack::ProcessHandler for JackMidiHandler {
    fn process(&mut self, _client: &jack::Client, ps: &jack::ProcessScope) -> jack::Control {
        let mut writer = self.midi_out.writer(ps);

        while let Ok(msg) = self.rx.try_recv() {
            let bytes = msg.to_bytes();
            let raw = jack::RawMidi {
                time: 0, // Immediate
                bytes: &bytes,
            };
            let _ = writer.write(&raw);
        }

        jack::Control::Continue
    }
}

/// Dummy MIDI output (for dry runs or when no backend is wanted)
pub struct DummyMidiOutput;

impl MidiOutput for DummyMidiOutput {
    fn send(&mut self, message: MidiMessage) -> Result<()> {
        log::debug!("MIDI {:?}", message);
        Ok(())
    }

    fn port_name(&self) -> &str {
        "dummy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_message_bytes() {
        let note_on = MidiMessage::NoteOn { channel: 0, note: 60, velocity: 64 };
        assert_eq!(note_on.to_bytes(), [0x90, 60, 64]);

        let note_off = MidiMessage::NoteOff { channel: 1, note: 62 };
        assert_eq!(note_off.to_bytes(), [0x81, 62, 0]);

        // Out-of-range values are masked into the 7-bit data range
        let masked = MidiMessage::NoteOn { channel: 16, note: 200, velocity: 255 };
        assert_eq!(masked.to_bytes(), [0x90, 200 & 0x7F, 0x7F]);
    }

    #[test]
    fn test_dummy_output() {
        let mut output = DummyMidiOutput;
        output.note_on(0, 60, 64);
        output.note_off(0, 60);
        assert_eq!(output.port_name(), "dummy");
    }

    struct FailingOutput;

    impl MidiOutput for FailingOutput {
        fn send(&mut self, _message: MidiMessage) -> Result<()> {
            Err(Error::Midi("port closed".to_string()))
        }

        fn port_name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_send_failure_is_swallowed() {
        let mut output: Box<dyn MidiOutput> = Box::new(FailingOutput);
        output.note_on(0, 60, 64);
        output.note_off(0, 60);
    }

    #[test]
    fn test_backend_parse() {
        #[derive(Deserialize)]
        struct Wrapper {
            backend: MidiBackend,
        }
        let parsed: Wrapper = toml::from_str("backend = \"jack\"").unwrap();
        assert_eq!(parsed.backend, MidiBackend::Jack);
        assert_eq!(MidiBackend::default(), MidiBackend::Alsa);
    }
}
