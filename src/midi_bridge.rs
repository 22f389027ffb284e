//! MIDI bridge (C8): opens the first available local MIDI input/output
//! ports and feeds/drains the same internal [`Msg`] type as the SPI and OSC
//! planes.
//!
//! Grounded on the reference codebase's `midir` connection pattern in
//! `core/src/protocol/midi.rs` (`MidiInput::ports`/`connect`) and
//! `core/src/device_map.rs` (port enumeration at start-up).

use crate::midi::{payload_len_for_status, MidiAtom};
use crate::msg::Msg;
use crate::queue::LockedQueue;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use std::sync::Arc;

/// Holds the live input connection (dropping it closes the port) and the
/// open output handle used by [`drain_output`].
pub struct MidiBridge {
    _input: Option<MidiInputConnection<()>>,
    output: Option<MidiOutputConnection>,
}

impl MidiBridge {
    /// Enumerates ports, connects to the first input (pushing every
    /// received message to both `spi_in` and `osc_in`), and opens the
    /// first output for later use by [`drain_output`].
    pub fn open(spi_in: Arc<LockedQueue<Msg>>, osc_in: Arc<LockedQueue<Msg>>) -> Self {
        let input = open_first_input(spi_in, osc_in);
        let output = open_first_output();
        MidiBridge { _input: input, output }
    }

    /// Drains `midi_out` to the open output port, if any. Intended to be
    /// called from a [`crate::worker::Worker`] loop on `midiOutQ`.
    pub fn send(&mut self, msg: &Msg) {
        let Some(atom) = msg.as_midi_atom() else {
            return;
        };
        let Some(conn) = self.output.as_mut() else {
            crate::log_eprintln!("[midi] no output port open, dropping outbound message");
            return;
        };
        let bytes = atom_to_wire(atom);
        if let Err(e) = conn.send(&bytes) {
            crate::log_eprintln!("[midi] failed to send to output port: {e}");
        }
    }
}

fn open_first_input(spi_in: Arc<LockedQueue<Msg>>, osc_in: Arc<LockedQueue<Msg>>) -> Option<MidiInputConnection<()>> {
    let mut midi_in = match MidiInput::new("patchbay-hub-in") {
        Ok(m) => m,
        Err(e) => {
            crate::log_eprintln!("[midi] failed to open MIDI input: {e}");
            return None;
        }
    };
    midi_in.ignore(midir::Ignore::None);

    let ports = midi_in.ports();
    let port = ports.first()?;
    let port_name = midi_in.port_name(port).unwrap_or_else(|_| "unknown".to_string());

    let conn = midi_in.connect(
        port,
        "patchbay-hub-in-conn",
        move |_timestamp, bytes, _| {
            if bytes.len() > 3 {
                crate::log_eprintln!("[midi] dropping {}-byte SysEx-shaped input", bytes.len());
                return;
            }
            if bytes.is_empty() {
                return;
            }
            let status = bytes[0];
            let data1 = bytes.get(1).copied().unwrap_or(0);
            let data2 = bytes.get(2).copied().unwrap_or(0);
            let atom = MidiAtom::new(0, status, data1, data2);
            let msg = Msg::midi_atom(atom);
            spi_in.push_back(msg.clone());
            osc_in.push_back(msg);
        },
        (),
    );

    match conn {
        Ok(c) => {
            crate::log_println!("[midi] connected input port '{port_name}'");
            Some(c)
        }
        Err(e) => {
            crate::log_eprintln!("[midi] failed to connect input port '{port_name}': {e}");
            None
        }
    }
}

fn open_first_output() -> Option<MidiOutputConnection> {
    let midi_out = match MidiOutput::new("patchbay-hub-out") {
        Ok(m) => m,
        Err(e) => {
            crate::log_eprintln!("[midi] failed to open MIDI output: {e}");
            return None;
        }
    };
    let ports = midi_out.ports();
    let port = ports.first()?;
    let port_name = midi_out.port_name(port).unwrap_or_else(|_| "unknown".to_string());
    match midi_out.connect(port, "patchbay-hub-out-conn") {
        Ok(c) => {
            crate::log_println!("[midi] connected output port '{port_name}'");
            Some(c)
        }
        Err(e) => {
            crate::log_eprintln!("[midi] failed to connect output port '{port_name}': {e}");
            None
        }
    }
}

/// Reconstructs wire bytes for an atom using the channel-voice/system
/// payload length table.
fn atom_to_wire(atom: MidiAtom) -> Vec<u8> {
    let len = payload_len_for_status(atom.status);
    match len {
        0 => vec![atom.status],
        1 => vec![atom.status, atom.data1],
        _ => vec![atom.status, atom.data1, atom.data2],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi;

    #[test]
    fn atom_to_wire_respects_payload_length() {
        assert_eq!(atom_to_wire(MidiAtom::new(0, midi::NOTE_ON, 60, 100)), vec![midi::NOTE_ON, 60, 100]);
        assert_eq!(atom_to_wire(MidiAtom::new(0, midi::PROGRAM_CHANGE, 5, 0)), vec![midi::PROGRAM_CHANGE, 5]);
        assert_eq!(atom_to_wire(MidiAtom::new(0, midi::CLOCK, 0, 0)), vec![midi::CLOCK]);
    }
}
