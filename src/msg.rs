//! The internal message type (`Msg`) shared across the SPI, OSC and MIDI
//! queues.

use crate::midi::MidiAtom;
use serde::{Deserialize, Serialize};

/// Maximum number of atoms a single `MidiList` may carry.
pub const MAX_MIDI_LIST: usize = 127;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Msg {
    None,
    Midi {
        port: u8,
        cmd: u8,
        val1: u8,
        val2: u8,
    },
    MidiList(Vec<MidiAtom>),
    ConfigButton { which: u8, payload: Vec<u8> },
    ConfigPedal { which: u8, payload: Vec<u8> },
    ConfigXlrm8r { which: u8, payload: Vec<u8> },
    Tempo(f32),
    DuinoCmd(u8),
}

impl Msg {
    pub fn midi_atom(atom: MidiAtom) -> Msg {
        Msg::Midi {
            port: atom.port,
            cmd: atom.status,
            val1: atom.data1,
            val2: atom.data2,
        }
    }

    pub fn as_midi_atom(&self) -> Option<MidiAtom> {
        match self {
            Msg::Midi { port, cmd, val1, val2 } => {
                Some(MidiAtom::new(*port, *cmd, *val1, *val2))
            }
            _ => None,
        }
    }

    /// Builds a `MidiList`, returning `None` if `atoms` exceeds
    /// [`MAX_MIDI_LIST`].
    pub fn midi_list(atoms: Vec<MidiAtom>) -> Option<Msg> {
        if atoms.len() > MAX_MIDI_LIST {
            None
        } else {
            Some(Msg::MidiList(atoms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midi_list_rejects_oversized_vec() {
        let atoms = vec![MidiAtom::new(0, 0x90, 60, 100); MAX_MIDI_LIST + 1];
        assert!(Msg::midi_list(atoms).is_none());
    }

    #[test]
    fn midi_list_accepts_boundary_size() {
        let atoms = vec![MidiAtom::new(0, 0x90, 60, 100); MAX_MIDI_LIST];
        assert!(Msg::midi_list(atoms).is_some());
    }

    #[test]
    fn midi_roundtrips_through_atom() {
        let atom = MidiAtom::new(2, 0x95, 60, 100);
        let msg = Msg::midi_atom(atom);
        assert_eq!(msg.as_midi_atom(), Some(atom));
    }
}
