//! SPI framing engine (C7): serialises outbound [`Msg`] values into the
//! microcontroller's byte protocol and parses its byte-stream reply back
//! into [`Msg`] values.
//!
//! The SPI driver itself (the actual full-duplex transfer) is a consumed
//! capability — this module only knows about bytes in, bytes out.

use crate::midi::MidiAtom;
use crate::msg::Msg;
use std::sync::atomic::{AtomicBool, Ordering};

/// The external full-duplex SPI link to the microcontroller — a consumed
/// capability. One `transfer` call writes `out` and returns however many
/// reply bytes the device produced for that tick.
pub trait SpiTransport: Send + Sync {
    fn transfer(&self, out: &[u8]) -> std::io::Result<Vec<u8>>;
}

const TAG_MIDI: u8 = 0x80;
const TAG_CFG_BUTTON: u8 = 0x01;
const TAG_CFG_PEDAL: u8 = 0x02;
const TAG_CFG_XLRM8R: u8 = 0x03;
const TAG_TEMPO: u8 = 0x04;
const TAG_DUINO: u8 = 0x05;
const TAG_PING: u8 = 0x06;

const BYTE_NULL: u8 = 0x00;
const BYTE_PONG: u8 = 0x07;
const BYTE_SEND_TEMPO: u8 = 0x08;
const BYTE_TEMPO: u8 = TAG_TEMPO;
const BYTE_DIAG: u8 = 0x09;

/// Maximum MIDI atoms a single `MidiList` tag byte (`TAG_MIDI | count`) can
/// carry — the top bit is reserved for the MIDI marker, leaving 7 bits for
/// the count.
const MAX_MIDI_COUNT: usize = 127;

/// Serialises one outbound [`Msg`] to its wire bytes. Returns the single
/// `Ping` byte for `Msg::None` / idle. A `MidiList` longer than
/// [`MAX_MIDI_COUNT`] is dropped (logged) and encoded as `Ping` instead.
pub fn encode_outbound(msg: &Msg) -> Vec<u8> {
    match msg {
        Msg::None => vec![TAG_PING],
        Msg::Midi { cmd, val1, val2, .. } => vec![TAG_MIDI | 1, *cmd, *val1, *val2],
        Msg::MidiList(atoms) => {
            if atoms.len() > MAX_MIDI_COUNT {
                crate::log_eprintln!("[spi] MidiList of {} atoms exceeds {MAX_MIDI_COUNT}, dropping", atoms.len());
                return vec![TAG_PING];
            }
            let mut buf = Vec::with_capacity(1 + atoms.len() * 3);
            buf.push(TAG_MIDI | atoms.len() as u8);
            for atom in atoms {
                buf.push(atom.status);
                buf.push(atom.data1);
                buf.push(atom.data2);
            }
            buf
        }
        Msg::ConfigButton { which, payload } => encode_config(TAG_CFG_BUTTON, *which, payload),
        Msg::ConfigPedal { which, payload } => encode_config(TAG_CFG_PEDAL, *which, payload),
        Msg::ConfigXlrm8r { which, payload } => encode_config(TAG_CFG_XLRM8R, *which, payload),
        Msg::Tempo(bpm) => {
            let mut buf = Vec::with_capacity(5);
            buf.push(TAG_TEMPO);
            buf.extend_from_slice(&bpm.to_le_bytes());
            buf
        }
        Msg::DuinoCmd(b) => vec![TAG_DUINO, *b],
    }
}

fn encode_config(tag: u8, which: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(3 + payload.len());
    buf.push(tag);
    buf.push(which);
    buf.push(payload.len() as u8);
    buf.extend_from_slice(payload);
    buf
}

/// Inbound byte-stream state.
#[derive(Debug, Clone, PartialEq)]
enum State {
    CmdByte,
    /// Awaiting the status byte of the next atom; `remaining` atoms left
    /// to read including this one.
    MidiStatus { remaining: u8 },
    MidiData1 { remaining: u8, status: u8 },
    MidiData2 { remaining: u8, status: u8, data1: u8 },
    TempoData { bytes: [u8; 4], filled: usize },
    DiagLen,
    DiagData { remaining: u8, buf: Vec<u8> },
}

/// Drives the inbound state machine byte by byte, accumulating decoded
/// [`Msg`] values and tracking the "tempo requested"/dropped-MIDI latches.
pub struct SpiReader {
    state: State,
    /// Set once and never cleared automatically: the hub polls and clears
    /// it explicitly.
    dropped_midi: AtomicBool,
    tempo_requested: AtomicBool,
}

impl Default for SpiReader {
    fn default() -> Self {
        SpiReader::new()
    }
}

impl SpiReader {
    pub fn new() -> Self {
        SpiReader {
            state: State::CmdByte,
            dropped_midi: AtomicBool::new(false),
            tempo_requested: AtomicBool::new(false),
        }
    }

    pub fn dropped_midi(&self) -> bool {
        self.dropped_midi.load(Ordering::SeqCst)
    }

    pub fn clear_dropped_midi(&self) {
        self.dropped_midi.store(false, Ordering::SeqCst);
    }

    pub fn take_tempo_requested(&self) -> bool {
        self.tempo_requested.swap(false, Ordering::SeqCst)
    }

    /// Feeds one inbound byte, returning any [`Msg`] the transition
    /// completed (most transitions produce none).
    pub fn feed(&mut self, byte: u8) -> Option<Msg> {
        match std::mem::replace(&mut self.state, State::CmdByte) {
            State::CmdByte => self.feed_cmd_byte(byte),
            State::MidiStatus { remaining } => {
                self.state = State::MidiData1 { remaining, status: byte };
                None
            }
            State::MidiData1 { remaining, status } => {
                self.state = State::MidiData2 { remaining, status, data1: byte };
                None
            }
            State::MidiData2 { remaining, status, data1 } => {
                let atom = MidiAtom::new(0, status, data1, byte);
                let remaining = remaining - 1;
                self.state = if remaining > 0 {
                    State::MidiStatus { remaining }
                } else {
                    State::CmdByte
                };
                Some(Msg::midi_atom(atom))
            }
            State::TempoData { mut bytes, filled } => {
                bytes[filled] = byte;
                let filled = filled + 1;
                if filled == 4 {
                    self.state = State::CmdByte;
                    Some(Msg::Tempo(f32::from_le_bytes(bytes)))
                } else {
                    self.state = State::TempoData { bytes, filled };
                    None
                }
            }
            State::DiagLen => {
                self.state = if byte == 0 {
                    State::CmdByte
                } else {
                    State::DiagData { remaining: byte, buf: Vec::with_capacity(byte as usize) }
                };
                None
            }
            State::DiagData { remaining, mut buf } => {
                buf.push(byte);
                let remaining = remaining - 1;
                self.state = if remaining == 0 {
                    // Diagnostic payload parsing is a handler stub: the bytes are retained but not interpreted.
                    State::CmdByte
                } else {
                    State::DiagData { remaining, buf }
                };
                None
            }
        }
    }

    fn feed_cmd_byte(&mut self, byte: u8) -> Option<Msg> {
        if byte & 0x80 != 0 {
            let count = byte & 0x7F;
            if count == 0 {
                self.state = State::CmdByte;
                return None;
            }
            self.state = State::MidiStatus { remaining: count };
            return None;
        }
        match byte {
            BYTE_NULL | BYTE_PONG | TAG_PING => {
                self.state = State::CmdByte;
                None
            }
            BYTE_SEND_TEMPO => {
                self.tempo_requested.store(true, Ordering::SeqCst);
                self.state = State::CmdByte;
                None
            }
            BYTE_TEMPO => {
                self.state = State::TempoData { bytes: [0; 4], filled: 0 };
                None
            }
            BYTE_DIAG => {
                self.state = State::DiagLen;
                None
            }
            other => {
                crate::log_eprintln!("[spi] unexpected command byte 0x{other:02x}, dropping MIDI");
                self.dropped_midi.store(true, Ordering::SeqCst);
                self.state = State::CmdByte;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_single_midi_atom() {
        let msg = Msg::Midi { port: 0, cmd: 0x90, val1: 60, val2: 100 };
        assert_eq!(encode_outbound(&msg), vec![0x81, 0x90, 60, 100]);
    }

    #[test]
    fn encodes_tempo_little_endian() {
        let bytes = encode_outbound(&Msg::Tempo(120.0));
        assert_eq!(bytes[0], TAG_TEMPO);
        assert_eq!(f32::from_le_bytes(bytes[1..5].try_into().unwrap()), 120.0);
    }

    #[test]
    fn idle_encodes_to_ping() {
        assert_eq!(encode_outbound(&Msg::None), vec![TAG_PING]);
    }

    #[test]
    fn midi_list_inbound_produces_two_atoms() {
        // S5: 0x82, 0x90,0x3C,0x40, 0x80,0x3C,0x00
        let mut reader = SpiReader::new();
        let bytes = [0x82u8, 0x90, 0x3C, 0x40, 0x80, 0x3C, 0x00];
        let msgs: Vec<Msg> = bytes.iter().filter_map(|b| reader.feed(*b)).collect();
        assert_eq!(
            msgs,
            vec![
                Msg::midi_atom(MidiAtom::new(0, 0x90, 0x3C, 0x40)),
                Msg::midi_atom(MidiAtom::new(0, 0x80, 0x3C, 0x00)),
            ]
        );
    }

    #[test]
    fn tempo_round_trips_through_inbound_state_machine() {
        let mut reader = SpiReader::new();
        let bytes = encode_outbound(&Msg::Tempo(133.5));
        let msgs: Vec<Msg> = bytes.iter().filter_map(|b| reader.feed(*b)).collect();
        assert_eq!(msgs, vec![Msg::Tempo(133.5)]);
    }

    #[test]
    fn send_tempo_byte_sets_latch() {
        let mut reader = SpiReader::new();
        reader.feed(BYTE_SEND_TEMPO);
        assert!(reader.take_tempo_requested());
        assert!(!reader.take_tempo_requested());
    }

    #[test]
    fn unexpected_byte_sets_dropped_midi_latch() {
        let mut reader = SpiReader::new();
        reader.feed(0x7F);
        assert!(reader.dropped_midi());
        reader.clear_dropped_midi();
        assert!(!reader.dropped_midi());
    }

    #[test]
    fn config_button_encoding_includes_length_prefix() {
        let msg = Msg::ConfigButton { which: 3, payload: vec![1, 2, 3] };
        assert_eq!(encode_outbound(&msg), vec![TAG_CFG_BUTTON, 3, 3, 1, 2, 3]);
    }
}
