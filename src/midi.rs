//! Raw MIDI atom representation shared by the OSC codec, the SPI framing
//! engine, and the local MIDI bridge.

use serde::{Deserialize, Serialize};

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const KEY_PRESSURE: u8 = 0xA0;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_BEND: u8 = 0xE0;

pub const SYSEX: u8 = 0xF0;
pub const TIME_CODE: u8 = 0xF1;
pub const SONG_POSITION: u8 = 0xF2;
pub const SONG_SELECT: u8 = 0xF3;
pub const TUNE_REQUEST: u8 = 0xF6;
pub const CLOCK: u8 = 0xF8;
pub const START: u8 = 0xFA;
pub const CONTINUE: u8 = 0xFB;
pub const STOP: u8 = 0xFC;

/// A single three-byte-on-the-wire MIDI message plus the port it belongs to
/// on the OSC/MIDI planes (the SPI plane addresses a single local device and
/// drops the port when serialising, see `spi`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiAtom {
    pub port: u8,
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl MidiAtom {
    pub fn new(port: u8, status: u8, data1: u8, data2: u8) -> Self {
        MidiAtom { port, status, data1, data2 }
    }

    /// True if this is a channel-voice status (0x80..=0xEF).
    pub fn is_channel_voice(&self) -> bool {
        self.status < 0xF0
    }

    /// The 4-bit channel, meaningful only for channel-voice statuses.
    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    /// The status with channel nibble masked off (e.g. `0x95` -> `0x90`).
    pub fn status_kind(&self) -> u8 {
        if self.is_channel_voice() {
            self.status & 0xF0
        } else {
            self.status
        }
    }

    /// Number of meaningful data bytes (0, 1 or 2) carried by this status,
    /// per the channel-voice / system-common payload tables.
    pub fn payload_len(&self) -> usize {
        payload_len_for_status(self.status)
    }
}

/// Number of data bytes a raw status byte carries.
pub fn payload_len_for_status(status: u8) -> usize {
    if status < 0xF0 {
        match status & 0xF0 {
            PROGRAM_CHANGE | CHANNEL_PRESSURE => 1,
            _ => 2,
        }
    } else {
        match status {
            TIME_CODE => 2,
            SONG_POSITION | SONG_SELECT => 1,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_is_low_nibble() {
        let a = MidiAtom::new(0, NOTE_ON | 0x05, 60, 100);
        assert_eq!(a.channel(), 5);
        assert_eq!(a.status_kind(), NOTE_ON);
    }

    #[test]
    fn payload_len_matches_status_table() {
        assert_eq!(payload_len_for_status(PROGRAM_CHANGE), 1);
        assert_eq!(payload_len_for_status(CHANNEL_PRESSURE), 1);
        assert_eq!(payload_len_for_status(NOTE_ON), 2);
        assert_eq!(payload_len_for_status(PITCH_BEND), 2);
        assert_eq!(payload_len_for_status(CLOCK), 0);
        assert_eq!(payload_len_for_status(SONG_SELECT), 1);
        assert_eq!(payload_len_for_status(SONG_POSITION), 1);
        assert_eq!(payload_len_for_status(TIME_CODE), 2);
    }
}
