//! OSC codec (C6): bidirectional translation between OSC wire packets and
//! [`Msg`] values, over the `/midi[<port>]/<op>` address grammar.
//!
//! Grounded on the reference codebase's `rosc`-based encode/decode calls in
//! `core/src/protocol/osc.rs`; the argument-type mapping here is narrower
//! (only `Int`) since every op in this grammar is integer-only.

use crate::midi::{self, MidiAtom};
use crate::msg::Msg;
use rosc::{OscMessage, OscPacket, OscType};

/// Maximum bundle recursion depth, a guard against pathological
/// nested-bundle input.
const MAX_BUNDLE_DEPTH: u32 = 8;

/// One decoded MIDI op, prior to being folded into a [`Msg`].
struct Decoded {
    port: u8,
    status: u8,
    data1: u8,
    data2: u8,
}

/// Parses a raw UDP payload into zero or more [`Msg::Midi`] values,
/// recursing into bundles up to [`MAX_BUNDLE_DEPTH`]. A malformed packet or
/// an out-of-grammar address yields no message for that entry rather than
/// aborting the whole payload.
pub fn decode_packet(bytes: &[u8]) -> Vec<Msg> {
    match rosc::decoder::decode_udp(bytes) {
        Ok((_, packet)) => {
            let mut out = Vec::new();
            decode_into(&packet, 0, &mut out);
            out
        }
        Err(e) => {
            crate::log_eprintln!("[osc] failed to decode packet: {e:?}");
            Vec::new()
        }
    }
}

fn decode_into(packet: &OscPacket, depth: u32, out: &mut Vec<Msg>) {
    if depth > MAX_BUNDLE_DEPTH {
        crate::log_eprintln!("[osc] bundle recursion depth exceeded, dropping");
        return;
    }
    match packet {
        OscPacket::Message(msg) => {
            if let Some(decoded) = decode_message(msg) {
                out.push(Msg::Midi {
                    port: decoded.port,
                    cmd: decoded.status,
                    val1: decoded.data1,
                    val2: decoded.data2,
                });
            }
        }
        OscPacket::Bundle(bundle) => {
            crate::log_debug!("[osc] bundle timetag {:?} (not honoured)", bundle.timetag);
            for inner in &bundle.content {
                decode_into(inner, depth + 1, out);
            }
        }
    }
}

/// Parses `/midi[<port>]/<op>` and its integer argument stream into a
/// decoded MIDI atom. Returns `None` (logging the reason) on any mismatch.
fn decode_message(msg: &OscMessage) -> Option<Decoded> {
    let rest = msg.addr.strip_prefix("/midi")?;
    let (port_str, op) = match rest.split_once('/') {
        Some((p, op)) => (p, op),
        None => return None,
    };
    let port: u8 = if port_str.is_empty() {
        0
    } else {
        match port_str.parse() {
            Ok(p) => p,
            Err(_) => {
                crate::log_eprintln!("[osc] bad port segment in '{}'", msg.addr);
                return None;
            }
        }
    };

    let ints = ints(&msg.args);

    let build = |status: u8, data1: u8, data2: u8| Decoded { port, status, data1, data2 };

    let atom = match op {
        "non" | "nof" | "key" | "ctl" => {
            let [chan, a, b] = take3(&ints)?;
            let base = match op {
                "non" => midi::NOTE_ON,
                "nof" => midi::NOTE_OFF,
                "key" => midi::KEY_PRESSURE,
                _ => midi::CONTROL_CHANGE,
            };
            build(base | (chan as u8 & 0x0F), a as u8, b as u8)
        }
        "prg" | "chn" => {
            let [chan, value] = take2(&ints)?;
            let base = if op == "prg" { midi::PROGRAM_CHANGE } else { midi::CHANNEL_PRESSURE };
            build(base | (chan as u8 & 0x0F), value as u8, 0)
        }
        "bnd" => {
            let [chan, bend] = take2(&ints)?;
            let bend14 = bend as u16 & 0x3FFF;
            build(midi::PITCH_BEND | (chan as u8 & 0x0F), (bend14 >> 7) as u8, (bend14 & 0x7F) as u8)
        }
        "tcd" => {
            let [kind, value] = take2(&ints)?;
            build(midi::TIME_CODE, kind as u8, value as u8)
        }
        "pos" => {
            let [value] = take1(&ints)?;
            build(midi::SONG_POSITION, value as u8, 0)
        }
        "sel" => {
            let [value] = take1(&ints)?;
            build(midi::SONG_SELECT, value as u8, 0)
        }
        "tun" => build(midi::TUNE_REQUEST, 0, 0),
        "clk" => build(midi::CLOCK, 0, 0),
        "stt" => build(midi::START, 0, 0),
        "cnt" => build(midi::CONTINUE, 0, 0),
        "stp" => build(midi::STOP, 0, 0),
        "sex" => {
            crate::log_debug!("[osc] sysex op reserved/unimplemented");
            return None;
        }
        other => {
            crate::log_eprintln!("[osc] unrecognised op '{}'", other);
            return None;
        }
    };
    Some(atom)
}

fn ints(args: &[OscType]) -> Vec<i32> {
    args.iter().filter_map(|a| a.clone().int()).collect()
}

fn take1(ints: &[i32]) -> Option<[i32; 1]> {
    if ints.len() < 1 {
        crate::log_eprintln!("[osc] argument stream shortage");
        return None;
    }
    Some([ints[0]])
}

fn take2(ints: &[i32]) -> Option<[i32; 2]> {
    if ints.len() < 2 {
        crate::log_eprintln!("[osc] argument stream shortage");
        return None;
    }
    Some([ints[0], ints[1]])
}

fn take3(ints: &[i32]) -> Option<[i32; 3]> {
    if ints.len() < 3 {
        crate::log_eprintln!("[osc] argument stream shortage");
        return None;
    }
    Some([ints[0], ints[1], ints[2]])
}

/// Encodes a [`MidiAtom`] back to an OSC message at `/midi[<port>]/<op>`,
/// the inverse of [`decode_message`].
pub fn encode_atom(atom: MidiAtom) -> Option<Vec<u8>> {
    let addr_port = if atom.port == 0 { String::new() } else { atom.port.to_string() };
    let chan = atom.channel() as i32;

    let (op, args): (&str, Vec<i32>) = match atom.status_kind() {
        midi::NOTE_ON => ("non", vec![chan, atom.data1 as i32, atom.data2 as i32]),
        midi::NOTE_OFF => ("nof", vec![chan, atom.data1 as i32, atom.data2 as i32]),
        midi::KEY_PRESSURE => ("key", vec![chan, atom.data1 as i32, atom.data2 as i32]),
        midi::CONTROL_CHANGE => ("ctl", vec![chan, atom.data1 as i32, atom.data2 as i32]),
        midi::PROGRAM_CHANGE => ("prg", vec![chan, atom.data1 as i32]),
        midi::CHANNEL_PRESSURE => ("chn", vec![chan, atom.data1 as i32]),
        midi::PITCH_BEND => {
            let bend14 = ((atom.data1 as u16) << 7) | atom.data2 as u16;
            ("bnd", vec![chan, bend14 as i32])
        }
        midi::TIME_CODE => ("tcd", vec![atom.data1 as i32, atom.data2 as i32]),
        midi::SONG_POSITION => ("pos", vec![atom.data1 as i32]),
        midi::SONG_SELECT => ("sel", vec![atom.data1 as i32]),
        midi::TUNE_REQUEST => ("tun", vec![]),
        midi::CLOCK => ("clk", vec![]),
        midi::START => ("stt", vec![]),
        midi::CONTINUE => ("cnt", vec![]),
        midi::STOP => ("stp", vec![]),
        _ => return None,
    };

    let addr = format!("/midi{addr_port}/{op}");
    let packet = OscPacket::Message(OscMessage {
        addr,
        args: args.into_iter().map(OscType::Int).collect(),
    });
    rosc::encoder::encode(&packet).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(atom: MidiAtom) -> MidiAtom {
        let bytes = encode_atom(atom).expect("encodable");
        let msgs = decode_packet(&bytes);
        assert_eq!(msgs.len(), 1);
        msgs[0].as_midi_atom().expect("midi atom")
    }

    #[test]
    fn note_on_round_trips() {
        let atom = MidiAtom::new(2, midi::NOTE_ON | 0x05, 60, 100);
        assert_eq!(round_trip(atom), atom);
    }

    #[test]
    fn port_zero_collapses_to_no_segment() {
        let atom = MidiAtom::new(0, midi::NOTE_ON | 0x01, 10, 20);
        let bytes = encode_atom(atom).unwrap();
        let packet = rosc::decoder::decode_udp(&bytes).unwrap().1;
        match packet {
            OscPacket::Message(m) => assert_eq!(m.addr, "/midi/non"),
            _ => panic!("expected message"),
        }
        assert_eq!(round_trip(atom), atom);
    }

    #[test]
    fn pitch_bend_splits_into_14_bits() {
        let atom = MidiAtom::new(1, midi::PITCH_BEND, 0x40, 0x00);
        assert_eq!(round_trip(atom), atom);
    }

    #[test]
    fn control_change_decodes_args() {
        let packet = OscPacket::Message(OscMessage {
            addr: "/midi2/non".to_string(),
            args: vec![OscType::Int(5), OscType::Int(60), OscType::Int(100)],
        });
        let bytes = rosc::encoder::encode(&packet).unwrap();
        let msgs = decode_packet(&bytes);
        assert_eq!(
            msgs,
            vec![Msg::Midi { port: 2, cmd: midi::NOTE_ON | 0x05, val1: 60, val2: 100 }]
        );
    }

    #[test]
    fn short_argument_stream_drops_message() {
        let packet = OscPacket::Message(OscMessage {
            addr: "/midi2/non".to_string(),
            args: vec![OscType::Int(5)],
        });
        let bytes = rosc::encoder::encode(&packet).unwrap();
        assert!(decode_packet(&bytes).is_empty());
    }

    #[test]
    fn unrecognised_address_yields_nothing() {
        let packet = OscPacket::Message(OscMessage {
            addr: "/something/else".to_string(),
            args: vec![],
        });
        let bytes = rosc::encoder::encode(&packet).unwrap();
        assert!(decode_packet(&bytes).is_empty());
    }

    #[test]
    fn bundle_recurses_into_messages() {
        let inner = OscPacket::Message(OscMessage {
            addr: "/midi/clk".to_string(),
            args: vec![],
        });
        let bundle = OscPacket::Bundle(rosc::OscBundle {
            timetag: rosc::OscTime { seconds: 0, fractional: 0 },
            content: vec![inner],
        });
        let bytes = rosc::encoder::encode(&bundle).unwrap();
        let msgs = decode_packet(&bytes);
        assert_eq!(msgs, vec![Msg::Midi { port: 0, cmd: midi::CLOCK, val1: 0, val2: 0 }]);
    }
}
