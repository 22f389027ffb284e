//! `patchbay_hub`: the concurrency and routing fabric bridging the
//! WebSocket, OSC, local-MIDI and SPI message planes of an embedded music
//! controller.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod job;
pub mod logger;
pub mod midi;
pub mod midi_bridge;
pub mod msg;
pub mod osc_codec;
pub mod queue;
pub mod spi;
pub mod udp_server;
pub mod worker;
pub mod ws_session;
