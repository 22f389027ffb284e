//! CLI/configuration surface (A3), parsed with `clap` the way the
//! reference codebase's `core/src/main.rs` `Cli` struct is declared.

use crate::logger::Severity;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "patchbayd",
    version,
    about = "Bridges WebSocket, OSC, MIDI and SPI message planes for an embedded music controller."
)]
pub struct Cli {
    /// Destination address for outbound OSC.
    #[arg(short = 'a', long = "osc_dst_addr", default_value = "127.0.0.1")]
    pub osc_dst_addr: String,

    /// Destination port for outbound OSC.
    #[arg(short = 'p', long = "osc_dst_port", default_value_t = 57120)]
    pub osc_dst_port: u16,

    /// Local port the OSC/UDP server listens on.
    #[arg(short = 'q', long = "osc_rcv_port", default_value_t = 5505)]
    pub osc_rcv_port: u16,

    /// Local port the WebSocket control-plane server listens on.
    #[arg(short = 'r', long = "ws_port", default_value_t = 8080)]
    pub ws_port: u16,

    /// Reactor thread-pool size; 0 means hardware concurrency.
    #[arg(short = 't', long = "threads", default_value_t = 1)]
    pub threads: u16,

    /// Log verbosity, 0 (fatal only) through 5 (trace).
    #[arg(short = 'l', long = "log-level", default_value_t = 4)]
    pub log_level: u16,
}

impl Cli {
    pub fn min_severity(&self) -> Severity {
        Severity::from_cli_level(self.log_level)
    }

    pub fn osc_dst(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(
            self.osc_dst_addr.parse().unwrap_or_else(|_| std::net::Ipv4Addr::LOCALHOST.into()),
            self.osc_dst_port,
        )
    }

    pub fn reactor_threads(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            self.threads as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_defaults_match_spec() {
        let cli = Cli::parse_from(["patchbayd"]);
        assert_eq!(cli.osc_dst_addr, "127.0.0.1");
        assert_eq!(cli.osc_dst_port, 57120);
        assert_eq!(cli.osc_rcv_port, 5505);
        assert_eq!(cli.ws_port, 8080);
        assert_eq!(cli.threads, 1);
        assert_eq!(cli.log_level, 4);
    }

    #[test]
    fn zero_threads_means_hardware_concurrency() {
        let cli = Cli::parse_from(["patchbayd", "--threads", "0"]);
        assert!(cli.reactor_threads() >= 1);
    }

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }
}
