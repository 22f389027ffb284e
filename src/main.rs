use clap::Parser;
use patchbay_hub::config::Cli;
use patchbay_hub::hub::Hub;
use patchbay_hub::{log_eprintln, log_println};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    patchbay_hub::logger::set_min_level(cli.min_severity());

    log_println!("patchbay-hub {}", env!("CARGO_PKG_VERSION"));
    log_println!(
        "osc_dst={}:{} osc_rcv_port={} ws_port={} threads={} log_level={}",
        cli.osc_dst_addr, cli.osc_dst_port, cli.osc_rcv_port, cli.ws_port, cli.threads, cli.log_level
    );

    // `--threads` (0 = hardware concurrency) sizes the reactor pool
    // directly, so the runtime is built explicitly rather than via
    // `#[tokio::main]`.
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.reactor_threads())
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log_eprintln!("[!] failed to build async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run_hub(cli))
}

async fn run_hub(cli: Cli) -> ExitCode {
    // The hardware-specific SPI driver and crypto-dongle device are
    // consumed capabilities; this entry point runs with
    // both absent, which leaves the SPI plane idle and `sign` jobs
    // returning `DongleRequired` until a real device is wired in.
    let mut hub = match Hub::new(&cli, None).await {
        Ok(hub) => hub,
        Err(e) => {
            log_eprintln!("[!] failed to initialise hub: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = hub.run().await {
        log_eprintln!("[!] hub exited with error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
