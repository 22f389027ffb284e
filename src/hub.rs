//! The hub (C11): owns every queue and the result store, constructs the
//! codec-facing servers and workers, and runs the reactor.
//!
//! Wiring follows the reference codebase's `World`/`SovaCoreServer`
//! construction order in `core/src/world.rs` and `core/src/main.rs`: build
//! every collaborator up front, referencing shared queues by `Arc`, then
//! hand ownership of the whole graph to `run`.

use crate::config::Cli;
use crate::dispatcher::Dispatcher;
use crate::job::{Job, JobContext, JobStatus};
use crate::midi_bridge::MidiBridge;
use crate::msg::Msg;
use crate::queue::{LockedQueue, LockedStore};
use crate::spi::{self, SpiReader, SpiTransport};
use crate::udp_server::UdpServer;
use crate::worker::Worker;
use crate::ws_session;
use serde_json::Value;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::net::TcpListener;
use tokio::runtime::Handle;

pub struct Hub {
    spi_in: Arc<LockedQueue<Msg>>,
    osc_in: Arc<LockedQueue<Msg>>,
    midi_out: Arc<LockedQueue<Msg>>,
    cmd_queue: Arc<LockedQueue<Job>>,
    results: Arc<LockedStore<u32, Value>>,
    job_ctx: Arc<JobContext>,
    dispatcher: Arc<Dispatcher>,
    udp_server: Arc<UdpServer>,
    midi_bridge: Arc<StdMutex<MidiBridge>>,
    spi_transport: Option<Arc<dyn SpiTransport>>,
    ws_port: u16,
    workers: Vec<Worker>,
}

impl Hub {
    /// Allocates the queues/result store and constructs every collaborator
    /// that references them. `spi_transport` is the consumed SPI
    /// driver capability (`None` runs with the SPI plane idle).
    pub async fn new(cli: &Cli, spi_transport: Option<Arc<dyn SpiTransport>>) -> std::io::Result<Self> {
        let spi_in = Arc::new(LockedQueue::new());
        let osc_in = Arc::new(LockedQueue::new());
        let midi_out = Arc::new(LockedQueue::new());
        let cmd_queue = Arc::new(LockedQueue::new());
        let results = Arc::new(LockedStore::new());
        let job_ctx = Arc::new(JobContext::new(spi_in.clone(), osc_in.clone()));
        let dispatcher = Arc::new(Dispatcher::new(cmd_queue.clone(), results.clone(), job_ctx.clone()));

        let udp_server = Arc::new(UdpServer::bind(cli.osc_rcv_port, cli.osc_dst(), spi_in.clone()).await?);
        let midi_bridge = Arc::new(StdMutex::new(MidiBridge::open(spi_in.clone(), osc_in.clone())));

        Ok(Hub {
            spi_in,
            osc_in,
            midi_out,
            cmd_queue,
            results,
            job_ctx,
            dispatcher,
            udp_server,
            midi_bridge,
            spi_transport,
            ws_port: cli.ws_port,
            workers: Vec::new(),
        })
    }

    /// Sets per-queue blocking policy, starts the servers and workers, and
    /// runs until `stop` is called.
    pub async fn run(&mut self) -> std::io::Result<()> {
        self.start_job_worker();
        self.start_osc_out_worker();
        self.start_spi_worker();
        self.start_midi_out_worker();

        // `Worker::start` enables blocking on every queue it drains by
        // default; the hub's policy overrides that for `spiInQ`, which
        // stays non-blocking (busy-spin).
        self.spi_in.set_blocking(false);

        let listener = TcpListener::bind(("0.0.0.0", self.ws_port)).await?;
        crate::log_println!("[hub] WebSocket control plane listening on :{}", self.ws_port);

        let udp_server = self.udp_server.clone();
        let udp_task = tokio::spawn(async move { udp_server.run().await });

        let dispatcher = self.dispatcher.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, addr)) => {
                        crate::log_println!("[hub] accepted WebSocket session from {addr}");
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move { ws_session::run_session(socket, dispatcher).await });
                    }
                    Err(e) => crate::log_eprintln!("[hub] accept failed: {e}"),
                }
            }
        });

        tokio::select! {
            _ = wait_for_shutdown_signal() => {
                crate::log_println!("[hub] shutdown signal received");
            }
            res = udp_task => {
                if let Err(e) = res {
                    crate::log_eprintln!("[hub] UDP server task exited: {e}");
                }
            }
        }
        accept_task.abort();
        self.stop();
        Ok(())
    }

    /// Posts the reactor stop signal, then stops every worker.
    pub fn stop(&mut self) {
        self.udp_server.shutdown();
        for worker in &mut self.workers {
            worker.stop(&self.cmd_queue);
        }
    }

    fn start_job_worker(&mut self) {
        let job_ctx = self.job_ctx.clone();
        let results = self.results.clone();
        let cmd_queue = self.cmd_queue.clone();
        let cmd_queue_for_step = cmd_queue.clone();
        let worker = Worker::start("job-worker", false, cmd_queue, move |job: Arc<Job>| {
            let (status, payload) = job.process(&job_ctx);
            let reboot_dongle = (status == JobStatus::Error)
                .then(|| job_ctx.dongle())
                .flatten()
                .filter(|d| d.should_reboot());
            let (_status, payload) = match reboot_dongle {
                Some(dongle) => {
                    crate::log_println!("[hub] job {} failed, dongle wants a reboot; reopening", job.id);
                    match dongle.reopen() {
                        Ok(()) => job.process(&job_ctx),
                        Err(e) => {
                            crate::log_eprintln!("[hub] dongle reopen failed: {e}");
                            (status, payload)
                        }
                    }
                }
                None => (status, payload),
            };
            results.insert(job.id, payload);
            cmd_queue_for_step.remove(&job);
        });
        self.workers.push(worker);
    }

    fn start_osc_out_worker(&mut self) {
        let osc_in = self.osc_in.clone();
        let osc_in_for_step = osc_in.clone();
        let udp_server = self.udp_server.clone();
        let handle = Handle::current();
        let worker = Worker::start("osc-out-worker", true, osc_in, move |msg: Arc<Msg>| {
            if let Err(e) = handle.block_on(udp_server.send(&msg)) {
                crate::log_eprintln!("[hub] failed to send outbound OSC: {e}");
            }
            osc_in_for_step.remove(&msg);
        });
        self.workers.push(worker);
    }

    fn start_spi_worker(&mut self) {
        let spi_in = self.spi_in.clone();
        let spi_in_for_step = spi_in.clone();
        let osc_in = self.osc_in.clone();
        let transport = self.spi_transport.clone();
        let reader = StdMutex::new(SpiReader::new());
        let worker = Worker::start("spi-worker", true, spi_in, move |msg: Arc<Msg>| {
            let Some(transport) = transport.as_ref() else {
                spi_in_for_step.remove(&msg);
                return;
            };
            let out = spi::encode_outbound(&msg);
            match transport.transfer(&out) {
                Ok(reply) => {
                    let mut reader = reader.lock().unwrap();
                    for byte in reply {
                        if let Some(decoded) = reader.feed(byte) {
                            osc_in.push_back(decoded);
                        }
                    }
                }
                Err(e) => crate::log_eprintln!("[spi] transfer failed: {e}"),
            }
            spi_in_for_step.remove(&msg);
        });
        self.workers.push(worker);
    }

    fn start_midi_out_worker(&mut self) {
        let midi_out = self.midi_out.clone();
        let midi_out_for_step = midi_out.clone();
        let bridge = self.midi_bridge.clone();
        let worker = Worker::start("midi-out-worker", true, midi_out, move |msg: Arc<Msg>| {
            bridge.lock().unwrap().send(&msg);
            midi_out_for_step.remove(&msg);
        });
        self.workers.push(worker);
    }
}

/// Waits for either Ctrl-C or SIGTERM. On platforms without
/// SIGTERM (e.g. Windows) this degrades to Ctrl-C only.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
