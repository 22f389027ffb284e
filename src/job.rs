//! Job model (C3): the polymorphic record behind every command the
//! dispatcher cannot answer inline.

use crate::error::HubError;
use crate::msg::Msg;
use crate::queue::LockedQueue;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Not done yet — keep (or place) the job in the queue.
    Scheduled,
    /// Finished successfully within the call that produced this status.
    Immediate,
    /// Finished with a recoverable error.
    Error,
}

/// The external, hardware-gated capability a `sign` job needs. The concrete
/// cryptographic "dongle" operations are out of scope; only this
/// consumed-capability interface is specified.
pub trait DongleCapability: Send + Sync {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, HubError>;

    /// True if the dongle's own state indicates a recoverable error is
    /// worth retrying after a reopen (e.g. it dropped its USB session).
    fn should_reboot(&self) -> bool;

    /// Closes and reopens the device. Called once after a job fails with
    /// `should_reboot` set, before the job is retried.
    fn reopen(&self) -> Result<(), HubError>;
}

/// Capabilities available to a job while it is being processed, owned by
/// the Hub and shared (by reference) with whichever worker currently holds
/// the job.
pub struct JobContext {
    pub spi_in: Arc<LockedQueue<Msg>>,
    pub osc_in: Arc<LockedQueue<Msg>>,
    dongle: Mutex<Option<Arc<dyn DongleCapability>>>,
}

impl JobContext {
    pub fn new(spi_in: Arc<LockedQueue<Msg>>, osc_in: Arc<LockedQueue<Msg>>) -> Self {
        JobContext {
            spi_in,
            osc_in,
            dongle: Mutex::new(None),
        }
    }

    pub fn set_dongle(&self, dongle: Option<Arc<dyn DongleCapability>>) {
        *self.dongle.lock().unwrap() = dongle;
    }

    pub fn dongle(&self) -> Option<Arc<dyn DongleCapability>> {
        self.dongle.lock().unwrap().clone()
    }
}

/// Mutable state threaded through repeated `process` calls. Held behind a
/// `Mutex` so a `Job` can live as a shared `Arc<Job>` handle in the queue
///
/// while still allowing the worker holding it to advance its state.
struct JobMutable {
    status: JobStatus,
    /// Number of times `process` has run. `sign` uses this to tell the
    /// dispatcher's inline call (always deferred) apart from a worker's
    /// call on the dequeued job (expected to reach a terminal status).
    attempts: u32,
}

/// A queued unit of work with an assigned id.
pub struct Job {
    pub id: u32,
    pub kind: String,
    pub payload: Value,
    mutable: Mutex<JobMutable>,
}

impl Job {
    pub fn new(id: u32, kind: impl Into<String>, payload: Value) -> Self {
        Job {
            id,
            kind: kind.into(),
            payload,
            mutable: Mutex::new(JobMutable { status: JobStatus::Scheduled, attempts: 0 }),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.mutable.lock().unwrap().status
    }

    /// The original request shape, for the `list` command.
    pub fn to_json(&self) -> Value {
        json!({ "cmd": self.kind, "payload": self.payload })
    }

    /// Performs (or advances) the job's work, following the state
    /// discipline workers and the dispatcher rely on.
    pub fn process(&self, ctx: &JobContext) -> (JobStatus, Value) {
        let attempts = {
            let mut m = self.mutable.lock().unwrap();
            m.attempts += 1;
            m.attempts
        };
        let (status, payload) = match self.kind.as_str() {
            "ping" => (JobStatus::Immediate, json!({ "pong": true })),
            "sign" => self.process_sign(ctx, attempts),
            "config_button" => Self::process_config(ctx, "which_button", |which, bytes| {
                Msg::ConfigButton { which, payload: bytes }
            }, &self.payload),
            "config_pedal" => Self::process_config(ctx, "which_pedal", |which, bytes| {
                Msg::ConfigPedal { which, payload: bytes }
            }, &self.payload),
            "config_xlrm8r" => Self::process_config(ctx, "which_xlrm8r", |which, bytes| {
                Msg::ConfigXlrm8r { which, payload: bytes }
            }, &self.payload),
            "set_tempo" => Self::process_set_tempo(ctx, &self.payload),
            other => (
                JobStatus::Error,
                HubError::UnknownCommand(other.to_string()).to_json(),
            ),
        };
        self.mutable.lock().unwrap().status = status;
        (status, payload)
    }

    /// The `sign` job is always `Scheduled` the first time it is seen by
    /// the dispatcher (the real work always waits for the worker), and
    /// terminal (`Immediate` or `Error`) once a worker dequeues and
    /// re-processes it.
    fn process_sign(&self, ctx: &JobContext, attempts: u32) -> (JobStatus, Value) {
        let Some(hex) = self.payload.get("data").and_then(Value::as_str) else {
            return (
                JobStatus::Error,
                HubError::BadRequest("sign requires a \"data\" hex string".to_string()).to_json(),
            );
        };
        // First pass (called inline by the dispatcher, job not yet queued):
        // always defer to a worker, which holds the authoritative dongle
        // handle.
        if attempts <= 1 {
            return (JobStatus::Scheduled, json!({ "data": hex }));
        }
        let Some(bytes) = decode_hex(hex) else {
            return (JobStatus::Error, HubError::InvalidHex(hex.to_string()).to_json());
        };
        match ctx.dongle() {
            None => (JobStatus::Error, HubError::DongleRequired.to_json()),
            Some(dongle) => match dongle.sign(&bytes) {
                Ok(sig) => (JobStatus::Immediate, json!({ "signature": encode_hex(&sig) })),
                Err(e) => (JobStatus::Error, e.to_json()),
            },
        }
    }

    fn process_config(
        ctx: &JobContext,
        which_field: &str,
        build: impl Fn(u8, Vec<u8>) -> Msg,
        payload: &Value,
    ) -> (JobStatus, Value) {
        let Some(which) = payload.get(which_field).and_then(Value::as_u64) else {
            return (
                JobStatus::Error,
                HubError::BadRequest(format!("missing \"{which_field}\"")).to_json(),
            );
        };
        let Some(hex) = payload.get("payload").and_then(Value::as_str) else {
            return (
                JobStatus::Error,
                HubError::BadRequest("missing \"payload\" hex string".to_string()).to_json(),
            );
        };
        let Some(bytes) = decode_hex(hex) else {
            return (JobStatus::Error, HubError::InvalidHex(hex.to_string()).to_json());
        };
        ctx.spi_in.push_back(build(which as u8, bytes));
        (JobStatus::Immediate, json!({ "queued_to": "spi" }))
    }

    fn process_set_tempo(ctx: &JobContext, payload: &Value) -> (JobStatus, Value) {
        let Some(bpm) = payload.get("bpm").and_then(Value::as_f64) else {
            return (
                JobStatus::Error,
                HubError::BadRequest("missing \"bpm\"".to_string()).to_json(),
            );
        };
        if !(1.0..=999.0).contains(&bpm) {
            return (
                JobStatus::Error,
                HubError::InvalidParameter("bpm out of range".to_string()).to_json(),
            );
        }
        let tempo = Msg::Tempo(bpm as f32);
        ctx.spi_in.push_back(tempo.clone());
        ctx.osc_in.push_back(tempo);
        (JobStatus::Immediate, json!({ "bpm": bpm }))
    }
}

pub fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysSigns;
    impl DongleCapability for AlwaysSigns {
        fn sign(&self, data: &[u8]) -> Result<Vec<u8>, HubError> {
            Ok(data.iter().rev().copied().collect())
        }
        fn should_reboot(&self) -> bool {
            false
        }
        fn reopen(&self) -> Result<(), HubError> {
            Ok(())
        }
    }

    fn ctx() -> JobContext {
        JobContext::new(Arc::new(LockedQueue::new()), Arc::new(LockedQueue::new()))
    }

    #[test]
    fn ping_job_completes_immediately() {
        let c = ctx();
        let job = Job::new(1, "ping", Value::Null);
        let (status, payload) = job.process(&c);
        assert_eq!(status, JobStatus::Immediate);
        assert_eq!(payload, json!({"pong": true}));
    }

    #[test]
    fn sign_job_is_scheduled_on_first_call_without_dongle() {
        let c = ctx();
        let job = Job::new(1, "sign", json!({"data": "deadbeef"}));
        let (status, _) = job.process(&c);
        assert_eq!(status, JobStatus::Scheduled);
    }

    #[test]
    fn sign_job_errors_when_dongle_absent_on_retry() {
        let c = ctx();
        let job = Job::new(1, "sign", json!({"data": "deadbeef"}));
        job.process(&c); // dispatcher's inline call: always Scheduled
        let (status, payload) = job.process(&c); // worker's call on the dequeued job
        assert_eq!(status, JobStatus::Error);
        assert_eq!(payload["error"], "DongleRequired");
    }

    #[test]
    fn sign_job_succeeds_once_dongle_present() {
        let c = ctx();
        c.set_dongle(Some(Arc::new(AlwaysSigns)));
        let job = Job::new(1, "sign", json!({"data": "deadbeef"}));
        job.process(&c);
        let (status, payload) = job.process(&c);
        assert_eq!(status, JobStatus::Immediate);
        assert_eq!(payload["signature"], "efbeadde");
    }

    #[test]
    fn config_button_pushes_spi_message() {
        let c = ctx();
        let job = Job::new(2, "config_button", json!({"which_button": 3, "payload": "0102"}));
        let (status, _) = job.process(&c);
        assert_eq!(status, JobStatus::Immediate);
        let head = c.spi_in.front_blocking(None).unwrap();
        assert_eq!(*head, Msg::ConfigButton { which: 3, payload: vec![1, 2] });
    }

    #[test]
    fn set_tempo_rejects_out_of_range_bpm() {
        let c = ctx();
        let job = Job::new(3, "set_tempo", json!({"bpm": 5000.0}));
        let (status, _) = job.process(&c);
        assert_eq!(status, JobStatus::Error);
    }

    #[test]
    fn set_tempo_pushes_to_both_spi_and_osc() {
        let c = ctx();
        let job = Job::new(3, "set_tempo", json!({"bpm": 120.0}));
        job.process(&c);
        assert_eq!(*c.spi_in.front_blocking(None).unwrap(), Msg::Tempo(120.0));
        assert_eq!(*c.osc_in.front_blocking(None).unwrap(), Msg::Tempo(120.0));
    }

    #[test]
    fn hex_roundtrip() {
        let bytes = vec![0xDE, 0xAD, 0xBE, 0xEF];
        assert_eq!(decode_hex(&encode_hex(&bytes)).unwrap(), bytes);
    }
}
