//! Command dispatcher (C4): parses an incoming JSON request, routes it to
//! an immediate handler or turns it into a queued [`Job`].

use crate::error::HubError;
use crate::job::{Job, JobContext, JobStatus};
use crate::queue::{LockedQueue, LockedStore};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// One entry in the static command registry. Exactly one of
/// `immediate` / `queued` is populated.
enum Handler {
    /// Answered entirely within the dispatch call.
    Immediate(fn(&Dispatcher, &Value) -> Result<Value, HubError>),
    /// Materialised as a [`Job`]; `urgent` controls `push_front` vs
    /// `push_back` when the job's first `process` call returns `Scheduled`.
    Queued { urgent: bool },
}

struct Registered {
    handler: Handler,
}

/// Routes JSON requests to handlers, mints job ids, and owns the
/// queue/store references every command needs.
pub struct Dispatcher {
    pub cmd_queue: Arc<LockedQueue<Job>>,
    pub results: Arc<LockedStore<u32, Value>>,
    pub job_ctx: Arc<JobContext>,
    next_id: AtomicU32,
}

impl Dispatcher {
    pub fn new(
        cmd_queue: Arc<LockedQueue<Job>>,
        results: Arc<LockedStore<u32, Value>>,
        job_ctx: Arc<JobContext>,
    ) -> Self {
        Dispatcher {
            cmd_queue,
            results,
            job_ctx,
            next_id: AtomicU32::new(1),
        }
    }

    fn registry(cmd: &str) -> Option<Registered> {
        match cmd {
            "echo" => Some(Registered { handler: Handler::Immediate(handle_echo) }),
            "get" => Some(Registered { handler: Handler::Immediate(handle_get) }),
            "list" => Some(Registered { handler: Handler::Immediate(handle_list) }),
            "ping" => Some(Registered { handler: Handler::Queued { urgent: true } }),
            "sign" => Some(Registered { handler: Handler::Queued { urgent: false } }),
            "config_button" | "config_pedal" | "config_xlrm8r" => {
                Some(Registered { handler: Handler::Queued { urgent: false } })
            }
            "set_tempo" => Some(Registered { handler: Handler::Queued { urgent: true } }),
            _ => None,
        }
    }

    /// Processes one JSON request, returning the JSON response to send
    /// back on the same connection.
    pub fn process(&self, request: &Value) -> Value {
        let Some(cmd) = request.get("cmd").and_then(Value::as_str) else {
            return HubError::BadRequest("missing \"cmd\"".to_string()).to_json();
        };
        let urgent_override = request
            .get("urgent")
            .and_then(Value::as_str)
            .map(|s| !s.is_empty())
            .unwrap_or(false);

        let Some(entry) = Self::registry(cmd) else {
            return HubError::UnknownCommand(cmd.to_string()).to_json();
        };

        match entry.handler {
            Handler::Immediate(f) => match f(self, request) {
                Ok(v) => v,
                Err(e) => e.to_json(),
            },
            Handler::Queued { urgent } => self.dispatch_job(cmd, request, urgent || urgent_override),
        }
    }

    fn dispatch_job(&self, cmd: &str, request: &Value, urgent: bool) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let payload = request.get("payload").cloned().unwrap_or(Value::Null);
        let job = Job::new(id, cmd, payload);
        let (status, result_payload) = job.process(&self.job_ctx);
        match status {
            JobStatus::Scheduled => {
                if urgent {
                    self.cmd_queue.push_front(job);
                } else {
                    self.cmd_queue.push_back(job);
                }
            }
            JobStatus::Immediate | JobStatus::Error => {
                self.results.insert(id, result_payload);
            }
        }
        json!({ "id": id })
    }
}

fn handle_echo(_d: &Dispatcher, req: &Value) -> Result<Value, HubError> {
    Ok(json!({ "echo": req.get("payload").cloned().unwrap_or(Value::Null) }))
}

fn handle_get(d: &Dispatcher, req: &Value) -> Result<Value, HubError> {
    let raw_id = req
        .get("id")
        .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_u64().map(|n| n.to_string())))
        .ok_or_else(|| HubError::BadRequest("missing \"id\"".to_string()))?;
    let id: u32 = raw_id
        .parse()
        .map_err(|_| HubError::BadRequest(format!("invalid id '{raw_id}'")))?;
    if id == 0 {
        return Err(HubError::BadRequest("Bad request id 0".to_string()));
    }
    if let Some(resp) = d.results.fetch(&id) {
        return Ok(json!({ "state": "done", "resp": resp }));
    }
    if let Some(pos) = d.cmd_queue.find_qorder(|job| job.id == id) {
        return Ok(json!({ "state": "enqueued", "pos": pos }));
    }
    Err(HubError::BadRequest(format!("unknown id {id}")))
}

fn handle_list(d: &Dispatcher, _req: &Value) -> Result<Value, HubError> {
    let mut requests = serde_json::Map::new();
    d.cmd_queue.for_each(|job| {
        requests.insert(job.id.to_string(), job.to_json());
    });
    let mut responses = serde_json::Map::new();
    d.results.for_each(|id, resp| {
        responses.insert(id.to_string(), resp.clone());
    });
    Ok(json!({ "requests": requests, "responses": responses }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobContext;

    fn new_dispatcher() -> Dispatcher {
        let spi_in = Arc::new(LockedQueue::new());
        let osc_in = Arc::new(LockedQueue::new());
        let cmd_queue = Arc::new(LockedQueue::new());
        let results = Arc::new(LockedStore::new());
        let job_ctx = Arc::new(JobContext::new(spi_in, osc_in));
        Dispatcher::new(cmd_queue, results, job_ctx)
    }

    #[test]
    fn ping_then_get_returns_done() {
        let d = new_dispatcher();
        let resp = d.process(&json!({"cmd": "ping"}));
        assert_eq!(resp["id"], 1);
        let get_resp = d.process(&json!({"cmd": "get", "id": "1"}));
        assert_eq!(get_resp["state"], "done");
    }

    #[test]
    fn unknown_command_reports_not_implemented() {
        let d = new_dispatcher();
        let resp = d.process(&json!({"cmd": "fluffle"}));
        assert_eq!(resp["error"], "Command 'fluffle' not implemented.");
    }

    #[test]
    fn list_reports_empty_then_a_response() {
        let d = new_dispatcher();
        let empty = d.process(&json!({"cmd": "list"}));
        assert_eq!(empty, json!({"requests": {}, "responses": {}}));
        d.process(&json!({"cmd": "ping"}));
        let after = d.process(&json!({"cmd": "list"}));
        assert!(after["responses"].as_object().unwrap().contains_key("1"));
    }

    #[test]
    fn get_of_id_zero_is_an_error() {
        let d = new_dispatcher();
        let resp = d.process(&json!({"cmd": "get", "id": "0"}));
        assert_eq!(resp["error"], "Bad request id 0");
    }

    #[test]
    fn ids_increase_monotonically_starting_at_one() {
        let d = new_dispatcher();
        let a = d.process(&json!({"cmd": "ping"}))["id"].as_u64().unwrap();
        let b = d.process(&json!({"cmd": "ping"}))["id"].as_u64().unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn sign_job_is_visible_as_enqueued_before_a_worker_drains_it() {
        let d = new_dispatcher();
        let resp = d.process(&json!({"cmd": "sign", "payload": {"data": "deadbeef"}}));
        let id = resp["id"].as_u64().unwrap();
        let get_resp = d.process(&json!({"cmd": "get", "id": id.to_string()}));
        assert_eq!(get_resp["state"], "enqueued");
    }

    #[test]
    fn set_tempo_is_urgent_and_answered_immediately() {
        let d = new_dispatcher();
        let resp = d.process(&json!({"cmd": "set_tempo", "payload": {"bpm": 120.0}}));
        let id = resp["id"].as_u64().unwrap();
        let get_resp = d.process(&json!({"cmd": "get", "id": id.to_string()}));
        assert_eq!(get_resp["state"], "done");
    }
}
