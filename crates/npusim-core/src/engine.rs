//! Discrete-event simulation engine.
//!
//! The engine keeps a priority queue of [`SimEvent`]s keyed by
//! `(time, phase, sequence)` and jumps straight from one populated tick to
//! the next. Within a tick every event is drained in phase order
//! (completion, send, arrival), then every NPU touched by a completion or
//! an arrival runs admission, then the tick is logged. Completions therefore
//! always free memory before same-tick admissions look at it.
//!
//! Runtime rule violations are fail-fast: the first one aborts the run.

use crate::clock::SimClock;
use crate::config::LimitsSection;
use crate::log_sink::{ResourceLogEntry, ResourceLogSink};
use crate::npu::Cluster;
use crate::request::{NpuId, PendingRequest, RequestId};
use crate::scenario::Scenario;
use crate::submission::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BinaryHeap};
use thiserror::Error;

/// Runtime failures. Any of them aborts the whole evaluation.
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("User {user} req {request}: sent at {send_time_ms}, but the previous request only allows sending from {earliest_ms}")]
    InvalidUserSendTime {
        user: u32,
        request: usize,
        send_time_ms: u64,
        earliest_ms: u64,
    },
    #[error("Simulation exceeded the {ceiling_ms}ms limit with {unfinished} user(s) unfinished (next event: {next_event_ms:?})")]
    SimulationTimeout {
        ceiling_ms: u64,
        next_event_ms: Option<u64>,
        unfinished: usize,
    },
    #[error("Failed to write resource log: {0}")]
    LogSink(#[from] std::io::Error),
}

impl SimulationError {
    /// Stable rule name.
    pub fn kind(&self) -> &'static str {
        match self {
            SimulationError::InvalidUserSendTime { .. } => "InvalidUserSendTime",
            SimulationError::SimulationTimeout { .. } => "SimulationTimeout",
            SimulationError::LogSink(_) => "LogSink",
        }
    }
}

/// Events in the discrete-event simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// A running task reaches its finish time.
    RequestComplete { npu: NpuId, request: RequestId },
    /// A user sends a request at its declared time.
    RequestSend(RequestId),
    /// A request reaches its target NPU's queue.
    RequestArrival(RequestId),
}

impl SimEvent {
    /// Intra-tick ordering: lower phases are handled first.
    fn phase(&self) -> u8 {
        match self {
            SimEvent::RequestComplete { .. } => 0,
            SimEvent::RequestSend(_) => 1,
            SimEvent::RequestArrival(_) => 2,
        }
    }
}

/// A timestamped event for the priority queue.
#[derive(Debug, Clone)]
struct TimedEvent {
    time_ms: u64,
    phase: u8,
    sequence: u64,
    event: SimEvent,
}

impl PartialEq for TimedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TimedEvent {}

impl PartialOrd for TimedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; we want min-heap
        other.key().cmp(&self.key())
    }
}

impl TimedEvent {
    fn key(&self) -> (u64, u8, u64) {
        (self.time_ms, self.phase, self.sequence)
    }
}

/// Mutable per-user state during a run.
#[derive(Debug, Clone)]
struct UserProgress {
    processed: u64,
    required: u64,
    deadline_ms: u64,
    last_npu: Option<NpuId>,
    migrations: u64,
    finish_time_ms: Option<u64>,
    /// Runtime send gate: previous arrival + 1.
    next_allowed_send_ms: u64,
}

/// Final state of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOutcome {
    pub user_id: u32,
    pub finish_time_ms: u64,
    pub processed: u64,
    /// NPU changes between consecutive sends.
    pub migrations: u64,
}

/// When a request actually ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTimeline {
    pub request: RequestId,
    pub start_ms: u64,
    pub finish_ms: u64,
}

/// Lifetime counters of one NPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpuUsage {
    pub server_id: usize,
    pub npu_id: usize,
    pub busy_time_ms: u64,
    pub tasks_served: u64,
    pub peak_memory: u64,
    pub max_memory: u64,
}

/// Everything a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    /// Tick at which the last sample completed.
    pub total_time_ms: u64,
    pub users: Vec<UserOutcome>,
    /// Indexed by [`RequestId`].
    pub requests: Vec<RequestTimeline>,
    pub npus: Vec<NpuUsage>,
    pub events_processed: u64,
}

/// The main simulation engine.
pub struct SimulationEngine<'a> {
    scenario: &'a Scenario,
    schedule: &'a Schedule,
    /// Virtual clock.
    pub clock: SimClock,
    /// Event queue (min-heap by time, then phase).
    event_queue: BinaryHeap<TimedEvent>,
    /// Sequence counter for tie-breaking.
    sequence: u64,
    /// NPU arena.
    pub cluster: Cluster,
    users: Vec<UserProgress>,
    /// `(start, finish)` per request, filled at admission.
    timelines: Vec<Option<(u64, u64)>>,
    sink: &'a mut dyn ResourceLogSink,
    cumulative_batch: u64,
    users_on_time: u32,
    users_late: u32,
    unfinished: usize,
    /// Total events processed.
    pub events_processed: u64,
}

impl<'a> SimulationEngine<'a> {
    /// Build an engine with every declared send already queued.
    pub fn new(
        scenario: &'a Scenario,
        schedule: &'a Schedule,
        limits: &LimitsSection,
        sink: &'a mut dyn ResourceLogSink,
    ) -> Self {
        let users: Vec<UserProgress> = scenario
            .users
            .iter()
            .map(|u| UserProgress {
                processed: 0,
                required: u.samples,
                deadline_ms: u.deadline_ms,
                last_npu: None,
                migrations: 0,
                finish_time_ms: None,
                next_allowed_send_ms: u.start_ms,
            })
            .collect();

        let mut engine = Self {
            scenario,
            schedule,
            clock: SimClock::new(limits.tick_ceiling_ms),
            event_queue: BinaryHeap::with_capacity(schedule.requests.len() * 2),
            sequence: 0,
            cluster: Cluster::new(scenario),
            unfinished: users.len(),
            users,
            timelines: vec![None; schedule.requests.len()],
            sink,
            cumulative_batch: 0,
            users_on_time: 0,
            users_late: 0,
            events_processed: 0,
        };
        for req in &schedule.requests {
            engine.schedule_event(req.send_time_ms, SimEvent::RequestSend(req.id));
        }
        engine
    }

    /// Schedule an event at a given time.
    pub fn schedule_event(&mut self, time_ms: u64, event: SimEvent) {
        self.event_queue.push(TimedEvent {
            time_ms,
            phase: event.phase(),
            sequence: self.sequence,
            event,
        });
        self.sequence += 1;
    }

    /// Run until every user has all samples processed, or a rule breaks.
    pub fn run(mut self) -> Result<SimulationOutcome, SimulationError> {
        tracing::info!(
            requests = self.schedule.requests.len(),
            npus = self.cluster.len(),
            samples = self.scenario.total_samples(),
            ceiling_ms = self.clock.ceiling_ms(),
            "simulation started"
        );

        while self.unfinished > 0 {
            let Some(next_ms) = self.event_queue.peek().map(|e| e.time_ms) else {
                return Err(self.timeout(None));
            };
            if !self.clock.advance_to_ms(next_ms) {
                return Err(self.timeout(Some(next_ms)));
            }
            self.process_tick(next_ms)?;
        }

        self.sink.finish()?;
        let total_time_ms = self.clock.now_ms();
        tracing::info!(
            total_time_ms,
            events = self.events_processed,
            "simulation finished"
        );
        Ok(self.into_outcome(total_time_ms))
    }

    fn timeout(&self, next_event_ms: Option<u64>) -> SimulationError {
        tracing::warn!(
            unfinished = self.unfinished,
            ?next_event_ms,
            "simulation timed out"
        );
        SimulationError::SimulationTimeout {
            ceiling_ms: self.clock.ceiling_ms(),
            next_event_ms,
            unfinished: self.unfinished,
        }
    }

    /// Drain every event at `now`, run admission, and log touched NPUs.
    fn process_tick(&mut self, now: u64) -> Result<(), SimulationError> {
        // NPU -> samples completed on it this tick.
        let mut touched: BTreeMap<NpuId, u64> = BTreeMap::new();

        while self.event_queue.peek().is_some_and(|e| e.time_ms == now) {
            let Some(timed) = self.event_queue.pop() else {
                break;
            };
            self.events_processed += 1;
            match timed.event {
                SimEvent::RequestComplete { npu, request } => {
                    let batch = self.handle_complete(now, npu, request);
                    *touched.entry(npu).or_insert(0) += batch;
                }
                SimEvent::RequestSend(request) => self.handle_send(now, request)?,
                SimEvent::RequestArrival(request) => {
                    let npu = self.handle_arrival(request);
                    touched.entry(npu).or_insert(0);
                }
            }
        }

        for &npu in touched.keys() {
            self.admit(now, npu);
        }

        for (&npu, &completed_batch) in &touched {
            let entry = ResourceLogEntry {
                time_ms: now,
                npu: self.cluster.get(npu).snapshot(),
                completed_batch,
                cumulative_batch: self.cumulative_batch,
                users_on_time: self.users_on_time,
                users_late: self.users_late,
            };
            self.sink.record(&entry)?;
        }
        Ok(())
    }

    /// Release the task's memory and credit its user. Returns the batch size.
    fn handle_complete(&mut self, now: u64, npu: NpuId, request: RequestId) -> u64 {
        let Some(task) = self.cluster.get_mut(npu).complete(request) else {
            tracing::warn!(npu = npu.0, request = request.0, "completion for unknown task");
            return 0;
        };
        let req = self.schedule.request(request);
        tracing::debug!(
            time_ms = now,
            npu = npu.0,
            request = request.0,
            user = req.user_id,
            batch = task.batch,
            "request completed"
        );

        self.cumulative_batch += task.batch;
        let progress = &mut self.users[req.user];
        progress.processed += task.batch;
        if progress.finish_time_ms.is_none() && progress.processed >= progress.required {
            progress.finish_time_ms = Some(now);
            self.unfinished -= 1;
            if now <= progress.deadline_ms {
                self.users_on_time += 1;
            } else {
                self.users_late += 1;
            }
            tracing::debug!(time_ms = now, user = req.user_id, "user finished");
        }
        task.batch
    }

    /// Apply the runtime send gate and put the request on the wire.
    fn handle_send(&mut self, now: u64, request: RequestId) -> Result<(), SimulationError> {
        let req = self.schedule.request(request);
        let progress = &mut self.users[req.user];
        if req.send_time_ms < progress.next_allowed_send_ms {
            return Err(SimulationError::InvalidUserSendTime {
                user: req.user_id,
                request: req.seq + 1,
                send_time_ms: req.send_time_ms,
                earliest_ms: progress.next_allowed_send_ms,
            });
        }
        progress.next_allowed_send_ms = req.arrival_time_ms.saturating_add(1);
        if progress.last_npu.is_some_and(|last| last != req.npu) {
            progress.migrations += 1;
        }
        progress.last_npu = Some(req.npu);

        let arrival_ms = req.arrival_time_ms;
        tracing::trace!(time_ms = now, request = request.0, arrival_ms, "request sent");
        self.schedule_event(arrival_ms, SimEvent::RequestArrival(request));
        Ok(())
    }

    fn handle_arrival(&mut self, request: RequestId) -> NpuId {
        let req = self.schedule.request(request);
        self.cluster.get_mut(req.npu).enqueue(PendingRequest::from(req));
        req.npu
    }

    fn admit(&mut self, now: u64, npu: NpuId) {
        let scenario = self.scenario;
        let slot = self.cluster.get_mut(npu);
        let server = &scenario.servers[slot.server];
        let admitted = slot.admit(now, server);
        for task in admitted {
            tracing::debug!(
                time_ms = now,
                npu = npu.0,
                request = task.request.0,
                finish_ms = task.finish_ms,
                "request admitted"
            );
            self.timelines[task.request.0] = Some((task.start_ms, task.finish_ms));
            self.schedule_event(
                task.finish_ms,
                SimEvent::RequestComplete {
                    npu,
                    request: task.request,
                },
            );
        }
    }

    fn into_outcome(self, total_time_ms: u64) -> SimulationOutcome {
        let users = self
            .scenario
            .users
            .iter()
            .zip(&self.users)
            .map(|(user, progress)| UserOutcome {
                user_id: user.id,
                finish_time_ms: progress.finish_time_ms.unwrap_or(total_time_ms),
                processed: progress.processed,
                migrations: progress.migrations,
            })
            .collect();
        let requests = self
            .timelines
            .iter()
            .enumerate()
            .filter_map(|(idx, t)| {
                t.map(|(start_ms, finish_ms)| RequestTimeline {
                    request: RequestId(idx),
                    start_ms,
                    finish_ms,
                })
            })
            .collect();
        let npus = self
            .cluster
            .npus
            .iter()
            .map(|n| NpuUsage {
                server_id: n.server + 1,
                npu_id: n.local + 1,
                busy_time_ms: n.busy_time_ms,
                tasks_served: n.tasks_served,
                peak_memory: n.peak_memory,
                max_memory: n.memory_limit,
            })
            .collect();
        SimulationOutcome {
            total_time_ms,
            users,
            requests,
            npus,
            events_processed: self.events_processed,
        }
    }
}
