//! NPU state and memory-bounded admission control.
//!
//! NPUs live in a flat arena ([`Cluster`]) addressed by [`NpuId`]. Each
//! server owns a contiguous slice of the arena, so `(server, local)` maps to
//! a global slot with one addition and no hashing.

use crate::request::{NpuId, PendingRequest, RequestId, RunningTask};
use crate::scenario::{Scenario, Server};
use serde::{Deserialize, Serialize};

/// A single memory-budgeted processing unit.
#[derive(Debug, Clone)]
pub struct Npu {
    pub id: NpuId,
    /// 0-based owning server index.
    pub server: usize,
    /// 0-based index within the server.
    pub local: usize,
    pub memory_limit: u64,
    pub used_memory: u64,
    /// Admitted-by-arrival requests not yet running.
    pub queue: Vec<PendingRequest>,
    pub running: Vec<RunningTask>,
    // --- Counters ---
    /// Highest `used_memory` ever observed.
    pub peak_memory: u64,
    /// Sum of inference times of every admitted task.
    pub busy_time_ms: u64,
    pub tasks_served: u64,
}

impl Npu {
    pub fn new(id: NpuId, server: usize, local: usize, memory_limit: u64) -> Self {
        Self {
            id,
            server,
            local,
            memory_limit,
            used_memory: 0,
            queue: Vec::new(),
            running: Vec::new(),
            peak_memory: 0,
            busy_time_ms: 0,
            tasks_served: 0,
        }
    }

    pub fn free_memory(&self) -> u64 {
        self.memory_limit - self.used_memory
    }

    pub fn fits(&self, memory: u64) -> bool {
        memory <= self.free_memory()
    }

    pub fn enqueue(&mut self, request: PendingRequest) {
        self.queue.push(request);
    }

    /// Admit every queued request that fits, scanning in
    /// `(arrival_time, user_id)` order.
    ///
    /// A request that does not fit is skipped and later requests are still
    /// considered (first-fit, not strict FIFO). This reproduces the contest
    /// grader's rule as-is; it was not derived from a queueing policy.
    pub fn admit(&mut self, now_ms: u64, server: &Server) -> Vec<RunningTask> {
        self.queue
            .sort_by(|a, b| (a.arrival_time_ms, a.user_id).cmp(&(b.arrival_time_ms, b.user_id)));

        let mut admitted = Vec::new();
        let mut waiting = Vec::with_capacity(self.queue.len());
        for pending in std::mem::take(&mut self.queue) {
            if !self.fits(pending.memory) {
                waiting.push(pending);
                continue;
            }
            self.reserve(pending.memory);
            let inference_ms = server.inference_time_ms(pending.batch);
            let task = RunningTask {
                request: pending.id,
                batch: pending.batch,
                start_ms: now_ms,
                finish_ms: now_ms + inference_ms,
                memory: pending.memory,
            };
            self.busy_time_ms += task.duration_ms();
            self.tasks_served += 1;
            self.running.push(task.clone());
            admitted.push(task);
        }
        self.queue = waiting;
        admitted
    }

    /// Remove a finished task and release its memory.
    pub fn complete(&mut self, request: RequestId) -> Option<RunningTask> {
        let pos = self.running.iter().position(|t| t.request == request)?;
        let task = self.running.swap_remove(pos);
        self.used_memory -= task.memory;
        Some(task)
    }

    fn reserve(&mut self, memory: u64) {
        debug_assert!(
            self.fits(memory),
            "NPU {:?} over-committed: used={} + {} > limit={}",
            self.id,
            self.used_memory,
            memory,
            self.memory_limit,
        );
        self.used_memory += memory;
        self.peak_memory = self.peak_memory.max(self.used_memory);
    }

    pub fn snapshot(&self) -> NpuSnapshot {
        NpuSnapshot {
            npu: self.id.0,
            server_id: self.server + 1,
            npu_id: self.local + 1,
            used_memory: self.used_memory,
            max_memory: self.memory_limit,
            queue_size: self.queue.len(),
            running_tasks: self.running.len(),
        }
    }
}

/// Read-only view of one NPU's instantaneous state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpuSnapshot {
    /// Global arena index.
    pub npu: usize,
    /// 1-based server id.
    pub server_id: usize,
    /// 1-based NPU id within its server.
    pub npu_id: usize,
    pub used_memory: u64,
    pub max_memory: u64,
    pub queue_size: usize,
    pub running_tasks: usize,
}

/// Flat arena of every NPU in the cluster.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub npus: Vec<Npu>,
    /// First arena slot of each server.
    offsets: Vec<usize>,
}

impl Cluster {
    pub fn new(scenario: &Scenario) -> Self {
        let mut npus = Vec::with_capacity(scenario.npu_count());
        let mut offsets = Vec::with_capacity(scenario.servers.len());
        for (server_idx, server) in scenario.servers.iter().enumerate() {
            offsets.push(npus.len());
            for local in 0..server.npu_count as usize {
                let id = NpuId(npus.len());
                npus.push(Npu::new(id, server_idx, local, server.memory));
            }
        }
        Self { npus, offsets }
    }

    /// Arena slot of NPU `local` on server `server` (both 0-based).
    pub fn npu_id(&self, server: usize, local: usize) -> NpuId {
        NpuId(self.offsets[server] + local)
    }

    pub fn get(&self, id: NpuId) -> &Npu {
        &self.npus[id.0]
    }

    pub fn get_mut(&mut self, id: NpuId) -> &mut Npu {
        &mut self.npus[id.0]
    }

    pub fn len(&self) -> usize {
        self.npus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.npus.is_empty()
    }
}
