//! Full grading report: score plus per-request and per-NPU detail.

use crate::engine::SimulationOutcome;
use crate::scenario::Scenario;
use crate::scorer::{self, ScoreReport};
use crate::submission::Schedule;
use serde::{Deserialize, Serialize};

/// How one request travelled through the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestReport {
    pub user_id: u32,
    /// 1-based position in the user's schedule.
    pub seq: usize,
    pub server_id: usize,
    pub npu_id: usize,
    pub batch: u64,
    pub send_time_ms: u64,
    pub arrival_time_ms: u64,
    pub start_ms: u64,
    pub finish_ms: u64,
}

impl RequestReport {
    pub fn duration_ms(&self) -> u64 {
        self.finish_ms - self.start_ms
    }

    pub fn queue_wait_ms(&self) -> u64 {
        self.start_ms - self.arrival_time_ms
    }
}

/// Busy-time accounting for one NPU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpuUtilization {
    pub server_id: usize,
    pub npu_id: usize,
    pub busy_time_ms: u64,
    pub tasks_served: u64,
    pub peak_memory: u64,
    pub max_memory: u64,
    /// Busy time over total simulation time, in percent.
    pub utilization_pct: f64,
}

/// Everything produced by a successful grading run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeReport {
    pub score: ScoreReport,
    pub events_processed: u64,
    pub requests: Vec<RequestReport>,
    pub npus: Vec<NpuUtilization>,
}

impl GradeReport {
    pub fn build(scenario: &Scenario, schedule: &Schedule, outcome: &SimulationOutcome) -> Self {
        let score = scorer::score(scenario, schedule, outcome);

        let requests = outcome
            .requests
            .iter()
            .map(|t| {
                let req = schedule.request(t.request);
                let (server_id, npu_id) = req.target();
                RequestReport {
                    user_id: req.user_id,
                    seq: req.seq + 1,
                    server_id,
                    npu_id,
                    batch: req.batch,
                    send_time_ms: req.send_time_ms,
                    arrival_time_ms: req.arrival_time_ms,
                    start_ms: t.start_ms,
                    finish_ms: t.finish_ms,
                }
            })
            .collect();

        let total = outcome.total_time_ms;
        let npus = outcome
            .npus
            .iter()
            .map(|n| NpuUtilization {
                server_id: n.server_id,
                npu_id: n.npu_id,
                busy_time_ms: n.busy_time_ms,
                tasks_served: n.tasks_served,
                peak_memory: n.peak_memory,
                max_memory: n.max_memory,
                utilization_pct: if total > 0 {
                    n.busy_time_ms as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
            })
            .collect();

        Self {
            score,
            events_processed: outcome.events_processed,
            requests,
            npus,
        }
    }
}

/// Per-request and per-NPU tables.
pub fn format_detailed(report: &GradeReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{:=^90}\n", "  Request Timeline  "));
    out.push_str(&format!(
        "  {:<6} {:<5} {:>8} {:>9} {:>7} {:>9} {:>8} {:>8} {:>9} {:>6}\n",
        "User", "Req", "Send", "Srv/NPU", "Batch", "Arrival", "Start", "End", "Duration", "Wait"
    ));
    out.push_str(&format!("{:-<90}\n", ""));
    for r in &report.requests {
        out.push_str(&format!(
            "  {:<6} {:<5} {:>8} {:>9} {:>7} {:>9} {:>8} {:>8} {:>9} {:>6}\n",
            r.user_id,
            r.seq,
            r.send_time_ms,
            format!("{}/{}", r.server_id, r.npu_id),
            r.batch,
            r.arrival_time_ms,
            r.start_ms,
            r.finish_ms,
            r.duration_ms(),
            r.queue_wait_ms(),
        ));
    }

    out.push_str(&format!("\n{:=^90}\n", "  NPU Utilization  "));
    out.push_str(&format!(
        "  Total Simulation Time: {} ms\n",
        report.score.total_simulation_time_ms
    ));
    out.push_str(&format!(
        "  {:<8} {:<5} {:>12} {:>8} {:>14} {:>10}\n",
        "Server", "NPU", "Busy (ms)", "Tasks", "Peak/Max Mem", "Util (%)"
    ));
    out.push_str(&format!("{:-<90}\n", ""));
    for n in &report.npus {
        out.push_str(&format!(
            "  {:<8} {:<5} {:>12} {:>8} {:>14} {:>10.2}\n",
            n.server_id,
            n.npu_id,
            n.busy_time_ms,
            n.tasks_served,
            format!("{}/{}", n.peak_memory, n.max_memory),
            n.utilization_pct,
        ));
    }
    out.push_str(&format!("{:=<90}\n", ""));
    out
}
