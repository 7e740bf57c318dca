//! Host telemetry sampling.
//!
//! Used by the controller to publish its own node and by the agent for
//! `stats_report`.

use std::sync::Arc;
use std::time::Duration;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

use crate::hub::Fanout;
use crate::registry::{NodeSource, NodeUpdate, Registry, CONTROLLER_NODE_ID};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One CPU/memory reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HostSample {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub ram_used_gb: f64,
    pub ram_total_gb: f64,
}

impl HostSample {
    fn from_memory(cpu_percent: f32, total_bytes: u64, available_bytes: u64) -> Self {
        let used = total_bytes.saturating_sub(available_bytes);
        let ram_percent = if total_bytes == 0 {
            0.0
        } else {
            used as f64 / total_bytes as f64 * 100.0
        };
        Self {
            cpu_percent: round(cpu_percent as f64, 1),
            ram_percent: round(ram_percent, 1),
            ram_used_gb: round(used as f64 / BYTES_PER_GB, 2),
            ram_total_gb: round(total_bytes as f64 / BYTES_PER_GB, 2),
        }
    }

    pub fn to_update(self) -> NodeUpdate {
        NodeUpdate::new()
            .ram_total_gb(self.ram_total_gb)
            .usage(self.cpu_percent, self.ram_percent, self.ram_used_gb)
    }
}

/// Keeps a `System` between samples so CPU usage is measured over the
/// interval since the previous call.
pub struct Sampler {
    system: System,
}

impl Sampler {
    pub fn new() -> Self {
        let mut system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::new().with_cpu_usage())
                .with_memory(MemoryRefreshKind::new().with_ram()),
        );
        system.refresh_cpu();
        system.refresh_memory();
        Self { system }
    }

    pub fn sample(&mut self) -> HostSample {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        HostSample::from_memory(
            self.system.global_cpu_info().cpu_usage(),
            self.system.total_memory(),
            self.system.available_memory(),
        )
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

/// This machine's host name, if the OS reports one.
pub fn host_name() -> Option<String> {
    System::host_name().filter(|name| !name.trim().is_empty())
}

/// Publish the controller's own telemetry every `period`, forever.
pub async fn run_sampler(registry: Arc<Registry>, fanout: Fanout, period: Duration) {
    let mut sampler = Sampler::new();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!("Sampling controller telemetry every {:?}", period);

    loop {
        ticker.tick().await;
        publish(&registry, &fanout, sampler.sample());
    }
}

fn publish(registry: &Registry, fanout: &Fanout, sample: HostSample) {
    registry.upsert(
        CONTROLLER_NODE_ID,
        sample.to_update().online(true).source(NodeSource::Controller),
    );
    fanout.broadcast_snapshot(None);
}

fn round(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
