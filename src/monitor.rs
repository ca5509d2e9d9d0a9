use crate::config::{BootstrapMode, MonitorConfig};
use crate::diff::{self, ChangeEvent};
use crate::record;
use crate::render;
use crate::sink::Output;
use crate::snapshot::Snapshot;
use crate::store::RecordStore;
use chrono::Local;
use crossbeam_channel::{Receiver, RecvTimeoutError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Diffing,
    Emitting,
    Sleeping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Fetch failed; nothing changed.
    StoreUnavailable,
    /// First successful fetch under `SkipExisting`: history recorded, nothing printed.
    Seeded { tracked: usize },
    Emitted { reported: usize, anomalies: usize },
}

pub struct Monitor<S> {
    config: MonitorConfig,
    store: S,
    output: Output,
    snapshot: Snapshot,
    phase: Phase,
    bootstrapped: bool,
}

impl<S: RecordStore> Monitor<S> {
    pub fn new(config: MonitorConfig, store: S, output: Output) -> Self {
        Self {
            config,
            store,
            output,
            snapshot: Snapshot::new(),
            phase: Phase::Idle,
            bootstrapped: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// One fetch → diff → render → emit pass. Every outcome leaves the
    /// monitor in [`Phase::Sleeping`], the only point where it may be stopped.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let outcome = self.poll();
        self.phase = Phase::Sleeping;
        outcome
    }

    fn poll(&mut self) -> CycleOutcome {
        self.phase = Phase::Fetching;
        let rows = match self.store.fetch_records(&self.config.key_prefix) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    cause = ?std::error::Error::source(&e),
                    "fetch failed, retrying next cycle"
                );
                return CycleOutcome::StoreUnavailable;
            }
        };
        tracing::debug!(rows = rows.len(), "fetched");

        self.phase = Phase::Diffing;
        let prefix = self.config.key_prefix.as_str();
        let parsed = rows.into_iter().map(|row| {
            let _span = tracing::info_span!("record", key = %row.key).entered();
            let fallback_id = row.key.strip_prefix(prefix).unwrap_or(&row.key);
            let result = record::parse(&row.value, fallback_id);
            (row.key, result)
        });
        let previous = std::mem::take(&mut self.snapshot);
        let changes = diff::diff(previous, parsed);
        self.snapshot = changes.snapshot;
        let anomalies = changes.anomalies.len();

        if !self.bootstrapped {
            self.bootstrapped = true;
            if self.config.bootstrap_mode == BootstrapMode::SkipExisting {
                let tracked = self.snapshot.len();
                tracing::info!(tracked, "existing conversations marked as seen");
                return CycleOutcome::Seeded { tracked };
            }
        }

        self.phase = Phase::Emitting;
        let mut reported = 0;
        for event in changes.events.iter().filter(|e| e.is_reportable()) {
            let block = format!("{}{}", banner(event), render::render(event));
            self.output.emit(&block);
            reported += 1;
        }
        tracing::debug!(reported, anomalies, tracked = self.snapshot.len(), "cycle done");
        CycleOutcome::Emitted {
            reported,
            anomalies,
        }
    }

    /// Poll until `shutdown` yields a message or its sender goes away, then
    /// flush and close the output. Cancellation is only observed between
    /// cycles.
    pub fn run(mut self, shutdown: &Receiver<()>) -> Snapshot {
        tracing::info!(
            prefix = %self.config.key_prefix,
            interval = ?self.config.poll_interval,
            bootstrap = self.config.bootstrap_mode.as_str(),
            debug = self.config.debug_logging,
            "monitoring started"
        );
        loop {
            self.run_cycle();
            match shutdown.recv_timeout(self.config.poll_interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::info!("monitoring stopped");
        self.finish()
    }

    /// Write the stop banner, close the output and hand back the final snapshot.
    pub fn finish(mut self) -> Snapshot {
        self.output.emit(&format!(
            "\n[{}] Monitoring stopped.\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        self.output.close();
        self.snapshot
    }
}

fn banner(event: &ChangeEvent) -> String {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S");
    match event {
        ChangeEvent::NewConversation { key, .. } => {
            format!("\n[{}] NEW CHAT DETECTED: {}\n", now, key)
        }
        ChangeEvent::Appended { key, .. } => format!("\n[{}] CHAT UPDATED: {}\n", now, key),
        ChangeEvent::NoChange { .. } => String::new(),
    }
}
