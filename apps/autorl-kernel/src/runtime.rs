// [[AUTORL]]/apps/autorl-kernel/src/runtime.rs
// Purpose: Run bookkeeping around the demo sequencer: launch, event bus, history.
// Architecture: Domain Logic Layer
// Dependencies: dashmap, tokio, chrono, uuid

use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use uuid::Uuid;

use crate::config::KernelConfig;
use crate::device::{DeviceView, GestureChannel, MockDevice};
use crate::error::KernelError;
use crate::events::{DemoEvent, EventKind, RuntimeEvent};
use crate::fleet::{DeviceFleet, DEMO_DEVICE_ID};
use crate::models::*;
use crate::observability::Metrics;
use crate::screens::{
    ScreenRegistry, SCREEN_BANKING, SCREEN_BANKING_BROKEN, SCREEN_BANKING_UPDATED,
};
use crate::sequencer::{DemoSequencer, EventSink};

const KEYSTROKE_DELAY: Duration = Duration::from_millis(40);

pub struct AutoRLRuntime {
    config: KernelConfig,
    sequencer: Arc<DemoSequencer>,
    device: Arc<MockDevice>,
    runs: DashMap<String, RunRecord>,
    /// Run that currently owns the mock device
    active_run: Mutex<Option<String>>,
    pub fleet: DeviceFleet,
    pub event_bus: broadcast::Sender<RuntimeEvent>,
    gesture_bus: broadcast::Sender<RunGesture>,
}

/// Forwards sequencer output into the run record and onto the event bus.
struct RunSink<'a> {
    runtime: &'a AutoRLRuntime,
    run_id: &'a str,
    next_seq: AtomicU64,
}

impl EventSink for RunSink<'_> {
    fn emit(&self, event: DemoEvent) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.runtime.record_event(RuntimeEvent::new(self.run_id, seq, event));
    }
}

impl AutoRLRuntime {
    pub fn new(config: KernelConfig) -> Self {
        Self::build(config, None)
    }

    /// Runtime whose sequencer drives `view` instead of the mock device.
    #[cfg(test)]
    fn with_device_view(config: KernelConfig, view: Arc<dyn DeviceView>) -> Self {
        Self::build(config, Some(view))
    }

    fn build(config: KernelConfig, view: Option<Arc<dyn DeviceView>>) -> Self {
        let screens = Arc::new(ScreenRegistry::load(&config.screens_path));
        tracing::info!("Loaded screen layouts: {:?}", screens.names());

        let device = Arc::new(
            MockDevice::new(screens).with_keystroke_delay(KEYSTROKE_DELAY.mul_f64(config.speed_factor())),
        );
        let view = view.unwrap_or_else(|| device.clone() as Arc<dyn DeviceView>);
        let gestures = GestureChannel::new(config.event_buffer);
        let sequencer = Arc::new(DemoSequencer::new(view, gestures, config.pacing()));
        let (tx, _) = broadcast::channel(config.event_buffer.max(1));
        let (gesture_tx, _) = broadcast::channel(config.event_buffer.max(1));

        AutoRLRuntime {
            config,
            sequencer,
            device,
            runs: DashMap::new(),
            active_run: Mutex::new(None),
            fleet: DeviceFleet::with_demo_devices(),
            event_bus: tx,
            gesture_bus: gesture_tx,
        }
    }

    // === EXECUTION LOGIC ===

    /// Claims the mock device and spawns the sequence. Returns the run id
    /// immediately.
    pub fn start_sequence(
        self: &Arc<Self>,
        variant: SequenceVariant,
        faults: FaultFlags,
        client_id: &str,
    ) -> Result<String, KernelError> {
        let run_id = Uuid::new_v4().to_string();

        {
            let mut active = self.active_run.lock().unwrap_or_else(PoisonError::into_inner);
            if active.is_some() || self.sequencer.is_running() {
                tracing::warn!("Rejecting {:?} sequence from {}: device busy", variant, client_id);
                return Err(KernelError::SequenceBusy);
            }
            *active = Some(run_id.clone());
        }

        self.runs.insert(
            run_id.clone(),
            RunRecord {
                run_id: run_id.clone(),
                variant,
                faults,
                client_id: client_id.to_string(),
                status: RunStatus::Running,
                events: Vec::new(),
                start_time: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
                end_time: None,
                duration_ms: None,
            },
        );

        if variant == SequenceVariant::Primary {
            self.device.show_screen(primary_screen_for(faults));
        }
        self.fleet.mark_running(DEMO_DEVICE_ID, &run_id);

        tracing::info!("Starting {:?} sequence {} for client {}", variant, run_id, client_id);

        let runtime = self.clone();
        let run_id_clone = run_id.clone();
        tokio::spawn(async move {
            let started = Instant::now();

            // The sequence runs in its own task so a panic surfaces here as a JoinError
            let worker = tokio::spawn({
                let runtime = runtime.clone();
                let run_id = run_id_clone.clone();
                async move { runtime.execute_run(&run_id, variant, faults).await }
            });

            let status = match worker.await {
                Ok(outcome) => RunStatus::from(outcome),
                Err(e) => {
                    tracing::error!("Run {} aborted: {}", run_id_clone, e);
                    runtime.record_abort(&run_id_clone);
                    RunStatus::Failed
                }
            };
            runtime.finish_run(&run_id_clone, status, started.elapsed().as_millis() as u64);
        });

        Ok(run_id)
    }

    /// Drives the sequencer for one run, tagging every gesture it dispatches
    /// with `run_id`.
    pub(crate) async fn execute_run(
        &self,
        run_id: &str,
        variant: SequenceVariant,
        faults: FaultFlags,
    ) -> SequenceOutcome {
        let sink = RunSink {
            runtime: self,
            run_id,
            next_seq: AtomicU64::new(0),
        };
        // The runtime claim makes this run the only sequencer user until it returns
        let mut gestures = self.sequencer.gestures().subscribe();

        let run = async {
            match variant {
                SequenceVariant::Primary => self.sequencer.run_primary(faults, &sink).await,
                SequenceVariant::CrossApp => self.sequencer.run_cross_app(faults, &sink).await,
            }
        };
        tokio::pin!(run);

        let mut open = true;
        let outcome = loop {
            tokio::select! {
                outcome = &mut run => break outcome,
                received = gestures.recv(), if open => match received {
                    Ok(gesture) => self.publish_gesture(run_id, gesture),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Run {} dropped {} gestures", run_id, skipped);
                    }
                    Err(RecvError::Closed) => open = false,
                },
            }
        };

        // Gestures from the final step may still be queued
        loop {
            match gestures.try_recv() {
                Ok(gesture) => self.publish_gesture(run_id, gesture),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("Run {} dropped {} gestures", run_id, skipped);
                }
                Err(_) => break,
            }
        }

        outcome
    }

    fn record_event(&self, envelope: RuntimeEvent) {
        if let Some(mut run) = self.runs.get_mut(&envelope.run_id) {
            run.events.push(envelope.clone());
        }
        // Broadcast to subscribers (WebSocket streams)
        let _ = self.event_bus.send(envelope);
    }

    fn publish_gesture(&self, run_id: &str, gesture: Gesture) {
        let _ = self.gesture_bus.send(RunGesture {
            run_id: run_id.to_string(),
            gesture,
        });
    }

    /// Appends a terminal error event to a run whose task died mid-sequence.
    fn record_abort(&self, run_id: &str) {
        let Some((seq, last)) = self.runs.get(run_id).map(|run| {
            (
                run.events.len() as u64,
                run.events.last().map(|e| e.event.timestamp()),
            )
        }) else {
            return;
        };

        let now = Utc::now();
        let timestamp = last.map_or(now, |prev| prev.max(now));
        let event = DemoEvent::new(EventKind::Error, "Sequence aborted unexpectedly", timestamp)
            .with_success(false);
        self.record_event(RuntimeEvent::new(run_id, seq, event));
    }

    fn finish_run(&self, run_id: &str, status: RunStatus, duration_ms: u64) {
        // Release the device before the final status becomes visible
        self.fleet.mark_idle(DEMO_DEVICE_ID);
        {
            let mut active = self.active_run.lock().unwrap_or_else(PoisonError::into_inner);
            if active.as_deref() == Some(run_id) {
                *active = None;
            }
        }

        if let Some(mut run) = self.runs.get_mut(run_id) {
            run.status = status;
            run.end_time = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true));
            run.duration_ms = Some(duration_ms);
        }
        self.prune_history();

        tracing::info!("Run {} finished: {:?} in {}ms", run_id, status, duration_ms);
    }

    /// Drops the oldest finished runs beyond the configured history size.
    fn prune_history(&self) {
        let mut finished: Vec<(String, String)> = self
            .runs
            .iter()
            .filter(|r| r.is_finished())
            .map(|r| (r.start_time.clone(), r.run_id.clone()))
            .collect();

        if finished.len() <= self.config.run_history {
            return;
        }

        finished.sort();
        let excess = finished.len() - self.config.run_history;
        for (_, run_id) in finished.into_iter().take(excess) {
            self.runs.remove(&run_id);
            tracing::debug!("Pruned run {} from history", run_id);
        }
    }

    // === QUERIES ===

    pub fn is_running(&self) -> bool {
        self.sequencer.is_running() || self.active_run().is_some()
    }

    pub fn active_run(&self) -> Option<String> {
        self.active_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn current_screen(&self) -> String {
        self.device.current_screen()
    }

    pub fn get_run(&self, run_id: &str) -> Option<RunRecord> {
        self.runs.get(run_id).map(|r| (*r).clone())
    }

    /// Most recent `limit` events across all retained runs, oldest first.
    pub fn recent_activity(&self, limit: usize) -> Vec<RuntimeEvent> {
        let mut events: Vec<RuntimeEvent> = self
            .runs
            .iter()
            .flat_map(|r| r.events.clone())
            .collect();
        events.sort_by(|a, b| {
            a.event
                .timestamp()
                .cmp(&b.event.timestamp())
                .then(a.seq.cmp(&b.seq))
        });

        let skip = events.len().saturating_sub(limit);
        events.split_off(skip)
    }

    pub fn metrics(&self) -> Metrics {
        let runs: Vec<RunRecord> = self.runs.iter().map(|r| r.value().clone()).collect();
        Metrics::from_runs(&runs)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.event_bus.subscribe()
    }

    pub fn subscribe_gestures(&self) -> broadcast::Receiver<RunGesture> {
        self.gesture_bus.subscribe()
    }
}

/// Screen the mock device shows before a primary run, given the faults.
fn primary_screen_for(faults: FaultFlags) -> &'static str {
    if faults.inject_error {
        SCREEN_BANKING_BROKEN
    } else if faults.inject_update {
        SCREEN_BANKING_UPDATED
    } else {
        SCREEN_BANKING
    }
}
