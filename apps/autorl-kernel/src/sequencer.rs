// [[AUTORL]]/apps/autorl-kernel/src/sequencer.rs
// Purpose: Scripted perceive -> plan -> act -> recover/complete demo narrative.
// Architecture: Domain Logic Layer
// Dependencies: tokio (timers), chrono, tracing

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::device::{DeviceView, GestureChannel};
use crate::events::{DemoEvent, EventKind};
use crate::models::{FaultFlags, Gesture, Rect, SequenceOutcome};

const TARGET_SEND_MONEY: &str = "send-money";
const TARGET_PAY: &str = "pay";
const FIELD_AMOUNT: &str = "amount";
const TARGET_CONFIRM: &str = "confirm";
const TARGET_SEND_INVITE: &str = "send-invite";
const APP_CALENDAR: &str = "calendar";
const APP_CHAT: &str = "chat";

const TRANSFER_AMOUNT: &str = "$20.00";
const PRIMARY_PLAN: [&str; 4] = [
    "open_payment_app",
    "tap_send_money",
    "enter_amount",
    "confirm_transfer",
];
/// Where the scripted recovery taps once the payment button is gone.
const RECOVERY_TAP: (u32, u32) = (180, 520);

/// Receives events in emission order.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DemoEvent);
}

impl<F> EventSink for F
where
    F: Fn(DemoEvent) + Send + Sync,
{
    fn emit(&self, event: DemoEvent) {
        self(event)
    }
}

/// Fixed delays between scripted steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    pub perception: Duration,
    pub planning: Duration,
    pub fallback_search: Duration,
    pub typing: Duration,
    pub settle: Duration,
    pub recovery_step: Duration,
    pub cross_app_step: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            perception: Duration::from_millis(1500),
            planning: Duration::from_millis(1200),
            fallback_search: Duration::from_millis(1000),
            typing: Duration::from_millis(600),
            settle: Duration::from_millis(800),
            recovery_step: Duration::from_millis(900),
            cross_app_step: Duration::from_millis(1000),
        }
    }
}

impl Pacing {
    pub fn instant() -> Self {
        Self::uniform(Duration::ZERO)
    }

    pub fn uniform(step: Duration) -> Self {
        Self {
            perception: step,
            planning: step,
            fallback_search: step,
            typing: step,
            settle: step,
            recovery_step: step,
            cross_app_step: step,
        }
    }

    /// Default delays multiplied by `factor`. Negative or non-finite factors
    /// are treated as 0.
    pub fn scaled(factor: f64) -> Self {
        let factor = if factor.is_finite() && factor > 0.0 { factor } else { 0.0 };
        let base = Self::default();
        let scale = |d: Duration| d.mul_f64(factor);
        Self {
            perception: scale(base.perception),
            planning: scale(base.planning),
            fallback_search: scale(base.fallback_search),
            typing: scale(base.typing),
            settle: scale(base.settle),
            recovery_step: scale(base.recovery_step),
            cross_app_step: scale(base.cross_app_step),
        }
    }
}

/// Clears the run guard when dropped, whichever way a sequence exits.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Stamps events with non-decreasing timestamps and forwards them to the sink.
struct Emitter<'a> {
    sink: &'a dyn EventSink,
    last: Option<DateTime<Utc>>,
}

impl<'a> Emitter<'a> {
    fn new(sink: &'a dyn EventSink) -> Self {
        Self { sink, last: None }
    }

    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamped = match self.last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        self.last = Some(stamped);
        stamped
    }

    fn emit(&mut self, kind: EventKind, text: impl Into<String>) {
        self.emit_with(kind, text, |event| event);
    }

    fn emit_with(
        &mut self,
        kind: EventKind,
        text: impl Into<String>,
        decorate: impl FnOnce(DemoEvent) -> DemoEvent,
    ) {
        let event = decorate(DemoEvent::new(kind, text, self.stamp()));
        tracing::debug!("[{}] {}", kind.as_str(), event.text());
        self.sink.emit(event);
    }
}

pub struct DemoSequencer {
    device: Arc<dyn DeviceView>,
    gestures: GestureChannel,
    pacing: Pacing,
    running: AtomicBool,
}

impl DemoSequencer {
    pub fn new(device: Arc<dyn DeviceView>, gestures: GestureChannel, pacing: Pacing) -> Self {
        Self {
            device,
            gestures,
            pacing,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn gestures(&self) -> &GestureChannel {
        &self.gestures
    }

    fn try_acquire(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(&self.running))
    }

    fn tap(&self, rect: Rect) -> (u32, u32) {
        let (x, y) = rect.center();
        self.gestures.dispatch(Gesture::Tap { x, y });
        (x, y)
    }

    /// Send-money narrative. Falls back to a semantic match on "pay" when the
    /// primary button is missing, and to the scripted recovery when an error
    /// is injected and nothing matches.
    pub async fn run_primary(&self, faults: FaultFlags, sink: &dyn EventSink) -> SequenceOutcome {
        let Some(_guard) = self.try_acquire() else {
            tracing::warn!("Primary sequence ignored: another sequence is running");
            return SequenceOutcome::Rejected;
        };
        tracing::info!(
            "Primary sequence started (inject_update={}, inject_error={})",
            faults.inject_update,
            faults.inject_error
        );
        let mut out = Emitter::new(sink);

        out.emit(EventKind::Perception, "Capturing screen and running OCR on the banking app");
        tokio::time::sleep(self.pacing.perception).await;

        out.emit_with(
            EventKind::Planning,
            "Plan ready: open app, tap Send Money, enter amount, confirm",
            |event| event.with_plan(PRIMARY_PLAN),
        );
        tokio::time::sleep(self.pacing.planning).await;

        match self.device.element_box(TARGET_SEND_MONEY) {
            Some(rect) if !faults.inject_update => {
                let (x, y) = self.tap(rect);
                out.emit(EventKind::Action, format!("Tapped 'Send Money' at ({}, {})", x, y));
            }
            _ => {
                out.emit(
                    EventKind::Warning,
                    "'Send Money' button not found. The app layout may have changed",
                );
                tokio::time::sleep(self.pacing.fallback_search).await;

                match self.device.element_box(TARGET_PAY) {
                    Some(rect) => {
                        let (x, y) = self.tap(rect);
                        out.emit(
                            EventKind::Action,
                            format!(
                                "Semantic match: 'Pay' is equivalent to 'Send Money'. Tapped at ({}, {})",
                                x, y
                            ),
                        );
                    }
                    None if faults.inject_error => {
                        out.emit(
                            EventKind::Error,
                            "No payment entry point found on screen. Action failed",
                        );
                        self.recover(&mut out).await;
                        tracing::info!("Primary sequence ended through recovery");
                        return SequenceOutcome::Recovered;
                    }
                    None => {
                        // Nothing to tap and no fault requested: carry on with the script.
                        tracing::debug!("No payment entry point found, continuing");
                    }
                }
            }
        }

        if let Some(rect) = self.device.element_box(FIELD_AMOUNT) {
            let (x, y) = self.tap(rect);
            out.emit(EventKind::Action, format!("Focused amount field at ({}, {})", x, y));
        }
        self.gestures.dispatch(Gesture::Type {
            field: FIELD_AMOUNT.to_string(),
            text: TRANSFER_AMOUNT.to_string(),
        });
        self.device.type_text(FIELD_AMOUNT, TRANSFER_AMOUNT).await;
        out.emit(
            EventKind::Action,
            format!("Typed {} into amount field", TRANSFER_AMOUNT),
        );
        tokio::time::sleep(self.pacing.typing).await;

        if let Some(rect) = self.device.element_box(TARGET_CONFIRM) {
            let (x, y) = self.tap(rect);
            out.emit(EventKind::Action, format!("Tapped 'Confirm' at ({}, {})", x, y));
        }

        tokio::time::sleep(self.pacing.settle).await;
        out.emit_with(
            EventKind::Completed,
            format!("Sent {} successfully", TRANSFER_AMOUNT),
            |event| event.with_success(true),
        );
        out.emit(
            EventKind::MemorySaved,
            "Stored 'send_money' workflow in episodic memory",
        );

        tracing::info!("Primary sequence completed");
        SequenceOutcome::Completed
    }

    /// Fixed recovery script. Nothing here depends on the failure that led to it.
    async fn recover(&self, out: &mut Emitter<'_>) {
        out.emit(
            EventKind::RecoveryAnalyze,
            "Analyzing failure: target element missing from current screen",
        );
        tokio::time::sleep(self.pacing.recovery_step).await;

        out.emit(
            EventKind::RecoveryPlan,
            "Recovery plan: dismiss overlay, return to home tab, retry from known entry point",
        );
        tokio::time::sleep(self.pacing.recovery_step).await;

        out.emit(EventKind::RecoveryExecute, "Executing recovery plan");
        let (x, y) = RECOVERY_TAP;
        self.gestures.dispatch(Gesture::Tap { x, y });
        tokio::time::sleep(self.pacing.recovery_step).await;

        out.emit_with(
            EventKind::Recovered,
            "Recovered: app returned to a known state",
            |event| event.with_success(true),
        );
    }

    /// Calendar -> chat narrative: send an invite, then hand over to chat.
    pub async fn run_cross_app(&self, faults: FaultFlags, sink: &dyn EventSink) -> SequenceOutcome {
        let Some(_guard) = self.try_acquire() else {
            tracing::warn!("Cross-app sequence ignored: another sequence is running");
            return SequenceOutcome::Rejected;
        };
        // Fault flags have no branch in this narrative
        tracing::info!(
            "Cross-app sequence started (inject_update={}, inject_error={})",
            faults.inject_update,
            faults.inject_error
        );
        let mut out = Emitter::new(sink);

        out.emit(
            EventKind::CrossAppStart,
            "Starting cross-app task: share meeting invite from Calendar to Chat",
        );
        self.device.switch_app(APP_CALENDAR);
        tokio::time::sleep(self.pacing.cross_app_step).await;

        out.emit(EventKind::Action, "Analyzing calendar screen for today's meeting");
        tokio::time::sleep(self.pacing.cross_app_step).await;

        if let Some(rect) = self.device.element_box(TARGET_SEND_INVITE) {
            let (x, y) = self.tap(rect);
            out.emit(EventKind::Action, format!("Tapped 'Send Invite' at ({}, {})", x, y));
        }
        tokio::time::sleep(self.pacing.cross_app_step).await;

        out.emit(EventKind::Action, "Switching from Calendar to Chat");
        self.device.switch_app(APP_CHAT);
        tokio::time::sleep(self.pacing.cross_app_step).await;

        out.emit_with(
            EventKind::Completed,
            "Invite shared to chat",
            |event| event.with_success(true),
        );
        out.emit(
            EventKind::MemorySaved,
            "Stored 'share_invite' cross-app workflow in episodic memory",
        );

        tracing::info!("Cross-app sequence completed");
        SequenceOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::events::EventKind::*;

    /// Device with a fixed set of elements that records every command.
    struct FakeDevice {
        elements: HashMap<String, Rect>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeDevice {
        fn with(names: &[&str]) -> Arc<Self> {
            let elements = names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.to_string(), Rect::new(10, 100 * (i as u32 + 1), 100, 40)))
                .collect();
            Arc::new(Self {
                elements,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeviceView for FakeDevice {
        fn element_box(&self, name: &str) -> Option<Rect> {
            self.elements.get(name).copied()
        }

        async fn type_text(&self, field: &str, value: &str) {
            self.calls.lock().unwrap().push(format!("type:{}={}", field, value));
        }

        fn switch_app(&self, name: &str) {
            self.calls.lock().unwrap().push(format!("switch:{}", name));
        }
    }

    type Log = Arc<Mutex<Vec<DemoEvent>>>;

    fn collector() -> (Log, impl EventSink + 'static) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink_log = log.clone();
        (log, move |event: DemoEvent| sink_log.lock().unwrap().push(event))
    }

    fn kinds(log: &Log) -> Vec<EventKind> {
        log.lock().unwrap().iter().map(|e| e.kind()).collect()
    }

    fn sequencer(device: Arc<FakeDevice>, pacing: Pacing) -> Arc<DemoSequencer> {
        Arc::new(DemoSequencer::new(device, GestureChannel::new(64), pacing))
    }

    #[tokio::test]
    async fn test_primary_happy_path() {
        let device = FakeDevice::with(&["send-money", "amount", "confirm"]);
        let seq = sequencer(device.clone(), Pacing::instant());
        let mut gestures = seq.gestures().subscribe();
        let (log, sink) = collector();

        assert!(!seq.is_running());
        let outcome = seq.run_primary(FaultFlags::default(), &sink).await;
        assert!(!seq.is_running());

        assert_eq!(outcome, SequenceOutcome::Completed);
        assert_eq!(
            kinds(&log),
            vec![Perception, Planning, Action, Action, Action, Action, Completed, MemorySaved]
        );

        let events = log.lock().unwrap().clone();
        assert_eq!(events[1].plan().map(|p| p.len()), Some(4));
        assert_eq!(events[6].success(), Some(true));
        assert_eq!(device.calls(), vec!["type:amount=$20.00"]);

        let mut seen = Vec::new();
        while let Ok(g) = gestures.try_recv() {
            seen.push(g);
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], Gesture::Tap { x: 60, y: 120 });
        assert!(matches!(seen[2], Gesture::Type { ref text, .. } if text == "$20.00"));
    }

    #[tokio::test]
    async fn test_primary_update_uses_semantic_match() {
        // send-money is present but the update flag forces the fallback search
        let device = FakeDevice::with(&["send-money", "pay", "amount", "confirm"]);
        let seq = sequencer(device, Pacing::instant());
        let (log, sink) = collector();

        let faults = FaultFlags {
            inject_update: true,
            inject_error: false,
        };
        let outcome = seq.run_primary(faults, &sink).await;

        assert_eq!(outcome, SequenceOutcome::Completed);
        assert_eq!(
            kinds(&log),
            vec![Perception, Planning, Warning, Action, Action, Action, Action, Completed, MemorySaved]
        );
        assert!(log.lock().unwrap()[3].text().contains("Semantic match"));
    }

    #[tokio::test]
    async fn test_primary_error_runs_recovery() {
        let device = FakeDevice::with(&["amount", "confirm"]);
        let seq = sequencer(device.clone(), Pacing::instant());
        let mut gestures = seq.gestures().subscribe();
        let (log, sink) = collector();

        let faults = FaultFlags {
            inject_update: false,
            inject_error: true,
        };
        let outcome = seq.run_primary(faults, &sink).await;

        assert_eq!(outcome, SequenceOutcome::Recovered);
        let kinds = kinds(&log);
        assert!(kinds.ends_with(&[
            Warning,
            Error,
            RecoveryAnalyze,
            RecoveryPlan,
            RecoveryExecute,
            Recovered
        ]));
        assert!(!kinds.contains(&Completed));
        assert!(device.calls().is_empty());
        assert!(!seq.is_running());

        assert_eq!(gestures.try_recv().unwrap(), Gesture::Tap { x: 180, y: 520 });
        assert!(gestures.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_primary_missing_target_falls_through() {
        let device = FakeDevice::with(&["amount", "confirm"]);
        let seq = sequencer(device, Pacing::instant());
        let (log, sink) = collector();

        let outcome = seq.run_primary(FaultFlags::default(), &sink).await;

        assert_eq!(outcome, SequenceOutcome::Completed);
        assert_eq!(
            kinds(&log),
            vec![Perception, Planning, Warning, Action, Action, Action, Completed, MemorySaved]
        );
    }

    #[tokio::test]
    async fn test_cross_app_order() {
        let device = FakeDevice::with(&["send-invite"]);
        let seq = sequencer(device.clone(), Pacing::instant());
        let (log, sink) = collector();

        let outcome = seq.run_cross_app(FaultFlags::default(), &sink).await;

        assert_eq!(outcome, SequenceOutcome::Completed);
        assert_eq!(
            kinds(&log),
            vec![CrossAppStart, Action, Action, Action, Completed, MemorySaved]
        );
        let events = log.lock().unwrap().clone();
        assert_eq!(events[events.len() - 2].success(), Some(true));
        assert_eq!(device.calls(), vec!["switch:calendar", "switch:chat"]);
    }

    #[tokio::test]
    async fn test_timestamps_non_decreasing() {
        let device = FakeDevice::with(&["amount", "confirm"]);
        let seq = sequencer(device, Pacing::uniform(Duration::from_millis(1)));
        let (log, sink) = collector();

        let faults = FaultFlags {
            inject_update: true,
            inject_error: true,
        };
        seq.run_primary(faults, &sink).await;

        let events = log.lock().unwrap().clone();
        assert!(events.len() > 2);
        assert!(events.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    }

    #[tokio::test]
    async fn test_guard_held_while_emitting() {
        let device = FakeDevice::with(&["send-invite"]);
        let seq = sequencer(device, Pacing::instant());

        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seq = seq.clone();
            let observed = observed.clone();
            move |_event: DemoEvent| observed.lock().unwrap().push(seq.is_running())
        };

        seq.run_cross_app(FaultFlags::default(), &sink).await;

        let observed = observed.lock().unwrap().clone();
        assert_eq!(observed.len(), 6);
        assert!(observed.iter().all(|running| *running));
        assert!(!seq.is_running());
    }

    #[tokio::test]
    async fn test_concurrent_invocation_is_ignored() {
        let device = FakeDevice::with(&["send-money", "amount", "confirm", "send-invite"]);
        let seq = sequencer(device.clone(), Pacing::uniform(Duration::from_millis(20)));

        let (first_log, first_sink) = collector();
        let task = {
            let seq = seq.clone();
            tokio::spawn(async move { seq.run_primary(FaultFlags::default(), &first_sink).await })
        };

        while !seq.is_running() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let calls_before = device.calls();
        let (second_log, second_sink) = collector();
        assert_eq!(
            seq.run_primary(FaultFlags::default(), &second_sink).await,
            SequenceOutcome::Rejected
        );
        assert_eq!(
            seq.run_cross_app(FaultFlags::default(), &second_sink).await,
            SequenceOutcome::Rejected
        );
        assert!(second_log.lock().unwrap().is_empty());
        assert_eq!(device.calls(), calls_before);

        assert_eq!(task.await.unwrap(), SequenceOutcome::Completed);
        assert_eq!(kinds(&first_log).len(), 8);
        assert!(!seq.is_running());

        // guard released: a new run is accepted
        assert_eq!(
            seq.run_cross_app(FaultFlags::default(), &second_sink).await,
            SequenceOutcome::Completed
        );
    }

    #[test]
    fn test_pacing_scaled() {
        let half = Pacing::scaled(0.5);
        assert_eq!(half.perception, Duration::from_millis(750));
        assert_eq!(Pacing::scaled(-1.0), Pacing::instant());
        assert_eq!(Pacing::scaled(f64::NAN), Pacing::instant());
    }
}
