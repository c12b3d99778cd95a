use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::config::AlarmConfig;
use crate::signals::{PipelineSignals, SignalSampler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmState {
    Ok,
    Alarm,
    InsufficientData,
}

/// How a missing sample counts against the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDataPolicy {
    Breaching,
    NotBreaching,
}

/// Emitted on every state transition. Consumers downstream decide what to
/// do with it; the monitor itself takes no remediation action.
#[derive(Debug, Clone, Serialize)]
pub struct AlarmEvent {
    pub metric: String,
    pub threshold: f64,
    pub state: AlarmState,
}

/// Per-metric alarm state machine.
///
/// Flipping to `Alarm` takes `periods` consecutive breaching samples;
/// flipping back to `Ok` takes the same number of clear samples. A single
/// noisy sample never alarms when `periods > 1`.
pub struct Alarm {
    metric: String,
    threshold: f64,
    periods: u32,
    missing_data: MissingDataPolicy,
    state: AlarmState,
    breach_streak: u32,
    clear_streak: u32,
}

impl Alarm {
    pub fn new(cfg: &AlarmConfig) -> Self {
        Self {
            metric: cfg.metric.clone(),
            threshold: cfg.threshold,
            periods: cfg.periods.max(1),
            missing_data: cfg.missing_data,
            state: AlarmState::InsufficientData,
            breach_streak: 0,
            clear_streak: 0,
        }
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Feed one evaluation period's sample. Returns an event on state
    /// transition, `None` otherwise.
    pub fn observe(&mut self, sample: Option<f64>) -> Option<AlarmEvent> {
        let breaching = match sample {
            Some(value) => value > self.threshold,
            None => self.missing_data == MissingDataPolicy::Breaching,
        };

        if breaching {
            self.breach_streak += 1;
            self.clear_streak = 0;
            if self.breach_streak >= self.periods && self.state != AlarmState::Alarm {
                self.state = AlarmState::Alarm;
                return Some(self.event());
            }
        } else {
            self.clear_streak += 1;
            self.breach_streak = 0;
            if self.clear_streak >= self.periods && self.state != AlarmState::Ok {
                self.state = AlarmState::Ok;
                return Some(self.event());
            }
        }
        None
    }

    fn event(&self) -> AlarmEvent {
        AlarmEvent {
            metric: self.metric.clone(),
            threshold: self.threshold,
            state: self.state,
        }
    }
}

/// Evaluates all configured alarms once per period against the shared
/// pipeline signals and publishes transitions on a broadcast channel.
pub struct AlarmMonitor {
    alarms: Vec<(Alarm, crate::signals::SignalName)>,
    sampler: SignalSampler,
    signals: Arc<PipelineSignals>,
    interval: Duration,
    events_tx: broadcast::Sender<AlarmEvent>,
}

impl AlarmMonitor {
    pub fn new(
        configs: &[AlarmConfig],
        signals: Arc<PipelineSignals>,
        interval: Duration,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            alarms: configs.iter().map(|c| (Alarm::new(c), c.signal)).collect(),
            sampler: SignalSampler::default(),
            signals,
            interval,
            events_tx,
        }
    }

    /// Downstream automated-response seam.
    pub fn subscribe(&self) -> broadcast::Receiver<AlarmEvent> {
        self.events_tx.subscribe()
    }

    /// Sender handle, so subscriptions outlive the monitor task.
    pub fn events_sender(&self) -> broadcast::Sender<AlarmEvent> {
        self.events_tx.clone()
    }

    /// One evaluation pass over every alarm.
    pub fn evaluate(&mut self) {
        for (alarm, signal) in &mut self.alarms {
            let sample = self.sampler.sample(*signal, &self.signals);
            if let Some(event) = alarm.observe(sample) {
                tracing::info!(
                    metric = %event.metric,
                    state = ?event.state,
                    threshold = event.threshold,
                    "alarm transition"
                );
                // Ignore if nothing is listening downstream.
                let _ = self.events_tx.send(event);
            }
        }
    }

    /// Run until shutdown, evaluating once per period.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so the first sample
        // covers a full period.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.evaluate(),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("alarm monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalName;

    fn cfg(periods: u32, missing: MissingDataPolicy) -> AlarmConfig {
        AlarmConfig {
            metric: "consumer-errors".into(),
            signal: SignalName::ConsumerErrors,
            threshold: 5.0,
            periods,
            missing_data: missing,
        }
    }

    #[test]
    fn two_consecutive_breaches_flip_to_alarm() {
        let mut alarm = Alarm::new(&cfg(2, MissingDataPolicy::Breaching));
        assert!(alarm.observe(Some(10.0)).is_none());
        let event = alarm.observe(Some(10.0)).expect("transition");
        assert_eq!(event.state, AlarmState::Alarm);
        assert_eq!(alarm.state(), AlarmState::Alarm);
    }

    #[test]
    fn a_single_noisy_sample_never_alarms() {
        let mut alarm = Alarm::new(&cfg(2, MissingDataPolicy::Breaching));
        assert!(alarm.observe(Some(10.0)).is_none());
        assert!(alarm.observe(Some(1.0)).is_none());
        assert!(alarm.observe(Some(10.0)).is_none());
        assert_ne!(alarm.state(), AlarmState::Alarm);
    }

    #[test]
    fn one_period_alarms_immediately_for_throttles() {
        let mut alarm = Alarm::new(&AlarmConfig {
            metric: "store-throttles".into(),
            signal: SignalName::StoreThrottles,
            threshold: 0.0,
            periods: 1,
            missing_data: MissingDataPolicy::Breaching,
        });
        let event = alarm.observe(Some(1.0)).expect("transition");
        assert_eq!(event.state, AlarmState::Alarm);
    }

    #[test]
    fn recovery_needs_the_same_streak() {
        let mut alarm = Alarm::new(&cfg(2, MissingDataPolicy::Breaching));
        alarm.observe(Some(10.0));
        alarm.observe(Some(10.0));
        assert_eq!(alarm.state(), AlarmState::Alarm);

        assert!(alarm.observe(Some(1.0)).is_none());
        let event = alarm.observe(Some(1.0)).expect("transition");
        assert_eq!(event.state, AlarmState::Ok);
    }

    #[test]
    fn missing_data_not_breaching_counts_as_clear() {
        let mut alarm = Alarm::new(&cfg(2, MissingDataPolicy::NotBreaching));
        alarm.observe(Some(1.0));
        alarm.observe(Some(1.0));
        assert_eq!(alarm.state(), AlarmState::Ok);

        // Gauge goes missing: stays OK.
        assert!(alarm.observe(None).is_none());
        assert!(alarm.observe(None).is_none());
        assert_eq!(alarm.state(), AlarmState::Ok);
    }

    #[test]
    fn missing_data_breaching_counts_as_breach() {
        let mut alarm = Alarm::new(&cfg(2, MissingDataPolicy::Breaching));
        alarm.observe(None);
        let event = alarm.observe(None).expect("transition");
        assert_eq!(event.state, AlarmState::Alarm);
    }

    #[tokio::test]
    async fn monitor_publishes_transitions() {
        let signals = Arc::new(PipelineSignals::default());
        let mut monitor = AlarmMonitor::new(
            &[AlarmConfig {
                metric: "consumer-errors".into(),
                signal: SignalName::ConsumerErrors,
                threshold: 0.0,
                periods: 2,
                missing_data: MissingDataPolicy::Breaching,
            }],
            signals.clone(),
            Duration::from_secs(60),
        );
        let mut events = monitor.subscribe();

        signals.batch_failed();
        monitor.evaluate();
        signals.batch_failed();
        monitor.evaluate();

        let event = events.try_recv().expect("alarm event");
        assert_eq!(event.state, AlarmState::Alarm);
        assert_eq!(event.metric, "consumer-errors");
        assert!(events.try_recv().is_err());
    }
}
