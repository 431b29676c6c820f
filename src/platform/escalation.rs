//! Graceful-then-forceful termination sequence
//!
//! The ordering lives here, away from any OS call: one graceful signal, liveness
//! probes every `poll_interval` until the grace window closes, then exactly one
//! forceful signal followed by a final probe. The POSIX handler plugs real
//! signals in through [`SignalSink`].

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::core::models::StopPolicy;
use crate::error::WardenResult;

/// Lower bound on the probe interval so a zero setting cannot busy-spin.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Minimum wait between the forceful signal and the final liveness check.
const KILL_SETTLE_FLOOR: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM-equivalent
    Graceful,
    /// SIGKILL-equivalent
    Forceful,
}

impl StopSignal {
    pub fn name(&self) -> &'static str {
        match self {
            StopSignal::Graceful => "SIGTERM",
            StopSignal::Forceful => "SIGKILL",
        }
    }
}

/// Outcome of a single signal delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Target does not exist; callers treat this as already stopped
    NoSuchProcess,
}

#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Deliver `signal`. Errors are reserved for failures other than "no such
    /// process" (e.g. permission denied).
    fn send(&self, pid: u32, signal: StopSignal) -> WardenResult<Delivery>;

    async fn is_alive(&self, pid: u32) -> bool;
}

/// Run the stop sequence against `pid`.
///
/// Returns `Ok(true)` once the process is confirmed gone (including when it
/// never existed) and `Ok(false)` only if it is still alive after the forceful
/// signal.
pub async fn escalate_stop<S>(sink: &S, pid: u32, policy: &StopPolicy) -> WardenResult<bool>
where
    S: SignalSink + ?Sized,
{
    if sink.send(pid, StopSignal::Graceful)? == Delivery::NoSuchProcess {
        debug!(pid, "process already gone before graceful signal");
        return Ok(true);
    }

    let poll = policy.poll_interval.max(MIN_POLL_INTERVAL);
    let deadline = Instant::now() + policy.grace_period;

    loop {
        if !sink.is_alive(pid).await {
            info!(pid, "process exited within grace window");
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep(poll.min(deadline - now)).await;
    }

    warn!(
        pid,
        grace_ms = policy.grace_period.as_millis() as u64,
        "grace window elapsed, escalating to forceful termination"
    );
    if sink.send(pid, StopSignal::Forceful)? == Delivery::NoSuchProcess {
        return Ok(true);
    }

    sleep(poll.max(KILL_SETTLE_FLOOR)).await;
    let gone = !sink.is_alive(pid).await;
    if !gone {
        warn!(pid, "process still alive after forceful signal");
    }
    Ok(gone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::errors;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Scripted process: exits after a number of probes following the graceful
    /// signal, or never; optionally survives the forceful signal too.
    struct ScriptedProcess {
        exists: bool,
        exit_after_probes: Option<usize>,
        survives_kill: bool,
        /// Time the process takes to disappear once killed
        kill_latency: Duration,
        deny_signals: bool,
        killed_at: Mutex<Option<std::time::Instant>>,
        sent: Mutex<Vec<StopSignal>>,
        probes: Mutex<usize>,
    }

    impl ScriptedProcess {
        fn new() -> Self {
            Self {
                exists: true,
                exit_after_probes: None,
                survives_kill: false,
                kill_latency: Duration::ZERO,
                deny_signals: false,
                killed_at: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
                probes: Mutex::new(0),
            }
        }

        fn sent(&self) -> Vec<StopSignal> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SignalSink for ScriptedProcess {
        fn send(&self, pid: u32, signal: StopSignal) -> WardenResult<Delivery> {
            if self.deny_signals {
                return Err(errors::signal_error(pid, signal.name(), "Operation not permitted"));
            }
            self.sent.lock().unwrap().push(signal);
            if signal == StopSignal::Forceful {
                *self.killed_at.lock().unwrap() = Some(std::time::Instant::now());
            }
            if self.exists {
                Ok(Delivery::Delivered)
            } else {
                Ok(Delivery::NoSuchProcess)
            }
        }

        async fn is_alive(&self, _pid: u32) -> bool {
            if !self.exists {
                return false;
            }
            if let Some(killed_at) = *self.killed_at.lock().unwrap() {
                return self.survives_kill || killed_at.elapsed() < self.kill_latency;
            }
            let mut probes = self.probes.lock().unwrap();
            *probes += 1;
            match self.exit_after_probes {
                Some(limit) => *probes <= limit,
                None => true,
            }
        }
    }

    fn policy() -> StopPolicy {
        StopPolicy::new(Duration::from_millis(200), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn missing_process_is_already_stopped() {
        let process = ScriptedProcess {
            exists: false,
            ..ScriptedProcess::new()
        };
        assert!(escalate_stop(&process, 999_999, &policy()).await.unwrap());
        assert_eq!(process.sent(), vec![StopSignal::Graceful]);
    }

    #[tokio::test]
    async fn exit_within_grace_returns_early() {
        let process = ScriptedProcess {
            exit_after_probes: Some(3),
            ..ScriptedProcess::new()
        };
        let started = std::time::Instant::now();
        assert!(escalate_stop(&process, 100, &policy()).await.unwrap());
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(process.sent(), vec![StopSignal::Graceful]);
    }

    #[tokio::test]
    async fn ignoring_graceful_gets_exactly_one_kill_after_window() {
        let process = ScriptedProcess::new();
        let started = std::time::Instant::now();
        assert!(escalate_stop(&process, 100, &policy()).await.unwrap());
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(
            process.sent(),
            vec![StopSignal::Graceful, StopSignal::Forceful]
        );
    }

    #[tokio::test]
    async fn surviving_kill_reports_false() {
        let process = ScriptedProcess {
            survives_kill: true,
            ..ScriptedProcess::new()
        };
        assert!(!escalate_stop(&process, 100, &policy()).await.unwrap());
        assert_eq!(
            process.sent(),
            vec![StopSignal::Graceful, StopSignal::Forceful]
        );
    }

    #[tokio::test]
    async fn slow_teardown_after_kill_is_waited_for() {
        let process = ScriptedProcess {
            kill_latency: Duration::from_millis(50),
            ..ScriptedProcess::new()
        };
        let hasty = StopPolicy::new(Duration::from_millis(20), Duration::from_millis(1));
        assert!(escalate_stop(&process, 100, &hasty).await.unwrap());
        assert_eq!(
            process.sent(),
            vec![StopSignal::Graceful, StopSignal::Forceful]
        );
    }

    #[tokio::test]
    async fn permission_denied_is_a_signal_error() {
        let process = ScriptedProcess {
            deny_signals: true,
            ..ScriptedProcess::new()
        };
        let err = escalate_stop(&process, 1, &policy()).await.unwrap_err();
        assert_eq!(err.pid(), Some(1));
        assert!(err.to_string().contains("SIGTERM"));
    }
}
