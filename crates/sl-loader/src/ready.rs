//! The app-readiness handshake between the loader and the rendered page.

use crate::config::Timings;
use sl_core::LoaderResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// State of the page's hold flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HoldState {
    /// The page never declared the flag.
    #[default]
    Undeclared,
    Holding,
    Released,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessSignal {
    pub hold: HoldState,
    /// The ready event has fired at least once.
    pub ready_event: bool,
}

/// Something the loader can ask whether the rendered app is done booting.
pub trait AppReadiness {
    fn poll_readiness(&mut self) -> LoaderResult<ReadinessSignal>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// The ready event fired.
    Signalled,
    /// The hold flag was cleared.
    Released,
    /// No flag was declared; the grace period ran out.
    GraceElapsed,
    /// The flag stayed set past the app-ready timeout.
    TimedOut,
}

/// Polls `source` until the app is ready or a bound is hit.
///
/// An undeclared flag waits only the grace period. A held flag waits until
/// released or the app-ready timeout. The ready event ends either wait.
pub async fn wait_for_app_ready<R: AppReadiness + ?Sized>(
    source: &mut R,
    timings: &Timings,
) -> LoaderResult<ReadyOutcome> {
    let started = Instant::now();
    loop {
        let signal = source.poll_readiness()?;
        let elapsed = started.elapsed();
        let limit = match (signal.ready_event, signal.hold) {
            (true, _) => {
                info!(elapsed_ms = millis(elapsed), "app signalled ready");
                return Ok(ReadyOutcome::Signalled);
            }
            (false, HoldState::Released) => {
                info!(elapsed_ms = millis(elapsed), "app released its hold");
                return Ok(ReadyOutcome::Released);
            }
            (false, HoldState::Undeclared) => timings.grace_period(),
            (false, HoldState::Holding) => timings.app_ready_timeout(),
        };
        if elapsed >= limit {
            return Ok(match signal.hold {
                HoldState::Holding => {
                    warn!(timeout_ms = millis(limit), "app held processing past the timeout");
                    ReadyOutcome::TimedOut
                }
                _ => {
                    debug!(grace_ms = millis(limit), "no hold flag declared");
                    ReadyOutcome::GraceElapsed
                }
            });
        }
        tokio::time::sleep(timings.poll_interval().min(limit - elapsed)).await;
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Readiness for embedders that signal through Rust instead of page globals.
#[derive(Debug)]
pub struct ReadyChannel {
    receiver: watch::Receiver<ReadinessSignal>,
}

/// Sending half of a [`ReadyChannel`].
#[derive(Debug, Clone)]
pub struct ReadyHandle {
    sender: Arc<watch::Sender<ReadinessSignal>>,
}

impl ReadyChannel {
    pub fn new() -> (ReadyHandle, Self) {
        let (sender, receiver) = watch::channel(ReadinessSignal::default());
        (
            ReadyHandle {
                sender: Arc::new(sender),
            },
            Self { receiver },
        )
    }
}

impl ReadyHandle {
    pub fn hold(&self) {
        self.sender.send_modify(|signal| signal.hold = HoldState::Holding);
    }

    pub fn release(&self) {
        self.sender.send_modify(|signal| signal.hold = HoldState::Released);
    }

    pub fn signal_ready(&self) {
        self.sender.send_modify(|signal| signal.ready_event = true);
    }
}

impl AppReadiness for ReadyChannel {
    fn poll_readiness(&mut self) -> LoaderResult<ReadinessSignal> {
        Ok(*self.receiver.borrow_and_update())
    }
}

#[cfg(test)]
mod tests {
    use super::ReadyChannel;
    use super::ReadyOutcome;
    use super::wait_for_app_ready;
    use crate::config::Timings;
    use std::time::Duration;
    use tokio::time::Instant;

    async fn wait(channel: &mut ReadyChannel) -> ReadyOutcome {
        match wait_for_app_ready(channel, &Timings::default()).await {
            Ok(outcome) => outcome,
            Err(error) => panic!("{error}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn undeclared_flag_waits_only_the_grace_period() {
        let (_handle, mut channel) = ReadyChannel::new();
        let started = Instant::now();
        assert_eq!(wait(&mut channel).await, ReadyOutcome::GraceElapsed);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(150) && elapsed < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn held_flag_times_out() {
        let (handle, mut channel) = ReadyChannel::new();
        handle.hold();
        let started = Instant::now();
        assert_eq!(wait(&mut channel).await, ReadyOutcome::TimedOut);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(8000) && elapsed < Duration::from_millis(8100));
    }

    #[tokio::test(start_paused = true)]
    async fn release_ends_the_hold_at_the_next_poll() {
        let (handle, mut channel) = ReadyChannel::new();
        handle.hold();
        let releaser = handle.clone();
        let started = Instant::now();
        let (outcome, ()) = tokio::join!(wait(&mut channel), async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            releaser.release();
        });
        assert_eq!(outcome, ReadyOutcome::Released);
        assert!(started.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_event_short_circuits() {
        let (handle, mut channel) = ReadyChannel::new();
        handle.hold();
        handle.signal_ready();
        let started = Instant::now();
        assert_eq!(wait(&mut channel).await, ReadyOutcome::Signalled);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
