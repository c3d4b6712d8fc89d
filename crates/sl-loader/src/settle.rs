//! Best-effort "rendering has settled" detection.

use crate::config::Timings;
use sl_core::LoaderResult;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;

/// A document whose changes can be observed as a generation counter.
pub trait MutationSource {
    /// Current generation, or `None` when changes cannot be observed.
    fn observe(&mut self) -> LoaderResult<Option<u64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// No change for the quiet window.
    Quiet,
    /// Still changing when the hard cap ran out.
    CappedAtMax,
    Unsupported,
}

/// Waits until the source has been unchanged for `settle_quiet`, checking
/// once per frame, never longer than `settle_max`.
pub async fn wait_for_settle<M: MutationSource + ?Sized>(
    source: &mut M,
    timings: &Timings,
) -> LoaderResult<SettleOutcome> {
    let Some(mut generation) = source.observe()? else {
        debug!("mutation observation unsupported; not waiting to settle");
        return Ok(SettleOutcome::Unsupported);
    };
    let started = Instant::now();
    let mut last_change = started;
    let quiet = timings.settle_quiet();
    let cap = timings.settle_max();

    loop {
        let until_quiet = quiet.saturating_sub(last_change.elapsed());
        let until_cap = cap.saturating_sub(started.elapsed());
        tokio::time::sleep(timings.frame_interval().min(until_quiet).min(until_cap)).await;

        match source.observe()? {
            None => return Ok(SettleOutcome::Unsupported),
            Some(current) if current != generation => {
                generation = current;
                last_change = Instant::now();
            }
            Some(_) => {}
        }
        if last_change.elapsed() >= quiet {
            debug!(elapsed_ms = started.elapsed().as_millis() as u64, "document settled");
            return Ok(SettleOutcome::Quiet);
        }
        if started.elapsed() >= cap {
            info!(cap_ms = cap.as_millis() as u64, "document still changing; settle wait capped");
            return Ok(SettleOutcome::CappedAtMax);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MutationSource;
    use super::SettleOutcome;
    use super::wait_for_settle;
    use crate::config::Timings;
    use sl_core::LoaderResult;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Changes on every observation until `busy_until`.
    struct Churn {
        busy_until: Instant,
        generation: u64,
    }

    impl MutationSource for Churn {
        fn observe(&mut self) -> LoaderResult<Option<u64>> {
            if Instant::now() < self.busy_until {
                self.generation = self.generation.saturating_add(1);
            }
            Ok(Some(self.generation))
        }
    }

    struct Blind;

    impl MutationSource for Blind {
        fn observe(&mut self) -> LoaderResult<Option<u64>> {
            Ok(None)
        }
    }

    async fn settle(source: &mut dyn MutationSource) -> (SettleOutcome, Duration) {
        let started = Instant::now();
        match wait_for_settle(source, &Timings::default()).await {
            Ok(outcome) => (outcome, started.elapsed()),
            Err(error) => panic!("{error}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_document_settles_after_the_quiet_window() {
        let mut source = Churn {
            busy_until: Instant::now(),
            generation: 7,
        };
        let (outcome, elapsed) = settle(&mut source).await;
        assert_eq!(outcome, SettleOutcome::Quiet);
        assert!(elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn late_changes_restart_the_quiet_window() {
        let mut source = Churn {
            busy_until: Instant::now() + Duration::from_millis(500),
            generation: 0,
        };
        let (outcome, elapsed) = settle(&mut source).await;
        assert_eq!(outcome, SettleOutcome::Quiet);
        assert!(elapsed >= Duration::from_millis(650) && elapsed < Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn endless_churn_is_capped() {
        let mut source = Churn {
            busy_until: Instant::now() + Duration::from_secs(60),
            generation: 0,
        };
        let (outcome, elapsed) = settle(&mut source).await;
        assert_eq!(outcome, SettleOutcome::CappedAtMax);
        assert!(elapsed >= Duration::from_millis(2500) && elapsed < Duration::from_millis(2550));
    }

    #[tokio::test(start_paused = true)]
    async fn unobservable_documents_do_not_wait() {
        let (outcome, elapsed) = settle(&mut Blind).await;
        assert_eq!(outcome, SettleOutcome::Unsupported);
        assert_eq!(elapsed, Duration::ZERO);
    }
}
