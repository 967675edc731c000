use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::EngineConfig;
use crate::timer::OneShotTimer;
use crate::{PageNumber, ViewportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAlign {
    /// Put the page top at the viewport top. Used for deliberate jumps.
    Start,
    /// Bring the page into view with minimal movement.
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPhase {
    Idle,
    UserScrolling,
    /// A requested jump is in flight; `target` is where it should land.
    Programmatic { target: PageNumber },
}

/// A scroll the host should carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollCommand {
    pub page: PageNumber,
    pub align: ScrollAlign,
}

/// Arbitrates between user scrolling, programmatic jumps, and the visibility
/// reports that track which page counts as current. All waiting is expressed
/// as deadlines pumped through `tick`, so behavior is deterministic under
/// test.
#[derive(Debug)]
pub struct ScrollCoordinator {
    phase: ScrollPhase,
    last_target: Option<PageNumber>,
    pending_report: Option<PageNumber>,
    quiet: OneShotTimer,
    report: OneShotTimer,
    target_reset: OneShotTimer,
    quiet_period: Duration,
    report_delay: Duration,
    reset_delay: Duration,
}

impl ScrollCoordinator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            phase: ScrollPhase::Idle,
            last_target: None,
            pending_report: None,
            quiet: OneShotTimer::new(),
            report: OneShotTimer::new(),
            target_reset: OneShotTimer::new(),
            quiet_period: config.scroll_quiet_period,
            report_delay: config.visible_report_delay,
            reset_delay: config.scroll_target_reset,
        }
    }

    pub fn phase(&self) -> ScrollPhase {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = ScrollPhase::Idle;
        self.last_target = None;
        self.pending_report = None;
        self.quiet.cancel();
        self.report.cancel();
        self.target_reset.cancel();
    }

    /// Raw user input. The user always wins: any in-flight programmatic jump
    /// stops being tracked, though its dedupe target stays recorded until the
    /// reset deadline.
    pub fn on_user_scroll(&mut self, now: Instant) {
        self.phase = ScrollPhase::UserScrolling;
        self.quiet.arm(now, self.quiet_period);
    }

    /// Feeds the debounced current-page candidate. While a programmatic jump
    /// is in flight, pages passing by are noise; only the target landing
    /// completes the jump.
    pub fn observe_visible(&mut self, candidate: PageNumber, now: Instant) {
        if let ScrollPhase::Programmatic { target } = self.phase {
            if candidate != target {
                debug!(page = candidate, target, "ignoring page passed during jump");
                return;
            }
            self.phase = ScrollPhase::Idle;
        }
        self.pending_report = Some(candidate);
        self.report.arm(now, self.report_delay);
    }

    /// Asks for a scroll command. Explicit requests jump to the page top and
    /// are deduplicated against the last target; tracking requests align
    /// nearest and yield to the user's own scrolling.
    pub fn request_scroll(
        &mut self,
        page: PageNumber,
        explicit: bool,
        admitted: bool,
        now: Instant,
    ) -> Result<Option<ScrollCommand>, ViewportError> {
        if !admitted {
            return Err(ViewportError::ScrollTargetNotReady { page });
        }

        if explicit {
            if self.last_target == Some(page) {
                debug!(page, "explicit scroll suppressed, target unchanged");
                return Ok(None);
            }
            self.last_target = Some(page);
            self.phase = ScrollPhase::Programmatic { target: page };
            self.target_reset.arm(now, self.reset_delay);
            return Ok(Some(ScrollCommand {
                page,
                align: ScrollAlign::Start,
            }));
        }

        if self.phase == ScrollPhase::UserScrolling {
            debug!(page, "tracking scroll suppressed while user scrolls");
            return Ok(None);
        }
        Ok(Some(ScrollCommand {
            page,
            align: ScrollAlign::Nearest,
        }))
    }

    /// Fires due deadlines. Returns a current-page report when its debounce
    /// has elapsed.
    pub fn tick(&mut self, now: Instant) -> Option<PageNumber> {
        if self.quiet.fire_if_due(now) && self.phase == ScrollPhase::UserScrolling {
            self.phase = ScrollPhase::Idle;
        }
        if self.target_reset.fire_if_due(now) {
            self.last_target = None;
            if matches!(self.phase, ScrollPhase::Programmatic { .. }) {
                self.phase = ScrollPhase::Idle;
            }
        }
        if self.report.fire_if_due(now) {
            return self.pending_report.take();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> ScrollCoordinator {
        ScrollCoordinator::new(&EngineConfig::default())
    }

    fn ms(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn explicit_request_scrolls_to_the_page_top() {
        let t0 = Instant::now();
        let mut scroll = coordinator();

        let command = scroll.request_scroll(5, true, true, t0).unwrap();
        assert_eq!(
            command,
            Some(ScrollCommand {
                page: 5,
                align: ScrollAlign::Start
            })
        );
        assert_eq!(scroll.phase(), ScrollPhase::Programmatic { target: 5 });
    }

    #[test]
    fn repeated_target_is_suppressed_until_reset() {
        let t0 = Instant::now();
        let mut scroll = coordinator();

        assert!(scroll.request_scroll(5, true, true, t0).unwrap().is_some());
        assert!(scroll
            .request_scroll(5, true, true, ms(t0, 50))
            .unwrap()
            .is_none());

        scroll.tick(ms(t0, 350));
        assert!(scroll
            .request_scroll(5, true, true, ms(t0, 350))
            .unwrap()
            .is_some());
    }

    #[test]
    fn alternating_targets_always_issue_commands() {
        let t0 = Instant::now();
        let mut scroll = coordinator();

        assert!(scroll.request_scroll(5, true, true, t0).unwrap().is_some());
        assert!(scroll
            .request_scroll(9, true, true, ms(t0, 50))
            .unwrap()
            .is_some());
        // A different page in between resets the dedupe, even inside the window.
        assert!(scroll
            .request_scroll(5, true, true, ms(t0, 100))
            .unwrap()
            .is_some());
    }

    #[test]
    fn unadmitted_target_is_an_error() {
        let t0 = Instant::now();
        let mut scroll = coordinator();

        let err = scroll.request_scroll(7, true, false, t0).unwrap_err();
        assert!(matches!(
            err,
            ViewportError::ScrollTargetNotReady { page: 7 }
        ));
        assert_eq!(scroll.phase(), ScrollPhase::Idle);
    }

    #[test]
    fn tracking_request_yields_to_the_user() {
        let t0 = Instant::now();
        let mut scroll = coordinator();

        scroll.on_user_scroll(t0);
        assert!(scroll
            .request_scroll(3, false, true, ms(t0, 10))
            .unwrap()
            .is_none());

        // Explicit navigation still goes through.
        assert!(scroll
            .request_scroll(3, true, true, ms(t0, 20))
            .unwrap()
            .is_some());
    }

    #[test]
    fn quiet_period_returns_to_idle() {
        let t0 = Instant::now();
        let mut scroll = coordinator();

        scroll.on_user_scroll(t0);
        assert_eq!(scroll.phase(), ScrollPhase::UserScrolling);

        scroll.tick(ms(t0, 200));
        assert_eq!(scroll.phase(), ScrollPhase::UserScrolling);

        scroll.tick(ms(t0, 300));
        assert_eq!(scroll.phase(), ScrollPhase::Idle);

        assert!(scroll
            .request_scroll(3, false, true, ms(t0, 310))
            .unwrap()
            .is_some());
    }

    #[test]
    fn continued_scrolling_extends_the_quiet_period() {
        let t0 = Instant::now();
        let mut scroll = coordinator();

        scroll.on_user_scroll(t0);
        scroll.on_user_scroll(ms(t0, 250));
        scroll.tick(ms(t0, 400));
        assert_eq!(scroll.phase(), ScrollPhase::UserScrolling);

        scroll.tick(ms(t0, 550));
        assert_eq!(scroll.phase(), ScrollPhase::Idle);
    }

    #[test]
    fn visibility_reports_are_debounced_to_the_latest() {
        let t0 = Instant::now();
        let mut scroll = coordinator();

        scroll.observe_visible(4, t0);
        scroll.observe_visible(5, ms(t0, 100));

        assert_eq!(scroll.tick(ms(t0, 250)), None);
        assert_eq!(scroll.tick(ms(t0, 300)), Some(5));
        assert_eq!(scroll.tick(ms(t0, 400)), None);
    }

    #[test]
    fn pages_passed_during_a_jump_are_not_reported() {
        let t0 = Instant::now();
        let mut scroll = coordinator();

        scroll.request_scroll(9, true, true, t0).unwrap();
        scroll.observe_visible(4, ms(t0, 20));
        scroll.observe_visible(6, ms(t0, 40));
        assert_eq!(scroll.tick(ms(t0, 100)), None);
        assert_eq!(scroll.phase(), ScrollPhase::Programmatic { target: 9 });

        scroll.observe_visible(9, ms(t0, 120));
        assert_eq!(scroll.phase(), ScrollPhase::Idle);
        assert_eq!(scroll.tick(ms(t0, 330)), Some(9));
    }

    #[test]
    fn stalled_jump_times_out_back_to_idle() {
        let t0 = Instant::now();
        let mut scroll = coordinator();

        scroll.request_scroll(9, true, true, t0).unwrap();
        scroll.tick(ms(t0, 350));
        assert_eq!(scroll.phase(), ScrollPhase::Idle);

        // The dedupe window died with the jump.
        assert!(scroll
            .request_scroll(9, true, true, ms(t0, 360))
            .unwrap()
            .is_some());
    }

    #[test]
    fn user_scroll_overrides_a_jump_in_flight() {
        let t0 = Instant::now();
        let mut scroll = coordinator();

        scroll.request_scroll(9, true, true, t0).unwrap();
        scroll.on_user_scroll(ms(t0, 50));
        assert_eq!(scroll.phase(), ScrollPhase::UserScrolling);

        // Pages the user lands on report normally again.
        scroll.observe_visible(4, ms(t0, 80));
        assert_eq!(scroll.tick(ms(t0, 280)), Some(4));
    }

    #[test]
    fn reset_clears_phase_targets_and_deadlines() {
        let t0 = Instant::now();
        let mut scroll = coordinator();

        scroll.request_scroll(5, true, true, t0).unwrap();
        scroll.observe_visible(5, ms(t0, 10));
        scroll.reset();

        assert_eq!(scroll.phase(), ScrollPhase::Idle);
        assert_eq!(scroll.tick(ms(t0, 500)), None);
        assert!(scroll
            .request_scroll(5, true, true, ms(t0, 510))
            .unwrap()
            .is_some());
    }
}
