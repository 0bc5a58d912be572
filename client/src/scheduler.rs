use std::time::{Duration, Instant};

use crate::config::PollIntervals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollKind {
    Full,
    Route,
    Chart,
}

impl PollKind {
    pub const ALL: [PollKind; 3] = [PollKind::Full, PollKind::Route, PollKind::Chart];

    pub fn as_str(self) -> &'static str {
        match self {
            PollKind::Full => "full",
            PollKind::Route => "route",
            PollKind::Chart => "chart",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Fired,
    Disabled,
    Hidden,
    InFlight,
    NotDue,
}

#[derive(Debug, Clone)]
pub struct PollTask {
    pub interval: Duration,
    pub enabled: bool,
    pub in_flight: bool,
    pub last_fired: Option<Instant>,
}

impl PollTask {
    fn new(interval: Duration, enabled: bool) -> Self {
        Self {
            interval,
            enabled,
            in_flight: false,
            last_fired: None,
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        self.last_fired
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }
}

#[derive(Debug, Clone)]
pub struct PollScheduler {
    full: PollTask,
    route: PollTask,
    chart: PollTask,
    full_base: Duration,
    full_while_routed: Duration,
    visible: bool,
}

impl PollScheduler {
    /// Full and chart polling start enabled; route polling waits for an
    /// active route.
    pub fn new(intervals: &PollIntervals) -> Self {
        Self {
            full: PollTask::new(intervals.full, true),
            route: PollTask::new(intervals.route, false),
            chart: PollTask::new(intervals.chart, true),
            full_base: intervals.full,
            full_while_routed: intervals.full_while_routed,
            visible: true,
        }
    }

    pub fn task(&self, kind: PollKind) -> &PollTask {
        match kind {
            PollKind::Full => &self.full,
            PollKind::Route => &self.route,
            PollKind::Chart => &self.chart,
        }
    }

    fn task_mut(&mut self, kind: PollKind) -> &mut PollTask {
        match kind {
            PollKind::Full => &mut self.full,
            PollKind::Route => &mut self.route,
            PollKind::Chart => &mut self.chart,
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Marks `kind` in flight if it is enabled, visible, idle and due.
    pub fn try_fire(&mut self, kind: PollKind, now: Instant) -> TickOutcome {
        let visible = self.visible;
        let task = self.task_mut(kind);
        if !task.enabled {
            TickOutcome::Disabled
        } else if !visible {
            TickOutcome::Hidden
        } else if task.in_flight {
            TickOutcome::InFlight
        } else if !task.is_due(now) {
            TickOutcome::NotDue
        } else {
            task.in_flight = true;
            task.last_fired = Some(now);
            TickOutcome::Fired
        }
    }

    pub fn complete(&mut self, kind: PollKind) {
        self.task_mut(kind).in_flight = false;
    }

    /// Disabling keeps any in-flight flag; its result is screened by the caller.
    pub fn set_enabled(&mut self, kind: PollKind, enabled: bool) {
        let task = self.task_mut(kind);
        if enabled && !task.enabled {
            task.last_fired = None;
        }
        task.enabled = enabled;
    }

    pub fn set_interval(&mut self, kind: PollKind, interval: Duration) {
        self.task_mut(kind).interval = interval;
    }

    /// Route polling on, full-state polling slowed down.
    pub fn start_route_polling(&mut self) {
        self.set_enabled(PollKind::Route, true);
        self.set_interval(PollKind::Full, self.full_while_routed);
    }

    pub fn stop_route_polling(&mut self) {
        self.set_enabled(PollKind::Route, false);
        self.set_interval(PollKind::Full, self.full_base);
    }
}
