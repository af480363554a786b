use crate::{backoff::ExponentialBackoff, Config};
use std::time::Duration;
use tokio::time::Instant;

/// Where the scheduler is in its rebuild cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum State {
    /// The emitted configuration is current.
    Idle,
    /// A generation is pending.
    Dirty,
    /// A generation is running and nothing has changed since it started.
    Generating,
    /// A generation is running and another must follow it.
    GeneratingDirty,
}

/// The scheduler's state transitions and timers, independent of any I/O.
#[derive(Debug)]
pub(crate) struct Machine {
    state: State,
    /// When the current dirty period began; bounds how long events may keep
    /// postponing a generation.
    first_dirty: Option<Instant>,
    last_event: Option<Instant>,
    /// Retries may not start before this instant.
    not_before: Option<Instant>,
    failures: u32,
    backoff: ExponentialBackoff,
    debounce: Duration,
    max_delay: Duration,
}

// === impl State ===

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dirty => "dirty",
            Self::Generating => "generating",
            Self::GeneratingDirty => "generating_dirty",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Machine ===

impl Machine {
    /// Starts dirty, so that the first generation rebuilds the index from
    /// whatever has been observed by then.
    pub(crate) fn new(config: &Config, now: Instant) -> Self {
        Self {
            state: State::Dirty,
            first_dirty: Some(now),
            last_event: Some(now),
            not_before: None,
            failures: 0,
            backoff: ExponentialBackoff::new(config.backoff_base, config.backoff_max),
            debounce: config.debounce,
            max_delay: config.max_delay,
        }
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }

    pub(crate) fn dirty(&mut self, now: Instant) {
        match self.state {
            State::Idle => self.begin_dirty(now),
            State::Dirty => self.last_event = Some(now),
            State::Generating => self.state = State::GeneratingDirty,
            State::GeneratingDirty => {}
        }
    }

    /// Drops a pending debounce. A running generation is rerun once it
    /// completes.
    pub(crate) fn cancel(&mut self) {
        match self.state {
            State::Dirty => {
                self.state = State::Idle;
                self.first_dirty = None;
                self.last_event = None;
            }
            State::Generating => self.state = State::GeneratingDirty,
            State::Idle | State::GeneratingDirty => {}
        }
    }

    /// When the pending generation should launch, if one is pending.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        if self.state != State::Dirty {
            return None;
        }
        let first = self.first_dirty?;
        let last = self.last_event.unwrap_or(first);
        let fire = (last + self.debounce).min(first + self.max_delay);
        Some(match self.not_before {
            Some(not_before) => fire.max(not_before),
            None => fire,
        })
    }

    /// Records the launch of a generation, returning how long the dirty
    /// period lasted.
    pub(crate) fn launch(&mut self, now: Instant) -> Duration {
        let waited = self
            .first_dirty
            .take()
            .map_or(Duration::ZERO, |first| now.saturating_duration_since(first));
        self.last_event = None;
        self.state = State::Generating;
        waited
    }

    pub(crate) fn succeeded(&mut self, now: Instant) {
        self.failures = 0;
        self.backoff.reset();
        self.not_before = None;
        match self.state {
            State::GeneratingDirty => self.begin_dirty(now),
            _ => self.state = State::Idle,
        }
    }

    /// Records a failed generation and schedules its retry, returning the
    /// back-off delay.
    pub(crate) fn failed(&mut self, now: Instant) -> Duration {
        self.failures += 1;
        let delay = self.backoff.next();
        self.not_before = Some(now + delay);
        self.begin_dirty(now);
        delay
    }

    /// The in-flight generation was abandoned at shutdown.
    pub(crate) fn abandoned(&mut self) {
        self.state = State::Idle;
        self.first_dirty = None;
        self.last_event = None;
    }

    fn begin_dirty(&mut self, now: Instant) {
        self.state = State::Dirty;
        self.first_dirty = Some(now);
        self.last_event = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MS: Duration = Duration::from_millis(1);

    fn config() -> Config {
        Config {
            debounce: 250 * MS,
            max_delay: 2000 * MS,
            backoff_base: 100 * MS,
            backoff_max: 1000 * MS,
            ..Config::default()
        }
    }

    #[test]
    fn starts_dirty() {
        let t0 = Instant::now();
        let m = Machine::new(&config(), t0);
        assert_eq!(m.state(), State::Dirty);
        assert_eq!(m.deadline(), Some(t0 + 250 * MS));
    }

    #[test]
    fn events_extend_the_debounce_up_to_the_cap() {
        let t0 = Instant::now();
        let mut m = Machine::new(&config(), t0);
        m.dirty(t0 + 100 * MS);
        assert_eq!(m.deadline(), Some(t0 + 350 * MS));
        m.dirty(t0 + 1900 * MS);
        assert_eq!(m.deadline(), Some(t0 + 2000 * MS));
    }

    #[test]
    fn events_during_generation_schedule_one_rerun() {
        let t0 = Instant::now();
        let mut m = Machine::new(&config(), t0);
        assert_eq!(m.launch(t0 + 250 * MS), 250 * MS);
        assert_eq!(m.state(), State::Generating);
        assert_eq!(m.deadline(), None);

        m.dirty(t0 + 300 * MS);
        m.dirty(t0 + 400 * MS);
        assert_eq!(m.state(), State::GeneratingDirty);

        m.succeeded(t0 + 500 * MS);
        assert_eq!(m.state(), State::Dirty);
        assert_eq!(m.deadline(), Some(t0 + 750 * MS));

        m.launch(t0 + 750 * MS);
        m.succeeded(t0 + 800 * MS);
        assert_eq!(m.state(), State::Idle);
        assert_eq!(m.deadline(), None);
    }

    #[test]
    fn failures_back_off() {
        let t0 = Instant::now();
        let mut m = Machine::new(&config(), t0);
        m.launch(t0);
        assert_eq!(m.failed(t0), 100 * MS);
        assert_eq!(m.state(), State::Dirty);
        // The debounce is longer than the first back-off.
        assert_eq!(m.deadline(), Some(t0 + 250 * MS));

        m.launch(t0 + 250 * MS);
        assert_eq!(m.failed(t0 + 250 * MS), 200 * MS);
        m.launch(t0 + 500 * MS);
        assert_eq!(m.failed(t0 + 500 * MS), 400 * MS);
        assert_eq!(m.deadline(), Some(t0 + 900 * MS));
        assert_eq!(m.failures(), 3);

        m.launch(t0 + 900 * MS);
        m.succeeded(t0 + 950 * MS);
        assert_eq!(m.failures(), 0);
        assert_eq!(m.state(), State::Idle);

        // Back-off starts over.
        m.dirty(t0 + 1000 * MS);
        m.launch(t0 + 1250 * MS);
        assert_eq!(m.failed(t0 + 1250 * MS), 100 * MS);
    }

    #[test]
    fn cancel() {
        let t0 = Instant::now();
        let mut m = Machine::new(&config(), t0);
        m.cancel();
        assert_eq!(m.state(), State::Idle);
        assert_eq!(m.deadline(), None);

        m.dirty(t0);
        m.launch(t0 + 250 * MS);
        m.cancel();
        assert_eq!(m.state(), State::GeneratingDirty);
        m.succeeded(t0 + 300 * MS);
        assert_eq!(m.state(), State::Dirty);
    }
}
