// Debounce state machine for one container
//
// Pure transitions over (state, event, now). No timers, no I/O: the runner
// in `scheduler/mod.rs` owns the clock and the adapter call, and asks this
// machine what to do.
//
// State Diagram:
//
//                 commit (not suspended)
//   [Idle] ─────────────────────────────▶ [Debouncing]
//     ▲                                     │   ▲  │
//     │                                     │   │  │ commit: deadline moves,
//     │                                     │   └──┘ ceiling does not
//     │                     deadline fires  │
//     │                                     ▼
//     │◀──── nothing buffered ──────── [Dispatching]
//                                           │
//        buffered commit ───────────────────┘──▶ [Debouncing] (fresh window)
//
// A suspended commit never starts a window. During Dispatching it also
// drops whatever was buffered, so the follow-up never goes out.
//

use crate::snapshot::ContainerSnapshot;
use std::time::Duration;
use tokio::time::Instant;

/// Externally visible phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchedulerPhase {
    #[default]
    Idle,
    /// Waiting for the window to close
    Debouncing,
    /// Adapter call in flight
    Dispatching,
}

/// Timing knobs for the debounce window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Quiet period after the last commit before dispatching
    pub debounce: Duration,
    /// Upper bound on how long a window may stay open under continuous commits
    pub max_wait: Duration,
}

impl SchedulerConfig {
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

    pub fn production() -> Self {
        Self {
            debounce: Self::DEFAULT_DEBOUNCE,
            max_wait: Duration::from_secs(2),
        }
    }

    /// Longer ceiling so breakpoints and slow dev builds don't flush mid-burst
    pub fn development() -> Self {
        Self {
            debounce: Self::DEFAULT_DEBOUNCE,
            max_wait: Duration::from_secs(20),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::production()
    }
}

/// What a commit did to the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Suspended while idle or debouncing; nothing changed
    Ignored,
    /// Opened a new window
    Scheduled,
    /// Replaced the pending snapshot and pushed the deadline
    Rescheduled,
    /// Held for after the in-flight dispatch
    Buffered,
    /// Suspended during dispatch; any buffered follow-up was dropped
    Discarded,
}

#[derive(Debug)]
enum State {
    Idle,
    Debouncing {
        pending: ContainerSnapshot,
        deadline: Instant,
        ceiling: Instant,
    },
    Dispatching {
        buffered: Option<ContainerSnapshot>,
    },
}

#[derive(Debug)]
pub struct DebounceMachine {
    config: SchedulerConfig,
    state: State,
}

impl DebounceMachine {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            state: State::Idle,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        match self.state {
            State::Idle => SchedulerPhase::Idle,
            State::Debouncing { .. } => SchedulerPhase::Debouncing,
            State::Dispatching { .. } => SchedulerPhase::Dispatching,
        }
    }

    /// When the open window closes, if one is open
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            State::Debouncing { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    pub fn on_commit(&mut self, snapshot: ContainerSnapshot, now: Instant) -> CommitOutcome {
        match &mut self.state {
            // A window that is already open keeps its earlier snapshot, which
            // still goes out when the deadline passes
            State::Idle | State::Debouncing { .. } if snapshot.suspended => CommitOutcome::Ignored,
            State::Idle => {
                self.state = self.open_window(snapshot, now);
                CommitOutcome::Scheduled
            }
            State::Debouncing {
                pending,
                deadline,
                ceiling,
            } => {
                *pending = snapshot;
                *deadline = (now + self.config.debounce).min(*ceiling);
                CommitOutcome::Rescheduled
            }
            State::Dispatching { buffered } if snapshot.suspended => {
                *buffered = None;
                CommitOutcome::Discarded
            }
            State::Dispatching { buffered } => {
                *buffered = Some(snapshot);
                CommitOutcome::Buffered
            }
        }
    }

    /// Close the window if its deadline has passed, handing out the snapshot
    pub fn begin_dispatch(&mut self, now: Instant) -> Option<ContainerSnapshot> {
        match self.state {
            State::Debouncing { deadline, .. } if deadline <= now => {}
            _ => return None,
        }
        match std::mem::replace(&mut self.state, State::Dispatching { buffered: None }) {
            State::Debouncing { pending, .. } => Some(pending),
            // Unreachable: checked above
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Adapter call returned (either way); pick the next state
    pub fn finish_dispatch(&mut self, now: Instant) -> SchedulerPhase {
        self.state = match std::mem::replace(&mut self.state, State::Idle) {
            State::Dispatching {
                buffered: Some(next),
            } => self.open_window(next, now),
            State::Dispatching { buffered: None } => State::Idle,
            other => other,
        };
        self.phase()
    }

    /// Drop back to Idle, returning whatever was waiting to go out
    pub fn take_pending(&mut self) -> Option<ContainerSnapshot> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Debouncing { pending, .. } => Some(pending),
            State::Dispatching { buffered } => buffered,
            State::Idle => None,
        }
    }

    fn open_window(&self, pending: ContainerSnapshot, now: Instant) -> State {
        State::Debouncing {
            pending,
            deadline: now + self.config.debounce,
            ceiling: now + self.config.max_wait,
        }
    }
}
