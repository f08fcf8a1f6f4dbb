//! # Connection State Machine
//!
//! ```text
//!              join                 opened
//! Disconnected ────► Connecting{n} ────────► Connected
//!      ▲  ▲              │   ▲                  │
//!      │  │ clean close  │   │ reconnect due    │ unclean close
//!      │  └──────────────┘   │                  ▼
//!      │               Reconnecting{n} ◄── attempts left?
//!      │ join                                   │ no
//!    Failed ◄───────────────────────────────────┘
//! ```
//!
//! Transitions are pure: [`ConnectionState::transition`] returns the next
//! state and the side effect the runtime must perform. Timers and sockets
//! live in the runtime, which makes every path here unit-testable.

use std::fmt;
use std::time::Duration;

/// Default delay unit between reconnect attempts.
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_millis(1000);
/// Default attempt ceiling.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Linear reconnect policy: attempt `n` waits `n * base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay unit.
    pub base_delay: Duration,
    /// Attempts allowed after an unclean close before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RECONNECT_BASE,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Policy that never reconnects.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(DEFAULT_RECONNECT_BASE, 0)
    }

    /// Delay before 1-based attempt `attempt`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(attempt)
            .unwrap_or(Duration::MAX)
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session joined.
    #[default]
    Disconnected,
    /// Socket being opened. `attempt` is 0 for the initial connect.
    Connecting {
        /// Reconnect attempt this connect belongs to.
        attempt: u32,
    },
    /// Socket open.
    Connected,
    /// Waiting for the reconnect delay to elapse.
    Reconnecting {
        /// Upcoming attempt (1-based).
        attempt: u32,
    },
    /// Reconnect attempts exhausted.
    Failed {
        /// Attempts made.
        attempts: u32,
    },
}

/// Something that happened to the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionInput {
    /// Caller asked to join.
    Join,
    /// Socket handshake completed.
    Opened,
    /// Socket closed or failed to open.
    Closed {
        /// Closing handshake completed.
        clean: bool,
    },
    /// Reconnect delay elapsed.
    ReconnectDue,
    /// Caller asked to leave.
    Leave,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a socket.
    Open,
    /// Close the current socket.
    Close,
    /// Wait `delay`, then feed [`ConnectionInput::ReconnectDue`].
    ScheduleReconnect {
        /// Upcoming attempt (1-based).
        attempt: u32,
        /// Delay before it.
        delay: Duration,
    },
    /// Stop reconnecting.
    GiveUp {
        /// Attempts made.
        attempts: u32,
    },
}

/// Result of [`ConnectionState::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Next state.
    pub state: ConnectionState,
    /// Side effect to perform, if any.
    pub action: Option<ConnectionAction>,
}

impl Transition {
    const fn stay(state: ConnectionState) -> Self {
        Self {
            state,
            action: None,
        }
    }

    const fn to(state: ConnectionState, action: ConnectionAction) -> Self {
        Self {
            state,
            action: Some(action),
        }
    }
}

impl ConnectionState {
    /// Compute the next state for `input`.
    #[must_use]
    pub fn transition(self, input: ConnectionInput, policy: &ReconnectPolicy) -> Transition {
        use ConnectionInput as In;
        use ConnectionState as S;

        match (self, input) {
            (S::Disconnected | S::Failed { .. }, In::Join) => {
                Transition::to(S::Connecting { attempt: 0 }, ConnectionAction::Open)
            }
            (S::Connecting { .. } | S::Connected | S::Reconnecting { .. }, In::Join) => {
                Transition::stay(self)
            }

            (S::Connecting { .. }, In::Opened) => Transition::stay(S::Connected),
            // A socket finished opening after the caller left.
            (_, In::Opened) => Transition::to(self, ConnectionAction::Close),

            (S::Connected | S::Connecting { .. }, In::Closed { clean: true }) => {
                Transition::stay(S::Disconnected)
            }
            (S::Connected, In::Closed { clean: false }) => Self::schedule(1, policy),
            (S::Connecting { attempt }, In::Closed { clean: false }) => {
                Self::schedule(attempt.saturating_add(1), policy)
            }
            (_, In::Closed { .. }) => Transition::stay(self),

            (S::Reconnecting { attempt }, In::ReconnectDue) => {
                Transition::to(S::Connecting { attempt }, ConnectionAction::Open)
            }
            (_, In::ReconnectDue) => Transition::stay(self),

            (S::Connecting { .. } | S::Connected, In::Leave) => {
                Transition::to(S::Disconnected, ConnectionAction::Close)
            }
            (_, In::Leave) => Transition::stay(S::Disconnected),
        }
    }

    fn schedule(attempt: u32, policy: &ReconnectPolicy) -> Transition {
        if attempt <= policy.max_attempts {
            Transition::to(
                Self::Reconnecting { attempt },
                ConnectionAction::ScheduleReconnect {
                    attempt,
                    delay: policy.delay_for_attempt(attempt),
                },
            )
        } else {
            let attempts = attempt - 1;
            Transition::to(
                Self::Failed { attempts },
                ConnectionAction::GiveUp { attempts },
            )
        }
    }

    /// Whether a socket is open, opening, or about to be reopened.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::Connecting { .. } | Self::Connected | Self::Reconnecting { .. }
        )
    }

    /// Whether a socket is open.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting { .. } => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting { attempt } | Self::Reconnecting { attempt } if *attempt > 0 => {
                write!(f, "{} (attempt {attempt})", self.as_str())
            }
            Self::Failed { attempts } => write!(f, "failed after {attempts} attempts"),
            _ => f.write_str(self.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::new(Duration::from_millis(100), 3)
    }

    fn run(inputs: &[ConnectionInput]) -> (ConnectionState, Vec<Option<ConnectionAction>>) {
        let policy = policy();
        let mut state = ConnectionState::default();
        let mut actions = Vec::new();
        for input in inputs {
            let t = state.transition(*input, &policy);
            state = t.state;
            actions.push(t.action);
        }
        (state, actions)
    }

    #[test]
    fn test_linear_delay() {
        let p = policy();
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(300));
        assert_eq!(
            ReconnectPolicy::default().delay_for_attempt(2),
            Duration::from_secs(2)
        );
        assert_eq!(
            ReconnectPolicy::new(Duration::MAX, 2).delay_for_attempt(2),
            Duration::MAX
        );
    }

    #[test]
    fn test_join_open_leave() {
        use ConnectionInput::*;
        let (state, actions) = run(&[Join, Opened, Leave]);
        assert_eq!(state, ConnectionState::Disconnected);
        assert_eq!(
            actions,
            vec![
                Some(ConnectionAction::Open),
                None,
                Some(ConnectionAction::Close)
            ]
        );
    }

    #[test]
    fn test_second_join_is_ignored_while_active() {
        use ConnectionInput::*;
        let (state, actions) = run(&[Join, Join, Opened, Join]);
        assert_eq!(state, ConnectionState::Connected);
        assert_eq!(actions[1], None);
        assert_eq!(actions[3], None);
    }

    #[test]
    fn test_clean_close_does_not_reconnect() {
        use ConnectionInput::*;
        let (state, actions) = run(&[Join, Opened, Closed { clean: true }]);
        assert_eq!(state, ConnectionState::Disconnected);
        assert_eq!(actions[2], None);
    }

    #[test]
    fn test_unclean_close_schedules_one_reconnect() {
        use ConnectionInput::*;
        let (state, actions) = run(&[Join, Opened, Closed { clean: false }]);
        assert_eq!(state, ConnectionState::Reconnecting { attempt: 1 });
        assert_eq!(
            actions[2],
            Some(ConnectionAction::ScheduleReconnect {
                attempt: 1,
                delay: Duration::from_millis(100)
            })
        );
    }

    #[test]
    fn test_attempts_grow_then_give_up() {
        use ConnectionInput::*;
        let (state, actions) = run(&[
            Join,
            Opened,
            Closed { clean: false },
            ReconnectDue,
            Closed { clean: false },
            ReconnectDue,
            Closed { clean: false },
            ReconnectDue,
            Closed { clean: false },
            ReconnectDue,
        ]);

        let delays: Vec<Duration> = actions
            .iter()
            .filter_map(|a| match a {
                Some(ConnectionAction::ScheduleReconnect { delay, .. }) => Some(*delay),
                _ => None,
            })
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300)
            ]
        );
        assert_eq!(actions[8], Some(ConnectionAction::GiveUp { attempts: 3 }));
        assert_eq!(actions[9], None);
        assert_eq!(state, ConnectionState::Failed { attempts: 3 });
    }

    #[test]
    fn test_successful_reconnect_resets_attempts() {
        use ConnectionInput::*;
        let (state, actions) = run(&[
            Join,
            Opened,
            Closed { clean: false },
            ReconnectDue,
            Closed { clean: false },
            ReconnectDue,
            Opened,
            Closed { clean: false },
        ]);
        assert_eq!(state, ConnectionState::Reconnecting { attempt: 1 });
        assert_eq!(
            actions[7],
            Some(ConnectionAction::ScheduleReconnect {
                attempt: 1,
                delay: Duration::from_millis(100)
            })
        );
    }

    #[test]
    fn test_initial_connect_failure_reconnects() {
        use ConnectionInput::*;
        let (state, _) = run(&[Join, Closed { clean: false }]);
        assert_eq!(state, ConnectionState::Reconnecting { attempt: 1 });
    }

    #[test]
    fn test_leave_cancels_pending_reconnect() {
        use ConnectionInput::*;
        let (state, actions) = run(&[Join, Opened, Closed { clean: false }, Leave, ReconnectDue]);
        assert_eq!(state, ConnectionState::Disconnected);
        assert_eq!(actions[3], None);
        assert_eq!(actions[4], None);
    }

    #[test]
    fn test_late_open_after_leave_is_closed() {
        use ConnectionInput::*;
        let (state, actions) = run(&[Join, Leave, Opened]);
        assert_eq!(state, ConnectionState::Disconnected);
        assert_eq!(actions[2], Some(ConnectionAction::Close));
    }

    #[test]
    fn test_join_after_failure_starts_over() {
        let t = ConnectionState::Failed { attempts: 3 }.transition(ConnectionInput::Join, &policy());
        assert_eq!(t.state, ConnectionState::Connecting { attempt: 0 });
        assert_eq!(t.action, Some(ConnectionAction::Open));
    }

    #[test]
    fn test_disabled_policy_fails_immediately() {
        let t = ConnectionState::Connected.transition(
            ConnectionInput::Closed { clean: false },
            &ReconnectPolicy::disabled(),
        );
        assert_eq!(t.state, ConnectionState::Failed { attempts: 0 });
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 2 }.to_string(),
            "reconnecting (attempt 2)"
        );
        assert_eq!(
            ConnectionState::Failed { attempts: 5 }.to_string(),
            "failed after 5 attempts"
        );
    }

    fn input() -> impl Strategy<Value = ConnectionInput> {
        prop_oneof![
            Just(ConnectionInput::Join),
            Just(ConnectionInput::Opened),
            Just(ConnectionInput::Closed { clean: true }),
            Just(ConnectionInput::Closed { clean: false }),
            Just(ConnectionInput::ReconnectDue),
            Just(ConnectionInput::Leave),
        ]
    }

    proptest! {
        #[test]
        fn scheduled_delays_are_linear_and_bounded(inputs in proptest::collection::vec(input(), 0..128)) {
            let policy = policy();
            let mut state = ConnectionState::default();
            for input in inputs {
                let t = state.transition(input, &policy);
                if let Some(ConnectionAction::ScheduleReconnect { attempt, delay }) = t.action {
                    prop_assert!(attempt >= 1 && attempt <= policy.max_attempts);
                    prop_assert_eq!(delay, policy.base_delay * attempt);
                    prop_assert_eq!(t.state, ConnectionState::Reconnecting { attempt });
                }
                if matches!(state, ConnectionState::Failed { .. }) && input != ConnectionInput::Join {
                    prop_assert!(!matches!(t.action, Some(ConnectionAction::ScheduleReconnect { .. } | ConnectionAction::Open)), "Failed state must not reconnect or open");
                }
                state = t.state;
            }
        }
    }
}
