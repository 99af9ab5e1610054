//! The Replicator's connection state machine (spec.md §4.5).

/// One state per row of spec.md §4.5's state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Stopped,
    Connecting,
    Idle,
    Busy,
    Stopping,
    Offline,
}

/// Events that can drive a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Start,
    WebSocketUpgraded,
    ConnectFailedFatal,
    ConnectFailedRetryable,
    LocalChangeOrIncomingMessage,
    QueueDrained,
    ErrorRetryable,
    ErrorFatal,
    Stop,
    Suspend,
    SocketClosedCleanly,
    SocketClosedRetryable,
    RetryTimerFired,
    HostReachable,
    Retry,
}

/// `ConnectionState::transition` return value: the new state plus whether
/// this transition should arm the retry timer (entering `Offline`) or reset
/// the retry counter (a successful `Idle` entry, or an explicit
/// `retry(resetCount=true)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub to: ConnectionState,
    pub reset_retry_count: bool,
    pub arm_retry_timer: bool,
}

impl ConnectionState {
    fn to(state: ConnectionState) -> Transition {
        Transition { to: state, reset_retry_count: false, arm_retry_timer: false }
    }

    /// Applies `event` to `self`, returning the transition taken. Events
    /// that don't apply to the current state are a no-op (`to == self`);
    /// callers that need to detect an invalid event should compare
    /// `transition.to` against the prior state.
    pub fn transition(self, event: ConnectionEvent) -> Transition {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self, event) {
            (S::Stopped, E::Start) => Self::to(S::Connecting),

            (S::Connecting, E::WebSocketUpgraded) => {
                Transition { to: S::Idle, reset_retry_count: true, arm_retry_timer: false }
            }
            (S::Connecting, E::ConnectFailedFatal) => Self::to(S::Stopped),
            (S::Connecting, E::ConnectFailedRetryable) => {
                Transition { to: S::Offline, reset_retry_count: false, arm_retry_timer: true }
            }

            (S::Idle, E::LocalChangeOrIncomingMessage) => Self::to(S::Busy),
            (S::Idle, E::Stop) => Self::to(S::Stopping),
            (S::Idle, E::Suspend) => Self::to(S::Stopping),

            (S::Busy, E::QueueDrained) => Self::to(S::Idle),
            (S::Busy, E::ErrorRetryable) => {
                Transition { to: S::Offline, reset_retry_count: false, arm_retry_timer: true }
            }
            (S::Busy, E::ErrorFatal) => Self::to(S::Stopped),

            (S::Stopping, E::SocketClosedCleanly) => Self::to(S::Stopped),
            (S::Stopping, E::SocketClosedRetryable) => {
                Transition { to: S::Offline, reset_retry_count: false, arm_retry_timer: true }
            }

            (S::Offline, E::RetryTimerFired) => Self::to(S::Connecting),
            (S::Offline, E::HostReachable) => Self::to(S::Connecting),
            (S::Offline, E::Retry) => Transition { to: S::Connecting, reset_retry_count: true, arm_retry_timer: false },

            (other, _) => Self::to(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionEvent as E;
    use ConnectionState as S;

    #[test]
    fn start_moves_stopped_to_connecting() {
        assert_eq!(S::Stopped.transition(E::Start).to, S::Connecting);
    }

    #[test]
    fn successful_upgrade_resets_retry_count() {
        let t = S::Connecting.transition(E::WebSocketUpgraded);
        assert_eq!(t.to, S::Idle);
        assert!(t.reset_retry_count);
    }

    #[test]
    fn retryable_connect_failure_goes_offline_and_arms_timer() {
        let t = S::Connecting.transition(E::ConnectFailedRetryable);
        assert_eq!(t.to, S::Offline);
        assert!(t.arm_retry_timer);
    }

    #[test]
    fn fatal_connect_failure_goes_to_stopped() {
        assert_eq!(S::Connecting.transition(E::ConnectFailedFatal).to, S::Stopped);
    }

    #[test]
    fn idle_to_busy_on_activity_and_back_on_drain() {
        assert_eq!(S::Idle.transition(E::LocalChangeOrIncomingMessage).to, S::Busy);
        assert_eq!(S::Busy.transition(E::QueueDrained).to, S::Idle);
    }

    #[test]
    fn stop_from_idle_goes_to_stopping_then_stopped() {
        assert_eq!(S::Idle.transition(E::Stop).to, S::Stopping);
        assert_eq!(S::Stopping.transition(E::SocketClosedCleanly).to, S::Stopped);
    }

    #[test]
    fn explicit_retry_resets_count_from_offline() {
        let t = S::Offline.transition(E::Retry);
        assert_eq!(t.to, S::Connecting);
        assert!(t.reset_retry_count);
    }

    #[test]
    fn an_event_that_does_not_apply_is_a_no_op() {
        let t = S::Stopped.transition(E::QueueDrained);
        assert_eq!(t.to, S::Stopped);
    }
}
