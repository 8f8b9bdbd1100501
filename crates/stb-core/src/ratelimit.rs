use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::domain::UserId;

/// What kind of interaction is being throttled. Each class carries its own
/// window so a burst of button taps does not eat into the message budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionClass {
    Message,
    Callback,
    TicketCreate,
    /// Ticket-completion taps (confirm/cancel) are never throttled; a stale
    /// gate here would strand a staged reply.
    TicketCompletion,
}

/// Per-user fixed-window cooldowns.
///
/// Unlike a token bucket there is no refill curve: an action is allowed iff
/// the previous accepted action of the same class is at least one window in
/// the past. Admins bypass the gate entirely.
#[derive(Debug)]
pub struct CooldownGate {
    message_window: Duration,
    callback_window: Duration,
    ticket_create_window: Duration,
    admins: Vec<i64>,
    last_accepted: HashMap<(UserId, ActionClass), Instant>,
}

impl CooldownGate {
    pub fn new(
        message_window: Duration,
        callback_window: Duration,
        ticket_create_window: Duration,
        admins: Vec<i64>,
    ) -> Self {
        Self {
            message_window,
            callback_window,
            ticket_create_window,
            admins,
            last_accepted: HashMap::new(),
        }
    }

    fn window(&self, class: ActionClass) -> Option<Duration> {
        match class {
            ActionClass::Message => Some(self.message_window),
            ActionClass::Callback => Some(self.callback_window),
            ActionClass::TicketCreate => Some(self.ticket_create_window),
            ActionClass::TicketCompletion => None,
        }
    }

    pub fn check(&mut self, user_id: UserId, class: ActionClass) -> (bool, Option<Duration>) {
        self.check_at(user_id, class, Instant::now())
    }

    /// Returns `(allowed, retry_in)`. An allowed action arms the window; a
    /// denied one does not, so hammering never pushes the deadline out.
    pub fn check_at(
        &mut self,
        user_id: UserId,
        class: ActionClass,
        now: Instant,
    ) -> (bool, Option<Duration>) {
        if self.admins.contains(&user_id.0) {
            return (true, None);
        }
        let Some(window) = self.window(class) else {
            return (true, None);
        };
        if window.is_zero() {
            return (true, None);
        }

        if let Some(last) = self.last_accepted.get(&(user_id, class)) {
            let elapsed = now.duration_since(*last);
            if elapsed < window {
                return (false, Some(window - elapsed));
            }
        }

        self.last_accepted.insert((user_id, class), now);
        (true, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(admins: Vec<i64>) -> CooldownGate {
        CooldownGate::new(
            Duration::from_millis(2000),
            Duration::from_millis(2000),
            Duration::from_millis(10_000),
            admins,
        )
    }

    #[test]
    fn second_message_inside_window_is_denied() {
        let start = Instant::now();
        let mut g = gate(vec![]);
        let u = UserId(1);

        assert!(g.check_at(u, ActionClass::Message, start).0);
        let (ok, retry) = g.check_at(u, ActionClass::Message, start + Duration::from_millis(500));
        assert!(!ok);
        assert_eq!(retry, Some(Duration::from_millis(1500)));
        assert!(g.check_at(u, ActionClass::Message, start + Duration::from_millis(2000)).0);
    }

    #[test]
    fn denied_attempt_does_not_extend_window() {
        let start = Instant::now();
        let mut g = gate(vec![]);
        let u = UserId(1);

        assert!(g.check_at(u, ActionClass::Message, start).0);
        // Hammering at 1.9s is denied but must not re-arm the window.
        assert!(!g.check_at(u, ActionClass::Message, start + Duration::from_millis(1900)).0);
        assert!(g.check_at(u, ActionClass::Message, start + Duration::from_millis(2100)).0);
    }

    #[test]
    fn classes_are_independent() {
        let start = Instant::now();
        let mut g = gate(vec![]);
        let u = UserId(1);

        assert!(g.check_at(u, ActionClass::Message, start).0);
        assert!(g.check_at(u, ActionClass::Callback, start).0);
        assert!(g.check_at(u, ActionClass::TicketCreate, start).0);
    }

    #[test]
    fn ticket_create_uses_long_window() {
        let start = Instant::now();
        let mut g = gate(vec![]);
        let u = UserId(1);

        assert!(g.check_at(u, ActionClass::TicketCreate, start).0);
        assert!(!g.check_at(u, ActionClass::TicketCreate, start + Duration::from_secs(5)).0);
        assert!(g.check_at(u, ActionClass::TicketCreate, start + Duration::from_secs(10)).0);
    }

    #[test]
    fn ticket_completion_is_never_throttled() {
        let start = Instant::now();
        let mut g = gate(vec![]);
        let u = UserId(1);

        for _ in 0..5 {
            assert!(g.check_at(u, ActionClass::TicketCompletion, start).0);
        }
    }

    #[test]
    fn admins_bypass_all_classes() {
        let start = Instant::now();
        let mut g = gate(vec![42]);
        let u = UserId(42);

        for _ in 0..5 {
            assert!(g.check_at(u, ActionClass::Message, start).0);
            assert!(g.check_at(u, ActionClass::TicketCreate, start).0);
        }
    }

    #[test]
    fn users_do_not_share_windows() {
        let start = Instant::now();
        let mut g = gate(vec![]);

        assert!(g.check_at(UserId(1), ActionClass::Message, start).0);
        assert!(g.check_at(UserId(2), ActionClass::Message, start).0);
    }
}
