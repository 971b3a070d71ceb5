//! Shared status state machine
//!
//! Holds the single current [`Status`] for every live session. Sessions only
//! request transitions; redundant requests are dropped and real changes are
//! pushed synchronously to every subscriber in subscription order.

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{info, warn};

use crate::status::Status;

type Listener = Arc<dyn Fn(Status) + Send + Sync>;

struct Inner {
    current: Status,
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
    /// Applied changes not yet delivered, as (previous, new)
    queued: VecDeque<(Status, Status)>,
    /// True while an outer `set_state` is draining `queued`
    draining: bool,
}

/// Process-wide status holder with multi-listener notification
pub struct StateMachine {
    inner: Mutex<Inner>,
    /// Serializes notification so listeners see changes in the order applied
    dispatch: ReentrantMutex<()>,
}

impl StateMachine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                current: Status::Idle,
                next_id: 0,
                listeners: Vec::new(),
                queued: VecDeque::new(),
                draining: false,
            }),
            dispatch: ReentrantMutex::new(()),
        })
    }

    /// Current status
    pub fn current(&self) -> Status {
        self.inner.lock().current
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Request a transition to `status`
    ///
    /// Returns `true` if the status changed. Requesting the current value is
    /// a no-op and notifies nobody. A panicking listener is logged and skipped;
    /// the new status stays committed and the remaining listeners still run.
    ///
    /// A change requested from inside a listener is applied at once but
    /// delivered after the change being dispatched has reached every listener.
    pub fn set_state(&self, status: Status) -> bool {
        let _dispatch = self.dispatch.lock();

        {
            let mut inner = self.inner.lock();
            if inner.current == status {
                return false;
            }
            let previous = inner.current;
            inner.current = status;
            inner.queued.push_back((previous, status));
            if inner.draining {
                return true;
            }
            inner.draining = true;
        }

        loop {
            let (previous, next, listeners) = {
                let mut inner = self.inner.lock();
                let Some((previous, next)) = inner.queued.pop_front() else {
                    inner.draining = false;
                    break;
                };
                let listeners: Vec<Listener> =
                    inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
                (previous, next, listeners)
            };

            info!("Status transition: {} -> {}", previous, next);
            notify(&listeners, next);
        }

        true
    }

    /// Register a listener for status changes
    ///
    /// The listener is not called with the current value, only with later
    /// changes. It stays registered until [`Subscription::unsubscribe`] is
    /// called; dropping the handle does not remove it.
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(Status) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));

        Subscription {
            id,
            machine: Arc::downgrade(self),
        }
    }

    fn remove_listener(&self, id: u64) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(listener_id, _)| *listener_id != id);
        inner.listeners.len() != before
    }
}

fn notify(listeners: &[Listener], status: Status) {
    for (index, listener) in listeners.iter().enumerate() {
        if catch_unwind(AssertUnwindSafe(|| listener(status))).is_err() {
            warn!(
                "Status listener #{} panicked while handling {}",
                index, status
            );
        }
    }
}

/// Handle returned by [`StateMachine::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    machine: Weak<StateMachine>,
}

impl Subscription {
    /// Remove the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.machine.upgrade() {
            Some(machine) => machine.remove_listener(self.id),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(machine: &Arc<StateMachine>) -> (Arc<Mutex<Vec<Status>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = machine.subscribe(move |s| sink.lock().push(s));
        (seen, sub)
    }

    #[test]
    fn test_starts_idle() {
        let machine = StateMachine::new();
        assert_eq!(machine.current(), Status::Idle);
    }

    #[test]
    fn test_redundant_request_is_silent() {
        let machine = StateMachine::new();
        let (seen, _sub) = recorder(&machine);

        assert!(!machine.set_state(Status::Idle));
        assert!(machine.set_state(Status::Thinking));
        assert!(!machine.set_state(Status::Thinking));
        assert!(!machine.set_state(Status::Thinking));

        assert_eq!(*seen.lock(), vec![Status::Thinking]);
    }

    #[test]
    fn test_listeners_called_in_subscription_order() {
        let machine = StateMachine::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            let _ = machine.subscribe(move |s| order.lock().push((tag, s)));
        }

        machine.set_state(Status::Streaming);

        assert_eq!(
            *order.lock(),
            vec![
                ("first", Status::Streaming),
                ("second", Status::Streaming),
                ("third", Status::Streaming),
            ]
        );
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let machine = StateMachine::new();
        let _bad = machine.subscribe(|_| panic!("listener blew up"));
        let (seen, _sub) = recorder(&machine);

        assert!(machine.set_state(Status::Thinking));
        assert_eq!(machine.current(), Status::Thinking);
        assert_eq!(*seen.lock(), vec![Status::Thinking]);

        assert!(machine.set_state(Status::Idle));
        assert_eq!(*seen.lock(), vec![Status::Thinking, Status::Idle]);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let machine = StateMachine::new();
        let (seen, sub) = recorder(&machine);
        assert_eq!(machine.listener_count(), 1);

        machine.set_state(Status::Thinking);
        assert!(sub.unsubscribe());
        assert_eq!(machine.listener_count(), 0);
        machine.set_state(Status::Idle);

        assert_eq!(*seen.lock(), vec![Status::Thinking]);
    }

    #[test]
    fn test_unsubscribe_after_machine_dropped() {
        let machine = StateMachine::new();
        let (_seen, sub) = recorder(&machine);
        drop(machine);
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_listener_may_reenter_machine() {
        let machine = StateMachine::new();
        let weak = Arc::downgrade(&machine);
        let _sub = machine.subscribe(move |s| {
            if let Some(machine) = weak.upgrade() {
                // Reading and re-requesting the same state must not deadlock
                assert_eq!(machine.current(), s);
                assert!(!machine.set_state(s));
            }
        });

        assert!(machine.set_state(Status::Thinking));
    }

    #[test]
    fn test_nested_change_delivered_after_outer_one() {
        let machine = StateMachine::new();
        let weak = Arc::downgrade(&machine);
        let _cancel = machine.subscribe(move |s| {
            if s == Status::Thinking {
                if let Some(machine) = weak.upgrade() {
                    assert!(machine.set_state(Status::Idle));
                }
            }
        });
        let (seen, _sub) = recorder(&machine);

        assert!(machine.set_state(Status::Thinking));

        assert_eq!(machine.current(), Status::Idle);
        assert_eq!(*seen.lock(), vec![Status::Thinking, Status::Idle]);
        assert_eq!(seen.lock().last().copied(), Some(machine.current()));
    }

    #[test]
    fn test_nested_changes_keep_applied_order() {
        let machine = StateMachine::new();
        let weak = Arc::downgrade(&machine);
        let _chain = machine.subscribe(move |s| {
            let next = match s {
                Status::Thinking => Status::Streaming,
                Status::Streaming => Status::Idle,
                Status::Idle => return,
            };
            if let Some(machine) = weak.upgrade() {
                machine.set_state(next);
            }
        });
        let (seen, _sub) = recorder(&machine);

        machine.set_state(Status::Thinking);

        assert_eq!(
            *seen.lock(),
            vec![Status::Thinking, Status::Streaming, Status::Idle]
        );
        assert_eq!(machine.current(), Status::Idle);
    }
}
