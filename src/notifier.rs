//! Fan-out of state snapshots to subscribers.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use crate::{orchestrator::ExecutionMode, timer::Timer};

/// Everything a front end needs to redraw after a change.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub timers: Vec<Timer>,
    pub execution_mode: ExecutionMode,
    pub repeat_sequence: bool,
    pub is_running: bool,
}

type Callback = Box<dyn FnMut(&Snapshot)>;

struct Subscriber {
    id: u64,
    callback: Callback,
}

/// Subscribers are called in subscription order. Subscribing or
/// unsubscribing from inside a callback is allowed; it takes effect from the
/// next publish, except that an unsubscribed callback is never called again.
#[derive(Default)]
pub struct Notifier {
    subscribers: RefCell<Vec<Subscriber>>,
    removed: RefCell<Vec<u64>>,
    publishing: Cell<bool>,
    next_id: Cell<u64>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl Notifier {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn subscribe(self: &Rc<Self>, callback: impl FnMut(&Snapshot) + 'static) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.subscribers.borrow_mut().push(Subscriber {
            id,
            callback: Box::new(callback),
        });
        Subscription {
            id,
            notifier: Rc::downgrade(self),
        }
    }

    fn unsubscribe(&self, id: u64) {
        if self.publishing.get() {
            // the list is checked out while publishing
            self.removed.borrow_mut().push(id);
        } else {
            self.subscribers.borrow_mut().retain(|s| s.id != id);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn publish(&self, snapshot: &Snapshot) {
        let mut current = std::mem::take(&mut *self.subscribers.borrow_mut());
        self.publishing.set(true);
        for subscriber in &mut current {
            if self.removed.borrow().contains(&subscriber.id) {
                continue;
            }
            (subscriber.callback)(snapshot);
        }
        self.publishing.set(false);
        let mut subscribers = self.subscribers.borrow_mut();
        // anything subscribed during the callbacks goes after the old list
        current.append(&mut subscribers);
        let removed = std::mem::take(&mut *self.removed.borrow_mut());
        current.retain(|s| !removed.contains(&s.id));
        *subscribers = current;
    }
}

/// Handle returned by [`Notifier::subscribe`]. Dropping it keeps the
/// subscription alive; call [`Subscription::unsubscribe`] to end it.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    notifier: Weak<Notifier>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.unsubscribe(self.id);
        }
    }
}
