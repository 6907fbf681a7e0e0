//! Single-threaded observer lists.
//!
//! An [`Event`] holds the handlers connected to it; an [`EventHandler`] owns a
//! callback and knows whether it is currently connected. A handler is
//! connected to at most one event at a time, reconnecting moves it, and
//! dropping it disconnects it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

const DISCONNECTED: u64 = 0;

struct HandlerSlot<T> {
    connection: Cell<u64>,
    callback: RefCell<Box<dyn FnMut(&T)>>,
}

pub struct EventHandler<T> {
    slot: Rc<HandlerSlot<T>>,
}

impl<T> EventHandler<T> {
    pub fn new(callback: impl FnMut(&T) + 'static) -> Self {
        Self {
            slot: Rc::new(HandlerSlot {
                connection: Cell::new(DISCONNECTED),
                callback: RefCell::new(Box::new(callback)),
            }),
        }
    }

    pub fn connect(&self, event: &Event<T>) {
        event.connect(self);
    }

    pub fn disconnect(&self) {
        self.slot.connection.set(DISCONNECTED);
    }

    pub fn is_connected(&self) -> bool {
        self.slot.connection.get() != DISCONNECTED
    }
}

impl<T> Drop for EventHandler<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

pub struct Event<T> {
    handlers: RefCell<Vec<(u64, Rc<HandlerSlot<T>>)>>,
}

impl<T> Event<T> {
    pub fn new() -> Self {
        Self {
            handlers: RefCell::new(Vec::new()),
        }
    }

    pub fn connect(&self, handler: &EventHandler<T>) {
        let connection = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
        handler.slot.connection.set(connection);

        let mut handlers = self.handlers.borrow_mut();
        handlers.retain(|(id, slot)| slot.connection.get() == *id);
        handlers.push((connection, Rc::clone(&handler.slot)));
    }

    pub fn handler_count(&self) -> usize {
        self.handlers
            .borrow()
            .iter()
            .filter(|(id, slot)| slot.connection.get() == *id)
            .count()
    }

    pub fn has_handlers(&self) -> bool {
        self.handler_count() > 0
    }

    /// Invokes every connected handler in connection order. Handlers
    /// disconnected by an earlier callback in the same signal are skipped.
    pub fn signal(&self, args: &T) {
        for (id, slot) in self.live_handlers() {
            if slot.connection.get() == id {
                Self::invoke(&slot, args);
            }
        }
    }

    /// Disconnects every handler, then invokes the ones that were connected.
    /// Callbacks may reconnect themselves for the next signal.
    pub fn signal_and_disconnect(&self, args: &T) {
        let live = self.live_handlers();
        self.disconnect_all_handlers();
        for (_, slot) in live {
            Self::invoke(&slot, args);
        }
    }

    pub fn disconnect_all_handlers(&self) {
        let mut handlers = self.handlers.borrow_mut();
        for (id, slot) in handlers.iter() {
            if slot.connection.get() == *id {
                slot.connection.set(DISCONNECTED);
            }
        }
        handlers.clear();
    }

    fn live_handlers(&self) -> Vec<(u64, Rc<HandlerSlot<T>>)> {
        self.handlers
            .borrow()
            .iter()
            .filter(|(id, slot)| slot.connection.get() == *id)
            .map(|(id, slot)| (*id, Rc::clone(slot)))
            .collect()
    }

    fn invoke(slot: &HandlerSlot<T>, args: &T) {
        match slot.callback.try_borrow_mut() {
            Ok(mut callback) => callback(args),
            Err(_) => log::warn!("Skipping re-entrant event handler invocation"),
        }
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Event<T> {
    fn drop(&mut self) {
        self.disconnect_all_handlers();
    }
}
