/// Per-session event bus. Handlers run sequentially in subscription order;
/// a handler may emit further events (the nested emission completes first)
/// and may drop itself by returning `true`.

use log::info;
use std::mem;

use crate::core::session::{SessionError, SessionState};
use crate::schema::event::{EventArgs, EventName, EVENT_COUNT};

/// `Ok(true)` unsubscribes the handler after this call.
pub type EventHandler =
    Box<dyn FnMut(&EventArgs, &mut EventBus, &mut SessionState) -> Result<bool, SessionError>>;

/// Ticket for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: EventHandler,
}

pub struct EventBus {
    slots: [Vec<Subscription>; EVENT_COUNT],
    next_id: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Vec::new()),
            next_id: 0,
        }
    }

    pub fn subscribe(&mut self, event: EventName, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.slots[event.index()].push(Subscription { id, handler });
        id
    }

    pub fn unsubscribe(&mut self, event: EventName, id: SubscriptionId) {
        self.slots[event.index()].retain(|sub| sub.id != id);
    }

    pub fn handler_count(&self, event: EventName) -> usize {
        self.slots[event.index()].len()
    }

    /// Drops every subscription. Sessions call this on teardown.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.clear();
        }
        info!("event bus reset");
    }

    /// Runs the event's handlers in subscription order. The slot is taken out
    /// for the duration of the dispatch, which is what makes re-entrant
    /// emission safe; survivors are reinstalled ahead of anything subscribed
    /// during dispatch. An erroring handler stays subscribed and aborts the
    /// remainder of the dispatch.
    pub fn emit(
        &mut self,
        event: EventName,
        args: EventArgs,
        state: &mut SessionState,
    ) -> Result<(), SessionError> {
        if !args.fits(event) {
            return Err(SessionError::EventArity { event });
        }
        info!("emitted {}{}", event, args);

        let pending = mem::take(&mut self.slots[event.index()]);
        let mut kept: Vec<Subscription> = Vec::with_capacity(pending.len());
        let mut pending = pending.into_iter();
        let mut failure = None;

        for mut sub in pending.by_ref() {
            match (sub.handler)(&args, self, state) {
                Ok(true) => {}
                Ok(false) => kept.push(sub),
                Err(err) => {
                    kept.push(sub);
                    failure = Some(err);
                    break;
                }
            }
        }
        kept.extend(pending);
        let added = mem::take(&mut self.slots[event.index()]);
        kept.extend(added);
        self.slots[event.index()] = kept;

        match failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::progress::ProgressRecord;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn state() -> SessionState {
        SessionState::new("ada", "rust-101", ProgressRecord::default())
    }

    fn probe(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> EventHandler {
        let log = Rc::clone(log);
        Box::new(move |_, _, _| {
            log.borrow_mut().push(tag);
            Ok(false)
        })
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let mut bus = EventBus::new();
        let mut state = state();
        let log = Rc::new(RefCell::new(Vec::new()));
        bus.subscribe(EventName::CourseStart, probe(&log, "first"));
        bus.subscribe(EventName::CourseStart, probe(&log, "second"));

        bus.emit(EventName::CourseStart, EventArgs::None, &mut state)
            .unwrap();
        assert_eq!(*log.borrow(), ["first", "second"]);
    }

    #[test]
    fn returning_true_unsubscribes() {
        let mut bus = EventBus::new();
        let mut state = state();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = Rc::clone(&log);
            bus.subscribe(
                EventName::ModuleStart,
                Box::new(move |_, _, _| {
                    log.borrow_mut().push("once");
                    Ok(true)
                }),
            );
        }

        bus.emit(EventName::ModuleStart, EventArgs::Module(1), &mut state)
            .unwrap();
        bus.emit(EventName::ModuleStart, EventArgs::Module(1), &mut state)
            .unwrap();
        assert_eq!(*log.borrow(), ["once"]);
        assert_eq!(bus.handler_count(EventName::ModuleStart), 0);
    }

    #[test]
    fn unsubscribe_by_id() {
        let mut bus = EventBus::new();
        let mut state = state();
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = bus.subscribe(EventName::LessonEnd, probe(&log, "dropped"));
        bus.subscribe(EventName::LessonEnd, probe(&log, "kept"));
        bus.unsubscribe(EventName::LessonEnd, id);

        bus.emit(EventName::LessonEnd, EventArgs::Lesson(1, 1), &mut state)
            .unwrap();
        assert_eq!(*log.borrow(), ["kept"]);
    }

    #[test]
    fn nested_emission_completes_first() {
        let mut bus = EventBus::new();
        let mut state = state();
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let log = Rc::clone(&log);
            bus.subscribe(
                EventName::ModuleStart,
                Box::new(move |_, bus, state| {
                    log.borrow_mut().push("outer");
                    bus.emit(EventName::CourseStart, EventArgs::None, state)?;
                    Ok(false)
                }),
            );
        }
        bus.subscribe(EventName::ModuleStart, probe(&log, "outer-second"));
        bus.subscribe(EventName::CourseStart, probe(&log, "nested"));

        bus.emit(EventName::ModuleStart, EventArgs::Module(2), &mut state)
            .unwrap();
        assert_eq!(*log.borrow(), ["outer", "nested", "outer-second"]);
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let mut bus = EventBus::new();
        let mut state = state();
        let err = bus
            .emit(EventName::CourseStart, EventArgs::Module(1), &mut state)
            .unwrap_err();
        assert!(matches!(err, SessionError::EventArity { .. }));
    }

    #[test]
    fn reset_clears_everything() {
        let mut bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        bus.subscribe(EventName::CourseStart, probe(&log, "a"));
        bus.subscribe(EventName::TestEnd, probe(&log, "b"));
        bus.reset();
        assert_eq!(bus.handler_count(EventName::CourseStart), 0);
        assert_eq!(bus.handler_count(EventName::TestEnd), 0);
    }

    #[test]
    fn erroring_handler_stays_and_stops_dispatch() {
        let mut bus = EventBus::new();
        let mut state = state();
        let log = Rc::new(RefCell::new(Vec::new()));
        bus.subscribe(
            EventName::CourseEnd,
            Box::new(|_, _, _| {
                Err(SessionError::UnknownVariable("boom".to_string()))
            }),
        );
        bus.subscribe(EventName::CourseEnd, probe(&log, "after"));

        assert!(bus
            .emit(EventName::CourseEnd, EventArgs::None, &mut state)
            .is_err());
        assert!(log.borrow().is_empty());
        assert_eq!(bus.handler_count(EventName::CourseEnd), 2);
    }
}
