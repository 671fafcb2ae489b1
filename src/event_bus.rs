/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which invokes event handlers on the events published by the algorithm thread.

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{events::*, logging::Logger};

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// How long the event bus waits for an event before checking for the shutdown signal again.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Default)]
pub(crate) struct EventHandlers {
    pub(crate) commit_block_handlers: Vec<HandlerPtr<CommitBlockEvent>>,
    pub(crate) update_committed_prepare_handlers: Vec<HandlerPtr<UpdateCommittedPrepareEvent>>,
    pub(crate) propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub(crate) sign_handlers: Vec<HandlerPtr<SignEvent>>,
    pub(crate) commit_handlers: Vec<HandlerPtr<CommitEvent>>,
    pub(crate) view_change_handlers: Vec<HandlerPtr<ViewChangeEvent>>,
    pub(crate) receive_prepare_handlers: Vec<HandlerPtr<ReceivePrepareEvent>>,
    pub(crate) receive_sign_handlers: Vec<HandlerPtr<ReceiveSignEvent>>,
    pub(crate) receive_commit_handlers: Vec<HandlerPtr<ReceiveCommitEvent>>,
    pub(crate) receive_view_change_handlers: Vec<HandlerPtr<ReceiveViewChangeEvent>>,
    pub(crate) start_view_handlers: Vec<HandlerPtr<StartViewEvent>>,
    pub(crate) view_timeout_handlers: Vec<HandlerPtr<ViewTimeoutEvent>>,
}

impl EventHandlers {
    /// Collect the user-defined handlers, plus the default loggers of every event type if `log_events`
    /// is set.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        commit_block_handler: Option<HandlerPtr<CommitBlockEvent>>,
        update_committed_prepare_handler: Option<HandlerPtr<UpdateCommittedPrepareEvent>>,
        propose_handler: Option<HandlerPtr<ProposeEvent>>,
        sign_handler: Option<HandlerPtr<SignEvent>>,
        commit_handler: Option<HandlerPtr<CommitEvent>>,
        view_change_handler: Option<HandlerPtr<ViewChangeEvent>>,
        receive_prepare_handler: Option<HandlerPtr<ReceivePrepareEvent>>,
        receive_sign_handler: Option<HandlerPtr<ReceiveSignEvent>>,
        receive_commit_handler: Option<HandlerPtr<ReceiveCommitEvent>>,
        receive_view_change_handler: Option<HandlerPtr<ReceiveViewChangeEvent>>,
        start_view_handler: Option<HandlerPtr<StartViewEvent>>,
        view_timeout_handler: Option<HandlerPtr<ViewTimeoutEvent>>,
    ) -> EventHandlers {
        fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
            let mut handlers: Vec<HandlerPtr<T>> = user_handler.into_iter().collect();
            if log_events {
                handlers.push(T::get_logger())
            }
            handlers
        }

        EventHandlers {
            commit_block_handlers: handlers(log_events, commit_block_handler),
            update_committed_prepare_handlers: handlers(log_events, update_committed_prepare_handler),
            propose_handlers: handlers(log_events, propose_handler),
            sign_handlers: handlers(log_events, sign_handler),
            commit_handlers: handlers(log_events, commit_handler),
            view_change_handlers: handlers(log_events, view_change_handler),
            receive_prepare_handlers: handlers(log_events, receive_prepare_handler),
            receive_sign_handlers: handlers(log_events, receive_sign_handler),
            receive_commit_handlers: handlers(log_events, receive_commit_handler),
            receive_view_change_handlers: handlers(log_events, receive_view_change_handler),
            start_view_handlers: handlers(log_events, start_view_handler),
            view_timeout_handlers: handlers(log_events, view_timeout_handler),
        }
    }

    /// Check whether no handler at all is registered, in which case no event bus needs to run.
    pub(crate) fn is_empty(&self) -> bool {
        self.commit_block_handlers.is_empty()
            && self.update_committed_prepare_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.sign_handlers.is_empty()
            && self.commit_handlers.is_empty()
            && self.view_change_handlers.is_empty()
            && self.receive_prepare_handlers.is_empty()
            && self.receive_sign_handlers.is_empty()
            && self.receive_commit_handlers.is_empty()
            && self.receive_view_change_handlers.is_empty()
            && self.start_view_handlers.is_empty()
            && self.view_timeout_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::CommitBlock(commit_block_event) => self
                .commit_block_handlers
                .iter()
                .for_each(|handler| handler(&commit_block_event)),

            Event::UpdateCommittedPrepare(update_committed_prepare_event) => self
                .update_committed_prepare_handlers
                .iter()
                .for_each(|handler| handler(&update_committed_prepare_event)),

            Event::Propose(propose_event) => self
                .propose_handlers
                .iter()
                .for_each(|handler| handler(&propose_event)),

            Event::Sign(sign_event) => self
                .sign_handlers
                .iter()
                .for_each(|handler| handler(&sign_event)),

            Event::Commit(commit_event) => self
                .commit_handlers
                .iter()
                .for_each(|handler| handler(&commit_event)),

            Event::ViewChange(view_change_event) => self
                .view_change_handlers
                .iter()
                .for_each(|handler| handler(&view_change_event)),

            Event::ReceivePrepare(receive_prepare_event) => self
                .receive_prepare_handlers
                .iter()
                .for_each(|handler| handler(&receive_prepare_event)),

            Event::ReceiveSign(receive_sign_event) => self
                .receive_sign_handlers
                .iter()
                .for_each(|handler| handler(&receive_sign_event)),

            Event::ReceiveCommit(receive_commit_event) => self
                .receive_commit_handlers
                .iter()
                .for_each(|handler| handler(&receive_commit_event)),

            Event::ReceiveViewChange(receive_view_change_event) => self
                .receive_view_change_handlers
                .iter()
                .for_each(|handler| handler(&receive_view_change_event)),

            Event::StartView(start_view_event) => self
                .start_view_handlers
                .iter()
                .for_each(|handler| handler(&start_view_event)),

            Event::ViewTimeout(view_timeout_event) => self
                .view_timeout_handlers
                .iter()
                .for_each(|handler| handler(&view_timeout_event)),
        }
    }
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from main thread")
            }
        }

        match event_subscriber.recv_timeout(EVENT_POLL_INTERVAL) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => {
                panic!("The algorithm thread (event publisher) was disconnected from the channel")
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{mpsc, Arc, Mutex},
        time::SystemTime,
    };

    use super::*;
    use crate::types::data_types::{BlockHeight, CryptoHash, ViewNumber};

    #[test]
    fn handlers_fire_only_for_their_event_type() {
        let committed = Arc::new(Mutex::new(Vec::new()));
        let committed_in_handler = Arc::clone(&committed);
        let mut handlers = EventHandlers::default();
        assert!(handlers.is_empty());

        handlers.commit_block_handlers.push(Box::new(move |event: &CommitBlockEvent| {
            committed_in_handler.lock().unwrap().push(event.height)
        }));
        assert!(!handlers.is_empty());

        handlers.fire_handlers(Event::CommitBlock(CommitBlockEvent {
            timestamp: SystemTime::now(),
            block: CryptoHash::default(),
            height: BlockHeight::new(1),
            view: ViewNumber::init(),
        }));
        handlers.fire_handlers(Event::ViewTimeout(ViewTimeoutEvent {
            timestamp: SystemTime::now(),
            view: ViewNumber::init(),
            to_view: ViewNumber::new(1),
            timeout: Duration::from_secs(3),
        }));

        assert_eq!(*committed.lock().unwrap(), vec![BlockHeight::new(1)]);
    }

    #[test]
    fn log_events_registers_a_logger_per_event_type() {
        let handlers = EventHandlers::new(
            true, None, None, None, None, None, None, None, None, None, None, None, None,
        );
        assert_eq!(handlers.commit_block_handlers.len(), 1);
        assert_eq!(handlers.view_timeout_handlers.len(), 1);

        let handlers = EventHandlers::new(
            false, None, None, None, None, None, None, None, None, None, None, None, None,
        );
        assert!(handlers.is_empty());
    }

    #[test]
    fn event_bus_stops_on_shutdown_signal() {
        let (event_publisher, event_subscriber) = mpsc::channel::<Event>();
        let (shutdown, shutdown_receiver) = mpsc::channel();
        let event_bus = start_event_bus(EventHandlers::default(), event_subscriber, shutdown_receiver);

        Event::StartView(StartViewEvent {
            timestamp: SystemTime::now(),
            leader: None,
            height: BlockHeight::new(1),
            view: ViewNumber::init(),
        })
        .publish(&Some(event_publisher.clone()));

        shutdown.send(()).unwrap();
        event_bus.join().unwrap();
        drop(event_publisher);
    }
}
