use agent_loop_protocol::protocol::Event;
use agent_loop_protocol::protocol::EventMsg;
use agent_loop_protocol::protocol::LoadingEvent;
use tokio::sync::mpsc;
use tracing::trace;

/// Receiving half of a session's event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Sending half of a session's event stream.
///
/// The channel is unbounded: emitting never waits on the consumer, so events
/// can be produced from any point of a turn (including `Drop`) without
/// reordering. Events sent after the receiver is gone are discarded.
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    tx_event: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    pub(crate) fn new() -> (Self, EventReceiver) {
        let (tx_event, rx_event) = mpsc::unbounded_channel();
        (Self { tx_event }, rx_event)
    }

    pub(crate) fn send(&self, turn_id: &str, msg: EventMsg) {
        let event = Event {
            id: turn_id.to_string(),
            msg,
        };
        if let Err(e) = self.tx_event.send(event) {
            trace!("dropping event, receiver is gone: {}", e.0.msg);
        }
    }
}

/// Emits `Loading(true)` when created and `Loading(false)` when dropped, so a
/// request abandoned on any path (error, cancellation, a dropped `run`
/// future) still closes its bracket.
pub(crate) struct LoadingGuard<'a> {
    events: &'a EventSender,
    turn_id: &'a str,
}

impl<'a> LoadingGuard<'a> {
    pub(crate) fn start(events: &'a EventSender, turn_id: &'a str) -> Self {
        events.send(turn_id, EventMsg::Loading(LoadingEvent { loading: true }));
        Self { events, turn_id }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.events
            .send(self.turn_id, EventMsg::Loading(LoadingEvent { loading: false }));
    }
}
