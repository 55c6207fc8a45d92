//! Scheduled events.

use crate::simulation::Simulation;
use motesim_common::{NodeId, SimTime};
use std::any::Any;
use std::fmt;

/// Event callback. Runs at most once, with the simulation and its own event.
pub type Handler = Box<dyn FnOnce(&mut Simulation, &mut SimEvent)>;

/// Opaque event payload.
pub type Payload = Box<dyn Any>;

/// What the driver releases after an event has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cleanup {
    /// Release nothing; the whole event is handed back.
    None,
    /// Release the event; its payload is handed back.
    Event,
    /// Release the payload; the event is handed back.
    Payload,
    /// Release both.
    #[default]
    Total,
}

/// Parts of processed events that their cleanup policy did not release.
#[derive(Debug)]
pub enum Retained {
    Event(SimEvent),
    Payload(Payload),
}

/// An event targeting one node at one virtual time.
pub struct SimEvent {
    pub time: SimTime,
    pub node: NodeId,
    pub cleanup: Cleanup,
    /// Run the handler even if the target mote is off.
    pub forced: bool,
    /// Advisory only. The driver does not consult it; handlers may.
    pub cancelled: bool,
    pub payload: Option<Payload>,
    handler: Option<Handler>,
}

impl SimEvent {
    /// Create an event with [`Cleanup::Total`], not forced, without payload.
    pub fn new(
        time: SimTime,
        node: NodeId,
        handler: impl FnOnce(&mut Simulation, &mut SimEvent) + 'static,
    ) -> Self {
        SimEvent {
            time,
            node,
            cleanup: Cleanup::default(),
            forced: false,
            cancelled: false,
            payload: None,
            handler: Some(Box::new(handler)),
        }
    }

    /// An event with no handler. Only its cleanup runs.
    pub fn empty(time: SimTime, node: NodeId) -> Self {
        SimEvent {
            time,
            node,
            cleanup: Cleanup::default(),
            forced: false,
            cancelled: false,
            payload: None,
            handler: None,
        }
    }

    pub fn with_cleanup(mut self, cleanup: Cleanup) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn forced(mut self) -> Self {
        self.forced = true;
        self
    }

    pub fn with_payload<T: Any>(mut self, payload: T) -> Self {
        self.payload = Some(Box::new(payload));
        self
    }

    /// Replace the handler, e.g. before re-inserting a handed-back event.
    pub fn set_handler(&mut self, handler: impl FnOnce(&mut Simulation, &mut SimEvent) + 'static) {
        self.handler = Some(Box::new(handler));
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub(crate) fn take_handler(&mut self) -> Option<Handler> {
        self.handler.take()
    }

    /// Borrow the payload as `T`.
    pub fn payload_ref<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref()?.downcast_ref()
    }

    pub fn payload_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.payload.as_mut()?.downcast_mut()
    }

    /// Apply the cleanup policy, returning whatever it does not release.
    pub(crate) fn clean_up(mut self) -> Option<Retained> {
        match self.cleanup {
            Cleanup::None => Some(Retained::Event(self)),
            Cleanup::Event => self.payload.take().map(Retained::Payload),
            Cleanup::Payload => {
                self.payload = None;
                Some(Retained::Event(self))
            }
            Cleanup::Total => None,
        }
    }
}

impl fmt::Debug for SimEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimEvent")
            .field("time", &self.time)
            .field("node", &self.node)
            .field("cleanup", &self.cleanup)
            .field("forced", &self.forced)
            .field("cancelled", &self.cancelled)
            .field("has_payload", &self.payload.is_some())
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}
