//! Application event handlers attached to a service.

use super::context::ServiceContext;
use crate::core::block::SessionId;
use crate::core::stream::Stream;
use crate::error::{Error, Result};
use crate::utils::TimeSpan;
use std::fmt;

bitflags::bitflags! {
    /// Events a facade opts into. Handlers outside the set are never called.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FacadeEvents: u16 {
        const START = 1 << 0;
        const STOP = 1 << 1;
        const UPDATE = 1 << 2;
        const IDLE = 1 << 3;
        const DATA_ARRIVAL = 1 << 4;
        const ERROR = 1 << 5;
        const SESSION_CREATE = 1 << 6;
        const SESSION_DESTROY = 1 << 7;

        const LIFECYCLE = Self::START.bits() | Self::STOP.bits();
        const SESSIONS = Self::SESSION_CREATE.bits() | Self::SESSION_DESTROY.bits();
    }
}

/// Registration handle returned by `Service::register_facade`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FacadeId(pub(crate) u64);

impl fmt::Display for FacadeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "facade-{}", self.0)
    }
}

/// An event handler owned by a service.
///
/// Every callback runs on the service's logic thread and receives a
/// [`ServiceContext`] for talking back to the service. Only the callbacks
/// whose bit is set in [`events`](Facade::events) are ever invoked; the
/// default bodies exist so implementors can leave the rest out.
///
/// Returning `Err` (or panicking) from a callback does not stop the
/// service. The failure is routed to facades subscribed to
/// [`FacadeEvents::ERROR`], or to the diagnostic sink when none are.
pub trait Facade: Send {
    /// Name used in diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Subscribed events. Read once, at registration.
    fn events(&self) -> FacadeEvents;

    /// Runs once before the update loop. `Ok(false)` aborts startup.
    fn on_start(&mut self, _ctx: &mut ServiceContext<'_>) -> Result<bool> {
        Ok(true)
    }

    /// Runs once after the update loop has ceased. Errors are only logged.
    fn on_stop(&mut self, _ctx: &mut ServiceContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Runs every tick; `elapsed` is the time since the previous tick began.
    fn on_update(&mut self, _ctx: &mut ServiceContext<'_>, _elapsed: TimeSpan) -> Result<()> {
        Ok(())
    }

    /// Runs on ticks that drained no inbound blocks, fired no timers and
    /// invoked no `on_update` handler.
    /// `idle` is the time left before the next tick is due.
    fn on_idle(&mut self, _ctx: &mut ServiceContext<'_>, _idle: TimeSpan) -> Result<()> {
        Ok(())
    }

    /// Runs once per decoded packet, in dequeue order.
    fn on_data_arrival(
        &mut self,
        _ctx: &mut ServiceContext<'_>,
        _session: SessionId,
        _opcode: u32,
        _payload: &mut Stream,
    ) -> Result<()> {
        Ok(())
    }

    /// Receives failures from other callbacks, timers and the protocol stack.
    fn on_error(&mut self, _ctx: &mut ServiceContext<'_>, _error: &Error) {}

    fn on_session_create(&mut self, _ctx: &mut ServiceContext<'_>, _session: SessionId) -> Result<()> {
        Ok(())
    }

    fn on_session_destroy(
        &mut self,
        _ctx: &mut ServiceContext<'_>,
        _session: SessionId,
    ) -> Result<()> {
        Ok(())
    }
}

/// A registered facade with its subscription captured at registration.
pub(crate) struct FacadeSlot {
    pub(crate) id: FacadeId,
    pub(crate) events: FacadeEvents,
    pub(crate) name: String,
    pub(crate) facade: Box<dyn Facade>,
}

impl FacadeSlot {
    pub(crate) fn new(id: FacadeId, facade: Box<dyn Facade>) -> Self {
        Self {
            id,
            events: facade.events(),
            name: facade.name().to_string(),
            facade,
        }
    }

    pub(crate) fn wants(&self, event: FacadeEvents) -> bool {
        self.events.contains(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;

    impl Facade for Quiet {
        fn events(&self) -> FacadeEvents {
            FacadeEvents::LIFECYCLE
        }
    }

    #[test]
    fn test_slot_captures_subscription() {
        let slot = FacadeSlot::new(FacadeId(3), Box::new(Quiet));
        assert!(slot.wants(FacadeEvents::START));
        assert!(slot.wants(FacadeEvents::STOP));
        assert!(!slot.wants(FacadeEvents::UPDATE));
        assert!(!slot.wants(FacadeEvents::DATA_ARRIVAL));
        assert!(slot.name.ends_with("Quiet"));
        assert_eq!(slot.id.to_string(), "facade-3");
    }
}
