//! Lifecycle events.
//!
//! Handlers are registered explicitly per event and run in registration
//! order. For the halting events a handler returning [`Propagation::Halt`]
//! stops the remaining handlers and aborts the surrounding operation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Creating,
    Created,
    Updating,
    Updated,
    Saving,
    Saved,
    Deleting,
    Deleted,
    Validating,
    Validated,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 10] = [
        Self::Creating,
        Self::Created,
        Self::Updating,
        Self::Updated,
        Self::Saving,
        Self::Saved,
        Self::Deleting,
        Self::Deleted,
        Self::Validating,
        Self::Validated,
    ];

    /// Whether a handler may abort the operation this event precedes.
    #[must_use]
    pub fn is_halting(self) -> bool {
        matches!(
            self,
            Self::Creating | Self::Updating | Self::Saving | Self::Deleting | Self::Validating
        )
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Updating => "updating",
            Self::Updated => "updated",
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Validating => "validating",
            Self::Validated => "validated",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LifecycleEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.name() == s)
            .ok_or_else(|| format!("unknown lifecycle event '{s}'"))
    }
}

/// What a handler wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    #[default]
    Continue,
    Halt,
}

impl Propagation {
    #[must_use]
    pub fn is_halt(self) -> bool {
        self == Self::Halt
    }
}

impl From<bool> for Propagation {
    fn from(proceed: bool) -> Self {
        if proceed { Self::Continue } else { Self::Halt }
    }
}

pub type EventHandler<T> = Arc<dyn Fn(&mut T) -> Propagation + Send + Sync>;

/// Ordered handler lists keyed by lifecycle event.
pub struct EventDispatcher<T> {
    handlers: HashMap<LifecycleEvent, Vec<EventHandler<T>>>,
}

impl<T> Default for EventDispatcher<T> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<T> Clone for EventDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<T> fmt::Debug for EventDispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<(&str, usize)> = self
            .handlers
            .iter()
            .map(|(event, handlers)| (event.name(), handlers.len()))
            .collect();
        counts.sort_unstable();
        f.debug_struct("EventDispatcher")
            .field("handlers", &counts)
            .finish()
    }
}

impl<T> EventDispatcher<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, event: LifecycleEvent, handler: F)
    where
        F: Fn(&mut T) -> Propagation + Send + Sync + 'static,
    {
        self.handlers.entry(event).or_default().push(Arc::new(handler));
    }

    /// Appends the handlers of `other` after the ones already registered.
    pub fn extend(&mut self, other: EventDispatcher<T>) {
        for (event, handlers) in other.handlers {
            self.handlers.entry(event).or_default().extend(handlers);
        }
    }

    #[must_use]
    pub fn listeners(&self, event: LifecycleEvent) -> usize {
        self.handlers.get(&event).map_or(0, Vec::len)
    }

    /// Runs the handlers of `event` against `target`.
    ///
    /// Returns [`Propagation::Halt`] when a handler of a halting event asked
    /// to stop; handlers of non-halting events all run and their answers are
    /// ignored.
    pub fn fire(&self, event: LifecycleEvent, target: &mut T) -> Propagation {
        let Some(handlers) = self.handlers.get(&event) else {
            return Propagation::Continue;
        };

        for handler in handlers {
            if handler(target).is_halt() && event.is_halting() {
                tracing::debug!(event = %event, "lifecycle handler halted propagation");
                return Propagation::Halt;
            }
        }
        Propagation::Continue
    }
}
