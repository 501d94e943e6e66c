//! Deferred-retry work queue.
//!
//! A synapse is a unit of work that may not be able to run yet. Each
//! [`SynapseQueue::fire`] attempts the head entry; the entry either
//! completes (and is removed) or defers (and stays at the head, blocking
//! everything behind it until a later `fire`).
//!
//! Nothing polls. `fire` is called by whoever observes a change that might
//! let the head proceed: a connection coming up, a busy peer being released,
//! a new request being submitted.
//!
//! ```text
//!   enqueue ──> [ E1 | E2 | E3 ]
//!                 ^
//!                 fire(): attempt E1
//!                   Complete → [ E2 | E3 ]
//!                   Deferred → [ E1 | E2 | E3 ]   (E2 not attempted)
//! ```

mod queue;

use serde::{Deserialize, Serialize};

pub use queue::{FireReport, SynapseQueue};

/// Outcome of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Work done; remove the entry
    Complete,
    /// Preconditions not met; keep the entry at the head
    Deferred,
}

/// How much a single [`SynapseQueue::fire`] drains
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainMode {
    /// Attempt the head once per call
    #[default]
    Single,
    /// Keep attempting heads until the queue is empty or one defers
    Continuous,
}

impl std::str::FromStr for DrainMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" | "one" => Ok(Self::Single),
            "continuous" | "all" => Ok(Self::Continuous),
            _ => Err(format!("Unknown drain mode: {s}")),
        }
    }
}

/// A deferrable unit of work attempted against a context `C`.
pub trait Synapse<C: ?Sized>: Send {
    /// Try to run. Must not block; return [`Attempt::Deferred`] instead.
    fn attempt(&mut self, ctx: &mut C) -> Attempt;

    /// Short description for logs
    fn label(&self) -> &str {
        "synapse"
    }
}

/// Boxed synapse as stored in a queue
pub type BoxedSynapse<C> = Box<dyn Synapse<C>>;

/// Synapse backed by a closure
pub struct FnSynapse<F> {
    label: String,
    f: F,
}

/// Wrap a closure as a synapse
pub fn from_fn<C, F>(label: impl Into<String>, f: F) -> FnSynapse<F>
where
    C: ?Sized,
    F: FnMut(&mut C) -> Attempt + Send,
{
    FnSynapse {
        label: label.into(),
        f,
    }
}

impl<C, F> Synapse<C> for FnSynapse<F>
where
    C: ?Sized,
    F: FnMut(&mut C) -> Attempt + Send,
{
    fn attempt(&mut self, ctx: &mut C) -> Attempt {
        (self.f)(ctx)
    }

    fn label(&self) -> &str {
        &self.label
    }
}
