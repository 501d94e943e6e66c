//! Operation routing by resource.

use super::server::{Decision, Execution, OperationHandler, Responder};
use crate::op::Op;
use crate::resource::Resource;

/// An operation implementation
pub type Action = Box<dyn FnMut(&Op, &str, &mut Responder<'_>) -> Execution + Send>;

/// Routes operations to actions by the longest resource containing the
/// operation type. Operations with no route are denied.
#[derive(Default)]
pub struct Router {
    routes: Vec<(Resource, Action)>,
}

impl Router {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action for `resource` and everything below it
    pub fn route<F>(mut self, resource: impl Into<Resource>, action: F) -> Self
    where
        F: FnMut(&Op, &str, &mut Responder<'_>) -> Execution + Send + 'static,
    {
        let resource = resource.into();
        self.routes.retain(|(existing, _)| existing != &resource);
        self.routes.push((resource, Box::new(action)));
        self
    }

    /// Registered resources
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.routes.iter().map(|(res, _)| res)
    }

    fn resolve(&mut self, op_type: &Resource) -> Option<&mut Action> {
        self.routes
            .iter_mut()
            .filter(|(res, _)| res.contains(op_type))
            .max_by_key(|(res, _)| res.segments().count())
            .map(|(_, action)| action)
    }
}

impl OperationHandler for Router {
    fn authorize(&mut self, op: &Op, _requester: &str) -> Decision {
        if self.resolve(op.op_type()).is_some() {
            Decision::Grant
        } else {
            Decision::Deny(format!("no handler for {}", op.op_type()))
        }
    }

    fn execute(&mut self, op: &Op, requester: &str, responder: &mut Responder<'_>) -> Execution {
        match self.resolve(op.op_type()) {
            Some(action) => (*action)(op, requester, responder),
            None => Err(format!("no handler for {}", op.op_type())),
        }
    }
}
