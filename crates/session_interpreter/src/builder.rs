use tessera_core::model::Model;

use super::session::InterpreterSession;

pub struct InterpreterSessionBuilder<'a> {
    model: &'a Model,
    enable_profiling: bool,
}

impl<'a> InterpreterSessionBuilder<'a> {
    pub const fn new(model: &'a Model) -> Self {
        Self {
            model,
            enable_profiling: false,
        }
    }

    /// Reports per-operator execution time at `info` level after every run.
    pub const fn with_profiling_enabled(mut self, enable_profiling: bool) -> Self {
        self.enable_profiling = enable_profiling;
        self
    }

    pub fn build(self) -> InterpreterSession<'a> {
        log::debug!(
            "Interpreter session over {} nodes (opset {})",
            self.model.graph.nodes.len(),
            self.model.opset_version
        );

        InterpreterSession {
            model: self.model,
            enable_profiling: self.enable_profiling,
        }
    }
}
