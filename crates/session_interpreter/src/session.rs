use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tessera_core::{model::Model, node::Node, op_error::OpError};
use tessera_session::{inputs::check_input_shapes, NamedTensors, Session, SessionError};

use crate::opset::{resolve_opset, Opset};

/// Runs a model by interpreting its nodes one at a time, in stored order.
pub struct InterpreterSession<'a> {
    pub(super) model: &'a Model,
    pub(super) enable_profiling: bool,
}

impl<'a> InterpreterSession<'a> {
    pub fn run(&self, inputs: NamedTensors) -> Result<NamedTensors, SessionError> {
        let start = Instant::now();
        let graph = &self.model.graph;

        check_input_shapes(graph, &inputs)?;
        let opset = resolve_opset(self.model.opset_version)?;

        let mut values = inputs;
        for (name, tensor) in &graph.inits {
            values.insert(name.clone(), tensor.clone());
        }

        let mut profile = FxHashMap::default();

        #[cfg(not(feature = "heavy-log"))]
        for (_, node) in graph.nodes.iter() {
            self.run_node(opset, &mut profile, &mut values, node)?;
        }

        #[cfg(feature = "heavy-log")]
        for (i, (_, node)) in graph.nodes.iter().enumerate() {
            let start = Instant::now();

            self.run_node(opset, &mut profile, &mut values, node)?;

            log::info!(
                "{}/{} {}({}) {:?}",
                i,
                graph.nodes.len(),
                node.op_type,
                node.label(),
                start.elapsed()
            );
        }

        if self.enable_profiling {
            log::info!(
                "Kernel execution time: {:#?}",
                profile.values().sum::<Duration>()
            );
            log::info!("Total execution time: {:#?}", start.elapsed());
            log::info!("Profile: {:#?}", profile);
        }

        graph
            .outputs
            .iter()
            .map(|output| {
                values
                    .get(&output.name)
                    .map(|tensor| (output.name.clone(), tensor.clone()))
                    .ok_or_else(|| SessionError::TensorNotFound {
                        node: "(graph outputs)".into(),
                        name: output.name.clone(),
                    })
            })
            .collect()
    }

    fn run_node(
        &self,
        opset: &Opset,
        profile: &mut FxHashMap<String, Duration>,
        values: &mut NamedTensors,
        node: &Node,
    ) -> Result<(), SessionError> {
        log::trace!("Running {} ({})", node.op_type, node.label());

        let ctor = opset
            .get(node.op_type.as_str())
            .ok_or_else(|| SessionError::UnknownOperator {
                op_type: node.op_type.clone(),
                opset: self.model.opset_version,
            })?;
        let mut op = ctor();
        op.init(&node.attributes).map_err(op_failure(node))?;

        if node.outputs.len() > op.max_outputs() {
            return Err(SessionError::OutputCountMismatch {
                node: node.label().to_string(),
                expected: node.outputs.len(),
                actual: op.max_outputs(),
            });
        }

        let inputs = node
            .inputs
            .iter()
            .map(|name| {
                if name.is_empty() {
                    return Ok(None);
                }
                values
                    .get(name)
                    .cloned()
                    .map(Some)
                    .ok_or_else(|| SessionError::TensorNotFound {
                        node: node.label().to_string(),
                        name: name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let inputs = op.validate_inputs(inputs).map_err(op_failure(node))?;

        let start = Instant::now();
        let mut outputs = op.apply(&inputs).map_err(op_failure(node))?;
        *profile.entry(node.op_type.clone()).or_default() += start.elapsed();

        // Trailing optional outputs the node does not declare are dropped.
        outputs.truncate(node.outputs.len());
        if outputs.len() != node.outputs.len() {
            return Err(SessionError::OutputCountMismatch {
                node: node.label().to_string(),
                expected: node.outputs.len(),
                actual: outputs.len(),
            });
        }

        for (name, tensor) in node.outputs.iter().zip(outputs) {
            if !name.is_empty() {
                values.insert(name.clone(), tensor);
            }
        }

        Ok(())
    }
}

impl Session for InterpreterSession<'_> {
    fn run(&self, inputs: NamedTensors) -> Result<NamedTensors, SessionError> {
        InterpreterSession::run(self, inputs)
    }
}

fn op_failure(node: &Node) -> impl Fn(OpError) -> SessionError + '_ {
    move |source| SessionError::Operator {
        op_type: node.op_type.clone(),
        node: node.label().to_string(),
        source,
    }
}
