use rustc_hash::FxHashMap as HashMap;

use crate::{
    node::{Node, NodeArena, NodeId},
    tensor::{Tensor, TypedShape},
};

#[derive(Debug, Default, Clone)]
pub struct Graph {
    /// Nodes in the order they were stored, which is also execution order.
    pub nodes: NodeArena,
    pub inits: HashMap<String, Tensor>,
    pub inputs: Vec<ValueInfo>,
    pub outputs: Vec<ValueInfo>,
}

/// A declared graph input or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueInfo {
    pub name: String,
    pub shape: Option<TypedShape>,
}

impl Graph {
    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.alloc(node)
    }

    pub fn add_init(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.inits.insert(name.into(), tensor);
    }

    pub fn add_input(&mut self, name: impl Into<String>, shape: impl Into<Option<TypedShape>>) {
        self.inputs.push(ValueInfo::new(name, shape));
    }

    pub fn add_output(&mut self, name: impl Into<String>, shape: impl Into<Option<TypedShape>>) {
        self.outputs.push(ValueInfo::new(name, shape));
    }
}

impl ValueInfo {
    pub fn new(name: impl Into<String>, shape: impl Into<Option<TypedShape>>) -> Self {
        Self {
            name: name.into(),
            shape: shape.into(),
        }
    }
}
