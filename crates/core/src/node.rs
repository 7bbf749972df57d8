use crate::{op_error::OpError, tensor::Tensor};
use id_arena::{Arena, Id};

pub type NodeId = Id<Node>;
pub type NodeArena = Arena<Node>;

/// One operator invocation. Inputs and outputs refer to tensors by name; an
/// empty name marks an absent optional slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub op_type: String,
    pub name: Option<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Float(f32),
    Int(i64),
    String(String),
    Tensor(Tensor),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
    Tensors(Vec<Tensor>),
}

impl Node {
    pub fn new(op_type: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            name: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<Option<String>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_in(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    pub fn with_ins<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.inputs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_out(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    pub fn with_outs<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.outputs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            value,
        });
        self
    }

    /// Name used in logs and error messages.
    pub fn label(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => self
                .outputs
                .first()
                .map_or(self.op_type.as_str(), String::as_str),
        }
    }
}

macro_rules! accessor {
    ($fn:ident, $variant:ident, $ret:ty, $expected:literal, |$v:ident| $conv:expr) => {
        pub fn $fn(&self) -> Result<$ret, OpError> {
            match &self.value {
                AttributeValue::$variant($v) => Ok($conv),
                _ => Err(OpError::AttributeType {
                    name: self.name.clone(),
                    expected: $expected,
                }),
            }
        }
    };
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    accessor!(float, Float, f32, "float", |v| *v);
    accessor!(int, Int, i64, "int", |v| *v);
    accessor!(string, String, &str, "string", |v| v.as_str());
    accessor!(tensor, Tensor, &Tensor, "tensor", |v| v);
    accessor!(floats, Floats, &[f32], "floats", |v| v.as_slice());
    accessor!(ints, Ints, &[i64], "ints", |v| v.as_slice());
    accessor!(strings, Strings, &[String], "strings", |v| v.as_slice());
    accessor!(tensors, Tensors, &[Tensor], "tensors", |v| v.as_slice());
}

#[test]
fn typed_attribute_access() {
    let a = Attribute::new("axis", AttributeValue::Int(-1));
    assert_eq!(a.int(), Ok(-1));
    assert_eq!(
        a.float(),
        Err(OpError::AttributeType {
            name: "axis".into(),
            expected: "float"
        })
    );
    let a = Attribute::new("pads", AttributeValue::Ints(vec![1, 1, 1, 1]));
    assert_eq!(a.ints().unwrap(), &[1, 1, 1, 1]);
}

#[test]
fn node_label() {
    let n = Node::new("Relu").with_in("x").with_out("y");
    assert_eq!(n.label(), "y");
    let n = n.with_name(Some("relu_1".to_string()));
    assert_eq!(n.label(), "relu_1");
    let n = Node::new("Identity");
    assert_eq!(n.label(), "Identity");
}
