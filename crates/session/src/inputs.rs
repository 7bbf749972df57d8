use tessera_core::graph::Graph;

use crate::{NamedTensors, SessionError};

/// Checks caller-supplied tensors against the graph's declared inputs.
///
/// Inputs backed by an initializer are skipped. A declared rank must match
/// exactly; a fixed dimension must equal the actual size while a dynamic
/// dimension accepts any size. Inputs declared without a shape are only
/// required to be present.
pub fn check_input_shapes(graph: &Graph, inputs: &NamedTensors) -> Result<(), SessionError> {
    for input in &graph.inputs {
        if graph.inits.contains_key(&input.name) {
            continue;
        }

        let tensor = inputs
            .get(&input.name)
            .ok_or_else(|| SessionError::MissingInput(input.name.clone()))?;
        let Some(shape) = input.shape.as_ref() else {
            continue;
        };

        if !shape.dims.matches(tensor.dims()) {
            return Err(SessionError::InvalidShape {
                name: input.name.clone(),
                expected: shape.dims.clone(),
                actual: tensor.dims().clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{
        dim::{Dimension, Dimensions},
        tensor::{Tensor, TensorElemType, TypedShape},
    };

    fn graph() -> Graph {
        let mut graph = Graph::default();
        graph.add_input(
            "x",
            TypedShape::new(
                Dimensions(vec![Dimension::Dynamic("batch".into()), Dimension::Fixed(3)]),
                TensorElemType::F32,
            ),
        );
        graph
    }

    fn inputs(dims: Vec<usize>) -> NamedTensors {
        let mut inputs = NamedTensors::default();
        inputs.insert("x".into(), Tensor::zeros::<f32>(dims.into()));
        inputs
    }

    #[test]
    fn dynamic_dimension_accepts_any_size() {
        let graph = graph();
        for batch in [0, 1, 2, 64] {
            assert!(check_input_shapes(&graph, &inputs(vec![batch, 3])).is_ok());
        }
    }

    #[test]
    fn fixed_dimension_must_match() {
        let err = check_input_shapes(&graph(), &inputs(vec![2, 4])).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidShape { ref name, .. } if name == "x"
        ));
        assert_eq!(
            err.to_string(),
            "Input 'x' has shape [2, 4] but the model declares [batch, 3]"
        );
    }

    #[test]
    fn rank_must_match() {
        assert!(matches!(
            check_input_shapes(&graph(), &inputs(vec![2, 3, 1])),
            Err(SessionError::InvalidShape { .. })
        ));
        assert!(matches!(
            check_input_shapes(&graph(), &inputs(vec![3])),
            Err(SessionError::InvalidShape { .. })
        ));
    }

    #[test]
    fn missing_input() {
        assert!(matches!(
            check_input_shapes(&graph(), &NamedTensors::default()),
            Err(SessionError::MissingInput(name)) if name == "x"
        ));
    }

    #[test]
    fn initializer_backed_input_is_optional() {
        let mut graph = graph();
        graph.add_init("x", Tensor::zeros::<f32>(vec![1, 3].into()));
        assert!(check_input_shapes(&graph, &NamedTensors::default()).is_ok());
    }
}
