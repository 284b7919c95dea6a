// This module validates a map before compilation and normalizes its output. Compiled maps
// must have exactly one input and one output; that is checked before anything else. The
// predict function writes its results through a single output pointer, so the map output
// must be one whole port of a node that writes its own storage. When the output is a
// sub-range, a concatenation, or the port of a source node (an input or a constant), an
// OutputNode of the matching element kind is appended to the model to copy the elements
// into a fresh port, and the map output is rebound to that port.

//! Map validation and output normalization.

use crate::core::{CompileError, CompileResult};
use crate::model::{DynamicMap, ElementKind, Model, PortElements, TensorShape};
use crate::nodes::OutputNode;

/// Whether the map output needs a synthesized output node.
fn needs_output_node(model: &Model, output: &PortElements) -> bool {
    if !output.is_full_port_output() {
        return true;
    }
    let producer = output.ranges()[0].port().node;
    model.node(producer).map(|node| node.input_ports().is_empty()).unwrap_or(true)
}

pub fn ensure_valid_map(map: &mut DynamicMap) -> CompileResult<()> {
    if map.num_input_ports() != 1 {
        return Err(CompileError::invalid_argument(format!(
            "compiled maps must have exactly one input, found {}",
            map.num_input_ports()
        )));
    }
    if map.num_output_ports() != 1 {
        return Err(CompileError::invalid_argument(format!(
            "compiled maps must have exactly one output, found {}",
            map.num_output_ports()
        )));
    }

    let output = map.output(0)?.clone();
    if !needs_output_node(map.model(), &output) {
        return Ok(());
    }

    let shape = map
        .output_nodes()
        .first()
        .and_then(|id| map.model().node(*id))
        .and_then(|node| node.shape())
        .unwrap_or_else(|| TensorShape::vector(output.size()));
    let kind = ElementKind::try_from(output.port_type())?;

    let id = map.model_mut().add_node(OutputNode::new(kind, output, shape))?;
    let full = map.model().full_output(id, 0)?;
    map.reset_output(0, full)?;
    log::debug!("Added {} output node {} with shape {}", kind.name(), id, shape);
    Ok(())
}
