// This module implements the scoped node-to-region table and the region merge engine.
// Each compiled node gets its own code region; the table remembers which region holds
// each node, one layer per active scope. After a node is compiled the merge engine tries
// to fold its region into the region of its unique parent, which turns straight
// producer/consumer chains into one linear run of blocks. The parent search is
// deliberately conservative: any parent consumed by more than one node ends the search
// with no parent at all, and parents living in different regions cancel each other out.
// A refused merge is a plain `false`; only emitter failures are errors.

//! Node regions and region merging.

use crate::core::{CompileError, CompileResult, Emitter, RegionRef};
use crate::model::{Node, NodeId};
use hashbrown::HashMap;

/// Node to region bindings for one scope.
pub type RegionScope = HashMap<NodeId, RegionRef>;

#[derive(Debug, Default)]
pub struct NodeRegions {
    scopes: Vec<RegionScope>,
}

impl NodeRegions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(RegionScope::new());
    }

    pub fn pop_scope(&mut self) -> CompileResult<()> {
        self.scopes
            .pop()
            .map(|_| ())
            .ok_or_else(|| CompileError::invalid_argument("region scope stack is empty"))
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Innermost scope.
    pub fn current_scope(&self) -> Option<&RegionScope> {
        self.scopes.last()
    }

    /// Region of `node` in the innermost scope.
    pub fn get(&self, node: NodeId) -> Option<RegionRef> {
        self.current_scope().and_then(|scope| scope.get(&node).copied())
    }

    pub fn set(&mut self, node: NodeId, region: RegionRef) -> CompileResult<()> {
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| CompileError::invalid_argument("no active region scope"))?;
        scope.insert(node, region);
        Ok(())
    }

    /// The single parent whose region `node` may join, with that region.
    ///
    /// `dependents` counts the distinct nodes consuming each node's outputs.
    pub fn unique_parent(&self, node: &dyn Node, dependents: &HashMap<NodeId, usize>) -> Option<(NodeId, RegionRef)> {
        let mut found: Option<(NodeId, RegionRef)> = None;
        for input in node.input_ports() {
            for parent in input.parent_nodes() {
                if dependents.get(&parent).copied().unwrap_or(0) != 1 {
                    return None;
                }
                if let Some(region) = self.get(parent) {
                    match found {
                        Some((_, existing)) if existing != region => return None,
                        _ => found = Some((parent, region)),
                    }
                }
            }
        }
        found
    }

    /// Fold the region of `id` into its unique parent's region.
    pub fn try_merge_node_region(
        &mut self,
        emitter: &mut dyn Emitter,
        id: NodeId,
        node: &dyn Node,
        dependents: &HashMap<NodeId, usize>,
    ) -> CompileResult<bool> {
        let Some(region) = self.get(id) else {
            return Ok(false);
        };
        let Some((parent, parent_region)) = self.unique_parent(node, dependents) else {
            return Ok(false);
        };
        if parent_region == region {
            return Ok(false);
        }

        if let (Some(current), Some(block)) = (emitter.current_region(), emitter.current_block()) {
            emitter.set_region_end(current, block)?;
        }
        emitter.concat_regions(parent_region, region)?;
        self.set(id, parent_region)?;
        log::trace!("Merged region of node {} into region of parent {}", id, parent);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BinaryOperator, CompilationSession, VariableType};
    use crate::ir::IrModuleEmitter;
    use crate::model::{ElementKind, Model, TensorShape};
    use crate::nodes::{BinaryOperationNode, InputNode};
    use bumpalo::Bump;

    /// Give every node its own region, then try to merge each one in order.
    fn merge_all(model: &Model) -> (NodeRegions, Vec<bool>) {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut emitter = IrModuleEmitter::new("test", &session);
        emitter.begin_function("f", VariableType::Void, &[]).unwrap();
        let entry = emitter.current_block().unwrap();
        emitter.add_region(entry).unwrap();

        let dependents = model.dependent_counts();
        let mut regions = NodeRegions::new();
        regions.push_scope();
        let mut merged = Vec::new();
        for (id, node) in model.nodes() {
            let block = emitter.begin_block(&format!("node{}", id)).unwrap();
            let region = emitter.add_region(block).unwrap();
            regions.set(id, region).unwrap();
            merged.push(regions.try_merge_node_region(&mut emitter, id, node, &dependents).unwrap());
        }
        emitter.end_function().unwrap();
        (regions, merged)
    }

    fn add(model: &mut Model, a: NodeId, b: NodeId) -> NodeId {
        let node = BinaryOperationNode::new(
            BinaryOperator::Add,
            model.full_output(a, 0).unwrap(),
            model.full_output(b, 0).unwrap(),
        )
        .unwrap();
        model.add_node(node).unwrap()
    }

    #[test]
    fn test_linear_chain_shares_one_region() {
        let mut model = Model::new();
        let x = model.add_node(InputNode::new(ElementKind::Real, TensorShape::vector(2))).unwrap();
        let a = add(&mut model, x, x);
        let b = add(&mut model, a, a);
        let c = add(&mut model, b, b);

        let (regions, merged) = merge_all(&model);
        assert_eq!(merged, vec![false, true, true, true]);
        let first = regions.get(x).unwrap();
        assert_eq!(regions.get(a), Some(first));
        assert_eq!(regions.get(b), Some(first));
        assert_eq!(regions.get(c), Some(first));
    }

    #[test]
    fn test_fan_in_from_different_regions_is_not_merged() {
        let mut model = Model::new();
        let x = model.add_node(InputNode::new(ElementKind::Real, TensorShape::vector(2))).unwrap();
        let y = model.add_node(InputNode::new(ElementKind::Real, TensorShape::vector(2))).unwrap();
        let f = add(&mut model, x, y);

        let (regions, merged) = merge_all(&model);
        assert_eq!(merged, vec![false, false, false]);
        assert_ne!(regions.get(f), regions.get(x));
        assert_ne!(regions.get(f), regions.get(y));
    }

    #[test]
    fn test_fan_out_parent_blocks_merging() {
        let mut model = Model::new();
        let x = model.add_node(InputNode::new(ElementKind::Real, TensorShape::vector(2))).unwrap();
        let a = add(&mut model, x, x);
        let b = add(&mut model, x, x);
        // `a` and `b` each have one consumer, but `x` has two.
        let c = add(&mut model, a, b);

        let (regions, merged) = merge_all(&model);
        assert_eq!(merged, vec![false, false, false, false]);
        assert_ne!(regions.get(c), regions.get(a));
    }

    #[test]
    fn test_balanced_scopes_leave_table_unchanged() {
        let mut regions = NodeRegions::new();
        regions.push_scope();
        regions.set(NodeId(0), RegionRef(0)).unwrap();
        regions.set(NodeId(1), RegionRef(1)).unwrap();
        let before = regions.current_scope().cloned();

        regions.push_scope();
        assert_eq!(regions.get(NodeId(0)), None);
        regions.set(NodeId(0), RegionRef(7)).unwrap();
        regions.pop_scope().unwrap();

        assert_eq!(regions.current_scope().cloned(), before);
        assert_eq!(regions.get(NodeId(0)), Some(RegionRef(0)));
        assert_eq!(regions.depth(), 1);
        regions.pop_scope().unwrap();
        assert!(regions.pop_scope().is_err());
    }
}
