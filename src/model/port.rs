// This module defines the port types of the dataflow graph. An OutputPort is a named,
// typed, fixed-size slot a node produces. Everything that consumes values refers to output
// ports indirectly: a PortElement names one element of one output port, a PortRange names a
// contiguous run of elements of one output port, and PortElements is an ordered list of
// ranges, which is how an input port can fan in from several producers (concatenation) or
// select part of a producer (sub-range). Ranges copy the type tag and size of the port they
// reference, so the compiler can answer "is this a full port?" and "what type is this?"
// without going back to the model. Adjacent ranges over the same port are coalesced, which
// keeps a re-sliced full port recognizable as a full port after refinement.

//! Ports, port ranges and port elements.

use super::node::NodeId;
use crate::core::{CompileError, CompileResult, VariableType};
use std::fmt;

/// Element type tag carried by an output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortType {
    None,
    SmallReal,
    Real,
    Integer,
    BigInt,
    Categorical,
    Boolean,
}

impl PortType {
    pub fn name(self) -> &'static str {
        match self {
            PortType::None => "none",
            PortType::SmallReal => "float",
            PortType::Real => "real",
            PortType::Integer => "int",
            PortType::BigInt => "int64",
            PortType::Categorical => "categorical",
            PortType::Boolean => "bool",
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The closed set of element kinds that can flow through compiled ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Boolean,
    Integer,
    BigInt,
    SmallReal,
    Real,
}

impl ElementKind {
    pub const ALL: [ElementKind; 5] = [
        ElementKind::Boolean,
        ElementKind::Integer,
        ElementKind::BigInt,
        ElementKind::SmallReal,
        ElementKind::Real,
    ];

    pub fn port_type(self) -> PortType {
        match self {
            ElementKind::Boolean => PortType::Boolean,
            ElementKind::Integer => PortType::Integer,
            ElementKind::BigInt => PortType::BigInt,
            ElementKind::SmallReal => PortType::SmallReal,
            ElementKind::Real => PortType::Real,
        }
    }

    pub fn variable_type(self) -> VariableType {
        match self {
            ElementKind::Boolean => VariableType::Boolean,
            ElementKind::Integer => VariableType::Int32,
            ElementKind::BigInt => VariableType::Int64,
            ElementKind::SmallReal => VariableType::Float,
            ElementKind::Real => VariableType::Double,
        }
    }

    pub fn name(self) -> &'static str {
        self.port_type().name()
    }

    pub fn from_name(name: &str) -> Option<ElementKind> {
        ElementKind::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl TryFrom<PortType> for ElementKind {
    type Error = CompileError;

    fn try_from(port_type: PortType) -> CompileResult<Self> {
        match port_type {
            PortType::Boolean => Ok(ElementKind::Boolean),
            PortType::Integer => Ok(ElementKind::Integer),
            PortType::BigInt => Ok(ElementKind::BigInt),
            PortType::SmallReal => Ok(ElementKind::SmallReal),
            PortType::Real => Ok(ElementKind::Real),
            other => Err(CompileError::type_mismatch(format!("no element kind for port type '{}'", other))),
        }
    }
}

/// Identity of an output port: owning node and position among its outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputPortRef {
    pub node: NodeId,
    pub index: usize,
}

impl OutputPortRef {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPort {
    name: &'static str,
    port_type: PortType,
    size: usize,
}

impl OutputPort {
    pub fn new(name: &'static str, port_type: PortType, size: usize) -> Self {
        Self { name, port_type, size }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn port_type(&self) -> PortType {
        self.port_type
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// A single element of an output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortElement {
    pub port: OutputPortRef,
    pub index: usize,
}

/// A contiguous run of elements of one output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    port: OutputPortRef,
    port_type: PortType,
    port_size: usize,
    start: usize,
    count: usize,
}

impl PortRange {
    /// The whole of `port`.
    pub fn full(port: OutputPortRef, desc: &OutputPort) -> Self {
        Self {
            port,
            port_type: desc.port_type(),
            port_size: desc.size(),
            start: 0,
            count: desc.size(),
        }
    }

    pub fn new(port: OutputPortRef, desc: &OutputPort, start: usize, count: usize) -> CompileResult<Self> {
        if start + count > desc.size() {
            return Err(CompileError::invalid_argument(format!(
                "range {}..{} exceeds port '{}' of size {}",
                start,
                start + count,
                desc.name(),
                desc.size()
            )));
        }
        Ok(Self {
            port,
            port_type: desc.port_type(),
            port_size: desc.size(),
            start,
            count,
        })
    }

    pub fn port(&self) -> OutputPortRef {
        self.port
    }

    pub fn port_type(&self) -> PortType {
        self.port_type
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_full_port_range(&self) -> bool {
        self.start == 0 && self.count == self.port_size
    }

    fn sub_range(&self, offset: usize, count: usize) -> Self {
        Self {
            start: self.start + offset,
            count,
            ..*self
        }
    }
}

/// An ordered list of port ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortElements {
    ranges: Vec<PortRange>,
}

impl PortElements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ranges(ranges: impl IntoIterator<Item = PortRange>) -> Self {
        let mut elements = Self::new();
        for range in ranges {
            elements.push_range(range);
        }
        elements
    }

    /// Append a range, extending the last one when they are adjacent in the same port.
    pub fn push_range(&mut self, range: PortRange) {
        if range.count == 0 {
            return;
        }
        if let Some(last) = self.ranges.last_mut() {
            if last.port == range.port && last.start + last.count == range.start {
                last.count += range.count;
                return;
            }
        }
        self.ranges.push(range);
    }

    pub fn append(&mut self, other: &PortElements) {
        for range in &other.ranges {
            self.push_range(*range);
        }
    }

    pub fn ranges(&self) -> &[PortRange] {
        &self.ranges
    }

    pub fn size(&self) -> usize {
        self.ranges.iter().map(|r| r.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Type of the referenced elements, taken from the first range.
    pub fn port_type(&self) -> PortType {
        self.ranges.first().map(|r| r.port_type).unwrap_or(PortType::None)
    }

    /// True when this is exactly one whole output port.
    pub fn is_full_port_output(&self) -> bool {
        self.ranges.len() == 1 && self.ranges[0].is_full_port_range()
    }

    pub fn element(&self, index: usize) -> Option<PortElement> {
        let mut offset = index;
        for range in &self.ranges {
            if offset < range.count {
                return Some(PortElement {
                    port: range.port,
                    index: range.start + offset,
                });
            }
            offset -= range.count;
        }
        None
    }

    pub fn elements(&self) -> impl Iterator<Item = PortElement> + '_ {
        self.ranges.iter().flat_map(|range| {
            (range.start..range.start + range.count).map(move |index| PortElement { port: range.port, index })
        })
    }

    /// Elements `start..start + count` of this list.
    pub fn slice(&self, start: usize, count: usize) -> CompileResult<PortElements> {
        if start + count > self.size() {
            return Err(CompileError::invalid_argument(format!(
                "slice {}..{} exceeds {} elements",
                start,
                start + count,
                self.size()
            )));
        }
        let mut result = PortElements::new();
        let mut skip = start;
        let mut remaining = count;
        for range in &self.ranges {
            if remaining == 0 {
                break;
            }
            if skip >= range.count {
                skip -= range.count;
                continue;
            }
            let take = (range.count - skip).min(remaining);
            result.push_range(range.sub_range(skip, take));
            remaining -= take;
            skip = 0;
        }
        Ok(result)
    }

    /// Distinct producing nodes, in order of first reference.
    pub fn referenced_nodes(&self) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        for range in &self.ranges {
            if !nodes.contains(&range.port.node) {
                nodes.push(range.port.node);
            }
        }
        nodes
    }
}

impl From<PortRange> for PortElements {
    fn from(range: PortRange) -> Self {
        PortElements::from_ranges([range])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPort {
    name: &'static str,
    elements: PortElements,
}

impl InputPort {
    pub fn new(name: &'static str, elements: PortElements) -> Self {
        Self { name, elements }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn elements(&self) -> &PortElements {
        &self.elements
    }

    pub fn size(&self) -> usize {
        self.elements.size()
    }

    pub fn port_type(&self) -> PortType {
        self.elements.port_type()
    }

    pub fn input_element(&self, index: usize) -> CompileResult<PortElement> {
        self.elements.element(index).ok_or_else(|| {
            CompileError::invalid_argument(format!(
                "input '{}' has {} elements, element {} requested",
                self.name,
                self.size(),
                index
            ))
        })
    }

    /// Distinct nodes feeding this input.
    pub fn parent_nodes(&self) -> Vec<NodeId> {
        self.elements.referenced_nodes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(size: usize) -> OutputPort {
        OutputPort::new("output", PortType::Real, size)
    }

    #[test]
    fn test_element_kind_dispatch() {
        for kind in ElementKind::ALL {
            assert_eq!(ElementKind::try_from(kind.port_type()).unwrap(), kind);
            assert_eq!(ElementKind::from_name(kind.name()), Some(kind));
        }
        assert!(matches!(
            ElementKind::try_from(PortType::Categorical),
            Err(CompileError::TypeMismatch { .. })
        ));
        assert!(ElementKind::try_from(PortType::None).is_err());
    }

    #[test]
    fn test_full_port_detection() {
        let a = OutputPortRef::new(NodeId(0), 0);
        let desc = port(4);
        assert!(PortElements::from(PortRange::full(a, &desc)).is_full_port_output());
        assert!(!PortElements::from(PortRange::new(a, &desc, 1, 2).unwrap()).is_full_port_output());
        assert!(PortRange::new(a, &desc, 3, 2).is_err());

        // Two halves of the same port coalesce into the full port.
        let halves = PortElements::from_ranges([
            PortRange::new(a, &desc, 0, 2).unwrap(),
            PortRange::new(a, &desc, 2, 2).unwrap(),
        ]);
        assert!(halves.is_full_port_output());
    }

    #[test]
    fn test_concatenation_and_slicing() {
        let a = OutputPortRef::new(NodeId(0), 0);
        let b = OutputPortRef::new(NodeId(1), 0);
        let elements = PortElements::from_ranges([
            PortRange::full(a, &port(3)),
            PortRange::new(b, &port(4), 1, 2).unwrap(),
        ]);
        assert_eq!(elements.size(), 5);
        assert!(!elements.is_full_port_output());
        assert_eq!(elements.element(3), Some(PortElement { port: b, index: 1 }));
        assert_eq!(elements.element(5), None);
        assert_eq!(elements.referenced_nodes(), vec![NodeId(0), NodeId(1)]);

        let middle = elements.slice(2, 2).unwrap();
        let collected: Vec<_> = middle.elements().collect();
        assert_eq!(
            collected,
            vec![PortElement { port: a, index: 2 }, PortElement { port: b, index: 1 }]
        );
        assert!(elements.slice(4, 2).is_err());
    }

    #[test]
    fn test_input_port_parents() {
        let a = OutputPortRef::new(NodeId(2), 0);
        let desc = port(2);
        let input = InputPort::new("input", PortElements::from_ranges([
            PortRange::new(a, &desc, 0, 1).unwrap(),
            PortRange::new(a, &desc, 1, 1).unwrap(),
        ]));
        assert_eq!(input.parent_nodes(), vec![NodeId(2)]);
        assert_eq!(input.input_element(1).unwrap().index, 1);
        assert!(input.input_element(2).is_err());
    }
}
