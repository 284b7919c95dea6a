//! Dataflow graph model.
//!
//! A [`DynamicMap`] wraps a [`Model`] of [`Node`]s and designates its logical input
//! and output. Nodes are connected through [`PortElements`], ordered runs of elements
//! of other nodes' [`OutputPort`]s.

pub mod port;
pub mod shape;
pub mod node;
pub mod graph;
pub mod transformer;
pub mod map;

pub use port::{
    ElementKind,
    InputPort,
    OutputPort,
    OutputPortRef,
    PortElement,
    PortElements,
    PortRange,
    PortType,
};
pub use shape::TensorShape;
pub use node::{diagnostic_string, id_string, Node, NodeAction, NodeId, NodeRole};
pub use graph::Model;
pub use transformer::{ModelTransformer, TransformContext};
pub use map::DynamicMap;
