// This module provides arena-based compilation session management using the bumpalo crate.
// CompilationSession owns a reference to the arena and tracks the bookkeeping shared by
// the map compiler and the IR backend for the duration of one compile call. Block,
// function and global labels are interned in the arena: generated code repeats the same
// labels across functions ("IfBlock0", "ThenBlock0", node identities) so every module
// stores `&'arena str` slices instead of owned strings. SessionStats counts nodes
// compiled, regions created and merged, functions and blocks emitted, and variables
// allocated, and renders a short report through Display. Interior mutability lets the
// compiler and the emitter share one `&CompilationSession` without threading `&mut`
// through every call.

//! Arena-based compilation session management.
//!
//! All labels produced during a compile call are interned in the session arena and
//! share its lifetime.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for interned labels.
    arena: &'arena Bump,

    /// Session statistics for debugging and optimization.
    stats: RefCell<SessionStats>,

    /// String interning for efficient storage.
    interned_strings: RefCell<HashMap<String, &'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    pub fn record_node_compiled(&self, type_name: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.nodes_compiled += 1;
        *stats.node_counts.entry(type_name.to_string()).or_insert(0) += 1;
    }

    pub fn record_region_created(&self) {
        self.stats.borrow_mut().regions_created += 1;
    }

    pub fn record_region_merged(&self) {
        self.stats.borrow_mut().regions_merged += 1;
    }

    pub fn record_function_emitted(&self, name: &str, block_count: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_emitted += 1;
        stats.blocks_emitted += block_count;

        if stats.largest_function_blocks < block_count {
            stats.largest_function_blocks = block_count;
            stats.largest_function_name = name.to_string();
        }
    }

    pub fn record_variable_allocated(&self) {
        self.stats.borrow_mut().variables_allocated += 1;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of nodes whose compile hook ran.
    pub nodes_compiled: usize,

    /// Count of compiled nodes per node type.
    pub node_counts: HashMap<String, usize>,

    /// Node regions opened.
    pub regions_created: usize,

    /// Node regions folded into a parent region.
    pub regions_merged: usize,

    /// Functions finished by the emitter.
    pub functions_emitted: usize,

    /// Total basic blocks across all emitted functions.
    pub blocks_emitted: usize,

    /// Function with the most blocks.
    pub largest_function_name: String,
    pub largest_function_blocks: usize,

    /// Storage variables allocated for ports.
    pub variables_allocated: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Nodes compiled: {}", self.nodes_compiled)?;
        writeln!(f, "  Regions created: {}", self.regions_created)?;
        writeln!(f, "  Regions merged: {}", self.regions_merged)?;
        writeln!(f, "  Functions emitted: {}", self.functions_emitted)?;
        writeln!(f, "  Blocks emitted: {}", self.blocks_emitted)?;
        writeln!(f, "  Variables allocated: {}", self.variables_allocated)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} blocks)",
                self.largest_function_name, self.largest_function_blocks
            )?;
        }

        if !self.node_counts.is_empty() {
            writeln!(f, "  Node breakdown:")?;
            let mut sorted: Vec<_> = self.node_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (name, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", name, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_session_creation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.nodes_compiled, 0);
        assert_eq!(stats.regions_created, 0);
        assert_eq!(stats.functions_emitted, 0);
    }

    #[test]
    fn test_string_interning() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let s1 = session.intern_str("IfBlock0");
        let s2 = session.intern_str("IfBlock0");
        let s3 = session.intern_str("ThenBlock0");

        assert_eq!(s1.as_ptr(), s2.as_ptr());
        assert_ne!(s1.as_ptr(), s3.as_ptr());
    }

    #[test]
    fn test_session_statistics() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_node_compiled("InputNode");
        session.record_node_compiled("BinaryOperationNode");
        session.record_node_compiled("BinaryOperationNode");
        session.record_region_created();
        session.record_region_created();
        session.record_region_merged();
        session.record_function_emitted("model_predict", 4);
        session.record_function_emitted("model_GetInputSize", 1);
        session.record_variable_allocated();

        let stats = session.stats();
        assert_eq!(stats.nodes_compiled, 3);
        assert_eq!(stats.node_counts["BinaryOperationNode"], 2);
        assert_eq!(stats.regions_created, 2);
        assert_eq!(stats.regions_merged, 1);
        assert_eq!(stats.functions_emitted, 2);
        assert_eq!(stats.blocks_emitted, 5);
        assert_eq!(stats.largest_function_name, "model_predict");
        assert_eq!(stats.variables_allocated, 1);
    }

    #[test]
    fn test_statistics_display() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_function_emitted("model_predict", 6);
        session.record_node_compiled("SumNode");

        let output = format!("{}", session.stats());
        assert!(output.contains("Nodes compiled: 1"));
        assert!(output.contains("model_predict (6 blocks)"));
        assert!(output.contains("SumNode: 1"));
    }
}
