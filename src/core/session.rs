// Compilation statistics shared by every function compiled in one session. The session
// borrows a bumpalo arena that outlives it, so callers can hand per-function scratch
// allocations the same lifetime, and keeps its counters behind a RefCell so recording
// does not need a mutable borrow of the session. SessionStats is a plain snapshot that
// implements Display for the liftc summary.

//! Compilation session statistics.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Counters for a batch of function compilations.
pub struct CompilationSession<'arena> {
    arena: &'arena Bump,
    stats: RefCell<SessionStats>,
}

impl<'arena> CompilationSession<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
        }
    }

    /// Intern a function or reason name in the arena.
    pub fn alloc_str(&self, s: &str) -> &'arena str {
        self.arena.alloc_str(s)
    }

    /// Record that a function was compiled.
    pub fn record_function_compiled(&self, code_size: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_compiled += 1;
        stats.total_code_size += code_size;
        stats.largest_function_size = stats.largest_function_size.max(code_size);
    }

    /// Record a function handed back to the fallback tier.
    pub fn record_unsupported(&self, reason: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.unsupported_functions += 1;
        *stats
            .unsupported_reasons
            .entry(reason.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_validation_failure(&self) {
        self.stats.borrow_mut().validation_failures += 1;
    }

    pub fn record_instructions(&self, count: usize) {
        self.stats.borrow_mut().instructions_compiled += count;
    }

    pub fn record_spills(&self, count: usize) {
        self.stats.borrow_mut().spills_generated += count;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of functions compiled.
    pub functions_compiled: usize,

    /// Functions declared unsupported.
    pub unsupported_functions: usize,

    /// Unsupported functions by reason.
    pub unsupported_reasons: HashMap<String, usize>,

    /// Functions rejected by validation.
    pub validation_failures: usize,

    /// Total code size generated (bytes).
    pub total_code_size: usize,

    /// Largest function compiled.
    pub largest_function_size: usize,

    /// Reachable instructions seen by the compiler.
    pub instructions_compiled: usize,

    /// Values written to spill slots.
    pub spills_generated: usize,
}

impl SessionStats {
    /// Average code size per compiled function.
    pub fn average_function_size(&self) -> f64 {
        if self.functions_compiled == 0 {
            0.0
        } else {
            self.total_code_size as f64 / self.functions_compiled as f64
        }
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Statistics:")?;
        writeln!(f, "  Functions compiled: {}", self.functions_compiled)?;
        writeln!(f, "  Unsupported functions: {}", self.unsupported_functions)?;
        writeln!(f, "  Validation failures: {}", self.validation_failures)?;
        writeln!(f, "  Instructions compiled: {}", self.instructions_compiled)?;
        writeln!(f, "  Spills generated: {}", self.spills_generated)?;
        writeln!(f, "  Total code size: {} bytes", self.total_code_size)?;
        writeln!(
            f,
            "  Average function size: {:.1} bytes",
            self.average_function_size()
        )?;
        writeln!(
            f,
            "  Largest function: {} bytes",
            self.largest_function_size
        )?;

        if !self.unsupported_reasons.is_empty() {
            writeln!(f, "  Unsupported reasons:")?;
            let mut reasons: Vec<_> = self.unsupported_reasons.iter().collect();
            reasons.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (reason, count) in reasons {
                writeln!(f, "    {reason}: {count}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_function_compiled(40);
        session.record_function_compiled(20);
        session.record_unsupported("i64 param/local");
        session.record_unsupported("i64 param/local");
        session.record_unsupported("call");
        session.record_validation_failure();

        let stats = session.stats();
        assert_eq!(stats.functions_compiled, 2);
        assert_eq!(stats.total_code_size, 60);
        assert_eq!(stats.largest_function_size, 40);
        assert_eq!(stats.unsupported_functions, 3);
        assert_eq!(stats.unsupported_reasons["i64 param/local"], 2);
        assert_eq!(stats.validation_failures, 1);
        assert_eq!(stats.average_function_size(), 30.0);
    }

    #[test]
    fn test_interned_names_live_in_the_arena() {
        let arena = Bump::new();
        let before = arena.allocated_bytes();
        let session = CompilationSession::new(&arena);
        let name = session.alloc_str(&format!("wasm_func_{}", 3));
        drop(session);

        assert_eq!(name, "wasm_func_3");
        assert!(arena.allocated_bytes() > before);
    }

    #[test]
    fn test_display_lists_reasons_by_frequency() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        session.record_unsupported("call");
        session.record_unsupported("if");
        session.record_unsupported("if");

        let text = session.stats().to_string();
        let if_pos = text.find("    if: 2").unwrap();
        let call_pos = text.find("    call: 1").unwrap();
        assert!(if_pos < call_pos);
    }
}
