//! Automatic naming of input variables.

use crate::error::Result;
use crate::graph::{Var, VarBuilder, VarName};
use crate::value::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hands out integer names `0, 1, 2, ...` for input variables.
///
/// Each counter is independent; pass it by reference to whatever builds the
/// inputs. It only restarts through [`NameCounter::reset`].
#[derive(Debug, Default)]
pub struct NameCounter {
    next: AtomicUsize,
}

impl NameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_name(&self) -> VarName {
        VarName::Index(self.next.fetch_add(1, Ordering::Relaxed) as i64)
    }

    /// The name the next call to `next_name` will return.
    pub fn peek(&self) -> VarName {
        VarName::Index(self.next.load(Ordering::Relaxed) as i64)
    }

    pub fn reset(&self) {
        self.next.store(0, Ordering::Relaxed);
    }

    /// A forward-mode input named by the next integer.
    pub fn variable(&self, value: impl Into<Value>) -> Result<Var> {
        self.builder(value).build()
    }

    /// Builder pre-filled with the next name, for a custom seed or mode.
    pub fn builder(&self, value: impl Into<Value>) -> VarBuilder {
        Var::builder(value).name(self.next_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphContext, Mode};

    #[test]
    fn test_names_are_sequential() {
        let counter = NameCounter::new();
        let a = counter.variable(1.0).unwrap();
        let b = counter.variable(2.0).unwrap();
        assert_eq!(a.name(), Some(VarName::Index(0)));
        assert_eq!(b.name(), Some(VarName::Index(1)));
        assert_eq!(counter.peek(), VarName::Index(2));
    }

    #[test]
    fn test_reset_restarts_numbering() {
        let counter = NameCounter::new();
        counter.next_name();
        counter.next_name();
        counter.reset();
        assert_eq!(counter.next_name(), VarName::Index(0));
    }

    #[test]
    fn test_counters_are_independent() {
        let first = NameCounter::new();
        let second = NameCounter::new();
        first.next_name();
        assert_eq!(second.next_name(), VarName::Index(0));
    }

    #[test]
    fn test_builder_keeps_the_name() {
        let counter = NameCounter::new();
        let ctx = GraphContext::new();
        let x = counter
            .builder(3.0)
            .mode(Mode::Reverse)
            .context(&ctx)
            .build()
            .unwrap();
        assert_eq!(x.mode(), Mode::Reverse);
        assert!(ctx.contains(&VarName::Index(0)));
    }
}
