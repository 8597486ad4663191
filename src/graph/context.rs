// context.rs
// Shape registry shared by every node descended from the same named inputs.

use super::node::VarName;
use crate::error::{Error, Result};
use crate::value::Shape;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Shared mapping from variable name to the shape it was declared with.
///
/// Cloning a context clones the handle, not the registry: all clones see the
/// same entries. The registry is append-only and a name keeps its shape for
/// the registry's whole lifetime. Single-threaded by construction (`Rc`).
#[derive(Clone, Default)]
pub struct GraphContext {
    shapes: Rc<RefCell<BTreeMap<VarName, Shape>>>,
}

impl GraphContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with `shape`. Re-registering with the same shape is a
    /// no-op; a different shape fails and leaves the registry untouched.
    pub fn register(&self, name: VarName, shape: Shape) -> Result<()> {
        let mut shapes = self.shapes.borrow_mut();
        match shapes.get(&name) {
            Some(existing) if *existing != shape => {
                Err(Error::shape_mismatch(&existing.to_vec(), &shape.to_vec()))
            }
            Some(_) => Ok(()),
            None => {
                shapes.insert(name, shape);
                Ok(())
            }
        }
    }

    pub fn shape_of(&self, name: &VarName) -> Option<Shape> {
        self.shapes.borrow().get(name).copied()
    }

    pub fn contains(&self, name: &VarName) -> bool {
        self.shapes.borrow().contains_key(name)
    }

    pub fn names(&self) -> Vec<VarName> {
        self.shapes.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.shapes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.borrow().is_empty()
    }

    /// True when both handles point at the same registry.
    pub fn ptr_eq(&self, other: &GraphContext) -> bool {
        Rc::ptr_eq(&self.shapes, &other.shapes)
    }

    /// Context for the result of an operation.
    ///
    /// The lhs registry is reused and absorbs the rhs entries in place.
    /// Conflicts are checked before anything is written.
    pub fn merge(
        lhs: Option<&GraphContext>,
        rhs: Option<&GraphContext>,
    ) -> Result<Option<GraphContext>> {
        match (lhs, rhs) {
            (None, None) => Ok(None),
            (Some(ctx), None) | (None, Some(ctx)) => Ok(Some(ctx.clone())),
            (Some(lhs), Some(rhs)) if lhs.ptr_eq(rhs) => Ok(Some(lhs.clone())),
            (Some(lhs), Some(rhs)) => {
                let incoming = rhs.shapes.borrow().clone();
                {
                    let existing = lhs.shapes.borrow();
                    for (name, shape) in &incoming {
                        if let Some(current) = existing.get(name) {
                            if current != shape {
                                return Err(Error::shape_mismatch(
                                    &current.to_vec(),
                                    &shape.to_vec(),
                                ));
                            }
                        }
                    }
                }
                lhs.shapes.borrow_mut().extend(incoming);
                Ok(Some(lhs.clone()))
            }
        }
    }
}

impl fmt::Debug for GraphContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.shapes.borrow().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_append_only() {
        let ctx = GraphContext::new();
        ctx.register("x".into(), Shape::Scalar).unwrap();
        ctx.register("x".into(), Shape::Scalar).unwrap();
        assert!(ctx.register("x".into(), Shape::Matrix(2, 1)).is_err());
        assert_eq!(ctx.shape_of(&"x".into()), Some(Shape::Scalar));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_clones_share_entries() {
        let ctx = GraphContext::new();
        let alias = ctx.clone();
        alias.register("y".into(), Shape::Matrix(3, 1)).unwrap();
        assert!(ctx.contains(&"y".into()));
        assert!(ctx.ptr_eq(&alias));
    }

    #[test]
    fn test_merge_absorbs_rhs_into_lhs() {
        let a = GraphContext::new();
        let b = GraphContext::new();
        a.register("x".into(), Shape::Scalar).unwrap();
        b.register("y".into(), Shape::Scalar).unwrap();

        let merged = GraphContext::merge(Some(&a), Some(&b)).unwrap().unwrap();
        assert!(merged.ptr_eq(&a));
        assert_eq!(a.names(), vec![VarName::from("x"), VarName::from("y")]);
        assert_eq!(b.len(), 1);

        assert!(GraphContext::merge(None, None).unwrap().is_none());
    }

    #[test]
    fn test_merge_conflict_leaves_registry_untouched() {
        let a = GraphContext::new();
        let b = GraphContext::new();
        a.register("x".into(), Shape::Scalar).unwrap();
        b.register("x".into(), Shape::Matrix(2, 2)).unwrap();
        b.register("z".into(), Shape::Scalar).unwrap();

        assert!(GraphContext::merge(Some(&a), Some(&b)).is_err());
        assert_eq!(a.len(), 1);
    }
}
