//! Registry of step types.
//!
//! An explicit value, passed to each run. Two runs (e.g. two tests) can use
//! different registries at the same time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::traits::StepLogic;

/// Constructor for a fresh step logic instance (one per step-copy).
pub type StepFactory = Arc<dyn Fn() -> Box<dyn StepLogic> + Send + Sync>;

/// Declaration of a step type: identity plus the hop arity it supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTypeDecl {
    pub id: String,
    pub description: String,
    /// Minimum number of enabled input hops.
    pub min_inputs: usize,
    /// Maximum number of enabled input hops; `None` for unbounded.
    pub max_inputs: Option<usize>,
}

impl StepTypeDecl {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            min_inputs: 0,
            max_inputs: None,
        }
    }

    pub fn inputs(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_inputs = min;
        self.max_inputs = max;
        self
    }
}

#[derive(Clone, Default)]
pub struct StepRegistry {
    entries: BTreeMap<String, (StepTypeDecl, StepFactory)>,
}

impl StepRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in step types.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        r.register(
            StepTypeDecl::new("injector", "Forwards rows pushed by a row producer"),
            || Box::new(crate::injector::Injector::default()),
        );
        r.register(
            StepTypeDecl::new("dummy", "Passes rows through unchanged"),
            || Box::new(crate::dummy::Dummy::default()),
        );
        r.register(
            StepTypeDecl::new("append", "Concatenates input streams in order").inputs(2, None),
            || Box::new(crate::append::Append::default()),
        );
        r.register(
            StepTypeDecl::new("generate_rows", "Emits constant rows").inputs(0, Some(0)),
            || Box::new(crate::generate::GenerateRows::default()),
        );
        r.register(
            StepTypeDecl::new("filter_rows", "Routes rows on a field comparison").inputs(1, None),
            || Box::new(crate::filter::FilterRows::default()),
        );
        r.register(
            StepTypeDecl::new("select_values", "Selects, renames, and converts fields")
                .inputs(1, None),
            || Box::new(crate::select::SelectValues::default()),
        );
        r.register(
            StepTypeDecl::new("abort", "Fails the run past a row threshold").inputs(1, None),
            || Box::new(crate::abort::Abort::default()),
        );
        r
    }

    /// Register (or replace) a step type.
    pub fn register<F>(&mut self, decl: StepTypeDecl, factory: F)
    where
        F: Fn() -> Box<dyn StepLogic> + Send + Sync + 'static,
    {
        self.entries
            .insert(decl.id.clone(), (decl, Arc::new(factory)));
    }

    pub fn decl(&self, id: &str) -> Option<&StepTypeDecl> {
        self.entries.get(id).map(|(d, _)| d)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Instantiate a new logic for `id`.
    pub fn create(&self, id: &str) -> Option<Box<dyn StepLogic>> {
        self.entries.get(id).map(|(_, f)| f())
    }

    /// Iterate over all declarations, sorted by id.
    pub fn declarations(&self) -> impl Iterator<Item = &StepTypeDecl> {
        self.entries.values().map(|(d, _)| d)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::StepIo;
    use crate::traits::{BatchOutcome, StepContext, StepError};

    struct Nop;

    impl StepLogic for Nop {
        fn init(&mut self, _ctx: &StepContext<'_>) -> Result<(), StepError> {
            Ok(())
        }
        fn process_batch(&mut self, _io: &mut StepIo) -> Result<BatchOutcome, StepError> {
            Ok(BatchOutcome::Finished)
        }
    }

    #[test]
    fn builtins_are_registered_with_arity() {
        let r = StepRegistry::with_builtins();
        assert!(r.contains("injector"));
        assert_eq!(r.decl("append").unwrap().min_inputs, 2);
        assert_eq!(r.decl("generate_rows").unwrap().max_inputs, Some(0));
        assert!(r.create("dummy").is_some());
        assert!(r.create("sap_input").is_none());
    }

    #[test]
    fn registries_are_independent() {
        let mut a = StepRegistry::new();
        let b = StepRegistry::new();
        a.register(StepTypeDecl::new("nop", "does nothing"), || Box::new(Nop));
        assert!(a.contains("nop"));
        assert!(!b.contains("nop"));
        assert_eq!(a.declarations().count(), 1);
    }
}
