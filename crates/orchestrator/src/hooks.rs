//! The augmentation hook registry (SPEC_FULL.md §4.13, supplement).
//!
//! Per Design Notes ("Global mutable augmentation pipeline" → "thin
//! handler registry keyed by lifecycle hook"): hosts register closures
//! against a named lifecycle point; the core invokes them synchronously,
//! in registration order, and does not interpret what they do. What
//! handlers actually implement (sense/cognition/conduit semantics) is out
//! of scope here — this is purely a seam.

use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use vg_core::{NounId, Result};

/// Mutable context passed to a pre-insert hook: the about-to-be-written
/// vector and metadata, which the handler may adjust in place before the
/// write proceeds.
pub struct PreInsertContext<'a> {
    /// Id the noun will be stored under.
    pub id: NounId,
    /// The vector about to be inserted.
    pub vector: &'a mut Vec<f32>,
    /// The metadata object about to be stored.
    pub metadata: &'a mut Map<String, JsonValue>,
}

/// Mutable context passed to a post-search hook: the about-to-be-returned
/// result set, which the handler may reorder, annotate, or truncate.
pub struct PostSearchContext<'a> {
    /// The query that produced these results.
    pub query: &'a [f32],
    /// `(id, distance)` pairs about to be returned to the caller.
    pub results: &'a mut Vec<(NounId, f32)>,
}

/// A pre-insert handler.
pub type PreInsertHook = Arc<dyn Fn(&mut PreInsertContext) -> Result<()> + Send + Sync>;

/// A post-search handler.
pub type PostSearchHook = Arc<dyn Fn(&mut PostSearchContext) -> Result<()> + Send + Sync>;

/// The registry `Database` consults at the two named lifecycle points.
#[derive(Default)]
pub struct HookRegistry {
    pre_insert: Vec<PreInsertHook>,
    post_search: Vec<PostSearchHook>,
}

impl HookRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        HookRegistry::default()
    }

    /// Register a handler run just before a noun is written (spec §4.13).
    pub fn register_pre_insert(&mut self, handler: PreInsertHook) {
        self.pre_insert.push(handler);
    }

    /// Register a handler run just before `search` returns its results.
    pub fn register_post_search(&mut self, handler: PostSearchHook) {
        self.post_search.push(handler);
    }

    /// Run every registered pre-insert handler, in registration order.
    pub fn run_pre_insert(&self, ctx: &mut PreInsertContext) -> Result<()> {
        for handler in &self.pre_insert {
            handler(ctx)?;
        }
        Ok(())
    }

    /// Run every registered post-search handler, in registration order.
    pub fn run_post_search(&self, ctx: &mut PostSearchContext) -> Result<()> {
        for handler in &self.post_search {
            handler(ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_insert_hooks_run_in_registration_order() {
        let mut registry = HookRegistry::new();
        registry.register_pre_insert(Arc::new(|ctx| {
            ctx.metadata.insert("stage".into(), JsonValue::from("first"));
            Ok(())
        }));
        registry.register_pre_insert(Arc::new(|ctx| {
            ctx.metadata.insert("stage".into(), JsonValue::from("second"));
            Ok(())
        }));
        let mut vector = vec![1.0];
        let mut metadata = Map::new();
        let mut ctx = PreInsertContext { id: NounId::new(), vector: &mut vector, metadata: &mut metadata };
        registry.run_pre_insert(&mut ctx).unwrap();
        assert_eq!(metadata["stage"], JsonValue::from("second"));
    }

    #[test]
    fn post_search_hook_can_truncate_results() {
        let mut registry = HookRegistry::new();
        registry.register_post_search(Arc::new(|ctx| {
            ctx.results.truncate(1);
            Ok(())
        }));
        let query = [0.0];
        let mut results = vec![(NounId::new(), 0.1), (NounId::new(), 0.2)];
        let mut ctx = PostSearchContext { query: &query, results: &mut results };
        registry.run_post_search(&mut ctx).unwrap();
        assert_eq!(results.len(), 1);
    }
}
