//! Aligned registry
//!
//! Integer-indexed table of durable handles owned by an environment. Native
//! code caches frequently used script values (functions, constructors,
//! configuration objects) here and reads them back by index on hot paths
//! instead of looking them up by name.

use std::cell::RefCell;
use std::rc::Rc;

use rquickjs::{Ctx, Function, Object, Value};

use super::handle::{DurableHandle, HandleStore};
use super::marshal::type_name;
use crate::core::error::{BridgeError, BridgeResult};

pub struct AlignedRegistry {
    handles: Rc<HandleStore>,
    entries: RefCell<Vec<Option<DurableHandle>>>,
}

impl AlignedRegistry {
    pub fn new(handles: Rc<HandleStore>) -> Self {
        Self {
            handles,
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Stores a strong handle to `value` at the next free index.
    pub fn register<'js>(&self, ctx: &Ctx<'js>, value: Value<'js>) -> usize {
        self.register_handle(self.handles.save(ctx, value).into())
    }

    pub fn register_handle(&self, handle: DurableHandle) -> usize {
        let mut entries = self.entries.borrow_mut();
        let index = entries.len();
        entries.push(Some(handle));
        tracing::trace!(target: "cyder::bindings", index, "aligned value registered");
        index
    }

    /// Stores a strong handle at a caller-chosen index, replacing any previous
    /// entry there.
    pub fn register_at<'js>(&self, ctx: &Ctx<'js>, index: usize, value: Value<'js>) {
        let handle = self.handles.save(ctx, value).into();
        let mut entries = self.entries.borrow_mut();
        if entries.len() <= index {
            entries.resize_with(index + 1, || None);
        }
        entries[index] = Some(handle);
    }

    pub fn get<'js>(&self, ctx: &Ctx<'js>, index: usize) -> BridgeResult<Value<'js>> {
        let entries = self.entries.borrow();
        let handle = entries
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(BridgeError::RegistryIndexOutOfRange {
                index,
                len: entries.len(),
            })?;
        handle
            .to_local(ctx)?
            .ok_or(BridgeError::RegistryCollected { index })
    }

    /// True when `index` holds a weak handle whose referent is gone.
    pub fn is_collected(&self, index: usize) -> bool {
        match self.entries.borrow().get(index) {
            Some(Some(DurableHandle::Weak(handle))) => handle.is_collected(),
            _ => false,
        }
    }

    pub fn get_function<'js>(&self, ctx: &Ctx<'js>, index: usize) -> BridgeResult<Function<'js>> {
        let value = self.get(ctx, index)?;
        let found = type_name(&value);
        value.into_function().ok_or(BridgeError::TypeMismatch {
            expected: "function",
            found,
        })
    }

    pub fn get_object<'js>(&self, ctx: &Ctx<'js>, index: usize) -> BridgeResult<Object<'js>> {
        let value = self.get(ctx, index)?;
        let found = type_name(&value);
        value.into_object().ok_or(BridgeError::TypeMismatch {
            expected: "object",
            found,
        })
    }

    /// Number of index slots, including slots skipped by [`register_at`](Self::register_at).
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Releases every handle. Called by the owning environment before the
    /// engine context goes away.
    pub fn clear(&self) {
        // Drop outside the borrow: releasing a handle must not observe the table.
        let entries = std::mem::take(&mut *self.entries.borrow_mut());
        drop(entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::handle::WeakHandle;
    use crate::bindings::Environment;
    use proptest::prelude::*;

    #[test]
    fn test_register_and_read_back() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let registry = scope.env().registry();
            let first = registry.register(scope.ctx(), scope.make_int(10));
            let second = registry.register(scope.ctx(), scope.make_string("ten").unwrap());
            assert_eq!((first, second), (0, 1));
            assert_eq!(registry.get(scope.ctx(), 0).unwrap().as_int(), Some(10));
            let text = registry.get(scope.ctx(), 1).unwrap();
            assert_eq!(scope.to_string(&text), "ten");
        });
    }

    #[test]
    fn test_read_unregistered_index() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let registry = scope.env().registry();
            registry.register(scope.ctx(), scope.make_null());
            let result = registry.get(scope.ctx(), 1);
            assert!(matches!(
                result,
                Err(BridgeError::RegistryIndexOutOfRange { index: 1, len: 1 })
            ));
        });
    }

    #[test]
    fn test_register_at_grows_table() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let registry = scope.env().registry();
            registry.register_at(scope.ctx(), 4, scope.make_bool(true));
            assert_eq!(registry.len(), 5);
            assert_eq!(registry.get(scope.ctx(), 4).unwrap().as_bool(), Some(true));
            // skipped slots read as never registered
            assert!(matches!(
                registry.get(scope.ctx(), 2),
                Err(BridgeError::RegistryIndexOutOfRange { index: 2, .. })
            ));
            assert_eq!(registry.register(scope.ctx(), scope.make_int(1)), 5);
        });
    }

    #[test]
    fn test_typed_reads() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let function: Value = scope.eval("(function add(a, b) { return a + b; })").unwrap();
            let registry = scope.env().registry();
            let index = registry.register(scope.ctx(), function);
            let add = registry.get_function(scope.ctx(), index).unwrap();
            assert_eq!(add.call::<_, i32>((2, 3)).unwrap(), 5);

            let number = registry.register(scope.ctx(), scope.make_number(1.5));
            assert!(matches!(
                registry.get_function(scope.ctx(), number),
                Err(BridgeError::TypeMismatch { found: "number", .. })
            ));
        });
    }

    #[test]
    fn test_entries_survive_scopes_and_gc() {
        let env = Environment::new().unwrap();
        let index = env.with(|scope| {
            let object = scope.make_object().unwrap();
            object.set("kept", 99).unwrap();
            scope.save_aligned_value(object.into_value())
        });
        env.run_gc();
        let kept = env.with(|scope| {
            let object = scope.read_aligned_object(index).unwrap();
            object.get::<_, i32>("kept").unwrap()
        });
        assert_eq!(kept, 99);
    }

    #[test]
    fn test_weak_entry_reports_collection() {
        let env = Environment::new().unwrap();
        let (pinned, dropped) = env.with(|scope| {
            let registry = scope.env().registry();
            let kept = scope.make_object().unwrap();
            kept.set("tag", "kept").unwrap();
            scope.global().set("kept", kept.clone()).unwrap();
            let pinned = registry.register_handle(WeakHandle::new(&scope, &kept).unwrap().into());

            let cyclic = scope.make_object().unwrap();
            cyclic.set("me", cyclic.clone()).unwrap();
            let dropped = registry.register_handle(WeakHandle::new(&scope, &cyclic).unwrap().into());
            (pinned, dropped)
        });

        env.run_gc();
        assert!(!env.token().registry().is_collected(pinned));
        assert!(env.token().registry().is_collected(dropped));
        env.with(|scope| {
            let kept = scope.read_aligned_object(pinned).unwrap();
            assert_eq!(kept.get::<_, String>("tag").unwrap(), "kept");
            assert!(matches!(
                scope.read_aligned_value(dropped),
                Err(BridgeError::RegistryCollected { index }) if index == dropped
            ));
        });
    }

    #[test]
    fn test_entries_read_as_released_after_teardown() {
        let env = Environment::new().unwrap();
        let token = env.token().clone();
        env.with(|scope| scope.save_aligned_value(scope.make_int(3)));
        drop(env);

        assert!(token.registry().is_empty());
        assert!(token.handles().is_released());
        assert!(token.handles().is_empty());
    }

    #[test]
    fn test_clear_releases_entries() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let registry = scope.env().registry();
            let pinned_before = scope.env().handles().len();
            registry.register(scope.ctx(), scope.make_int(1));
            assert_eq!(scope.env().handles().len(), pinned_before + 1);
            registry.clear();
            assert!(registry.is_empty());
            assert_eq!(scope.env().handles().len(), pinned_before);
        });
    }

    proptest! {
        #[test]
        fn test_registry_indices_are_sequential(values in prop::collection::vec(any::<i32>(), 0..32)) {
            let env = Environment::new().unwrap();
            env.with(|scope| {
                let registry = scope.env().registry();
                for (expected, value) in values.iter().enumerate() {
                    let index = registry.register(scope.ctx(), scope.make_int(*value));
                    prop_assert_eq!(index, expected);
                }
                for (index, value) in values.iter().enumerate() {
                    let stored = registry.get(scope.ctx(), index).unwrap();
                    prop_assert_eq!(stored.as_int(), Some(*value));
                }
                let out_of_range = matches!(
                    registry.get(scope.ctx(), values.len()),
                    Err(BridgeError::RegistryIndexOutOfRange { .. })
                );
                prop_assert!(out_of_range);
                Ok(())
            })?;
        }
    }
}
