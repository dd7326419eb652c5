//! # Property Accessor Tables
//!
//! Precompiled map from dotted field path to a typed getter, built once per
//! entity type at configuration time. Resolving a path per row is a single
//! map lookup followed by direct field access; no per-row path parsing.
//!
//! Nested tables compose:
//! - [`AccessorTable::one`] registers `rel.sub` for a to-one relationship
//! - [`AccessorTable::many`] registers `rel.sub` for a to-many relationship,
//!   producing [`Property::Many`] (existential matching downstream)
//!
//! ```
//! use tabula_core::{AccessorTable, Value};
//!
//! struct Address { city: String }
//! struct Person { id: u64, address: Option<Address> }
//!
//! let addresses = AccessorTable::<Address>::new()
//!     .field("city", |a| Value::from(&a.city));
//! let people = AccessorTable::<Person>::new()
//!     .field("id", |p| Value::from(p.id))
//!     .one("address", |p| p.address.as_ref(), addresses);
//!
//! assert!(people.contains("address.city"));
//! ```

use crate::primitives::PATH_SEPARATOR;
use crate::types::{Property, TabulaError, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A resolved getter for one field path.
pub type Getter<E> = Arc<dyn Fn(&E) -> Property + Send + Sync>;

/// Field-path → getter table for entity type `E`.
pub struct AccessorTable<E> {
    getters: BTreeMap<String, Getter<E>>,
}

impl<E> Default for AccessorTable<E> {
    fn default() -> Self {
        Self {
            getters: BTreeMap::new(),
        }
    }
}

impl<E> Clone for AccessorTable<E> {
    fn clone(&self) -> Self {
        Self {
            getters: self.getters.clone(),
        }
    }
}

impl<E> fmt::Debug for AccessorTable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorTable")
            .field("paths", &self.getters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<E: 'static> AccessorTable<E> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scalar field.
    #[must_use]
    pub fn field<F>(self, name: &str, get: F) -> Self
    where
        F: Fn(&E) -> Value + Send + Sync + 'static,
    {
        self.property(name, move |e| Property::One(get(e)))
    }

    /// Register an element collection (multi-valued scalar field).
    #[must_use]
    pub fn collection<F>(self, name: &str, get: F) -> Self
    where
        F: Fn(&E) -> Vec<Value> + Send + Sync + 'static,
    {
        self.property(name, move |e| Property::Many(get(e)))
    }

    /// Register a raw property getter under an arbitrary path.
    #[must_use]
    pub fn property<F>(mut self, path: &str, get: F) -> Self
    where
        F: Fn(&E) -> Property + Send + Sync + 'static,
    {
        self.getters.insert(path.to_string(), Arc::new(get));
        self
    }

    /// Register every path of `inner` under `name.` through a to-one relationship.
    ///
    /// A missing related entity resolves every nested path to null.
    #[must_use]
    pub fn one<R, N>(mut self, name: &str, nav: N, inner: AccessorTable<R>) -> Self
    where
        R: 'static,
        N: for<'a> Fn(&'a E) -> Option<&'a R> + Send + Sync + 'static,
    {
        let nav = Arc::new(nav);
        for (sub, getter) in inner.getters {
            let nav = Arc::clone(&nav);
            let path = format!("{name}{PATH_SEPARATOR}{sub}");
            self.getters.insert(
                path,
                Arc::new(move |e: &E| match nav(e) {
                    Some(related) => getter(related),
                    None => Property::One(Value::Null),
                }),
            );
        }
        self
    }

    /// Register every path of `inner` under `name.` through a to-many relationship.
    ///
    /// Nested values of all related entities are flattened into one
    /// [`Property::Many`], in relationship order.
    #[must_use]
    pub fn many<R, N>(mut self, name: &str, nav: N, inner: AccessorTable<R>) -> Self
    where
        R: 'static,
        N: for<'a> Fn(&'a E) -> &'a [R] + Send + Sync + 'static,
    {
        let nav = Arc::new(nav);
        for (sub, getter) in inner.getters {
            let nav = Arc::clone(&nav);
            let path = format!("{name}{PATH_SEPARATOR}{sub}");
            self.getters.insert(
                path,
                Arc::new(move |e: &E| {
                    let mut values = Vec::new();
                    for related in nav(e) {
                        match getter(related) {
                            Property::One(v) => values.push(v),
                            Property::Many(vs) => values.extend(vs),
                        }
                    }
                    Property::Many(values)
                }),
            );
        }
        self
    }
}

impl<E> AccessorTable<E> {
    /// Resolve the getter for a path.
    ///
    /// # Errors
    ///
    /// Returns `TabulaError::UnknownField` if no getter is registered.
    pub fn resolve(&self, path: &str) -> Result<&Getter<E>, TabulaError> {
        self.getters
            .get(path)
            .ok_or_else(|| TabulaError::UnknownField(path.to_string()))
    }

    /// Resolve a path against an entity.
    pub fn get(&self, entity: &E, path: &str) -> Result<Property, TabulaError> {
        Ok(self.resolve(path)?(entity))
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.getters.contains_key(path)
    }

    /// All registered paths, in lexical order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.getters.keys().map(String::as_str)
    }
}

// =============================================================================
// TESTS
// =============================================================================
