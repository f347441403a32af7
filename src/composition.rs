// Copyright 2025 Cowboy AI, LLC.

//! Composed query classes and the query objects built from them
//!
//! A [`QueryClass`] is an immutable chain of layers. Folding a fragment onto
//! a class yields a new class whose ancestry is `(fragment, class)`: the new
//! fragment's methods win on name clashes and the old class stays reachable
//! through super calls.
//!
//! ```mermaid
//! graph LR
//!     Specific[Article fragment] --> Content[Content fragment]
//!     Content --> Global[Global fragment]
//!     Global --> Base[Base class: no-op default hook]
//! ```

use std::fmt;
use std::iter;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::errors::{MixinError, MixinResult};
use crate::fragment::{DefaultChain, Fragment, FragmentId, Invocation, MethodFn, MethodTable};
use crate::query_set::QuerySet;

/// Name of the base composed class
pub const BASE_CLASS_NAME: &str = "QuerySet";

struct Layer {
    fragment: Arc<dyn Fragment>,
    methods: MethodTable,
}

/// A synthesized query class combining fragments in precedence order
pub struct QueryClass {
    name: String,
    layer: Option<Layer>,
    parent: Option<Arc<QueryClass>>,
    depth: usize,
}

impl QueryClass {
    /// The base class: no fragments, default hook returns the query unchanged
    pub fn base() -> Arc<Self> {
        Arc::new(Self {
            name: BASE_CLASS_NAME.to_string(),
            layer: None,
            parent: None,
            depth: 0,
        })
    }

    /// Fold `fragment` on top of `accumulated`
    pub fn fold(fragment: Arc<dyn Fragment>, accumulated: &Arc<QueryClass>) -> Arc<Self> {
        let methods = fragment.methods();
        Arc::new(Self {
            name: fragment.name().to_string(),
            layer: Some(Layer { fragment, methods }),
            parent: Some(Arc::clone(accumulated)),
            depth: accumulated.depth + 1,
        })
    }

    /// Class name, taken from its most specific fragment
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the base class
    pub fn is_base(&self) -> bool {
        self.layer.is_none()
    }

    /// Number of fragments in the class
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Class this one was folded onto
    pub fn parent(&self) -> Option<&Arc<QueryClass>> {
        self.parent.as_ref()
    }

    /// Fragment contributed by this layer
    pub fn fragment(&self) -> Option<&Arc<dyn Fragment>> {
        self.layer.as_ref().map(|layer| &layer.fragment)
    }

    /// This class followed by every class it was folded onto, ending at the base
    pub fn ancestry(&self) -> impl Iterator<Item = &QueryClass> {
        iter::successors(Some(self), |class| class.parent.as_deref())
    }

    /// Fragments in resolution order, most specific first
    pub fn fragments(&self) -> Vec<&Arc<dyn Fragment>> {
        self.ancestry().filter_map(QueryClass::fragment).collect()
    }

    /// Fragment names in resolution order, most specific first
    pub fn fragment_names(&self) -> Vec<&str> {
        self.fragments().into_iter().map(|f| f.name()).collect()
    }

    /// Whether a fragment with this identity is part of the class
    pub fn contains(&self, id: FragmentId) -> bool {
        self.fragments().iter().any(|fragment| fragment.id() == id)
    }

    /// Whether the class includes a fragment of type `F`
    pub fn includes<F: Fragment>(&self) -> bool {
        self.fragments()
            .iter()
            .any(|fragment| fragment.as_any().is::<F>())
    }

    /// Resolve a method, returning the defining layer with it
    pub fn find_method(&self, name: &str) -> Option<(&QueryClass, &Arc<MethodFn>)> {
        self.ancestry().find_map(|class| {
            class
                .layer
                .as_ref()
                .and_then(|layer| layer.methods.get(name))
                .map(|method| (class, method))
        })
    }

    /// Whether any layer defines `name`
    pub fn responds_to(&self, name: &str) -> bool {
        self.find_method(name).is_some()
    }

    /// Union of all method names, most specific layer first
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for class in self.ancestry() {
            if let Some(layer) = &class.layer {
                for name in layer.methods.names() {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        names
    }

    /// Run the default-customization chain from the most specific layer
    pub fn run_default(&self, query: ComposedQuery) -> MixinResult<ComposedQuery> {
        DefaultChain::starting_at(self).proceed(query)
    }
}

impl fmt::Debug for QueryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClass")
            .field("name", &self.name)
            .field("fragments", &self.fragment_names())
            .finish()
    }
}

/// Result of a fragment method
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A plain value
    Value(Value),
    /// A refined query of the same composed class
    Query(ComposedQuery),
}

impl Outcome {
    /// The value, if this is one
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Outcome::Value(value) => Some(value),
            Outcome::Query(_) => None,
        }
    }

    /// Take the value, if this is one
    pub fn into_value(self) -> Option<Value> {
        match self {
            Outcome::Value(value) => Some(value),
            Outcome::Query(_) => None,
        }
    }

    /// Take the query, if this is one
    pub fn into_query(self) -> Option<ComposedQuery> {
        match self {
            Outcome::Value(_) => None,
            Outcome::Query(query) => Some(query),
        }
    }

    /// Whether this is a query
    pub fn is_query(&self) -> bool {
        matches!(self, Outcome::Query(_))
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Value(value)
    }
}

impl From<ComposedQuery> for Outcome {
    fn from(query: ComposedQuery) -> Self {
        Outcome::Query(query)
    }
}

/// A base query object bound to a composed class
///
/// Refinements keep the composed class, so fragment methods stay available
/// on every derived query.
#[derive(Clone)]
pub struct ComposedQuery {
    class: Arc<QueryClass>,
    base: QuerySet,
}

impl ComposedQuery {
    /// Bind a base query to a class
    pub fn new(class: Arc<QueryClass>, base: QuerySet) -> Self {
        Self { class, base }
    }

    /// The composed class
    pub fn class(&self) -> &Arc<QueryClass> {
        &self.class
    }

    /// The underlying base query
    pub fn base(&self) -> &QuerySet {
        &self.base
    }

    /// Take the underlying base query
    pub fn into_base(self) -> QuerySet {
        self.base
    }

    /// Whether the class includes a fragment of type `F`
    pub fn is_instance_of<F: Fragment>(&self) -> bool {
        self.class.includes::<F>()
    }

    /// Whether the class includes the given fragment
    pub fn has_fragment(&self, fragment: &dyn Fragment) -> bool {
        self.class.contains(fragment.id())
    }

    /// Whether a fragment method with this name is available
    pub fn responds_to(&self, name: &str) -> bool {
        self.class.responds_to(name)
    }

    /// Invoke a fragment method by name
    pub fn call(&self, name: &str, args: &[Value]) -> MixinResult<Outcome> {
        match self.class.find_method(name) {
            Some((layer, method)) => method(&Invocation::new(self, layer, name), args),
            None => Err(MixinError::missing_member(self.class.name(), name)),
        }
    }

    /// Apply a base operation, preferring a fragment method of the same name
    ///
    /// The refinement methods of this type are the base operations themselves;
    /// a fragment overriding one of them reaches the base behavior through
    /// them rather than through [`Invocation::call_super`].
    ///
    /// # Errors
    ///
    /// Propagates the override's error, and returns
    /// [`MixinError::FragmentFailure`] when the override yields a value
    /// instead of a query.
    pub fn dispatch<F>(&self, name: &str, args: &[Value], base: F) -> MixinResult<Self>
    where
        F: FnOnce(&Self) -> Self,
    {
        match self.class.find_method(name) {
            Some((layer, method)) => {
                trace!(class = self.class.name(), method = name, "base operation overridden");
                method(&Invocation::new(self, layer, name), args)?
                    .into_query()
                    .ok_or_else(|| {
                        MixinError::fragment_failure(
                            layer.name(),
                            format!("'{name}' must return a query"),
                        )
                    })
            }
            None => Ok(base(self)),
        }
    }

    /// Replace the base query, keeping the class
    pub fn map_base<F>(&self, refine: F) -> Self
    where
        F: FnOnce(QuerySet) -> QuerySet,
    {
        Self {
            class: Arc::clone(&self.class),
            base: refine(self.base.clone()),
        }
    }

    /// Copy of this query
    pub fn all(&self) -> Self {
        self.map_base(QuerySet::all)
    }

    /// Restrict to rows where `field` matches `value`
    pub fn filter(&self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.map_base(|base| base.filter(field, value))
    }

    /// Remove rows where `field` matches `value`
    pub fn exclude(&self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.map_base(|base| base.exclude(field, value))
    }

    /// Replace the ordering
    pub fn order_by<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.map_base(|base| base.order_by(fields))
    }

    /// Load every relation eagerly
    pub fn select_related(&self) -> Self {
        self.map_base(QuerySet::select_related)
    }

    /// Load the listed relations eagerly
    pub fn select_related_fields<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.map_base(|base| base.select_related_fields(fields))
    }

    /// Remove duplicate rows
    pub fn distinct(&self) -> Self {
        self.map_base(QuerySet::distinct)
    }

    /// Run against a specific database alias
    pub fn using(&self, alias: impl Into<String>) -> Self {
        self.map_base(|base| base.using(alias))
    }
}

impl fmt::Debug for ComposedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedQuery")
            .field("class", &self.class.name())
            .field("base", &self.base)
            .finish()
    }
}
