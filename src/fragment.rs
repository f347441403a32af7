// Copyright 2025 Cowboy AI, LLC.

//! Capability fragments contributed to composed query classes
//!
//! A fragment bundles named methods and an optional default-customization
//! hook. Fragments never know what precedes them in a composed class: they
//! delegate to earlier layers through [`Invocation::call_super`] and
//! [`DefaultChain::proceed`].

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use uuid::Uuid;

use crate::composition::{ComposedQuery, Outcome, QueryClass};
use crate::errors::{MixinError, MixinResult};
use crate::model::Model;

/// Signature of a fragment method
pub type MethodFn = dyn Fn(&Invocation<'_>, &[Value]) -> MixinResult<Outcome> + Send + Sync;

/// Signature of a closure-based default-customization hook
pub type HookFn =
    dyn Fn(ComposedQuery, DefaultChain<'_>) -> MixinResult<ComposedQuery> + Send + Sync;

/// Identity of a fragment inside a composed class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentId {
    /// One identity per fragment type
    Type(TypeId),
    /// One identity per fragment instance
    Instance(Uuid),
    /// The fragment declared on a model type
    Declared(TypeId),
}

impl FragmentId {
    /// Identity shared by every value of `F`
    pub fn of<F: ?Sized + 'static>() -> Self {
        FragmentId::Type(TypeId::of::<F>())
    }

    /// A fresh instance identity
    pub fn unique() -> Self {
        FragmentId::Instance(Uuid::new_v4())
    }

    /// Identity of the fragment declared on model `M`
    ///
    /// Stable across calls, so every value built for the declaration is the
    /// same layer.
    pub fn declared_on<M: Model>() -> Self {
        FragmentId::Declared(TypeId::of::<M>())
    }
}

/// Ordered set of named methods
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: IndexMap<String, Arc<MethodFn>>,
}

impl MethodTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method, replacing any method with the same name
    pub fn with<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&Invocation<'_>, &[Value]) -> MixinResult<Outcome> + Send + Sync + 'static,
    {
        self.insert(name, method);
        self
    }

    /// Insert a method, replacing any method with the same name
    pub fn insert<F>(&mut self, name: impl Into<String>, method: F)
    where
        F: Fn(&Invocation<'_>, &[Value]) -> MixinResult<Outcome> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
    }

    /// Look up a method
    pub fn get(&self, name: &str) -> Option<&Arc<MethodFn>> {
        self.methods.get(name)
    }

    /// Whether a method is defined
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Method names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Number of methods
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.methods.keys()).finish()
    }
}

/// A reusable bundle of query behavior
///
/// # Example
///
/// ```
/// use cim_query_mixins::{ComposedQuery, DefaultChain, Fragment, MixinResult};
/// use std::any::Any;
///
/// struct Newest;
///
/// impl Fragment for Newest {
///     fn name(&self) -> &str { "Newest" }
///     fn as_any(&self) -> &dyn Any { self }
///     fn mixin_default(&self, query: ComposedQuery, chain: DefaultChain<'_>) -> MixinResult<ComposedQuery> {
///         Ok(chain.proceed(query)?.order_by(["-created"]))
///     }
/// }
/// ```
pub trait Fragment: Any + Send + Sync {
    /// Name of the fragment, used for composed class names and diagnostics
    fn name(&self) -> &str;

    /// Identity used to keep a fragment from appearing twice in one class
    fn id(&self) -> FragmentId {
        FragmentId::Type(Any::type_id(self))
    }

    /// Methods contributed by this fragment
    ///
    /// Called once when the fragment is folded into a composed class.
    fn methods(&self) -> MethodTable {
        MethodTable::new()
    }

    /// Customize the default query
    ///
    /// Implementations must call `chain.proceed` and return or wrap its result.
    fn mixin_default(
        &self,
        query: ComposedQuery,
        chain: DefaultChain<'_>,
    ) -> MixinResult<ComposedQuery> {
        chain.proceed(query)
    }

    /// Get the fragment as Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("name", &self.name())
            .field("id", &self.id())
            .finish()
    }
}

/// Fragment assembled from closures
///
/// Every `MethodFragment` has its own identity, so two fragments built with
/// the same name are still distinct layers. Fragments returned from
/// [`Model::declared_fragment`] are built with
/// [`MethodFragment::declared_on`] instead, so repeated calls yield one layer.
pub struct MethodFragment {
    id: FragmentId,
    name: String,
    methods: MethodTable,
    hook: Option<Arc<HookFn>>,
}

impl MethodFragment {
    /// Create an empty fragment
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: FragmentId::unique(),
            name: name.into(),
            methods: MethodTable::new(),
            hook: None,
        }
    }

    /// Create the fragment declared on model `M`
    pub fn declared_on<M: Model>(name: impl Into<String>) -> Self {
        Self::new(name).with_id(FragmentId::declared_on::<M>())
    }

    /// Replace the identity
    pub fn with_id(mut self, id: FragmentId) -> Self {
        self.id = id;
        self
    }

    /// Add a method
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&Invocation<'_>, &[Value]) -> MixinResult<Outcome> + Send + Sync + 'static,
    {
        self.methods.insert(name, method);
        self
    }

    /// Set the default-customization hook
    pub fn on_default<F>(mut self, hook: F) -> Self
    where
        F: Fn(ComposedQuery, DefaultChain<'_>) -> MixinResult<ComposedQuery>
            + Send
            + Sync
            + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Finish building and share the fragment
    pub fn into_arc(self) -> Arc<dyn Fragment> {
        Arc::new(self)
    }
}

impl Fragment for MethodFragment {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> FragmentId {
        self.id
    }

    fn methods(&self) -> MethodTable {
        self.methods.clone()
    }

    fn mixin_default(
        &self,
        query: ComposedQuery,
        chain: DefaultChain<'_>,
    ) -> MixinResult<ComposedQuery> {
        match &self.hook {
            Some(hook) => hook(query, chain),
            None => chain.proceed(query),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Context of a fragment method call
pub struct Invocation<'a> {
    query: &'a ComposedQuery,
    layer: &'a QueryClass,
    method: &'a str,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(query: &'a ComposedQuery, layer: &'a QueryClass, method: &'a str) -> Self {
        Self {
            query,
            layer,
            method,
        }
    }

    /// The query the method was invoked on
    pub fn query(&self) -> &'a ComposedQuery {
        self.query
    }

    /// Name of the invoked method
    pub fn method(&self) -> &'a str {
        self.method
    }

    /// The fragment that defines the running method, if it is an `F`
    pub fn fragment<F: Fragment>(&self) -> Option<&'a F> {
        self.layer
            .fragment()
            .and_then(|fragment| fragment.as_any().downcast_ref::<F>())
    }

    /// Dispatch another method on the same query
    pub fn call(&self, name: &str, args: &[Value]) -> MixinResult<Outcome> {
        self.query.call(name, args)
    }

    /// Call the same method as defined by an earlier layer
    pub fn call_super(&self, args: &[Value]) -> MixinResult<Outcome> {
        let parent = self.layer.parent().ok_or_else(|| {
            MixinError::missing_member(self.query.class().name(), self.method)
        })?;
        match parent.find_method(self.method) {
            Some((layer, method)) => method(&Invocation::new(self.query, layer, self.method), args),
            None => Err(MixinError::missing_member(
                self.query.class().name(),
                self.method,
            )),
        }
    }
}

/// The remaining default-customization hooks of a composed class
///
/// Proceeding past the last fragment reaches the base class, whose hook
/// returns the query unchanged.
pub struct DefaultChain<'a> {
    next: Option<&'a QueryClass>,
}

impl<'a> DefaultChain<'a> {
    pub(crate) fn starting_at(class: &'a QueryClass) -> Self {
        Self { next: Some(class) }
    }

    /// Run the hook of the next layer down
    pub fn proceed(self, query: ComposedQuery) -> MixinResult<ComposedQuery> {
        let mut level = self.next;
        while let Some(class) = level {
            if let Some(fragment) = class.fragment() {
                let chain = DefaultChain {
                    next: class.parent().map(|parent| &**parent),
                };
                return fragment.mixin_default(query, chain);
            }
            level = class.parent().map(|parent| &**parent);
        }
        Ok(query)
    }
}
