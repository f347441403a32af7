// Copyright 2025 Cowboy AI, LLC.

//! # CIM Query Mixins
//!
//! Composable behavior for read-model query objects.
//!
//! Independently written fragments ("mixins") are attached to query objects
//! according to where they sit in a model hierarchy:
//! - **Fragments**: named bundles of query methods plus an optional default hook
//! - **Anchors**: the model type (or the global anchor) a fragment is registered for
//! - **Registry**: maps anchors to fragments and memoizes composed query classes
//! - **Composed classes**: every applicable fragment folded along a model's ancestry
//! - **Manager**: the facade clients use to obtain customized queries
//!
//! ## Design Principles
//!
//! 1. **Deterministic precedence**: global first, then ancestors from most general
//!    to most specific; the most specific fragment wins on name clashes
//! 2. **Explicit opt-in**: fragments are registered or declared on a model, never
//!    discovered by introspection
//! 3. **Initialize then freeze**: registrations happen during start-up, after which
//!    the registry can be frozen and the cache is a pure memoization table
//! 4. **Fail fast**: unknown or private members are never silently forwarded
//!
//! ## Example
//!
//! ```
//! use cim_query_mixins::{MethodFragment, MixinManager, MixinRegistry, Model};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Article;
//! impl Model for Article {}
//!
//! let registry = Arc::new(MixinRegistry::new());
//! registry
//!     .register_for::<Article>(
//!         MethodFragment::new("PublishedQuerySet")
//!             .method("published", |cx, _| Ok(cx.query().filter("published", true).into()))
//!             .into_arc(),
//!     )
//!     .unwrap();
//!
//! let articles = MixinManager::for_model::<Article>().with_registry(registry);
//! let published = articles.call("published", &[]).unwrap().into_query().unwrap();
//! assert_eq!(published.base().filters()[0].value, json!(true));
//! ```

#![warn(missing_docs)]

mod composition;
mod config;
mod errors;
mod fragment;
mod manager;
mod model;
mod query_set;
mod registry;
pub mod mixins;

pub use composition::{ComposedQuery, Outcome, QueryClass, BASE_CLASS_NAME};
pub use config::RegistryConfig;
pub use errors::{MixinError, MixinResult};
pub use fragment::{
    DefaultChain, Fragment, FragmentId, HookFn, Invocation, MethodFn, MethodFragment,
    MethodTable,
};
pub use manager::{MixinManager, MANAGER_NAME};
pub use model::{Anchor, Model, ModelType};
pub use query_set::{
    DefaultQuerySetFactory, Lookup, QueryArgs, QuerySet, QuerySetFactory, SelectRelated,
};
pub use registry::{global, register_mixin, MixinRegistry, RegistrationInfo};
