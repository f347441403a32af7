// Copyright 2025 Cowboy AI, LLC.

//! Manager facade over composed queries
//!
//! A [`MixinManager`] is what clients hold for a model. Every request builds
//! a fresh composed query: the registry resolves the model's class, the
//! factory builds the base query, and the class's default-customization
//! chain runs once over the result.
//!
//! Base operations are typed methods on the manager; a fragment defining a
//! method with a base operation's name overrides it there. Other fragment
//! methods are reached by name through [`MixinManager::call`], which fails
//! fast on private names, base operation names and unknown members.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::composition::{ComposedQuery, Outcome, QueryClass};
use crate::errors::{MixinError, MixinResult};
use crate::model::{Model, ModelType};
use crate::query_set::{DefaultQuerySetFactory, QueryArgs, QuerySet, QuerySetFactory};
use crate::registry::{self, MixinRegistry};

/// Type name reported by forwarding errors
pub const MANAGER_NAME: &str = "MixinManager";

/// Facade handing out composed queries for one model
#[derive(Clone)]
pub struct MixinManager {
    model: ModelType,
    args: QueryArgs,
    registry: Arc<MixinRegistry>,
    factory: Arc<dyn QuerySetFactory>,
}

impl MixinManager {
    /// Manager for model `M` backed by the process-wide registry
    pub fn for_model<M: Model>() -> Self {
        Self::new(ModelType::of::<M>())
    }

    /// Manager for a model type backed by the process-wide registry
    pub fn new(model: ModelType) -> Self {
        Self {
            model,
            args: QueryArgs::default(),
            registry: Arc::clone(registry::global()),
            factory: Arc::new(DefaultQuerySetFactory),
        }
    }

    /// Use another registry
    pub fn with_registry(mut self, registry: Arc<MixinRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Use another base query factory
    pub fn with_factory(mut self, factory: Arc<dyn QuerySetFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Target a database alias
    pub fn using(mut self, alias: impl Into<String>) -> Self {
        self.args.using = Some(alias.into());
        self
    }

    /// Managed model
    pub fn model(&self) -> &ModelType {
        &self.model
    }

    /// Registry the manager resolves against
    pub fn registry(&self) -> &MixinRegistry {
        &self.registry
    }

    /// Composed class for the managed model
    pub fn query_class(&self) -> Arc<QueryClass> {
        self.registry.resolve(&self.model)
    }

    /// Build the default query, taking every applicable fragment into account
    pub fn get_query_set(&self) -> MixinResult<ComposedQuery> {
        let class = self.query_class();
        let base: QuerySet = self.factory.create(&self.model, &self.args);
        let query = ComposedQuery::new(Arc::clone(&class), base);
        // Fragments customize the default query here, e.g. eager loading
        class.run_default(query)
    }

    /// Invoke a fragment method by name on a fresh default query
    ///
    /// # Errors
    ///
    /// Returns [`MixinError::MissingMember`] naming the manager when `member`
    /// is private (leading `_`) or is not defined by any applicable fragment.
    /// Base query operations are rejected too; the typed methods serve them,
    /// overrides included.
    pub fn call(&self, member: &str, args: &[Value]) -> MixinResult<Outcome> {
        if member.starts_with('_') || QuerySet::is_member(member) {
            return Err(MixinError::missing_member(MANAGER_NAME, member));
        }

        let query = self.get_query_set()?;
        if !query.responds_to(member) {
            return Err(MixinError::missing_member(MANAGER_NAME, member));
        }

        trace!(model = %self.model, member, "forwarding to composed query");
        query.call(member, args)
    }

    /// Whether `member` would be forwarded to a fragment method
    pub fn responds_to(&self, member: &str) -> bool {
        !member.starts_with('_')
            && !QuerySet::is_member(member)
            && self.query_class().responds_to(member)
    }

    /// Every row of the model
    pub fn all(&self) -> MixinResult<ComposedQuery> {
        self.get_query_set()?.dispatch("all", &[], ComposedQuery::all)
    }

    /// Rows where `field` matches `value`
    pub fn filter(
        &self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> MixinResult<ComposedQuery> {
        let (field, value) = (field.into(), value.into());
        let args = [Value::from(field.as_str()), value.clone()];
        self.get_query_set()?
            .dispatch("filter", &args, |query| query.filter(field, value))
    }

    /// Rows where `field` does not match `value`
    pub fn exclude(
        &self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> MixinResult<ComposedQuery> {
        let (field, value) = (field.into(), value.into());
        let args = [Value::from(field.as_str()), value.clone()];
        self.get_query_set()?
            .dispatch("exclude", &args, |query| query.exclude(field, value))
    }

    /// Rows in the given order
    pub fn order_by<I, S>(&self, fields: I) -> MixinResult<ComposedQuery>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let args: Vec<Value> = fields.iter().map(|field| Value::from(field.as_str())).collect();
        self.get_query_set()?
            .dispatch("order_by", &args, |query| query.order_by(fields))
    }

    /// Rows with every relation loaded eagerly
    pub fn select_related(&self) -> MixinResult<ComposedQuery> {
        self.get_query_set()?
            .dispatch("select_related", &[], ComposedQuery::select_related)
    }

    /// Rows without duplicates
    pub fn distinct(&self) -> MixinResult<ComposedQuery> {
        self.get_query_set()?
            .dispatch("distinct", &[], ComposedQuery::distinct)
    }
}

impl fmt::Debug for MixinManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(MANAGER_NAME)
            .field("model", &self.model)
            .field("args", &self.args)
            .finish()
    }
}
