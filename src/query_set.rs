// Copyright 2025 Cowboy AI, LLC.

//! Base query objects
//!
//! A [`QuerySet`] describes a read against one model: filters, exclusions,
//! ordering, related-data loading and de-duplication. It is never executed
//! here; the read side that runs it lives elsewhere. Every refinement returns
//! a new value so query objects can be shared and cloned freely.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ModelType;

/// A single field lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lookup {
    /// Field path, e.g. `author__name`
    pub field: String,
    /// Value to compare against
    pub value: Value,
}

/// Related-data loading strategy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectRelated {
    /// Related data is loaded lazily
    #[default]
    Disabled,
    /// Every relation is loaded eagerly
    All,
    /// Only the listed relations are loaded eagerly
    Fields(Vec<String>),
}

impl SelectRelated {
    /// Whether any relation is loaded eagerly
    pub fn is_enabled(&self) -> bool {
        !matches!(self, SelectRelated::Disabled)
    }
}

/// Description of a read against one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySet {
    model: String,
    using: Option<String>,
    filters: Vec<Lookup>,
    excludes: Vec<Lookup>,
    ordering: Vec<String>,
    select_related: SelectRelated,
    distinct: bool,
}

impl QuerySet {
    /// Public operations every base query object provides
    ///
    /// These names are never forwarded by the manager facade.
    pub const MEMBERS: &'static [&'static str] = &[
        "all",
        "filter",
        "exclude",
        "order_by",
        "select_related",
        "distinct",
        "using",
        "model",
        "db",
    ];

    /// Create an unrestricted query for a model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            using: None,
            filters: Vec::new(),
            excludes: Vec::new(),
            ordering: Vec::new(),
            select_related: SelectRelated::Disabled,
            distinct: false,
        }
    }

    /// Whether `name` is a base operation
    pub fn is_member(name: &str) -> bool {
        Self::MEMBERS.contains(&name)
    }

    /// Model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Database alias, if one was chosen
    pub fn db(&self) -> Option<&str> {
        self.using.as_deref()
    }

    /// Filters applied
    pub fn filters(&self) -> &[Lookup] {
        &self.filters
    }

    /// Exclusions applied
    pub fn excludes(&self) -> &[Lookup] {
        &self.excludes
    }

    /// Ordering fields, `-` prefixed for descending
    pub fn ordering(&self) -> &[String] {
        &self.ordering
    }

    /// Related-data loading strategy
    pub fn related(&self) -> &SelectRelated {
        &self.select_related
    }

    /// Whether duplicate rows are removed
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Copy of this query
    pub fn all(self) -> Self {
        self
    }

    /// Restrict to rows where `field` matches `value`
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Lookup {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Remove rows where `field` matches `value`
    pub fn exclude(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.excludes.push(Lookup {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Replace the ordering
    pub fn order_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ordering = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Load every relation eagerly
    pub fn select_related(mut self) -> Self {
        self.select_related = SelectRelated::All;
        self
    }

    /// Load the listed relations eagerly
    ///
    /// Has no effect once every relation is selected.
    pub fn select_related_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let added = fields.into_iter().map(Into::into);
        self.select_related = match self.select_related {
            SelectRelated::All => SelectRelated::All,
            SelectRelated::Disabled => SelectRelated::Fields(added.collect()),
            SelectRelated::Fields(mut existing) => {
                for field in added {
                    if !existing.contains(&field) {
                        existing.push(field);
                    }
                }
                SelectRelated::Fields(existing)
            }
        };
        self
    }

    /// Remove duplicate rows
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Run against a specific database alias
    pub fn using(mut self, alias: impl Into<String>) -> Self {
        self.using = Some(alias.into());
        self
    }
}

/// Arguments for constructing a base query object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryArgs {
    /// Database alias
    pub using: Option<String>,
}

impl QueryArgs {
    /// Arguments targeting a database alias
    pub fn using(alias: impl Into<String>) -> Self {
        Self {
            using: Some(alias.into()),
        }
    }
}

/// Produces the canonical base query object for a model
pub trait QuerySetFactory: Send + Sync {
    /// Build the base query for `model`
    fn create(&self, model: &ModelType, args: &QueryArgs) -> QuerySet;
}

/// Factory producing an unrestricted [`QuerySet`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultQuerySetFactory;

impl QuerySetFactory for DefaultQuerySetFactory {
    fn create(&self, model: &ModelType, args: &QueryArgs) -> QuerySet {
        let query = QuerySet::new(model.name());
        match &args.using {
            Some(alias) => query.using(alias.clone()),
            None => query,
        }
    }
}
