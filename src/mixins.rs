// Copyright 2025 Cowboy AI, LLC.

//! Commonly useful query mixins

use std::any::Any;

use crate::composition::ComposedQuery;
use crate::errors::MixinResult;
use crate::fragment::{DefaultChain, Fragment};

/// Loads related data eagerly by default
///
/// Forgetting to select related rows causes far more performance trouble in
/// practice than selecting a few too many.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectRelatedMixin {
    fields: Vec<String>,
}

impl SelectRelatedMixin {
    /// Select every relation
    pub fn new() -> Self {
        Self::default()
    }

    /// Select only the listed relations
    pub fn with_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Relations selected, empty meaning all
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl Fragment for SelectRelatedMixin {
    fn name(&self) -> &str {
        "SelectRelatedMixin"
    }

    fn mixin_default(
        &self,
        query: ComposedQuery,
        chain: DefaultChain<'_>,
    ) -> MixinResult<ComposedQuery> {
        let query = chain.proceed(query)?;
        if self.fields.is_empty() {
            Ok(query.select_related())
        } else {
            Ok(query.select_related_fields(self.fields.iter().cloned()))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::QueryClass;
    use crate::query_set::{QuerySet, SelectRelated};
    use std::sync::Arc;

    fn customize(mixin: SelectRelatedMixin) -> ComposedQuery {
        let class = QueryClass::fold(Arc::new(mixin), &QueryClass::base());
        let query = ComposedQuery::new(Arc::clone(&class), QuerySet::new("Site"));
        class.run_default(query).unwrap()
    }

    #[test]
    fn test_selects_everything_by_default() {
        let query = customize(SelectRelatedMixin::new());
        assert_eq!(query.base().related(), &SelectRelated::All);
    }

    #[test]
    fn test_selects_listed_fields() {
        let query = customize(SelectRelatedMixin::with_fields(["owner", "domain"]));
        assert_eq!(
            query.base().related(),
            &SelectRelated::Fields(vec!["owner".to_string(), "domain".to_string()])
        );
    }

    #[test]
    fn test_has_no_methods() {
        assert!(SelectRelatedMixin::new().methods().is_empty());
        assert!(SelectRelatedMixin::new().fields().is_empty());
    }
}
