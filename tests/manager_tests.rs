// Copyright 2025 Cowboy AI, LLC.

//! Manager behaviour for discovered, registered and global mixins

use std::any::Any;
use std::sync::Arc;

use cim_query_mixins::mixins::SelectRelatedMixin;
use cim_query_mixins::{
    register_mixin, Anchor, Fragment, MethodTable, MixinManager, MixinRegistry, Model,
    SelectRelated,
};
use serde_json::json;

// MODELS

struct Discovered;

impl Model for Discovered {
    fn declared_fragment() -> Option<Arc<dyn Fragment>> {
        Some(Arc::new(DiscoveredQuerySet))
    }
}

struct Registered;
impl Model for Registered {}

struct Site;
impl Model for Site {}

// MIXINS

struct DiscoveredQuerySet;

impl Fragment for DiscoveredQuerySet {
    fn name(&self) -> &str {
        "DiscoveredQuerySet"
    }

    fn methods(&self) -> MethodTable {
        MethodTable::new().with("foo", |_, _| Ok(json!("foo").into()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct RegisteredQuerySet;

impl Fragment for RegisteredQuerySet {
    fn name(&self) -> &str {
        "RegisteredQuerySet"
    }

    fn methods(&self) -> MethodTable {
        MethodTable::new().with("bar", |_, _| Ok(json!("bar").into()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct GlobalQuerySet;

impl Fragment for GlobalQuerySet {
    fn name(&self) -> &str {
        "GlobalQuerySet"
    }

    fn methods(&self) -> MethodTable {
        MethodTable::new().with("baz", |_, _| Ok(json!("baz").into()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// TESTS

#[test]
fn discovered_mixin() {
    let objects = MixinManager::for_model::<Discovered>();

    assert!(objects.all().unwrap().is_instance_of::<DiscoveredQuerySet>());
    let foo = objects.call("foo", &[]).unwrap();
    assert_eq!(foo.into_value(), Some(json!("foo")));
}

#[test]
fn registered_mixin() {
    register_mixin(Arc::new(RegisteredQuerySet), Anchor::model::<Registered>()).unwrap();
    let objects = MixinManager::for_model::<Registered>();

    assert!(objects.all().unwrap().is_instance_of::<RegisteredQuerySet>());
    let bar = objects.call("bar", &[]).unwrap();
    assert_eq!(bar.into_value(), Some(json!("bar")));
}

#[test]
fn global_mixin() {
    // Private registry: a global fragment on the process-wide registry would
    // leak into every other test in this binary
    let registry = Arc::new(MixinRegistry::new());
    registry.register_global(Arc::new(GlobalQuerySet)).unwrap();
    let objects = MixinManager::for_model::<Site>().with_registry(registry);

    assert!(objects.all().unwrap().is_instance_of::<GlobalQuerySet>());
    let baz = objects.call("baz", &[]).unwrap();
    assert_eq!(baz.into_value(), Some(json!("baz")));
}

#[test]
fn select_related_mixin() {
    let registry = Arc::new(MixinRegistry::new());
    registry
        .register_for::<Site>(Arc::new(SelectRelatedMixin::new()))
        .unwrap();
    let objects = MixinManager::for_model::<Site>().with_registry(registry);

    let query = objects.all().unwrap();
    assert_eq!(query.base().related(), &SelectRelated::All);
}

#[test]
fn select_related_mixin_keeps_custom_fields() {
    let registry = Arc::new(MixinRegistry::new());
    registry
        .register_for::<Site>(Arc::new(SelectRelatedMixin::with_fields(["domain"])))
        .unwrap();
    let objects = MixinManager::for_model::<Site>().with_registry(registry);

    let query = objects.filter("name", "test").unwrap();
    assert_eq!(
        query.base().related(),
        &SelectRelated::Fields(vec!["domain".to_string()])
    );
    assert_eq!(query.base().filters().len(), 1);
}
