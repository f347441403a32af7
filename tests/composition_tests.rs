//! Composition guarantees of the registry and the manager facade

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cim_query_mixins::{
    ComposedQuery, DefaultChain, Fragment, MethodFragment, MethodTable, MixinError,
    MixinManager, MixinRegistry, MixinResult, Model, ModelType, QueryArgs, QuerySet,
    QuerySetFactory, SelectRelated, MANAGER_NAME,
};
use mockall::mock;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use test_case::test_case;

// Content <- Article <- FeatureArticle, Article also derives Tagged

struct Content;

impl Model for Content {
    fn declared_fragment() -> Option<Arc<dyn Fragment>> {
        Some(Arc::new(ContentQuerySet))
    }
}

struct Tagged;
impl Model for Tagged {}

struct Article;

impl Model for Article {
    fn bases() -> Vec<ModelType> {
        vec![ModelType::of::<Content>(), ModelType::of::<Tagged>()]
    }
}

struct FeatureArticle;

impl Model for FeatureArticle {
    fn bases() -> Vec<ModelType> {
        vec![ModelType::of::<Article>()]
    }
}

struct Standalone;
impl Model for Standalone {}

struct ContentQuerySet;

impl Fragment for ContentQuerySet {
    fn name(&self) -> &str {
        "ContentQuerySet"
    }

    fn methods(&self) -> MethodTable {
        MethodTable::new()
            .with("kind", |_, _| Ok(json!("content").into()))
            .with("live", |cx, _| {
                Ok(cx.query().filter("status", "live").into())
            })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn constant(name: &str, method: &str, value: Value) -> Arc<dyn Fragment> {
    MethodFragment::new(name)
        .method(method, move |_, _| Ok(value.clone().into()))
        .into_arc()
}

fn value_of(manager: &MixinManager, member: &str) -> Value {
    manager
        .call(member, &[])
        .unwrap()
        .into_value()
        .unwrap_or(Value::Null)
}

fn manager<M: Model>(registry: &Arc<MixinRegistry>) -> MixinManager {
    MixinManager::for_model::<M>().with_registry(Arc::clone(registry))
}

#[test]
fn unregistered_type_resolves_to_base_class() {
    let registry = Arc::new(MixinRegistry::new());

    let class = registry.resolve_for::<Standalone>();
    assert!(class.is_base());

    let query = manager::<Standalone>(&registry).get_query_set().unwrap();
    assert_eq!(query.into_base(), QuerySet::new("Standalone"));
}

#[test]
fn global_fragment_reaches_every_type() {
    let registry = Arc::new(MixinRegistry::new());
    registry
        .register_global(constant("Audit", "audited", json!(true)))
        .unwrap();

    for model in [
        ModelType::of::<Standalone>(),
        ModelType::of::<Article>(),
        ModelType::of::<FeatureArticle>(),
        ModelType::opaque::<String>(),
    ] {
        let objects = MixinManager::new(model).with_registry(Arc::clone(&registry));
        assert_eq!(value_of(&objects, "audited"), json!(true));
    }
}

#[test]
fn declared_fragment_applies_to_descendants_once() {
    let registry = Arc::new(MixinRegistry::new());

    let class = registry.resolve_for::<FeatureArticle>();
    assert_eq!(class.fragment_names(), vec!["ContentQuerySet"]);

    let objects = manager::<FeatureArticle>(&registry);
    assert!(objects.all().unwrap().is_instance_of::<ContentQuerySet>());
    assert_eq!(value_of(&objects, "kind"), json!("content"));
}

#[test]
fn registration_extends_declaration_and_wins_clashes() {
    let registry = Arc::new(MixinRegistry::new());
    assert_eq!(value_of(&manager::<Content>(&registry), "kind"), json!("content"));

    registry
        .register_for::<Content>(constant("ContentOverride", "kind", json!("override")))
        .unwrap();

    let objects = manager::<Content>(&registry);
    assert_eq!(value_of(&objects, "kind"), json!("override"));
    // The declared fragment is still part of the class
    assert!(objects.responds_to("live"));
    assert_eq!(
        objects.query_class().fragment_names(),
        vec!["ContentOverride", "ContentQuerySet"]
    );
}

#[test]
fn most_specific_fragment_wins() {
    let registry = Arc::new(MixinRegistry::new());
    registry
        .register_global(constant("GlobalKind", "kind", json!("global")))
        .unwrap();
    registry
        .register_for::<Article>(constant("ArticleKind", "kind", json!("article")))
        .unwrap();
    registry
        .register_for::<Tagged>(constant("TaggedKind", "kind", json!("tagged")))
        .unwrap();

    assert_eq!(value_of(&manager::<FeatureArticle>(&registry), "kind"), json!("article"));
    assert_eq!(value_of(&manager::<Tagged>(&registry), "kind"), json!("tagged"));
    assert_eq!(value_of(&manager::<Standalone>(&registry), "kind"), json!("global"));

    // Folded global first, then Tagged, Content and Article, so the
    // resolution order reads the other way round
    let class = registry.resolve_for::<FeatureArticle>();
    assert_eq!(
        class.fragment_names(),
        vec!["ArticleKind", "ContentQuerySet", "TaggedKind", "GlobalKind"]
    );
}

#[test]
fn registration_invalidates_cached_classes() {
    let registry = Arc::new(MixinRegistry::new());
    let objects = manager::<FeatureArticle>(&registry);
    assert!(!objects.responds_to("tagged"));
    assert!(registry.cached_len() > 0);

    registry
        .register_for::<Tagged>(constant("TaggedQuerySet", "tagged", json!(true)))
        .unwrap();

    assert!(objects.responds_to("tagged"));
    assert_eq!(value_of(&objects, "tagged"), json!(true));
}

#[test]
fn same_fragment_type_is_folded_once() {
    let registry = Arc::new(MixinRegistry::new());
    registry
        .register_for::<Content>(Arc::new(ContentQuerySet))
        .unwrap();
    registry
        .register_for::<Article>(Arc::new(ContentQuerySet))
        .unwrap();

    let class = registry.resolve_for::<FeatureArticle>();
    assert_eq!(class.fragment_names(), vec!["ContentQuerySet"]);
}

#[test]
fn default_hook_runs_once_per_create() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let registry = Arc::new(MixinRegistry::new());
    registry
        .register_for::<Standalone>(
            MethodFragment::new("EagerQuerySet")
                .on_default(move |query, chain| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(chain.proceed(query)?.select_related())
                })
                .into_arc(),
        )
        .unwrap();

    let objects = manager::<Standalone>(&registry);
    let first = objects.get_query_set().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.base().related(), &SelectRelated::All);

    objects.all().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

struct ArchiveSwap;

impl Fragment for ArchiveSwap {
    fn name(&self) -> &str {
        "ArchiveSwap"
    }

    fn mixin_default(
        &self,
        query: ComposedQuery,
        chain: DefaultChain<'_>,
    ) -> MixinResult<ComposedQuery> {
        let query = chain.proceed(query)?;
        // Swap in a different but compatible query
        Ok(ComposedQuery::new(
            Arc::clone(query.class()),
            QuerySet::new("ArchivedStandalone").using("archive"),
        ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn default_hook_result_replaces_instance() {
    let registry = Arc::new(MixinRegistry::new());
    registry
        .register_for::<Standalone>(Arc::new(ArchiveSwap))
        .unwrap();

    let query = manager::<Standalone>(&registry).get_query_set().unwrap();
    assert_eq!(query.base().model(), "ArchivedStandalone");
    assert_eq!(query.base().db(), Some("archive"));
}

#[test]
fn failing_hook_surfaces_at_create() {
    let registry = Arc::new(MixinRegistry::new());
    registry
        .register_for::<Standalone>(
            MethodFragment::new("Broken")
                .on_default(|_, _| Err(MixinError::fragment_failure("Broken", "no default")))
                .into_arc(),
        )
        .unwrap();

    let err = manager::<Standalone>(&registry).get_query_set().unwrap_err();
    assert_eq!(err, MixinError::fragment_failure("Broken", "no default"));
}

#[test_case("does_not_exist" ; "unknown member")]
#[test_case("_kind" ; "private member")]
#[test_case("filter" ; "base operation")]
#[test_case("order_by" ; "another base operation")]
fn forwarding_fails_fast(member: &str) {
    let registry = Arc::new(MixinRegistry::new());
    registry
        .register_for::<Article>(
            MethodFragment::new("Everything")
                .method("_kind", |_, _| Ok(json!("private").into()))
                .method("filter", |_, _| Ok(json!("shadow").into()))
                .method("order_by", |_, _| Ok(json!("shadow").into()))
                .into_arc(),
        )
        .unwrap();

    let err = manager::<Article>(&registry).call(member, &[]).unwrap_err();
    assert_eq!(
        err,
        MixinError::MissingMember {
            owner: MANAGER_NAME.to_string(),
            member: member.to_string(),
        }
    );
    assert_eq!(
        err.to_string(),
        format!("'MixinManager' object has no attribute '{member}'")
    );
}

#[test]
fn fragment_methods_receive_arguments() {
    let registry = Arc::new(MixinRegistry::new());
    registry
        .register_for::<Article>(
            MethodFragment::new("ByAuthor")
                .method("by_author", |cx, args| match args {
                    [Value::String(author)] => {
                        Ok(cx.query().filter("author__name", author.as_str()).into())
                    }
                    _ => Err(MixinError::invalid_arguments(
                        cx.method(),
                        "expected one author name",
                    )),
                })
                .into_arc(),
        )
        .unwrap();

    let objects = manager::<Article>(&registry);
    let query = objects
        .call("by_author", &[json!("ada")])
        .unwrap()
        .into_query()
        .unwrap();
    assert_eq!(query.base().filters()[0].value, json!("ada"));

    let err = objects.call("by_author", &[]).unwrap_err();
    assert_eq!(
        err,
        MixinError::invalid_arguments("by_author", "expected one author name")
    );
}

#[test]
fn fragment_methods_dispatch_to_each_other() {
    let registry = Arc::new(MixinRegistry::new());
    registry
        .register_for::<Article>(
            MethodFragment::new("Featured")
                .method("featured", |cx, _| {
                    let live = cx.call("live", &[])?.into_query().ok_or_else(|| {
                        MixinError::fragment_failure("Featured", "live did not return a query")
                    })?;
                    Ok(live.filter("featured", true).into())
                })
                .into_arc(),
        )
        .unwrap();

    let query = manager::<FeatureArticle>(&registry)
        .call("featured", &[])
        .unwrap()
        .into_query()
        .unwrap();
    let fields: Vec<_> = query
        .base()
        .filters()
        .iter()
        .map(|lookup| lookup.field.as_str())
        .collect();
    assert_eq!(fields, vec!["status", "featured"]);
}

mock! {
    pub Factory {}

    impl QuerySetFactory for Factory {
        fn create(&self, model: &ModelType, args: &QueryArgs) -> QuerySet;
    }
}

#[test]
fn base_query_comes_from_factory() {
    let mut factory = MockFactory::new();
    factory
        .expect_create()
        .withf(|model, args| {
            model.name() == "Article" && args.using.as_deref() == Some("replica")
        })
        .times(1)
        .returning(|model, args| {
            let query = QuerySet::new(model.name()).filter("tenant", 7);
            match &args.using {
                Some(alias) => query.using(alias.clone()),
                None => query,
            }
        });

    let registry = Arc::new(MixinRegistry::new());
    let query = manager::<Article>(&registry)
        .with_factory(Arc::new(factory))
        .using("replica")
        .get_query_set()
        .unwrap();

    assert_eq!(query.base().db(), Some("replica"));
    assert_eq!(query.base().filters()[0].value, json!(7));
    // Article inherits the declared Content fragment
    assert!(query.is_instance_of::<ContentQuerySet>());
}

#[test]
fn frozen_registry_still_resolves() {
    let registry = Arc::new(MixinRegistry::new());
    registry
        .register_for::<Article>(constant("Early", "early", json!(1)))
        .unwrap();
    registry.freeze();

    let late = registry.register_for::<Article>(constant("Late", "late", json!(2)));
    assert!(late.unwrap_err().is_lifecycle_error());

    let objects = manager::<Article>(&registry);
    assert_eq!(value_of(&objects, "early"), json!(1));
    assert!(!objects.responds_to("late"));
}

struct Doc;
impl Model for Doc {}

#[test]
fn fragment_overrides_base_operation() {
    let registry = Arc::new(MixinRegistry::new());
    registry
        .register_for::<Doc>(
            MethodFragment::new("SoftDelete")
                .method("all", |cx, _| Ok(cx.query().filter("deleted", false).into()))
                .into_arc(),
        )
        .unwrap();

    let objects = manager::<Doc>(&registry);
    let all = objects.all().unwrap();
    assert_eq!(all.base().filters().len(), 1);
    assert_eq!(all.base().filters()[0].value, json!(false));

    // The typed method is the way in; forwarding still refuses base names
    assert!(objects.call("all", &[]).unwrap_err().is_missing_member());
}

// Folder declares a closure fragment, Archive derives Folder

struct Folder;

impl Model for Folder {
    fn declared_fragment() -> Option<Arc<dyn Fragment>> {
        Some(
            MethodFragment::declared_on::<Folder>("FolderQuerySet")
                .method("root", |cx, _| Ok(cx.query().filter("parent", Value::Null).into()))
                .into_arc(),
        )
    }
}

struct Archive;

impl Model for Archive {
    fn bases() -> Vec<ModelType> {
        vec![ModelType::of::<Folder>()]
    }
}

#[test]
fn declared_closure_fragment_is_folded_once() {
    let registry = Arc::new(MixinRegistry::new());
    let declared = Folder::declared_fragment().unwrap();
    registry
        .register_for::<Archive>(Arc::clone(&declared))
        .unwrap();

    let class = registry.resolve_for::<Archive>();
    assert_eq!(class.fragment_names(), vec!["FolderQuerySet"]);

    let query = manager::<Archive>(&registry).get_query_set().unwrap();
    assert!(query.has_fragment(&*declared));
    assert!(query.has_fragment(&*Folder::declared_fragment().unwrap()));
}
