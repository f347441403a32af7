// Copyright 2025 Cowboy AI, LLC.

//! Fragment registry and composition cache
//!
//! The registry maps anchors to fragments and memoizes the composed query
//! class of every resolved model. Both live in one [`MixinRegistry`] because
//! they are coupled: any registration can change the composition of many
//! cached descendants, so every registration clears the whole cache.
//!
//! Registrations belong to the initialization phase. Once configuration is
//! complete, [`MixinRegistry::freeze`] rejects further registrations and the
//! cache becomes a pure memoization table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::composition::QueryClass;
use crate::config::RegistryConfig;
use crate::errors::{MixinError, MixinResult};
use crate::fragment::Fragment;
use crate::model::{Anchor, Model, ModelType};

static GLOBAL_REGISTRY: LazyLock<Arc<MixinRegistry>> =
    LazyLock::new(|| Arc::new(MixinRegistry::new()));

/// The process-wide registry
pub fn global() -> &'static Arc<MixinRegistry> {
    &GLOBAL_REGISTRY
}

/// Register a fragment on the process-wide registry
pub fn register_mixin(fragment: Arc<dyn Fragment>, anchor: impl Into<Anchor>) -> MixinResult<()> {
    global().register(fragment, anchor)
}

struct Registration {
    fragment: Arc<dyn Fragment>,
    registered_at: DateTime<Utc>,
}

/// Snapshot of one registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationInfo {
    /// Anchor the fragment is registered for
    pub anchor: String,
    /// Fragment name
    pub fragment: String,
    /// When the fragment was registered
    pub registered_at: DateTime<Utc>,
}

/// Registry of fragments with a composition cache
pub struct MixinRegistry {
    config: RegistryConfig,
    fragments: RwLock<HashMap<Anchor, Registration>>,
    cache: RwLock<LruCache<Anchor, Arc<QueryClass>>>,
    frozen: AtomicBool,
    generation: AtomicU64,
}

impl MixinRegistry {
    /// Create a registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with the given configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        let capacity = config.capacity();
        Self {
            config,
            fragments: RwLock::new(HashMap::new()),
            cache: RwLock::new(LruCache::new(capacity)),
            frozen: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a fragment for an anchor, replacing any previous one
    ///
    /// Clears every cached composed class.
    ///
    /// # Errors
    ///
    /// Returns [`MixinError::RegistryFrozen`] once the registry is frozen.
    pub fn register(
        &self,
        fragment: Arc<dyn Fragment>,
        anchor: impl Into<Anchor>,
    ) -> MixinResult<()> {
        let anchor = anchor.into();
        if self.is_frozen() {
            warn!(%anchor, fragment = fragment.name(), "registration rejected, registry is frozen");
            return Err(MixinError::RegistryFrozen {
                anchor: anchor.to_string(),
                fragment: fragment.name().to_string(),
            });
        }

        let mut fragments = write(&self.fragments);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(%anchor, fragment = fragment.name(), generation, "registered query mixin");
        fragments.insert(
            anchor,
            Registration {
                fragment,
                registered_at: Utc::now(),
            },
        );
        drop(fragments);

        self.invalidate();
        Ok(())
    }

    /// Register a fragment that applies to every model
    pub fn register_global(&self, fragment: Arc<dyn Fragment>) -> MixinResult<()> {
        self.register(fragment, Anchor::Global)
    }

    /// Register a fragment for model `M` and its descendants
    pub fn register_for<M: Model>(&self, fragment: Arc<dyn Fragment>) -> MixinResult<()> {
        self.register(fragment, Anchor::model::<M>())
    }

    /// Fragment registered for an anchor
    pub fn lookup(&self, anchor: &Anchor) -> Option<Arc<dyn Fragment>> {
        read(&self.fragments)
            .get(anchor)
            .map(|registration| Arc::clone(&registration.fragment))
    }

    /// Snapshot of every registration
    pub fn registrations(&self) -> Vec<RegistrationInfo> {
        let mut infos: Vec<RegistrationInfo> = read(&self.fragments)
            .iter()
            .map(|(anchor, registration)| RegistrationInfo {
                anchor: anchor.to_string(),
                fragment: registration.fragment.name().to_string(),
                registered_at: registration.registered_at,
            })
            .collect();
        infos.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        infos
    }

    /// Reject all further registrations
    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::SeqCst) {
            debug!("mixin registry frozen");
        }
    }

    /// Whether registrations are rejected
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Number of registrations so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Number of cached composed classes
    pub fn cached_len(&self) -> usize {
        read(&self.cache).len()
    }

    /// Drop every cached composed class
    pub fn invalidate(&self) {
        write(&self.cache).clear();
        trace!("composition cache cleared");
    }

    /// Composed query class for a model type
    pub fn resolve(&self, model: &ModelType) -> Arc<QueryClass> {
        if self.config.freeze_on_first_resolve {
            self.freeze();
        }

        // Without ancestry only the global layer can apply
        if !model.has_lineage() {
            return self.global_class();
        }

        let anchor = Anchor::Model(model.clone());
        if let Some(class) = self.cached(&anchor) {
            trace!(%model, "composition cache hit");
            return class;
        }

        let generation = self.generation();
        let class = self.build(model);
        self.store(anchor, Arc::clone(&class), generation);
        class
    }

    /// Composed query class for model `M`
    pub fn resolve_for<M: Model>(&self) -> Arc<QueryClass> {
        self.resolve(&ModelType::of::<M>())
    }

    /// Composed query class carrying only the global fragment, if any
    ///
    /// Shared by every resolved model so the global layer is built once.
    pub fn global_class(&self) -> Arc<QueryClass> {
        if let Some(class) = self.cached(&Anchor::Global) {
            return class;
        }

        let generation = self.generation();
        let class = match self.lookup(&Anchor::Global) {
            Some(fragment) => QueryClass::fold(fragment, &QueryClass::base()),
            None => QueryClass::base(),
        };
        self.store(Anchor::Global, Arc::clone(&class), generation);
        class
    }

    fn build(&self, model: &ModelType) -> Arc<QueryClass> {
        let mut class = self.global_class();

        if let Some(mro) = model.mro() {
            for ancestor in mro.iter().rev() {
                // A registration extends the declaration made on the same model
                let declared = ancestor.declared_fragment();
                let registered = self.lookup(&Anchor::Model(ancestor.clone()));
                for fragment in declared.into_iter().chain(registered) {
                    if !class.contains(fragment.id()) {
                        class = QueryClass::fold(fragment, &class);
                    }
                }
            }
        }

        debug!(%model, layers = class.depth(), "built composed query class");
        class
    }

    fn cached(&self, anchor: &Anchor) -> Option<Arc<QueryClass>> {
        write(&self.cache).get(anchor).cloned()
    }

    fn store(&self, anchor: Anchor, class: Arc<QueryClass>, generation: u64) {
        let mut cache = write(&self.cache);
        // A registration during the build makes the class stale
        if self.generation() == generation {
            cache.put(anchor, class);
        }
    }
}

impl Default for MixinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
