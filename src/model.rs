// Copyright 2025 Cowboy AI, LLC.

//! Model types, registry anchors and ancestry linearization
//!
//! A [`Model`] describes its place in a type hierarchy through its direct
//! bases. The hierarchy is linearized with the C3 algorithm, giving every
//! model a deterministic ancestry that lists the model first and every base
//! before the bases it derives from.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::warn;

use crate::fragment::Fragment;

/// A model type that query mixins can be anchored to
///
/// # Example
///
/// ```
/// use cim_query_mixins::{Model, ModelType};
///
/// struct Content;
/// impl Model for Content {}
///
/// struct Article;
/// impl Model for Article {
///     fn bases() -> Vec<ModelType> {
///         vec![ModelType::of::<Content>()]
///     }
/// }
///
/// let names: Vec<_> = ModelType::of::<Article>()
///     .mro()
///     .unwrap()
///     .iter()
///     .map(|t| t.name())
///     .collect();
/// assert_eq!(names, vec!["Article", "Content"]);
/// ```
pub trait Model: 'static {
    /// Display name of the model
    fn model_name() -> &'static str {
        short_type_name::<Self>()
    }

    /// Direct bases of the model, in declaration order
    fn bases() -> Vec<ModelType> {
        Vec::new()
    }

    /// Fragment declared directly on this model
    ///
    /// Declarations are not inherited: a fragment declared on a base model
    /// applies to descendants because the base is part of their ancestry,
    /// not because descendants repeat the declaration.
    ///
    /// Called on every build. Closure fragments should be created with
    /// [`MethodFragment::declared_on`](crate::MethodFragment::declared_on)
    /// so each call returns the same fragment identity.
    fn declared_fragment() -> Option<Arc<dyn Fragment>> {
        None
    }
}

#[derive(Clone, Copy)]
struct Lineage {
    bases: fn() -> Vec<ModelType>,
    declared: fn() -> Option<Arc<dyn Fragment>>,
}

/// Runtime descriptor of a model type
///
/// Compared and hashed by type identity only.
#[derive(Clone)]
pub struct ModelType {
    id: TypeId,
    name: &'static str,
    lineage: Option<Lineage>,
}

impl ModelType {
    /// Descriptor of a model with its ancestry metadata
    pub fn of<M: Model>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            name: M::model_name(),
            lineage: Some(Lineage {
                bases: M::bases,
                declared: M::declared_fragment,
            }),
        }
    }

    /// Descriptor of a type that is not part of any model hierarchy
    pub fn opaque<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_type_name::<T>(),
            lineage: None,
        }
    }

    /// Type identity
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the type carries ancestry metadata
    pub fn has_lineage(&self) -> bool {
        self.lineage.is_some()
    }

    /// Direct bases, empty for opaque types
    pub fn bases(&self) -> Vec<ModelType> {
        self.lineage.map(|l| (l.bases)()).unwrap_or_default()
    }

    /// Fragment declared directly on this type
    pub fn declared_fragment(&self) -> Option<Arc<dyn Fragment>> {
        self.lineage.and_then(|l| (l.declared)())
    }

    /// Linearized ancestry, most specific first, starting with this type
    ///
    /// Returns `None` for opaque types.
    pub fn mro(&self) -> Option<Vec<ModelType>> {
        self.lineage?;
        let mut visiting = Vec::new();
        Some(linearize(self, &mut visiting))
    }

    /// Whether `other` appears in this type's ancestry
    pub fn is_subclass_of(&self, other: &ModelType) -> bool {
        self == other
            || self
                .mro()
                .map(|mro| mro.contains(other))
                .unwrap_or(false)
    }
}

impl PartialEq for ModelType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ModelType {}

impl Hash for ModelType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("has_lineage", &self.has_lineage())
            .finish()
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Registry key for a fragment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Anchor {
    /// Applies to every model
    Global,
    /// Applies to a model and its descendants
    Model(ModelType),
}

impl Anchor {
    /// Anchor for a model type
    pub fn model<M: Model>() -> Self {
        Anchor::Model(ModelType::of::<M>())
    }

    /// Whether this is the global anchor
    pub fn is_global(&self) -> bool {
        matches!(self, Anchor::Global)
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Anchor::Global
    }
}

impl From<ModelType> for Anchor {
    fn from(model: ModelType) -> Self {
        Anchor::Model(model)
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::Global => f.write_str("global"),
            Anchor::Model(model) => write!(f, "{model}"),
        }
    }
}

/// Last path segment of a type name, without generic arguments
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}

fn linearize(ty: &ModelType, visiting: &mut Vec<TypeId>) -> Vec<ModelType> {
    visiting.push(ty.id);

    let bases: Vec<ModelType> = ty
        .bases()
        .into_iter()
        .filter(|base| {
            if visiting.contains(&base.id) {
                warn!(model = ty.name, base = base.name, "cyclic model base ignored");
                false
            } else {
                true
            }
        })
        .collect();

    let mut sequences: Vec<Vec<ModelType>> =
        bases.iter().map(|base| linearize(base, visiting)).collect();
    sequences.push(bases);
    visiting.pop();

    let mut order = vec![ty.clone()];
    match c3_merge(sequences.clone()) {
        Some(merged) => order.extend(merged),
        None => {
            warn!(
                model = ty.name,
                "no consistent ancestry order, falling back to depth-first"
            );
            for candidate in sequences.into_iter().flatten() {
                if !order.contains(&candidate) {
                    order.push(candidate);
                }
            }
        }
    }
    order
}

fn c3_merge(mut sequences: Vec<Vec<ModelType>>) -> Option<Vec<ModelType>> {
    let mut merged = Vec::new();
    loop {
        sequences.retain(|seq| !seq.is_empty());
        if sequences.is_empty() {
            return Some(merged);
        }

        // A head is usable when it does not appear in the tail of any sequence
        let head = sequences
            .iter()
            .map(|seq| &seq[0])
            .find(|candidate| sequences.iter().all(|seq| !seq[1..].contains(candidate)))?
            .clone();

        for seq in sequences.iter_mut() {
            if seq[0] == head {
                seq.remove(0);
            }
        }
        merged.push(head);
    }
}
