//! Name lookup across the whole project namespace.

use std::collections::{BTreeMap, HashMap};

use super::{EntityKind, Project, Reference};

/// What a reference points at after name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceTarget {
    /// A top-level or nested entity, by id.
    Entity { kind: EntityKind, id: String },
    /// An unqualified name matching nested entities in several models.
    Ambiguous { candidates: Vec<String> },
    Unresolved,
}

/// Index from names to entity kinds, built once per project.
///
/// Top-level entities are keyed by name. Nested metrics and dimensions are
/// keyed by `model.name` and also reachable unqualified when exactly one
/// model declares that name.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    top_level: HashMap<String, EntityKind>,
    nested: HashMap<String, EntityKind>,
    unqualified: HashMap<String, Vec<String>>,
    duplicates: BTreeMap<String, Vec<EntityKind>>,
}

impl NameIndex {
    pub fn new(project: &Project) -> Self {
        let mut index = NameIndex::default();
        for entity in project.entities() {
            let id = entity.id();
            let kind = entity.kind();
            let table = if entity.is_nested() {
                index
                    .unqualified
                    .entry(entity.name().to_string())
                    .or_default()
                    .push(id.clone());
                &mut index.nested
            } else {
                &mut index.top_level
            };
            if let Some(previous) = table.insert(id.clone(), kind) {
                let kinds = index.duplicates.entry(id).or_insert_with(|| vec![previous]);
                kinds.push(kind);
            }
        }
        for ids in index.unqualified.values_mut() {
            ids.sort();
            ids.dedup();
        }
        index
    }

    /// Names declared more than once, with every kind they were declared as.
    pub fn duplicates(&self) -> impl Iterator<Item = (&str, &[EntityKind])> {
        self.duplicates
            .iter()
            .map(|(name, kinds)| (name.as_str(), kinds.as_slice()))
    }

    /// Kind of the entity with this id.
    pub fn kind_of(&self, id: &str) -> Option<EntityKind> {
        self.top_level
            .get(id)
            .or_else(|| self.nested.get(id))
            .copied()
    }

    pub fn resolve(&self, reference: &Reference) -> ReferenceTarget {
        match reference {
            Reference::Parent(name) => self.entity(name, self.top_level.get(name)),
            Reference::Named { name, property } => self.resolve_named(name, property.as_deref()),
        }
    }

    /// Resolve `name` or `name.property`.
    ///
    /// With a property, a nested entity `name.property` wins; otherwise the
    /// property is a column and the reference points at `name` itself.
    pub fn resolve_named(&self, name: &str, property: Option<&str>) -> ReferenceTarget {
        if let Some(property) = property {
            let id = format!("{}.{}", name, property);
            if let Some(kind) = self.nested.get(&id) {
                return ReferenceTarget::Entity { kind: *kind, id };
            }
            return self.entity(name, self.top_level.get(name));
        }

        if let Some(kind) = self.top_level.get(name) {
            return self.entity(name, Some(kind));
        }
        if let Some(kind) = self.nested.get(name) {
            return self.entity(name, Some(kind));
        }
        match self.unqualified.get(name).map(Vec::as_slice) {
            Some([id]) => self.entity(id, self.nested.get(id)),
            Some(ids) if ids.len() > 1 => ReferenceTarget::Ambiguous {
                candidates: ids.to_vec(),
            },
            _ => ReferenceTarget::Unresolved,
        }
    }

    fn entity(&self, id: &str, kind: Option<&EntityKind>) -> ReferenceTarget {
        match kind {
            Some(kind) => ReferenceTarget::Entity {
                kind: *kind,
                id: id.to_string(),
            },
            None => ReferenceTarget::Unresolved,
        }
    }
}
