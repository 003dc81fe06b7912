//! Metric and dimension expression resolution.
//!
//! Expands `${ref(...)}` tokens that point at other metrics or dimensions
//! into their parenthesized SQL, recursively. Tokens pointing at model
//! columns are left in place for the [field resolver](super::field_resolver).
//!
//! Cycle protection here does not rely on the validator: every recursion
//! carries its own visited path, so a resolver used on an unvalidated project
//! still fails with a cycle error instead of recursing forever.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::error::{SemanticError, SemanticResult};
use crate::model::reference::{extract_refs, replace_refs, RefToken};
use crate::model::{EntityKind, Model, NameIndex, Project, ReferenceTarget};

/// A metric or dimension known to the resolver.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionEntity<'p> {
    pub kind: EntityKind,
    pub expression: &'p str,
    /// Declaring model, for nested entities.
    pub parent: Option<&'p Model>,
}

/// Resolves metric and dimension expressions into ref-free SQL.
///
/// Memoizes finished expressions per instance. Create one per compile.
#[derive(Debug)]
pub struct MetricResolver<'p> {
    project: &'p Project,
    index: NameIndex,
    entities: BTreeMap<String, ExpressionEntity<'p>>,
    cache: HashMap<String, String>,
}

impl<'p> MetricResolver<'p> {
    pub fn new(project: &'p Project) -> Self {
        let mut entities = BTreeMap::new();
        for entity in project.entities() {
            let kind = entity.kind();
            if !matches!(kind, EntityKind::Metric | EntityKind::Dimension) {
                continue;
            }
            if let Some(expression) = entity.expression() {
                entities.insert(
                    entity.id(),
                    ExpressionEntity {
                        kind,
                        expression,
                        parent: entity.parent(),
                    },
                );
            }
        }

        Self {
            project,
            index: NameIndex::new(project),
            entities,
            cache: HashMap::new(),
        }
    }

    pub fn project(&self) -> &'p Project {
        self.project
    }

    pub fn entity(&self, id: &str) -> Option<ExpressionEntity<'p>> {
        self.entities.get(id).copied()
    }

    /// Id of the metric or dimension a token points at.
    ///
    /// `Ok(None)` means the token is not a metric or dimension (a model
    /// column, or an unknown name) and is left for field resolution.
    pub fn lookup(&self, context: &str, token: &RefToken) -> SemanticResult<Option<String>> {
        match self
            .index
            .resolve_named(&token.name, token.property.as_deref())
        {
            ReferenceTarget::Entity { kind, id }
                if matches!(kind, EntityKind::Metric | EntityKind::Dimension) =>
            {
                Ok(Some(id))
            }
            ReferenceTarget::Ambiguous { candidates } => Err(SemanticError::AmbiguousReference {
                entity: context.to_string(),
                reference: token.qualified_name(),
                candidates,
            }),
            _ => Ok(None),
        }
    }

    /// Resolve a metric or dimension by id, `model.name`, or unqualified name.
    pub fn resolve_expression(&mut self, name: &str) -> SemanticResult<String> {
        let id = self.canonical_id(name)?;
        let mut visited = Vec::new();
        self.resolve_key(&id, &mut visited)
    }

    fn canonical_id(&self, name: &str) -> SemanticResult<String> {
        if self.entities.contains_key(name) {
            return Ok(name.to_string());
        }
        match self.index.resolve_named(name, None) {
            ReferenceTarget::Entity { id, .. } if self.entities.contains_key(&id) => Ok(id),
            ReferenceTarget::Ambiguous { candidates } => Err(SemanticError::AmbiguousReference {
                entity: name.to_string(),
                reference: name.to_string(),
                candidates,
            }),
            _ => Err(SemanticError::UnresolvedReference {
                entity: name.to_string(),
                reference: name.to_string(),
            }),
        }
    }

    fn resolve_key(&mut self, id: &str, visited: &mut Vec<String>) -> SemanticResult<String> {
        if let Some(done) = self.cache.get(id) {
            return Ok(done.clone());
        }
        if let Some(start) = visited.iter().position(|v| v == id) {
            let mut cycle = visited[start..].to_vec();
            cycle.push(id.to_string());
            return Err(SemanticError::CircularDependency { cycle });
        }
        let Some(entity) = self.entity(id) else {
            return Err(SemanticError::UnresolvedReference {
                entity: visited.last().cloned().unwrap_or_else(|| id.to_string()),
                reference: id.to_string(),
            });
        };

        tracing::debug!(entity = id, "resolving expression");
        visited.push(id.to_string());
        let resolved = if entity.parent.is_some() {
            // Nested entities read their model's columns directly.
            entity.expression.trim().to_string()
        } else {
            replace_refs::<SemanticError, _>(entity.expression, |token| {
                match self.lookup(id, token)? {
                    Some(dep) => Ok(Some(format!("({})", self.resolve_key(&dep, visited)?))),
                    None => Ok(None),
                }
            })?
            .trim()
            .to_string()
        };
        visited.pop();

        self.cache.insert(id.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Metrics and dimensions an entity references directly, sorted.
    pub fn direct_references(&self, id: &str) -> SemanticResult<Vec<String>> {
        let Some(entity) = self.entity(id) else {
            return Ok(Vec::new());
        };
        if entity.parent.is_some() {
            return Ok(Vec::new());
        }
        let mut deps = BTreeSet::new();
        for token in extract_refs(entity.expression) {
            if let Some(dep) = self.lookup(id, &token)? {
                deps.insert(dep);
            }
        }
        Ok(deps.into_iter().collect())
    }

    /// Every metric and dimension id, dependencies first (Kahn's algorithm
    /// over direct references). Ties resolve alphabetically.
    pub fn topological_order(&self) -> SemanticResult<Vec<String>> {
        let mut deps: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for id in self.entities.keys() {
            let direct = self
                .direct_references(id)?
                .into_iter()
                .filter(|d| self.entities.contains_key(d))
                .collect();
            deps.insert(id.clone(), direct);
        }

        let mut remaining: BTreeMap<&str, usize> =
            deps.iter().map(|(id, d)| (id.as_str(), d.len())).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (id, d) in &deps {
            for dep in d {
                dependents.entry(dep.as_str()).or_default().push(id.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(deps.len());

        while let Some(id) = ready.pop_first() {
            remaining.remove(id);
            order.push(id.to_string());
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if let Some(start) = remaining.keys().next() {
            return Err(SemanticError::CircularDependency {
                cycle: cycle_from(start, &deps, &remaining),
            });
        }
        Ok(order)
    }

    /// Resolve every metric and dimension in dependency order.
    pub fn resolve_all(&mut self) -> SemanticResult<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for id in self.topological_order()? {
            let sql = self.resolve_expression(&id)?;
            out.insert(id, sql);
        }
        Ok(out)
    }

    /// Every model an entity draws from, through any chain of references.
    ///
    /// The field resolver folds this into the model set of each field that
    /// references the entity; the query builder joins exactly those models.
    pub fn models_referenced_by(&self, name: &str) -> SemanticResult<BTreeSet<String>> {
        let id = self.canonical_id(name)?;
        let mut models = BTreeSet::new();
        let mut seen = BTreeSet::new();
        self.collect_models(&id, &mut seen, &mut models)?;
        Ok(models)
    }

    fn collect_models(
        &self,
        id: &str,
        seen: &mut BTreeSet<String>,
        models: &mut BTreeSet<String>,
    ) -> SemanticResult<()> {
        if !seen.insert(id.to_string()) {
            return Ok(());
        }
        let Some(entity) = self.entity(id) else {
            return Ok(());
        };
        if let Some(parent) = entity.parent {
            models.insert(parent.name.clone());
            return Ok(());
        }

        for token in extract_refs(entity.expression) {
            match self.lookup(id, &token)? {
                Some(dep) => self.collect_models(&dep, seen, models)?,
                None => {
                    if let ReferenceTarget::Entity {
                        kind: EntityKind::Model,
                        id: model,
                    } = self.index.resolve_named(&token.name, None)
                    {
                        models.insert(model);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Walk unfinished nodes from `start` until one repeats; return that loop.
fn cycle_from(
    start: &str,
    deps: &BTreeMap<String, Vec<String>>,
    remaining: &BTreeMap<&str, usize>,
) -> Vec<String> {
    let mut path: Vec<String> = Vec::new();
    let mut current = start.to_string();
    loop {
        if let Some(pos) = path.iter().position(|p| *p == current) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(current);
            return cycle;
        }
        path.push(current.clone());
        let next = deps
            .get(&current)
            .and_then(|d| d.iter().find(|n| remaining.contains_key(n.as_str())));
        match next {
            Some(next) => current = next.clone(),
            None => return path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dimension, Metric};

    fn project() -> Project {
        Project::new("p")
            .with_model(
                Model::sql("orders", "SELECT 1")
                    .with_metric(Metric::new("revenue", "SUM(amount)"))
                    .with_metric(Metric::new("count", "COUNT(*)")),
            )
            .with_model(
                Model::sql("refunds", "SELECT 1").with_metric(Metric::new("count", "COUNT(*)")),
            )
            .with_metric(Metric::new("aov", "${ref(orders).revenue} / ${ref(orders).count}"))
            .with_metric(Metric::new("aov_pct", "100 * ${ref(aov)}"))
            .with_dimension(Dimension::new("big", "${ref(orders).amount} > 100"))
    }

    #[test]
    fn test_resolve_nested_chain() {
        let project = project();
        let mut resolver = MetricResolver::new(&project);
        assert_eq!(
            resolver.resolve_expression("aov_pct").unwrap(),
            "100 * ((SUM(amount)) / (COUNT(*)))"
        );
    }

    #[test]
    fn test_column_refs_are_left_alone() {
        let project = project();
        let mut resolver = MetricResolver::new(&project);
        assert_eq!(
            resolver.resolve_expression("big").unwrap(),
            "${ref(orders).amount} > 100"
        );
    }

    #[test]
    fn test_unqualified_unique_and_ambiguous() {
        let project = project()
            .with_metric(Metric::new("rev2", "${ref(revenue)} * 2"))
            .with_metric(Metric::new("bad", "${ref(count)}"));
        let mut resolver = MetricResolver::new(&project);
        assert_eq!(resolver.resolve_expression("rev2").unwrap(), "(SUM(amount)) * 2");
        assert_eq!(
            resolver.resolve_expression("bad").unwrap_err(),
            SemanticError::AmbiguousReference {
                entity: "bad".into(),
                reference: "count".into(),
                candidates: vec!["orders.count".into(), "refunds.count".into()],
            }
        );
    }

    #[test]
    fn test_cycle_without_validation() {
        let project = Project::new("p")
            .with_metric(Metric::new("m1", "${ref(m2)} + 1"))
            .with_metric(Metric::new("m2", "${ref(m1)} + 1"));
        let mut resolver = MetricResolver::new(&project);
        assert_eq!(
            resolver.resolve_expression("m1").unwrap_err(),
            SemanticError::CircularDependency {
                cycle: vec!["m1".into(), "m2".into(), "m1".into()]
            }
        );
        assert!(matches!(
            resolver.topological_order(),
            Err(SemanticError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_self_reference() {
        let project = Project::new("p").with_metric(Metric::new("m", "${ref(m)}"));
        let mut resolver = MetricResolver::new(&project);
        assert_eq!(
            resolver.resolve_expression("m").unwrap_err(),
            SemanticError::CircularDependency {
                cycle: vec!["m".into(), "m".into()]
            }
        );
        assert_eq!(
            resolver.topological_order().unwrap_err(),
            SemanticError::CircularDependency {
                cycle: vec!["m".into(), "m".into()]
            }
        );
    }

    #[test]
    fn test_topological_order() {
        let project = project();
        let resolver = MetricResolver::new(&project);
        let order = resolver.topological_order().unwrap();
        let pos = |id: &str| order.iter().position(|o| o == id).unwrap();
        assert!(pos("orders.revenue") < pos("aov"));
        assert!(pos("orders.count") < pos("aov"));
        assert!(pos("aov") < pos("aov_pct"));
        assert_eq!(order.len(), 6);
    }

    #[test]
    fn test_resolve_all() {
        let project = project();
        let mut resolver = MetricResolver::new(&project);
        let all = resolver.resolve_all().unwrap();
        assert_eq!(all["aov"], "(SUM(amount)) / (COUNT(*))");
        assert_eq!(all["refunds.count"], "COUNT(*)");
    }

    #[test]
    fn test_models_referenced_by() {
        let project = project()
            .with_model(Model::sql("users", "SELECT 1"))
            .with_metric(Metric::new(
                "per_user",
                "${ref(aov)} / COUNT(DISTINCT ${ref(users).id})",
            ));
        let resolver = MetricResolver::new(&project);
        let models: Vec<String> = resolver
            .models_referenced_by("per_user")
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(models, vec!["orders", "users"]);
    }
}
