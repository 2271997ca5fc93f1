//! Dependency resolution
//!
//! Computes the build order for a set of requested recipes. Build-time
//! dependencies are ordering edges; run-time dependencies are pulled into
//! the set but scheduled after the recipe that needs them.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::core::catalog::Catalog;
use crate::error::ResolverError;

/// Dependency graph for recipes
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Adjacency list: recipe -> build-time dependencies
    build_edges: HashMap<String, Vec<String>>,
    /// Adjacency list: recipe -> run-time dependencies
    runtime_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recipe to the graph
    pub fn add_recipe(&mut self, name: &str, build: Vec<String>, runtime: Vec<String>) {
        self.build_edges.insert(name.to_string(), build);
        self.runtime_edges.insert(name.to_string(), runtime);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.build_edges.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.build_edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.build_edges.is_empty()
    }

    /// Collect the transitive closure of `roots` from the catalog
    ///
    /// Fails on the first name without a catalog entry, reporting which
    /// recipe asked for it.
    pub fn from_catalog(catalog: &Catalog, roots: &[String]) -> Result<Self, ResolverError> {
        let mut graph = Self::new();
        let mut queue: VecDeque<(String, Option<String>)> =
            roots.iter().map(|r| (r.clone(), None)).collect();

        while let Some((name, required_by)) = queue.pop_front() {
            if graph.contains(&name) {
                continue;
            }
            let recipe = catalog
                .get(&name)
                .ok_or_else(|| ResolverError::UnknownRecipe {
                    name: name.clone(),
                    required_by: required_by.clone(),
                })?;

            for dep in recipe.dependencies.iter().chain(&recipe.runtime_dependencies) {
                queue.push_back((dep.clone(), Some(name.clone())));
            }
            graph.add_recipe(
                &name,
                recipe.dependencies.clone(),
                recipe.runtime_dependencies.clone(),
            );
        }

        Ok(graph)
    }

    /// Compute the build order starting from `roots`
    ///
    /// Depth-first post-order over the roots in the given order, with
    /// dependencies visited in declared order, so independent recipes keep
    /// the caller's ordering. Duplicates are collapsed.
    pub fn build_order(&self, roots: &[String]) -> Result<Vec<String>, ResolverError> {
        let mut visited = HashSet::new();
        let mut temp_visited = HashSet::new();
        let mut result = Vec::new();
        let mut queue: VecDeque<String> = roots.iter().cloned().collect();

        while let Some(root) = queue.pop_front() {
            if visited.contains(&root) {
                continue;
            }
            let mut cycle_path = Vec::new();
            let mut deferred = Vec::new();
            self.visit(
                &root,
                &mut visited,
                &mut temp_visited,
                &mut result,
                &mut cycle_path,
                &mut deferred,
            )?;
            // Run-time dependencies follow the chain that introduced them.
            for dep in deferred.into_iter().rev() {
                queue.push_front(dep);
            }
        }

        Ok(result)
    }

    fn visit(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        temp_visited: &mut HashSet<String>,
        result: &mut Vec<String>,
        cycle_path: &mut Vec<String>,
        deferred: &mut Vec<String>,
    ) -> Result<(), ResolverError> {
        if temp_visited.contains(node) {
            let start = cycle_path.iter().position(|n| n == node).unwrap_or(0);
            let mut cycle = cycle_path[start..].to_vec();
            cycle.push(node.to_string());
            return Err(ResolverError::DependencyCycle { cycle });
        }

        if visited.contains(node) {
            return Ok(());
        }

        temp_visited.insert(node.to_string());
        cycle_path.push(node.to_string());

        if let Some(deps) = self.build_edges.get(node) {
            for dep in deps {
                self.visit(dep, visited, temp_visited, result, cycle_path, deferred)?;
            }
        }

        cycle_path.pop();
        temp_visited.remove(node);
        visited.insert(node.to_string());
        result.push(node.to_string());

        if let Some(deps) = self.runtime_edges.get(node) {
            deferred.extend(deps.iter().filter(|d| !visited.contains(*d)).cloned());
        }

        Ok(())
    }

    /// Check if the graph has any build-time cycles
    pub fn has_cycle(&self) -> bool {
        let mut names: Vec<String> = self.build_edges.keys().cloned().collect();
        names.sort();
        self.build_order(&names).is_err()
    }
}

/// Resolve `requested` recipes into a build order
///
/// The environment's own dependencies come first, then the requested
/// recipes with everything they need.
pub fn resolve(
    catalog: &Catalog,
    environment_deps: &[String],
    requested: &[String],
) -> Result<Vec<String>, ResolverError> {
    let roots: Vec<String> = environment_deps.iter().chain(requested).cloned().collect();
    let graph = DependencyGraph::from_catalog(catalog, &roots)?;
    graph.build_order(&roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::RecipeDefinition;
    use proptest::prelude::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn recipe(name: &str, deps: &[&str], runtime: &[&str]) -> RecipeDefinition {
        let mut def = RecipeDefinition::new(name);
        def.dependencies = names(deps);
        def.runtime_dependencies = names(runtime);
        def
    }

    fn catalog(recipes: Vec<RecipeDefinition>) -> Catalog {
        let mut catalog = Catalog::new();
        for r in recipes {
            catalog.insert(r, "test");
        }
        catalog
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|x| x == name).unwrap()
    }

    #[test]
    fn test_simple_dependency_order() {
        let mut graph = DependencyGraph::new();
        graph.add_recipe("app", names(&["lib"]), vec![]);
        graph.add_recipe("lib", vec![], vec![]);

        let order = graph.build_order(&names(&["app"])).unwrap();
        assert_eq!(order, names(&["lib", "app"]));
    }

    #[test]
    fn test_environment_deps_come_first() {
        let catalog = catalog(vec![
            recipe("bin_lsbsdk", &[], &[]),
            recipe("patchelf", &[], &[]),
            recipe("lib_glib", &[], &[]),
            recipe("lib_atk", &["lib_glib"], &[]),
        ]);

        let order = resolve(&catalog, &names(&["bin_lsbsdk", "patchelf"]), &names(&["lib_atk"])).unwrap();
        assert_eq!(order, names(&["bin_lsbsdk", "patchelf", "lib_glib", "lib_atk"]));
    }

    #[test]
    fn test_requested_order_is_the_tie_break() {
        let catalog = catalog(vec![
            recipe("c", &[], &[]),
            recipe("a", &[], &[]),
            recipe("b", &[], &[]),
        ]);

        let order = resolve(&catalog, &[], &names(&["c", "a", "b", "a"])).unwrap();
        assert_eq!(order, names(&["c", "a", "b"]));
    }

    #[test]
    fn test_circular_dependency_names_participants() {
        let catalog = catalog(vec![
            recipe("root", &["a"], &[]),
            recipe("a", &["b"], &[]),
            recipe("b", &["a"], &[]),
        ]);

        let err = resolve(&catalog, &[], &names(&["root"])).unwrap_err();
        assert_eq!(
            err,
            ResolverError::DependencyCycle {
                cycle: names(&["a", "b", "a"])
            }
        );
    }

    #[test]
    fn test_has_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_recipe("a", names(&["b"]), vec![]);
        graph.add_recipe("b", names(&["c"]), vec![]);
        graph.add_recipe("c", names(&["a"]), vec![]);
        assert!(graph.has_cycle());
    }

    #[test]
    fn test_unknown_recipe_reports_requirer() {
        let catalog = catalog(vec![recipe("lib_gtk", &["lib_tiff"], &[])]);

        let err = resolve(&catalog, &[], &names(&["lib_gtk"])).unwrap_err();
        assert_eq!(
            err,
            ResolverError::UnknownRecipe {
                name: "lib_tiff".to_string(),
                required_by: Some("lib_gtk".to_string()),
            }
        );

        let err = resolve(&catalog, &[], &names(&["nope"])).unwrap_err();
        assert!(matches!(err, ResolverError::UnknownRecipe { required_by: None, .. }));
    }

    #[test]
    fn test_runtime_dependency_follows_dependent() {
        let catalog = catalog(vec![
            recipe("app", &["lib"], &["data"]),
            recipe("lib", &[], &[]),
            recipe("data", &[], &[]),
            recipe("other", &[], &[]),
        ]);

        let order = resolve(&catalog, &[], &names(&["app", "other"])).unwrap();
        assert_eq!(order, names(&["lib", "app", "data", "other"]));
    }

    #[test]
    fn test_runtime_back_edge_is_not_a_cycle() {
        let catalog = catalog(vec![
            recipe("python27", &["lib_openssl"], &[]),
            recipe("lib_openssl", &[], &["python27"]),
        ]);

        let order = resolve(&catalog, &[], &names(&["python27"])).unwrap();
        assert_eq!(order, names(&["lib_openssl", "python27"]));
    }

    #[test]
    fn test_builtin_gtk_order() {
        let catalog = Catalog::builtin().unwrap();
        let order = resolve(&catalog, &names(&["bin_lsbsdk", "patchelf"]), &names(&["lib_gtk"])).unwrap();

        assert_eq!(&order[..2], &names(&["bin_lsbsdk", "patchelf"])[..]);
        assert!(position(&order, "lib_fontconfig") < position(&order, "lib_pango"));
        assert!(position(&order, "lib_glib") < position(&order, "lib_atk"));
        assert_eq!(order.last().map(String::as_str), Some("lib_gtk"));
    }

    /// Random DAG: recipe `i` may only depend on recipes with a lower index.
    fn dag_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
        (1usize..12).prop_flat_map(|n| {
            (0..n)
                .map(|i| proptest::collection::vec(0..i.max(1), 0..=i.min(3)))
                .collect::<Vec<_>>()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// For acyclic graphs every recipe comes after its build-time
        /// dependencies and appears exactly once.
        #[test]
        fn prop_order_respects_dependencies(deps in dag_strategy(), pick in 0usize..12) {
            let n = deps.len();
            let name = |i: usize| format!("r{i}");
            let recipes = deps
                .iter()
                .enumerate()
                .map(|(i, ds)| {
                    let ds: Vec<String> = ds.iter().filter(|d| **d < i).map(|d| name(*d)).collect();
                    let mut def = RecipeDefinition::new(&name(i));
                    def.dependencies = ds;
                    def
                })
                .collect();
            let catalog = catalog(recipes);

            let requested = vec![name(pick % n), name(n - 1)];
            let order = resolve(&catalog, &[], &requested).unwrap();

            let unique: HashSet<_> = order.iter().collect();
            prop_assert_eq!(unique.len(), order.len());

            for recipe_name in &order {
                let def = catalog.get(recipe_name).unwrap();
                for dep in &def.dependencies {
                    prop_assert!(position(&order, dep) < position(&order, recipe_name));
                }
            }
        }
    }
}
