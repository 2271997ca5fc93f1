//! Recipe catalog
//!
//! Name to definition lookup. The built-in catalog ships inside the binary;
//! a user catalog directory can add recipes or replace built-in ones, one
//! `<name>.toml` file per recipe.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::recipe::RecipeDefinition;
use crate::error::CatalogError;

const BUILTIN_CATALOG: &str = include_str!("../../catalog/linux.toml");

/// Multi-recipe catalog file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    recipe: Vec<RecipeDefinition>,
}

/// Recipe definitions keyed by name
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    recipes: BTreeMap<String, RecipeDefinition>,
    origins: BTreeMap<String, String>,
}

impl Catalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog compiled into the binary
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_catalog_toml(BUILTIN_CATALOG, "<builtin>")
    }

    /// Parse a multi-recipe catalog (`[[recipe]]` tables)
    pub fn from_catalog_toml(content: &str, origin: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content).map_err(|e| CatalogError::Parse {
            origin: origin.to_string(),
            error: e.to_string(),
        })?;

        let mut catalog = Self::new();
        for recipe in file.recipe {
            catalog.insert(recipe, origin);
        }
        Ok(catalog)
    }

    /// Add or replace a recipe
    pub fn insert(&mut self, recipe: RecipeDefinition, origin: &str) {
        if let Some(previous) = self.origins.insert(recipe.name.clone(), origin.to_string()) {
            tracing::debug!("Recipe '{}' from {origin} overrides {previous}", recipe.name);
        }
        self.recipes.insert(recipe.name.clone(), recipe);
    }

    /// Load every `*.toml` file in `dir` as one recipe each
    ///
    /// Files are read in name order so the last definition of a name wins
    /// deterministically. Returns the number of recipes loaded.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, CatalogError> {
        let pattern = dir.join("*.toml").display().to_string();
        let entries = glob::glob(&pattern).map_err(|e| CatalogError::Read {
            path: dir.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut files: Vec<_> = entries.filter_map(Result::ok).collect();
        files.sort();

        for file in &files {
            let content = std::fs::read_to_string(file).map_err(|e| CatalogError::Read {
                path: file.clone(),
                error: e.to_string(),
            })?;
            let origin = file.display().to_string();
            let recipe = RecipeDefinition::from_toml(&content, &origin)?;
            self.insert(recipe, &origin);
        }

        tracing::debug!("Loaded {} recipe(s) from {}", files.len(), dir.display());
        Ok(files.len())
    }

    pub fn get(&self, name: &str) -> Option<&RecipeDefinition> {
        self.recipes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.recipes.contains_key(name)
    }

    /// Where a recipe's definition came from
    pub fn origin(&self, name: &str) -> Option<&str> {
        self.origins.get(name).map(String::as_str)
    }

    /// Recipe names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}
