//! Shared library recipe modules loaded with `libloading`.

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use super::source::{ModuleKind, PluginSource};
use super::traits::{Recipe, RecipeEntryFn, RecipeInfo, RecipeList, RECIPE_ENTRY_SYMBOL};
use crate::error::DiscoveryError;

/// An opened recipe library and the recipes its entry point returned
pub struct NativeModule {
    path: PathBuf,
    // Declared before `library`: the recipes' code lives in the library.
    recipes: Vec<Box<dyn Recipe>>,
    library: Library,
}

impl std::fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeModule")
            .field("path", &self.path)
            .field("recipes", &self.recipes.len())
            .field("library", &self.library)
            .finish()
    }
}

fn load(path: &Path) -> Result<Library, DiscoveryError> {
    // SAFETY: loading a library runs its initialisers. Recipe libraries are
    // trusted code found in the configured recipe directories.
    unsafe { Library::new(path) }.map_err(|e| DiscoveryError::ModuleLoadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn entry_point(library: &Library, path: &Path) -> Result<RecipeEntryFn, DiscoveryError> {
    // SAFETY: the symbol is declared with the signature every recipe library
    // exports through `export_recipes!`.
    let symbol: Symbol<RecipeEntryFn> = unsafe { library.get(RECIPE_ENTRY_SYMBOL.as_bytes()) }.map_err(|e| {
        log::debug!("{}: {}", path.display(), e);
        DiscoveryError::MissingEntrySymbol {
            path: path.to_path_buf(),
            symbol: RECIPE_ENTRY_SYMBOL,
        }
    })?;
    Ok(*symbol)
}

impl NativeModule {
    /// Load the library and collect its recipes.
    pub fn open(path: &Path) -> Result<Self, DiscoveryError> {
        let library = load(path)?;
        let entry = entry_point(&library, path)?;

        let mut list = RecipeList::new();
        // SAFETY: `entry` comes from `library`, which is alive for the call.
        let status = unsafe { entry(&mut list) };
        if status != 0 {
            log::warn!(
                "Unexpected error ({}) in recovering a pluginlist from library '{}'",
                status,
                path.display()
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            recipes: list.into_vec(),
            library,
        })
    }

    /// Check that `path` loads and exports the entry point, without calling it.
    pub fn probe(path: &Path) -> Result<(), DiscoveryError> {
        let library = load(path)?;
        entry_point(&library, path).map(drop)
    }
}

impl PluginSource for NativeModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Native
    }

    fn list_plugins(&self) -> Vec<RecipeInfo> {
        self.recipes.iter().map(|r| r.info()).collect()
    }

    fn get_plugin(&mut self, name: &str) -> Option<Box<dyn Recipe>> {
        let index = self.recipes.iter().position(|r| r.info().name == name)?;
        Some(self.recipes.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_rejects_non_library() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(format!("libfake.{}", super::super::source::NATIVE_EXTENSION));
        std::fs::write(&path, b"not a shared object").unwrap();

        let err = NativeModule::open(&path).unwrap_err();
        assert!(matches!(err, DiscoveryError::ModuleLoadFailed { .. }));
        assert!(NativeModule::probe(&path).is_err());
    }
}
