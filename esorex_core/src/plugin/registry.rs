//! Resolving a recipe name to the module that provides it.
//!
//! Several libraries may provide a recipe of the same name; the highest
//! version wins and the first one scanned wins a tie. Every module opened
//! while resolving is closed again before [`PluginRegistry::resolve`]
//! returns: each one lives only for its own loop iteration.

use std::path::{Path, PathBuf};

use super::source::{ModuleOpener, PluginSource};
use super::traits::{Recipe, RecipeContext, RecipeInfo};
use crate::error::DiscoveryError;

/// Outcome of version arbitration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub path: PathBuf,
    pub version: u64,
    /// Copies found at the winning version
    pub copies: usize,
    /// Copies found at any version
    pub total: usize,
}

/// A recipe ready to run, together with the module holding its code.
///
/// The recipe is declared before the module, so it is dropped first.
/// There is no way to take the recipe out of the descriptor.
pub struct PluginDescriptor {
    info: RecipeInfo,
    recipe: Box<dyn Recipe>,
    module: Box<dyn PluginSource>,
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("info", &self.info)
            .field("module", &self.module.path())
            .finish()
    }
}

impl PluginDescriptor {
    pub fn info(&self) -> &RecipeInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn library_path(&self) -> &Path {
        self.module.path()
    }

    pub fn init(&mut self, ctx: &mut RecipeContext) -> i32 {
        self.recipe.init(ctx)
    }

    pub fn exec(&mut self, ctx: &mut RecipeContext) -> i32 {
        self.recipe.exec(ctx)
    }

    pub fn deinit(&mut self, ctx: &mut RecipeContext) -> i32 {
        self.recipe.deinit(ctx)
    }

    /// Drop the recipe but never close its module
    pub fn keep_resident(self) {
        let Self { recipe, module, .. } = self;
        drop(recipe);
        std::mem::forget(module);
    }
}

/// Looks recipes up in candidate modules
pub struct PluginRegistry<'a> {
    opener: &'a dyn ModuleOpener,
    search_path: String,
}

impl<'a> PluginRegistry<'a> {
    /// `search_path` is only used in messages
    pub fn new(opener: &'a dyn ModuleOpener, search_path: &str) -> Self {
        Self {
            opener,
            search_path: search_path.to_string(),
        }
    }

    fn not_found(&self, recipe: &str) -> DiscoveryError {
        DiscoveryError::NotFound {
            recipe: recipe.to_string(),
            search_path: self.search_path.clone(),
        }
    }

    fn open(&self, path: &Path) -> Option<Box<dyn PluginSource>> {
        match self.opener.open(path) {
            Ok(module) => Some(module),
            Err(e) => {
                log::error!("Could not open {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Find the library providing the newest version of `recipe`.
    pub fn resolve(&self, candidates: &[PathBuf], recipe: &str) -> Result<Resolution, DiscoveryError> {
        let mut best: Option<Resolution> = None;
        let mut total = 0;

        for path in candidates {
            let Some(module) = self.open(path) else {
                continue;
            };
            let infos = module.list_plugins();
            match infos.len() {
                0 => log::warn!("No plugins contained within library '{}'", path.display()),
                1 => {}
                _ => log::debug!("Multiple plugins contained within library '{}'", path.display()),
            }

            for info in infos.iter().filter(|i| i.name == recipe) {
                total += 1;
                if info.version == 0 {
                    log::warn!(
                        "Recipe '{}' (in library '{}') has an invalid version number",
                        recipe,
                        path.display()
                    );
                }
                let newer = best.as_ref().map_or(true, |b| info.version > b.version);
                if newer {
                    best = Some(Resolution {
                        path: path.clone(),
                        version: info.version,
                        copies: 1,
                        total: 0,
                    });
                } else if let Some(b) = best.as_mut().filter(|b| b.version == info.version) {
                    b.copies += 1;
                }
            }
            drop(module);
        }

        let mut best = best.ok_or_else(|| self.not_found(recipe))?;
        best.total = total;
        if best.copies > 1 {
            let ambiguity = DiscoveryError::AmbiguousVersion {
                recipe: recipe.to_string(),
                copies: best.copies,
                path: best.path.display().to_string(),
                version: best.version,
            };
            log::error!("{}", ambiguity);
        } else if total > 1 {
            log::warn!(
                "Older copies ({}) of recipe '{}' were also found. Using latest version, path '{}' ('{}' version {})",
                total - 1,
                recipe,
                best.path.display(),
                recipe,
                best.version
            );
        }
        Ok(best)
    }

    /// Open `path` and take `recipe` out of it.
    pub fn instantiate(&self, path: &Path, recipe: &str) -> Result<PluginDescriptor, DiscoveryError> {
        let mut module = self.opener.open(path)?;
        let plugin = module.get_plugin(recipe).ok_or_else(|| self.not_found(recipe))?;
        Ok(PluginDescriptor {
            info: plugin.info(),
            recipe: plugin,
            module,
        })
    }

    /// [`resolve`](Self::resolve) followed by [`instantiate`](Self::instantiate)
    pub fn find(&self, candidates: &[PathBuf], recipe: &str) -> Result<PluginDescriptor, DiscoveryError> {
        let resolution = self.resolve(candidates, recipe)?;
        log::debug!("Using recipe '{}' from '{}'", recipe, resolution.path.display());
        self.instantiate(&resolution.path, recipe)
    }

    /// `(name, synopsis)` of every recipe in every candidate, in scan order
    pub fn list_recipes(&self, candidates: &[PathBuf]) -> Vec<(String, String)> {
        candidates
            .iter()
            .filter_map(|path| self.open(path))
            .flat_map(|module| module.list_plugins())
            .map(|info| (info.name, info.synopsis))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::source::ModuleKind;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    struct Fake(&'static str, u64);

    impl Recipe for Fake {
        fn info(&self) -> RecipeInfo {
            RecipeInfo::new(self.0, self.1).with_synopsis("fake")
        }
        fn init(&mut self, _: &mut RecipeContext) -> i32 {
            0
        }
        fn exec(&mut self, _: &mut RecipeContext) -> i32 {
            0
        }
    }

    struct FakeModule {
        path: PathBuf,
        recipes: Vec<Box<dyn Recipe>>,
        open: Rc<RefCell<usize>>,
    }

    impl Drop for FakeModule {
        fn drop(&mut self) {
            *self.open.borrow_mut() -= 1;
        }
    }

    impl PluginSource for FakeModule {
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
            let i = self.recipes.iter().position(|r| r.info().name == name)?;
            Some(self.recipes.remove(i))
        }
    }

    #[derive(Default)]
    struct FakeOpener {
        libraries: HashMap<PathBuf, Vec<(&'static str, u64)>>,
        open: Rc<RefCell<usize>>,
    }

    impl FakeOpener {
        fn with(mut self, path: &str, recipes: &[(&'static str, u64)]) -> Self {
            self.libraries.insert(PathBuf::from(path), recipes.to_vec());
            self
        }
    }

    impl ModuleOpener for FakeOpener {
        fn open(&self, path: &Path) -> Result<Box<dyn PluginSource>, DiscoveryError> {
            let recipes = self.libraries.get(path).ok_or_else(|| DiscoveryError::ModuleLoadFailed {
                path: path.to_path_buf(),
                reason: "missing".into(),
            })?;
            *self.open.borrow_mut() += 1;
            Ok(Box::new(FakeModule {
                path: path.to_path_buf(),
                recipes: recipes
                    .iter()
                    .map(|&(n, v)| Box::new(Fake(n, v)) as Box<dyn Recipe>)
                    .collect(),
                open: Rc::clone(&self.open),
            }))
        }
    }

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_highest_version_wins() {
        let opener = FakeOpener::default()
            .with("/r/a.so", &[("foo", 1)])
            .with("/r/b.so", &[("foo", 2)]);
        let registry = PluginRegistry::new(&opener, "/r");
        let res = registry.resolve(&paths(&["/r/a.so", "/r/b.so"]), "foo").unwrap();
        assert_eq!(res.path, PathBuf::from("/r/b.so"));
        assert_eq!((res.version, res.copies, res.total), (2, 1, 2));
        assert_eq!(*opener.open.borrow(), 0);
    }

    #[test]
    fn test_tie_at_highest_version_uses_first() {
        let opener = FakeOpener::default()
            .with("/r/a.so", &[("foo", 1)])
            .with("/r/b.so", &[("foo", 3)])
            .with("/r/c.so", &[("foo", 3)]);
        let registry = PluginRegistry::new(&opener, "/r");
        let res = registry
            .resolve(&paths(&["/r/a.so", "/r/b.so", "/r/c.so"]), "foo")
            .unwrap();
        assert_eq!(res.path, PathBuf::from("/r/b.so"));
        assert_eq!(res.copies, 2);
        assert_eq!(*opener.open.borrow(), 0);
    }

    #[test]
    fn test_version_zero_is_still_a_candidate() {
        let opener = FakeOpener::default().with("/r/a.so", &[("foo", 0)]);
        let res = PluginRegistry::new(&opener, "/r")
            .resolve(&paths(&["/r/a.so"]), "foo")
            .unwrap();
        assert_eq!(res.version, 0);
    }

    #[test]
    fn test_not_found_names_search_path() {
        let opener = FakeOpener::default().with("/r/a.so", &[("bar", 1)]);
        let err = PluginRegistry::new(&opener, "/r:/s")
            .resolve(&paths(&["/r/a.so", "/r/missing.so"]), "foo")
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("'foo'") && text.contains("/r:/s"), "{text}");
        assert_eq!(*opener.open.borrow(), 0);
    }

    #[test]
    fn test_instantiate_keeps_module_open_until_drop() {
        let opener = FakeOpener::default().with("/r/a.so", &[("foo", 1), ("bar", 2)]);
        let registry = PluginRegistry::new(&opener, "/r");
        let descriptor = registry.find(&paths(&["/r/a.so"]), "bar").unwrap();
        assert_eq!(descriptor.info().version, 2);
        assert_eq!(descriptor.library_path(), Path::new("/r/a.so"));
        assert_eq!(*opener.open.borrow(), 1);
        drop(descriptor);
        assert_eq!(*opener.open.borrow(), 0);
    }

    #[test]
    fn test_list_recipes() {
        let opener = FakeOpener::default()
            .with("/r/a.so", &[("foo", 1), ("bar", 2)])
            .with("/r/b.so", &[("foo", 2)]);
        let list = PluginRegistry::new(&opener, "/r").list_recipes(&paths(&["/r/a.so", "/r/b.so"]));
        let names: Vec<_> = list.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["foo", "bar", "foo"]);
        assert_eq!(*opener.open.borrow(), 0);
    }
}
