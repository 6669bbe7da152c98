//! Recipe directory scanning.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::source::{ModuleKind, ModuleOpener};
use crate::fileutils;
use crate::strings::StringList;

/// Candidate modules found below the recipe directories
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub native: Vec<PathBuf>,
    pub script: Vec<PathBuf>,
}

impl ScanResult {
    /// Native candidates first, then scripts, without duplicate paths
    pub fn merged(&self) -> Vec<PathBuf> {
        let mut seen = StringList::new();
        self.native
            .iter()
            .chain(&self.script)
            .filter(|p| seen.push_unique(p.display().to_string()))
            .cloned()
            .collect()
    }
}

/// Walks recipe directories and keeps the files that are loadable modules.
pub struct PluginDirectoryScanner<'a> {
    opener: &'a dyn ModuleOpener,
}

impl<'a> PluginDirectoryScanner<'a> {
    pub fn new(opener: &'a dyn ModuleOpener) -> Self {
        Self { opener }
    }

    /// Collect module files below `dirs` by extension, without validation.
    /// Hidden files and directories are skipped.
    pub fn collect(&self, dirs: &[String]) -> ScanResult {
        let mut result = ScanResult::default();
        let mut any_dir = false;

        for dir in dirs {
            let dir = fileutils::tilde_replace(dir);
            if !fileutils::directory_exists(&dir) {
                log::debug!("Recipe directory '{}' does not exist", dir);
                continue;
            }
            any_dir = true;

            let walker = WalkDir::new(&dir)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));
            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        let path = e.path().map(|p| p.display().to_string()).unwrap_or_else(|| dir.clone());
                        log::warn!("Unable to open directory {}", path);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                match ModuleKind::from_path(entry.path()) {
                    Some(ModuleKind::Native) => result.native.push(entry.into_path()),
                    Some(ModuleKind::Script) => result.script.push(entry.into_path()),
                    None => {}
                }
            }
        }

        if !any_dir && !dirs.is_empty() {
            log::warn!("None of the recipe directories ({}) exist", dirs.join(":"));
        }
        result
    }

    /// Collect and validate candidates. Invalid modules are dropped.
    pub fn scan(&self, dirs: &[String]) -> ScanResult {
        let mut result = self.collect(dirs);
        result.native.retain(|path| match self.opener.validate(path) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Ignoring '{}': {}", path.display(), e);
                false
            }
        });
        result.script.retain(|path| match self.opener.validate(path) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Ignoring '{}': {}", path.display(), e);
                false
            }
        });
        result
    }

    /// Validated candidates as one list
    pub fn candidates(&self, dirs: &[String]) -> Vec<PathBuf> {
        self.scan(dirs).merged()
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiscoveryError;
    use crate::plugin::source::{PluginSource, NATIVE_EXTENSION};
    use std::fs;
    use tempfile::TempDir;

    /// Accepts files whose content starts with "ok"
    struct ContentOpener;

    impl ModuleOpener for ContentOpener {
        fn open(&self, path: &Path) -> Result<Box<dyn PluginSource>, DiscoveryError> {
            Err(DiscoveryError::ModuleLoadFailed {
                path: path.to_path_buf(),
                reason: "not used".into(),
            })
        }

        fn validate(&self, path: &Path) -> Result<(), DiscoveryError> {
            if fs::read_to_string(path).unwrap_or_default().starts_with("ok") {
                Ok(())
            } else {
                Err(DiscoveryError::MissingEntrySymbol {
                    path: path.to_path_buf(),
                    symbol: "esorex_get_recipe_info",
                })
            }
        }
    }

    fn lib(name: &str) -> String {
        format!("{name}.{NATIVE_EXTENSION}")
    }

    #[test]
    fn test_recursive_scan_skips_hidden_and_invalid() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("vimos/sub")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::write(root.join(lib("liba")), "ok").unwrap();
        fs::write(root.join("vimos/sub").join(lib("libb")), "ok").unwrap();
        fs::write(root.join("vimos").join(lib("libbroken")), "bad").unwrap();
        fs::write(root.join(".hidden").join(lib("libc")), "ok").unwrap();
        fs::write(root.join(lib(".libd")), "ok").unwrap();
        fs::write(root.join("notes.txt"), "ok").unwrap();

        let opener = ContentOpener;
        let scanner = PluginDirectoryScanner::new(&opener);
        let collected = scanner.collect(&[root.display().to_string()]);
        assert_eq!(collected.native.len(), 3);

        let found = scanner.candidates(&[root.display().to_string()]);
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![lib("liba"), lib("libb")]);
    }

    #[test]
    fn test_duplicate_directories_are_merged() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(lib("liba")), "ok").unwrap();
        let d = dir.path().display().to_string();
        let opener = ContentOpener;
        let found = PluginDirectoryScanner::new(&opener).candidates(&[d.clone(), d]);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_missing_directories() {
        let opener = ContentOpener;
        let result = PluginDirectoryScanner::new(&opener).scan(&["/no/such/recipes".to_string()]);
        assert_eq!(result, ScanResult::default());
    }
}
