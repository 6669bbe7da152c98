//! In-process recipe modules for runner tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use esorex_core::error::DiscoveryError;
use esorex_core::plugin::{ModuleKind, ModuleOpener, PluginSource, NATIVE_EXTENSION};
use esorex_core::{
    ConfigResolver, Frame, ParamMode, Parameter, Recipe, RecipeContext, RecipeInfo, RunContext, RunReport,
    RunSettings,
};
use tempfile::TempDir;

/// What the fake recipe saw and how often it was called
#[derive(Debug, Default)]
pub struct Calls {
    pub init: usize,
    pub exec: usize,
    pub deinit: usize,
    pub open_modules: isize,
    pub par1: Option<i32>,
    pub input_frames: usize,
}

pub type Shared = Rc<RefCell<Calls>>;

/// Behaviour of the fake recipe
#[derive(Debug, Clone)]
pub struct RecipeSpec {
    pub name: &'static str,
    pub init_code: i32,
    pub exec_code: i32,
    pub deinit_code: i32,
    /// File created and registered as product by `exec`
    pub product: Option<PathBuf>,
}

impl Default for RecipeSpec {
    fn default() -> Self {
        Self {
            name: "fake_bias",
            init_code: 0,
            exec_code: 0,
            deinit_code: 0,
            product: None,
        }
    }
}

pub struct FakeRecipe {
    spec: RecipeSpec,
    calls: Shared,
}

impl Recipe for FakeRecipe {
    fn info(&self) -> RecipeInfo {
        RecipeInfo::new(self.spec.name, 10203)
            .with_synopsis("Fake master bias")
            .with_description("Combines nothing.")
            .with_author("Test Author", "test@example.org")
            .with_copyright("GPL")
    }

    fn init(&mut self, ctx: &mut RecipeContext) -> i32 {
        self.calls.borrow_mut().init += 1;
        ctx.parameters.push(
            Parameter::new_value("fake.par1", "fake", "An integer", 5)
                .with_alias(ParamMode::CommandLine, "par1")
                .with_alias(ParamMode::Environment, "FAKE_PAR1"),
        );
        self.spec.init_code
    }

    fn exec(&mut self, ctx: &mut RecipeContext) -> i32 {
        let mut calls = self.calls.borrow_mut();
        calls.exec += 1;
        calls.par1 = ctx.parameters.get_int("fake.par1");
        calls.input_frames = ctx.frames.len();
        if let Some(product) = &self.spec.product {
            if fs::write(product, b"product").is_err() {
                return 1;
            }
            ctx.frames.push(Frame::product(product.display().to_string(), "FAKE_PRODUCT"));
        }
        self.spec.exec_code
    }

    fn deinit(&mut self, _ctx: &mut RecipeContext) -> i32 {
        self.calls.borrow_mut().deinit += 1;
        self.spec.deinit_code
    }
}

struct FakeModule {
    path: PathBuf,
    recipe: Option<FakeRecipe>,
    info: RecipeInfo,
    calls: Shared,
}

impl Drop for FakeModule {
    fn drop(&mut self) {
        self.calls.borrow_mut().open_modules -= 1;
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
        vec![self.info.clone()]
    }

    fn get_plugin(&mut self, name: &str) -> Option<Box<dyn Recipe>> {
        if name != self.info.name {
            return None;
        }
        self.recipe.take().map(|r| Box::new(r) as Box<dyn Recipe>)
    }
}

/// Opens every native module file as one fake recipe
pub struct FakeOpener {
    pub spec: RecipeSpec,
    pub calls: Shared,
}

impl ModuleOpener for FakeOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn PluginSource>, DiscoveryError> {
        if ModuleKind::from_path(path) != Some(ModuleKind::Native) {
            return Err(DiscoveryError::ModuleLoadFailed {
                path: path.to_path_buf(),
                reason: "not a fake module".into(),
            });
        }
        self.calls.borrow_mut().open_modules += 1;
        let recipe = FakeRecipe {
            spec: self.spec.clone(),
            calls: Rc::clone(&self.calls),
        };
        Ok(Box::new(FakeModule {
            path: path.to_path_buf(),
            info: recipe.info(),
            recipe: Some(recipe),
            calls: Rc::clone(&self.calls),
        }))
    }
}

/// Directory layout of one run
pub struct Fixture {
    pub root: TempDir,
    pub spec: RecipeSpec,
    pub calls: Shared,
    pub env: Vec<(String, String)>,
}

impl Fixture {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        for dir in ["recipes", "out", "logs", "home", "work"] {
            fs::create_dir(root.path().join(dir)).unwrap();
        }
        fs::write(root.path().join("recipes").join(format!("libfake.{NATIVE_EXTENSION}")), b"").unwrap();
        Self {
            root,
            spec: RecipeSpec::default(),
            calls: Shared::default(),
            env: Vec::new(),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    pub fn settings(&self) -> RunSettings {
        let mut settings = RunSettings {
            recipe_dirs: vec![self.path("recipes").display().to_string()],
            home: Some(self.path("home")),
            log_dir: self.path("logs").display().to_string(),
            ..RunSettings::default()
        };
        settings.relocation.output_dir = self.path("out").display().to_string();
        settings
    }

    /// Write a SOF listing `entries` of `(file, tag, group)`, creating
    /// every listed file empty.
    pub fn sof(&self, name: &str, entries: &[(&str, &str, &str)]) -> String {
        let mut text = String::new();
        for (file, tag, group) in entries {
            let path = self.path("work").join(file);
            fs::write(&path, b"").unwrap();
            text.push_str(&format!("{} {} {}\n", path.display(), tag, group));
        }
        let sof = self.path("work").join(name);
        fs::write(&sof, text).unwrap();
        sof.display().to_string()
    }

    pub fn run(&self, settings: &RunSettings, args: &[&str]) -> (RunReport, String) {
        let opener = FakeOpener {
            spec: self.spec.clone(),
            calls: Rc::clone(&self.calls),
        };
        let env = self.env.clone();
        let resolver = ConfigResolver::new()
            .with_env_lookup(move |var| env.iter().find(|(k, _)| k == var).map(|(_, v)| v.clone()));
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let mut ctx = RunContext::default();
        let mut out = Vec::new();
        let report = esorex_core::PluginRunner::new(&opener, &resolver, settings).run(
            &mut ctx,
            self.spec.name,
            &args,
            &mut out,
        );
        (report, String::from_utf8(out).unwrap())
    }
}
