//! Python recipe modules.
//!
//! A script module is a `.py` file with one or more classes deriving from a
//! class named `CplPlugin`:
//!
//! ```python
//! class CplPlugin(object):
//!     name = "py_sum"
//!     version = 10000
//!     synopsis = "Add a constant"
//!     parameters = [{'class': 'range', 'name': 'py_sum.offset',
//!                    'default': 1, 'min': 0, 'max': 10}]
//!
//!     def execute(self, plugin):
//!         offset = plugin['parameters'][0]['value']
//!         plugin['frames'].append({'filename': 'out.fits', 'tag': 'SUM', 'group': 3})
//!         return 0
//! ```
//!
//! The engine never embeds an interpreter. Each request starts the
//! interpreter named by `ESOREX_PYTHON` (default `python3`) with a short
//! bootstrap, writes one JSON document on its standard input and reads one
//! JSON document from its standard output. Anything the script prints goes
//! to standard error.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;
use serde_json::{json, Value};

use super::source::{ModuleKind, PluginSource};
use super::traits::{Recipe, RecipeContext, RecipeInfo};
use crate::error::DiscoveryError;
use crate::frames::{Frame, FrameGroup};
use crate::params::{ParamMode, ParamType, ParamValue, Parameter};

/// Environment variable naming the interpreter
pub const PYTHON_ENV: &str = "ESOREX_PYTHON";

const BOOTSTRAP: &str = "import sys, json; _data = json.load(sys.stdin); _out = sys.stdout; \
                         sys.stdout = sys.stderr; exec(_data['script'])";

const DISCOVER_SCRIPT: &str = r#"
import inspect, os
found = {}
for path in _data['paths']:
    module = os.path.splitext(os.path.basename(path))[0]
    sys.path.append(os.path.dirname(path))
    try:
        __import__(module)
        for _, cls in inspect.getmembers(sys.modules[module], predicate=inspect.isclass):
            if any(base.__name__ == 'CplPlugin' for base in cls.__mro__):
                found.setdefault(path, []).append(cls)
    except Exception:
        import traceback
        traceback.print_exc()
    del sys.path[-1]

def attr(inst, key, fallback=None):
    return getattr(inst, key, fallback)

results = {}
for path, classes in found.items():
    results[path] = []
    for cls in classes:
        try:
            inst = cls()
        except Exception:
            continue
        doc = inspect.getdoc(inst) or ''
        results[path].append({
            'class': cls.__name__,
            'name': attr(inst, 'name', cls.__name__),
            'version': attr(inst, 'version'),
            'synopsis': attr(inst, 'synopsis', doc.splitlines()[0] if doc else None),
            'description': attr(inst, 'description', doc or None),
            'author': attr(inst, 'author'),
            'email': attr(inst, 'email'),
            'copyright': attr(inst, 'copyright'),
            'parameters': attr(inst, 'parameters', []),
            'recipeconfig': attr(inst, 'recipeconfig'),
        })
json.dump(results, _out, indent=2)
"#;

const EXECUTE_SCRIPT: &str = r#"
import importlib
sys.path.append(_data['modulepath'])
module = importlib.import_module(_data['module'])
plugin = getattr(module, _data['class'])()
result = plugin.execute(_data['plugin'])
json.dump({'result': result,
           'error': getattr(plugin, 'error_message', None),
           'plugin': _data['plugin']}, _out, indent=2)
"#;

/// Runs requests through an external interpreter
#[derive(Debug, Clone)]
pub struct ScriptBridge {
    interpreter: String,
}

impl Default for ScriptBridge {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ScriptBridge {
    pub fn new(interpreter: &str) -> Self {
        Self {
            interpreter: interpreter.to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(&std::env::var(PYTHON_ENV).unwrap_or_else(|_| "python3".to_string()))
    }

    fn run(&self, input: &Value) -> Result<Value, DiscoveryError> {
        let bridge_err = |what: &str, e: &dyn std::fmt::Display| {
            DiscoveryError::ScriptBridge(format!("{} ({}): {}", what, self.interpreter, e))
        };

        let mut child = Command::new(&self.interpreter)
            .arg("-c")
            .arg(BOOTSTRAP)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| bridge_err("failed to start the interpreter", &e))?;

        let payload = serde_json::to_vec(input).map_err(|e| bridge_err("failed to encode request", &e))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .map_err(|e| bridge_err("failed to write to the interpreter", &e))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| bridge_err("failed to read from the interpreter", &e))?;
        if !output.status.success() {
            return Err(DiscoveryError::ScriptBridge(format!(
                "the interpreter ({}) exited with {}",
                self.interpreter, output.status
            )));
        }
        log::debug!("Script bridge reply: {}", String::from_utf8_lossy(&output.stdout));
        serde_json::from_slice(&output.stdout).map_err(|e| bridge_err("invalid reply", &e))
    }

    /// Recipe declarations of every module in `paths`, keyed by path.
    /// Modules without `CplPlugin` classes are absent from the result.
    pub fn discover(&self, paths: &[PathBuf]) -> Result<HashMap<String, Vec<ScriptDeclaration>>, DiscoveryError> {
        if paths.is_empty() {
            return Ok(HashMap::new());
        }
        let paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        let reply = self.run(&json!({ "script": DISCOVER_SCRIPT, "paths": paths }))?;
        serde_json::from_value(reply).map_err(|e| DiscoveryError::ScriptBridge(e.to_string()))
    }

    /// Call `execute` of `class` in the module at `path` with `plugin`
    pub fn execute(&self, path: &Path, class: &str, plugin: Value) -> Result<ExecuteReply, DiscoveryError> {
        let module = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.split('.').next())
            .unwrap_or_default();
        let dir = path.parent().map(|p| p.display().to_string()).unwrap_or_default();
        let reply = self.run(&json!({
            "script": EXECUTE_SCRIPT,
            "modulepath": dir,
            "module": module,
            "class": class,
            "plugin": plugin,
        }))?;
        serde_json::from_value(reply).map_err(|e| DiscoveryError::ScriptBridge(e.to_string()))
    }
}

/// Recipe class as declared by a script module
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptDeclaration {
    pub class: String,
    pub name: String,
    pub version: Option<u64>,
    pub synopsis: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub email: Option<String>,
    pub copyright: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ScriptParameter>,
    #[serde(default)]
    pub recipeconfig: Option<Value>,
}

impl ScriptDeclaration {
    pub fn info(&self) -> RecipeInfo {
        let text = |s: &Option<String>| s.clone().unwrap_or_default();
        RecipeInfo {
            name: self.name.clone(),
            synopsis: text(&self.synopsis),
            description: text(&self.description),
            author: text(&self.author),
            email: text(&self.email),
            copyright: text(&self.copyright),
            version: self.version.unwrap_or(0),
        }
    }
}

fn default_class() -> String {
    "value".to_string()
}

/// Parameter declaration of a script recipe
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptParameter {
    #[serde(default = "default_class")]
    pub class: String,
    pub name: String,
    pub default: Value,
    #[serde(default)]
    pub min: Option<Value>,
    #[serde(default)]
    pub max: Option<Value>,
    #[serde(default)]
    pub choices: Option<Vec<Value>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub cli_enabled: Option<bool>,
    #[serde(default)]
    pub cli_alias: Option<String>,
    #[serde(default)]
    pub env_enabled: Option<bool>,
    #[serde(default)]
    pub env_alias: Option<String>,
    #[serde(default)]
    pub cfg_enabled: Option<bool>,
    #[serde(default)]
    pub cfg_alias: Option<String>,
}

fn json_type(value: &Value) -> Option<ParamType> {
    match value {
        Value::Bool(_) => Some(ParamType::Bool),
        Value::Number(n) if n.is_i64() => Some(ParamType::Int),
        Value::Number(_) => Some(ParamType::Double),
        Value::String(_) => Some(ParamType::String),
        _ => None,
    }
}

impl ScriptParameter {
    /// Build the engine parameter; `recipe` is the fallback context.
    pub fn to_parameter(&self, recipe: &str) -> Result<Parameter, String> {
        let ty = json_type(&self.default)
            .ok_or_else(|| format!("parameter '{}' has an unsupported default", self.name))?;
        let value = |v: &Value, what: &str| {
            ParamValue::from_json(ty, v)
                .ok_or_else(|| format!("{} of parameter '{}' does not match the type {}", what, self.name, ty))
        };
        let default = value(&self.default, "default")?;
        let context = self.context.as_deref().unwrap_or(recipe);
        let help = self.description.as_deref().unwrap_or_default();

        let mut param = match self.class.as_str() {
            "value" => Parameter::new_value(&self.name, context, help, default),
            "range" => {
                let (Some(min), Some(max)) = (&self.min, &self.max) else {
                    return Err(format!("range parameter '{}' needs 'min' and 'max'", self.name));
                };
                Parameter::new_range(&self.name, context, help, default, value(min, "min")?, value(max, "max")?)
            }
            "enum" => {
                let choices = self
                    .choices
                    .as_deref()
                    .ok_or_else(|| format!("enum parameter '{}' needs 'choices'", self.name))?
                    .iter()
                    .map(|c| value(c, "choice"))
                    .collect::<Result<Vec<_>, _>>()?;
                Parameter::new_enum(&self.name, context, help, default, choices)
            }
            other => return Err(format!("parameter '{}' has an unknown class '{}'", self.name, other)),
        };

        for (mode, enabled, alias) in [
            (ParamMode::CommandLine, self.cli_enabled, &self.cli_alias),
            (ParamMode::Environment, self.env_enabled, &self.env_alias),
            (ParamMode::ConfigFile, self.cfg_enabled, &self.cfg_alias),
        ] {
            if let Some(alias) = alias {
                param.set_alias(mode, alias);
            }
            if let Some(enabled) = enabled {
                param.set_enabled(mode, enabled);
            }
        }
        Ok(param)
    }
}

/// Reply to an execute request
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteReply {
    pub result: Option<i64>,
    pub error: Option<String>,
    pub plugin: Value,
}

/// A recipe class of a script module
#[derive(Debug)]
pub struct ScriptRecipe {
    path: PathBuf,
    declaration: ScriptDeclaration,
    bridge: ScriptBridge,
}

fn frame_to_json(frame: &Frame) -> Value {
    json!({ "filename": frame.filename, "tag": frame.tag, "group": frame.group.code() })
}

fn frame_from_json(value: &Value) -> Option<Frame> {
    let filename = value.get("filename")?.as_str()?;
    let tag = value.get("tag").and_then(Value::as_str).unwrap_or_default();
    let group = value.get("group").and_then(Value::as_i64).map(FrameGroup::from_code).unwrap_or_default();
    Some(Frame::new(filename, tag, group))
}

impl ScriptRecipe {
    fn plugin_json(&self, ctx: &RecipeContext) -> Value {
        let parameters: Vec<Value> = ctx
            .parameters
            .iter()
            .map(|p| {
                json!({
                    "name": p.name(),
                    "class": p.constraint().class(),
                    "context": p.context(),
                    "description": p.help(),
                    "value": p.value().to_json(),
                    "default": p.default_value().to_json(),
                })
            })
            .collect();
        let frames: Vec<Value> = ctx.frames.iter().map(frame_to_json).collect();
        json!({
            "name": self.declaration.name,
            "version": self.declaration.version,
            "parameters": parameters,
            "frames": frames,
        })
    }

    /// Update the frames passed in and append the new ones
    fn merge_frames(ctx: &mut RecipeContext, reply: &Value) -> Result<(), String> {
        let frames = reply
            .get("frames")
            .and_then(Value::as_array)
            .ok_or("Received an empty frameset from the plugin")?;
        if frames.len() < ctx.frames.len() {
            return Err("The frameset returned from the plugin recipe lost frames".to_string());
        }
        let known = ctx.frames.len();
        for (i, value) in frames.iter().enumerate() {
            let frame = frame_from_json(value).ok_or_else(|| format!("invalid frame {i} returned"))?;
            if i >= known {
                ctx.frames.push(frame);
            } else if let Some(existing) = ctx.frames.get_mut(i) {
                *existing = frame;
            }
        }
        Ok(())
    }
}

impl Recipe for ScriptRecipe {
    fn info(&self) -> RecipeInfo {
        self.declaration.info()
    }

    fn init(&mut self, ctx: &mut RecipeContext) -> i32 {
        for declared in &self.declaration.parameters {
            match declared.to_parameter(&self.declaration.name) {
                Ok(param) => ctx.parameters.push(param),
                Err(e) => {
                    log::error!("{}", e);
                    return -1;
                }
            }
        }
        0
    }

    fn exec(&mut self, ctx: &mut RecipeContext) -> i32 {
        let plugin = self.plugin_json(ctx);
        let reply = match self.bridge.execute(&self.path, &self.declaration.class, plugin) {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("{}", e);
                return -1;
            }
        };
        if let Err(e) = Self::merge_frames(ctx, &reply.plugin) {
            log::error!("{}", e);
            return -1;
        }
        if let Some(message) = reply.error.as_deref().filter(|m| !m.is_empty()) {
            log::error!("{}", message);
        }
        match reply.result {
            Some(code) => i32::try_from(code).unwrap_or(-1),
            None if reply.error.is_some() => -1,
            None => 0,
        }
    }
}

/// A `.py` file with at least one recipe class
pub struct ScriptModule {
    path: PathBuf,
    recipes: Vec<ScriptDeclaration>,
    bridge: ScriptBridge,
}

impl ScriptModule {
    pub fn open(path: &Path, bridge: ScriptBridge) -> Result<Self, DiscoveryError> {
        let mut found = bridge.discover(&[path.to_path_buf()])?;
        let recipes = found.remove(&path.display().to_string()).unwrap_or_default();
        if recipes.is_empty() {
            return Err(DiscoveryError::ModuleLoadFailed {
                path: path.to_path_buf(),
                reason: "no class derived from CplPlugin".to_string(),
            });
        }
        Ok(Self::from_declarations(path, recipes, bridge))
    }

    pub fn from_declarations(path: &Path, recipes: Vec<ScriptDeclaration>, bridge: ScriptBridge) -> Self {
        Self {
            path: path.to_path_buf(),
            recipes,
            bridge,
        }
    }
}

impl PluginSource for ScriptModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Script
    }

    fn list_plugins(&self) -> Vec<RecipeInfo> {
        self.recipes.iter().map(ScriptDeclaration::info).collect()
    }

    fn get_plugin(&mut self, name: &str) -> Option<Box<dyn Recipe>> {
        let index = self.recipes.iter().position(|d| d.name == name)?;
        Some(Box::new(ScriptRecipe {
            path: self.path.clone(),
            declaration: self.recipes.remove(index),
            bridge: self.bridge.clone(),
        }))
    }
}
