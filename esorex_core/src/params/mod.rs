//! Configurable parameters of the caller and of recipes.
//!
//! A [`Parameter`] carries a typed value, its compiled-in default and a
//! [`Constraint`]. It can be reached from three configuration contexts
//! ([`ParamMode`]), each with its own alias and enable switch. A fresh
//! parameter is enabled in every context and each alias equals its full
//! name.
//!
//! A [`ParameterList`] keeps insertion order, which is also the order used
//! for listings and generated configuration files.

pub mod json;
pub mod source;
pub mod value;

pub use source::{
    env_source, SourceAnnotations, SOURCE_CALLER_DEFAULT, SOURCE_COMMAND_LINE,
    SOURCE_RECIPE_DEFAULT,
};
pub use value::{choices_text, Constraint, ParamClass, ParamType, ParamValue};

use crate::error::ConfigError;

/// Configuration context through which a parameter can be set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamMode {
    CommandLine,
    Environment,
    ConfigFile,
}

/// Per-context switch and alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSettings {
    pub enabled: bool,
    pub alias: String,
}

/// One configurable setting
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    context: String,
    help: String,
    value: ParamValue,
    default: ParamValue,
    constraint: Constraint,
    cli: ModeSettings,
    env: ModeSettings,
    cfg: ModeSettings,
    explicit: bool,
    id: usize,
}

impl Parameter {
    fn build(
        name: &str,
        context: &str,
        help: &str,
        default: ParamValue,
        constraint: Constraint,
    ) -> Self {
        let mode = ModeSettings {
            enabled: true,
            alias: name.to_string(),
        };
        Self {
            name: name.to_string(),
            context: context.to_string(),
            help: help.to_string(),
            value: default.clone(),
            default,
            constraint,
            cli: mode.clone(),
            env: mode.clone(),
            cfg: mode,
            explicit: false,
            id: 0,
        }
    }

    /// Parameter of class Value
    pub fn new_value(name: &str, context: &str, help: &str, default: impl Into<ParamValue>) -> Self {
        Self::build(name, context, help, default.into(), Constraint::Value)
    }

    /// Parameter of class Range; `min`/`max` must have the type of `default`
    pub fn new_range<T: Into<ParamValue>>(
        name: &str,
        context: &str,
        help: &str,
        default: T,
        min: T,
        max: T,
    ) -> Self {
        let constraint = Constraint::Range {
            min: min.into(),
            max: max.into(),
        };
        Self::build(name, context, help, default.into(), constraint)
    }

    /// Parameter of class Enum with the given choices
    pub fn new_enum<T: Into<ParamValue>>(
        name: &str,
        context: &str,
        help: &str,
        default: T,
        choices: impl IntoIterator<Item = T>,
    ) -> Self {
        let choices = choices.into_iter().map(Into::into).collect();
        Self::build(name, context, help, default.into(), Constraint::Enum(choices))
    }

    /// Builder form of [`Parameter::set_alias`]
    pub fn with_alias(mut self, mode: ParamMode, alias: &str) -> Self {
        self.set_alias(mode, alias);
        self
    }

    /// Builder form of [`Parameter::set_enabled`] with `false`
    pub fn disabled(mut self, mode: ParamMode) -> Self {
        self.set_enabled(mode, false);
        self
    }

    fn mode(&self, mode: ParamMode) -> &ModeSettings {
        match mode {
            ParamMode::CommandLine => &self.cli,
            ParamMode::Environment => &self.env,
            ParamMode::ConfigFile => &self.cfg,
        }
    }

    fn mode_mut(&mut self, mode: ParamMode) -> &mut ModeSettings {
        match mode {
            ParamMode::CommandLine => &mut self.cli,
            ParamMode::Environment => &mut self.env,
            ParamMode::ConfigFile => &mut self.cfg,
        }
    }

    pub fn set_alias(&mut self, mode: ParamMode, alias: &str) {
        self.mode_mut(mode).alias = alias.to_string();
    }

    pub fn set_enabled(&mut self, mode: ParamMode, enabled: bool) {
        self.mode_mut(mode).enabled = enabled;
    }

    pub fn alias(&self, mode: ParamMode) -> &str {
        &self.mode(mode).alias
    }

    pub fn is_enabled(&self, mode: ParamMode) -> bool {
        self.mode(mode).enabled
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn value(&self) -> &ParamValue {
        &self.value
    }

    pub fn default_value(&self) -> &ParamValue {
        &self.default
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    pub fn param_type(&self) -> ParamType {
        self.default.param_type()
    }

    /// True once the value was assigned by a configuration pass
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Position in the list as of the last [`ParameterList::renumber`]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Parse `text` and assign it, recording `source` for diagnostics.
    ///
    /// The source is recorded before validation so that diagnostics name
    /// the attempted origin even when the assignment fails. `None` means
    /// that no value was given at all.
    pub fn set_from_string(
        &mut self,
        text: Option<&str>,
        source: &str,
        sources: &mut SourceAnnotations,
    ) -> Result<(), ConfigError> {
        sources.record(&self.name, source);
        let text = text.ok_or_else(|| ConfigError::NullInput {
            name: self.name.clone(),
            kind: self.param_type().as_str(),
        })?;
        let value = ParamValue::parse(self.param_type(), text, &self.name)?;
        self.set_value(value)
    }

    /// Assign an already typed value, checking type and constraint.
    pub fn set_value(&mut self, value: ParamValue) -> Result<(), ConfigError> {
        if value.param_type() != self.param_type() {
            return Err(ConfigError::TypeMismatch {
                name: self.name.clone(),
                value: value.to_string(),
                expected: self.param_type().as_str(),
            });
        }
        self.constraint.check(&self.name, &value)?;
        self.value = value;
        self.explicit = true;
        Ok(())
    }

    /// Replace a leading `~` of a string value with the home directory.
    /// The explicit flag is left untouched.
    pub fn expand_tilde(&mut self) {
        if let ParamValue::String(s) = &self.value {
            if s.starts_with('~') {
                self.value = ParamValue::String(crate::fileutils::tilde_replace(s));
            }
        }
    }

    /// Copy the default into the value unless a pass set it explicitly.
    fn apply_default(&mut self) {
        if !self.explicit {
            self.value = self.default.clone();
        }
    }
}

/// Ordered collection of parameters owned by the caller or a recipe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterList {
    params: Vec<Parameter>,
}

impl ParameterList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, param: Parameter) {
        self.params.push(param);
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Parameter> {
        self.params.iter_mut()
    }

    pub fn find(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    pub fn find_by_alias(&self, mode: ParamMode, alias: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.alias(mode) == alias)
    }

    pub fn find_by_alias_mut(&mut self, mode: ParamMode, alias: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.alias(mode) == alias)
    }

    pub fn find_by_id_mut(&mut self, id: usize) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.id == id)
    }

    /// Re-derive sequential ids in list order
    pub fn renumber(&mut self) {
        for (id, p) in self.params.iter_mut().enumerate() {
            p.id = id;
        }
    }

    /// For every parameter not explicitly set, copy its default into its value
    pub fn postprocess_defaults(&mut self) {
        self.params.iter_mut().for_each(Parameter::apply_default);
    }

    /// Expand `~` in every string value
    pub fn expand_tilde(&mut self) {
        self.params.iter_mut().for_each(Parameter::expand_tilde);
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.find(name).and_then(|p| p.value.as_bool())
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        self.find(name).and_then(|p| p.value.as_int())
    }

    pub fn get_double(&self, name: &str) -> Option<f64> {
        self.find(name).and_then(|p| p.value.as_double())
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.find(name).and_then(|p| p.value.as_str())
    }
}

impl FromIterator<Parameter> for ParameterList {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ParameterList {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}
