//! Machine readable parameter dumps.

use serde::{Deserialize, Serialize};

use super::{Constraint, ParamClass, ParamMode, ParamType, Parameter, ParameterList};

/// JSON record of one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub name: String,
    pub value: serde_json::Value,
    pub valtype: ParamType,
    pub partype: ParamClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valmin: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valmax: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valenum: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<String>,
}

impl ParameterRecord {
    pub fn from_parameter(param: &Parameter, recipe: Option<&str>) -> Self {
        let (valmin, valmax, valenum) = match param.constraint() {
            Constraint::Value => (None, None, None),
            Constraint::Range { min, max } => (Some(min.to_json()), Some(max.to_json()), None),
            Constraint::Enum(choices) => {
                (None, None, Some(choices.iter().map(|c| c.to_json()).collect()))
            }
        };
        Self {
            name: param.name().to_string(),
            value: param.value().to_json(),
            valtype: param.param_type(),
            partype: param.constraint().class(),
            valmin,
            valmax,
            valenum,
            display_name: param.alias(ParamMode::CommandLine).to_string(),
            description: param.help().to_string(),
            recipe: recipe.filter(|r| !r.is_empty()).map(str::to_string),
        }
    }
}

/// Records of all parameters that may appear in a configuration file
pub fn config_records(list: &ParameterList, recipe: Option<&str>) -> Vec<ParameterRecord> {
    list.iter()
        .filter(|p| p.is_enabled(ParamMode::ConfigFile))
        .map(|p| ParameterRecord::from_parameter(p, recipe))
        .collect()
}

/// Pretty printed JSON array of [`config_records`]
pub fn to_json_string(list: &ParameterList, recipe: Option<&str>) -> serde_json::Result<String> {
    let mut text = serde_json::to_string_pretty(&config_records(list, recipe))?;
    text.push('\n');
    Ok(text)
}
