//! Environment variable pass.

use crate::error::ConfigError;
use crate::params::{env_source, ParamMode, ParameterList, SourceAnnotations};

/// True for names a shell can export (letters, digits and `_`, not
/// starting with a digit).
pub fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Set every environment-enabled parameter whose variable is defined.
pub fn apply_environment(list: &mut ParameterList, sources: &mut SourceAnnotations) -> Result<(), ConfigError> {
    apply_environment_with(list, sources, |var| std::env::var(var).ok())
}

/// [`apply_environment`] with an injectable variable lookup.
///
/// Aliases that are not plain variable names (recipe parameters keep their
/// dotted full names by default) are skipped.
pub fn apply_environment_with(
    list: &mut ParameterList,
    sources: &mut SourceAnnotations,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    for param in list.iter_mut() {
        if !param.is_enabled(ParamMode::Environment) {
            continue;
        }
        let var = param.alias(ParamMode::Environment).to_string();
        if !is_variable_name(&var) {
            continue;
        }
        if let Some(value) = lookup(&var) {
            log::debug!("Using environment variable {}={}", var, value);
            param.set_from_string(Some(&value), &env_source(&var), sources)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameter;

    #[test]
    fn test_variable_names() {
        assert!(is_variable_name("ESOREX_LOG_LEVEL"));
        assert!(is_variable_name("_x1"));
        assert!(!is_variable_name("vimos.bias.par1"));
        assert!(!is_variable_name("1ABC"));
        assert!(!is_variable_name(""));
    }

    #[test]
    fn test_environment_pass() {
        let mut list: ParameterList = [
            Parameter::new_value("esorex.caller.time", "esorex.caller", "", false)
                .with_alias(ParamMode::Environment, "ESOREX_TIME"),
            Parameter::new_value("esorex.caller.show-hidden", "esorex.caller", "", false)
                .with_alias(ParamMode::Environment, "ESOREX_SHOW_HIDDEN")
                .disabled(ParamMode::Environment),
            Parameter::new_value("rec.par", "rec", "", 1),
        ]
        .into_iter()
        .collect();
        let mut sources = SourceAnnotations::new();
        let lookup = |var: &str| match var {
            "ESOREX_TIME" | "ESOREX_SHOW_HIDDEN" => Some("TRUE".to_string()),
            "rec.par" => Some("5".to_string()),
            _ => None,
        };
        apply_environment_with(&mut list, &mut sources, lookup).unwrap();

        assert_eq!(list.get_bool("esorex.caller.time"), Some(true));
        assert_eq!(list.get_bool("esorex.caller.show-hidden"), Some(false));
        assert_eq!(list.get_int("rec.par"), Some(1));
        assert_eq!(
            sources.get("esorex.caller.time"),
            Some("environment variable 'ESOREX_TIME'")
        );
    }

    #[test]
    fn test_bad_environment_value_is_an_error() {
        let mut list: ParameterList = [Parameter::new_value("a.n", "a", "", 1)
            .with_alias(ParamMode::Environment, "A_N")]
        .into_iter()
        .collect();
        let err = apply_environment_with(&mut list, &mut SourceAnnotations::new(), |_| {
            Some("many".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }
}
