//! `key=value` configuration files.
//!
//! ```text
//! # --recipe-dir
//! # Directory containing recipe libraries.
//! esorex.caller.recipe-dir=/opt/eso/recipes
//! esorex.caller.output-prefix="night 1"
//! ```
//!
//! Keys are full parameter names. Values may be double quoted; a backslash
//! escapes the next character.

use std::fs;
use std::path::Path;

use crate::error::{ConfigError, EsorexResult, FileError};
use crate::params::{ParamMode, ParameterList, SourceAnnotations};

/// Comment line written by the config file generator; the version number of
/// the generating program follows it.
pub const CONFIG_VERSION_MARKER: &str =
    "# Note: This configuration file has been automatically generated by the EsoRex (v";

/// Read the configuration file at `path` into `list`.
///
/// The path of the file is recorded as the source of every value it sets.
pub fn parse_config_file(
    list: &mut ParameterList,
    path: &Path,
    sources: &mut SourceAnnotations,
) -> EsorexResult<()> {
    let text = fs::read_to_string(path).map_err(|e| FileError::from_io(path, e))?;
    log::debug!("Reading configuration file '{}'", path.display());
    parse_config_str(list, &text, &path.display().to_string(), sources)?;
    Ok(())
}

/// Apply configuration text; `origin` names the file in messages.
pub fn parse_config_str(
    list: &mut ParameterList,
    text: &str,
    origin: &str,
    sources: &mut SourceAnnotations,
) -> Result<(), ConfigError> {
    for (index, raw) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = raw.trim();

        if line.starts_with(CONFIG_VERSION_MARKER) {
            check_generator_version(line, origin);
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = match line.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() && !v.trim().is_empty() => (k.trim(), v.trim()),
            _ => {
                log::error!(
                    "'{}' does not fit 'key=value' format in configuration file '{}'",
                    line, origin
                );
                return Err(ConfigError::MalformedLine {
                    file: origin.to_string(),
                    line: line_number,
                    text: line.to_string(),
                });
            }
        };

        let Some(param) = list.find_mut(key) else {
            log::error!("Parameter '{}' not recognised in configuration file '{}'", key, origin);
            return Err(ConfigError::UnknownKey {
                file: origin.to_string(),
                line: line_number,
                key: key.to_string(),
            });
        };
        if !param.is_enabled(ParamMode::ConfigFile) {
            log::warn!(
                "Parameter '{}' should not appear in a configuration file, but is present in '{}'",
                key, origin
            );
            continue;
        }

        let value = unquote(value).ok_or_else(|| {
            log::error!(
                "Quoting mismatch within value '{}' for parameter '{}' in configuration file '{}'",
                value, key, origin
            );
            ConfigError::QuoteMismatch {
                file: origin.to_string(),
                line: line_number,
                key: key.to_string(),
            }
        })?;

        if let Err(e) = param.set_from_string(Some(&value), origin, sources) {
            log::error!(
                "Error parsing/interpreting entry '{}' in configuration file '{}'",
                key, origin
            );
            return Err(e);
        }
    }
    Ok(())
}

/// Double quoted form of `value` with `\` and `"` escaped, as read back
/// by the parser.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Strip enclosing quotes and resolve backslash escapes. Returns `None`
/// on unbalanced or unescaped quotes.
fn unquote(value: &str) -> Option<String> {
    let inner = if let Some(rest) = value.strip_prefix('"') {
        let body = rest.strip_suffix('"')?;
        if body.ends_with('\\') && !body.ends_with("\\\\") {
            return None;
        }
        body
    } else {
        value
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '"' => return None,
            _ => out.push(c),
        }
    }
    Some(out)
}

fn check_generator_version(line: &str, origin: &str) {
    let Some(file_major) = leading_number(&line[CONFIG_VERSION_MARKER.len()..]) else {
        return;
    };
    let Some(own_major) = leading_number(crate::VERSION) else {
        log::error!("Unidentified {} version", crate::PACKAGE);
        return;
    };
    if own_major > file_major {
        log::warn!(
            "The configuration file '{}' appears to have been created with an older version of EsoRex.",
            origin
        );
    } else if own_major < file_major {
        log::warn!(
            "The configuration file '{}' appears to have been created with a more recent version of EsoRex.",
            origin
        );
    }
}

fn leading_number(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameter;

    fn list() -> ParameterList {
        [
            Parameter::new_value("r.name", "r", "", "default"),
            Parameter::new_range("r.count", "r", "", 1, 0, 10),
            Parameter::new_value("r.flag", "r", "", false),
            Parameter::new_value("r.internal", "r", "", 0).disabled(ParamMode::ConfigFile),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_values_and_sources() {
        let mut list = list();
        let mut sources = SourceAnnotations::new();
        parse_config_str(
            &mut list,
            "# comment\n\n  r.count = 7  \nr.flag=TRUE\nr.name=\"two words\"\n",
            "/tmp/r.rc",
            &mut sources,
        )
        .unwrap();
        assert_eq!(list.get_int("r.count"), Some(7));
        assert_eq!(list.get_bool("r.flag"), Some(true));
        assert_eq!(list.get_string("r.name"), Some("two words"));
        assert_eq!(sources.get("r.count"), Some("/tmp/r.rc"));
    }

    #[test]
    fn test_escapes() {
        let mut list = list();
        let mut sources = SourceAnnotations::new();
        parse_config_str(&mut list, r#"r.name="say \"hi\" \\o/""#, "f", &mut sources).unwrap();
        assert_eq!(list.get_string("r.name"), Some(r#"say "hi" \o/"#));
    }

    #[test]
    fn test_quoted_values_read_back_unchanged() {
        for value in [r#"a"b"#, r"C:\dir", "  padded  ", r"trail\", "plain"] {
            let mut list = list();
            let line = format!("r.name={}", quote(value));
            parse_config_str(&mut list, &line, "f", &mut SourceAnnotations::new()).unwrap();
            assert_eq!(list.get_string("r.name"), Some(value), "{line}");
        }
        assert_eq!(quote(r#"say "hi""#), r#""say \"hi\"""#);
    }

    #[test]
    fn test_quote_mismatch() {
        for line in [r#"r.name="open"#, r#"r.name=mid"quote"#, r#"r.name="tail\""#] {
            let mut list = list();
            let err = parse_config_str(&mut list, line, "f", &mut SourceAnnotations::new()).unwrap_err();
            assert!(matches!(err, ConfigError::QuoteMismatch { .. }), "{line}");
        }
    }

    #[test]
    fn test_malformed_and_unknown() {
        let mut list = list();
        let mut sources = SourceAnnotations::new();
        let err = parse_config_str(&mut list, "r.count", "f", &mut sources).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedLine { line: 1, .. }));
        let err = parse_config_str(&mut list, "r.count=", "f", &mut sources).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedLine { .. }));
        let err = parse_config_str(&mut list, "\nr.bogus=1", "f", &mut sources).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { line: 2, .. }));
    }

    #[test]
    fn test_parse_error_aborts_file() {
        let mut list = list();
        let mut sources = SourceAnnotations::new();
        let err = parse_config_str(&mut list, "r.count=11\nr.flag=TRUE", "f", &mut sources).unwrap_err();
        assert!(matches!(err, ConfigError::RangeError { .. }));
        assert_eq!(list.get_bool("r.flag"), Some(false));
    }

    #[test]
    fn test_disabled_key_is_ignored() {
        let mut list = list();
        let mut sources = SourceAnnotations::new();
        parse_config_str(&mut list, "r.internal=5", "f", &mut sources).unwrap();
        assert_eq!(list.get_int("r.internal"), Some(0));
    }

    #[test]
    fn test_version_marker_is_a_comment() {
        let mut list = list();
        let text = format!("{CONFIG_VERSION_MARKER}2.0.1) program.\nr.count=3\n");
        parse_config_str(&mut list, &text, "f", &mut SourceAnnotations::new()).unwrap();
        assert_eq!(list.get_int("r.count"), Some(3));
        assert_eq!(leading_number("2.0.1) program."), Some(2));
    }

    #[test]
    fn test_missing_file() {
        let mut list = list();
        let err = parse_config_file(&mut list, Path::new("/no/such.rc"), &mut SourceAnnotations::new())
            .unwrap_err();
        assert!(err.to_string().contains("/no/such.rc"));
    }
}
