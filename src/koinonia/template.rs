//! Placeholder substitution for stored prompt templates.
//!
//! Three interchangeable placeholder syntaxes resolve to the same parameter:
//! `${key}`, `$(key)` and `<KEY>` (the key upper-cased). All occurrences of
//! all three syntaxes are replaced in a single scan over the template, so a
//! value that itself happens to contain placeholder-looking text is inserted
//! verbatim and never re-expanded.
//!
//! Unmatched placeholders are left in the output untouched; detecting missing
//! parameters up front is the registry's job
//! (see [`crate::prompts::PromptRegistry::get_and_populate`]).

use regex::Regex;
use std::collections::HashMap;

/// Populate `template` by substituting named placeholders from `params`.
///
/// `${key}` and `$(key)` match the key case-sensitively; `<KEY>` matches the
/// upper-cased key. Interior whitespace is tolerated inside `$( ... )`, which
/// is how stored persona templates are written. Keys are regex-escaped before
/// the match pattern is built, so a key containing regex metacharacters
/// cannot break the scan.
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
/// use koinonia::template::populate;
///
/// let mut params = HashMap::new();
/// params.insert("name".to_string(), "Ruth".to_string());
/// assert_eq!(populate("$(name) ${name} <NAME>", &params), "Ruth Ruth Ruth");
/// ```
pub fn populate(template: &str, params: &HashMap<String, String>) -> String {
    if params.is_empty() || template.is_empty() {
        return template.to_string();
    }

    // Longest keys first so an alternation like `name|name_suffix` cannot
    // shadow the longer key.
    let mut keys: Vec<&str> = params.keys().map(String::as_str).collect();
    keys.retain(|k| !k.is_empty());
    if keys.is_empty() {
        return template.to_string();
    }
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

    let escaped: Vec<String> = keys.iter().map(|k| regex::escape(k)).collect();
    let escaped_upper: Vec<String> = keys
        .iter()
        .map(|k| regex::escape(&k.to_uppercase()))
        .collect();

    let pattern = format!(
        r"\$\{{({alt})\}}|\$\(\s*({alt})\s*\)|<({alt_upper})>",
        alt = escaped.join("|"),
        alt_upper = escaped_upper.join("|"),
    );

    // The pattern is built from escaped, implementation-controlled keys.
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            log::error!("template::populate(...): invalid match pattern: {}", e);
            return template.to_string();
        }
    };

    // Index for resolving the upper-cased <KEY> form back to its parameter.
    let upper_index: HashMap<String, &str> = params
        .keys()
        .map(|k| (k.to_uppercase(), k.as_str()))
        .collect();

    re.replace_all(template, |caps: &regex::Captures| {
        if let Some(key) = caps.get(1).or_else(|| caps.get(2)) {
            return params
                .get(key.as_str())
                .cloned()
                .unwrap_or_else(|| caps[0].to_string());
        }
        if let Some(upper) = caps.get(3) {
            if let Some(key) = upper_index.get(upper.as_str()) {
                if let Some(value) = params.get(*key) {
                    return value.clone();
                }
            }
        }
        caps[0].to_string()
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_all_three_syntaxes_replaced() {
        let out = populate("$(x) <X> ${x}", &params(&[("x", "v")]));
        assert_eq!(out, "v v v");
    }

    #[test]
    fn test_unmatched_placeholder_left_verbatim() {
        let out = populate(
            "Hello $(name), welcome to $(place)",
            &params(&[("name", "Ruth")]),
        );
        assert_eq!(out, "Hello Ruth, welcome to $(place)");
    }

    #[test]
    fn test_inserted_value_not_re_expanded() {
        let out = populate(
            "$(outer) and $(inner)",
            &params(&[("outer", "$(inner)"), ("inner", "deep")]),
        );
        // The value inserted for `outer` is literal text, not a placeholder.
        assert_eq!(out, "$(inner) and deep");
    }

    #[test]
    fn test_dollar_paren_tolerates_whitespace() {
        let out = populate("$( name ) and $(name)", &params(&[("name", "Ruth")]));
        assert_eq!(out, "Ruth and Ruth");
    }

    #[test]
    fn test_angle_form_upper_cases_key() {
        let out = populate("<COMPANION_NAME>", &params(&[("companion_name", "Sofia")]));
        assert_eq!(out, "Sofia");
        // Lower-cased angle form is not a recognized placeholder.
        let out = populate("<companion_name>", &params(&[("companion_name", "Sofia")]));
        assert_eq!(out, "<companion_name>");
    }

    #[test]
    fn test_dollar_forms_are_case_sensitive() {
        let out = populate("$(Name)", &params(&[("name", "Ruth")]));
        assert_eq!(out, "$(Name)");
    }

    #[test]
    fn test_special_characters_in_keys_are_escaped() {
        let out = populate(
            "$(scenario-details) and $(a.b)",
            &params(&[("scenario-details", "D"), ("a.b", "V")]),
        );
        assert_eq!(out, "D and V");
    }

    #[test]
    fn test_multiple_occurrences_all_replaced() {
        let out = populate("$(k) $(k) $(k)", &params(&[("k", "x")]));
        assert_eq!(out, "x x x");
    }

    #[test]
    fn test_empty_params_returns_template() {
        let out = populate("$(anything)", &HashMap::new());
        assert_eq!(out, "$(anything)");
    }

    #[test]
    fn test_longer_key_wins_over_prefix() {
        let out = populate(
            "$(name_suffix)",
            &params(&[("name", "N"), ("name_suffix", "S")]),
        );
        assert_eq!(out, "S");
    }
}
