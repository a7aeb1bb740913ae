// src/policy/template.rs

//! `{name}` placeholder substitution for command and path templates.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder regex is valid"))
}

/// Replace every `{key}` whose key is in `vars`. Unknown placeholders are left
/// untouched so shell snippets with braces survive.
pub fn expand(template: &str, vars: &BTreeMap<&str, String>) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures<'_>| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
