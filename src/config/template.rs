//! Placeholder substitution in configuration text.
//!
//! Configuration strings may contain `$name` / `${name}` placeholders that
//! are substituted per worker (`process`) and per file (`input`, `output`)
//! before the configuration is parsed, so one configuration drives many
//! per-file pipeline instantiations. Unknown placeholders are left as-is;
//! `$$` escapes a literal dollar.
use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\$(?:\$|\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
            .expect("placeholder regex");
}

pub fn substitute(text: &str, vars: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2));
            match name {
                // "$$"
                None => "$".to_string(),
                Some(name) => vars
                    .get(name.as_str())
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string()),
            }
        })
        .into_owned()
}
