//! Glob-to-regex path rules with positional capture substitution.
//!
//! Each `*` in a glob becomes a greedy capture group and the pattern is
//! anchored at the end; every other character is literal. The replacement
//! refers to captures as `$1`, `$2`, … from left to right:
//!
//! ```text
//! /users/*/orders/*   →   /user/$1/order/$2
//! /users/123/orders/456   becomes   /user/123/order/456
//! ```

use regex::{Captures, Regex};

use crate::error::{Error, Result};

#[derive(Clone, Debug)]
struct Rule {
    pattern: Regex,
    replacement: String,
}

/// An ordered set of compiled rules. The first match wins; rules never chain.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compiles `(glob, replacement)` pairs, keeping their order.
    pub fn new<I, G, R>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (G, R)>,
        G: AsRef<str>,
        R: Into<String>,
    {
        let rules = rules
            .into_iter()
            .map(|(glob, replacement)| {
                Ok(Rule { pattern: compile(glob.as_ref())?, replacement: replacement.into() })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Applies the first matching rule to `path`.
    pub fn apply(&self, path: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| {
            let captures = rule.pattern.captures(path)?;
            Some(expand(&rule.replacement, &captures))
        })
    }
}

/// Writes `replacement` with every `$n` replaced by the n-th capture.
///
/// Single left-to-right pass: inserted text is never scanned again. `$`
/// takes the longest run of digits after it; an index with no matching group
/// (including `$0`) and a bare `$` are copied through unchanged.
fn expand(replacement: &str, captures: &Captures<'_>) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut rest = replacement;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        let index = after[..digits]
            .parse::<usize>()
            .ok()
            .filter(|&n| n > 0 && n < captures.len());
        match index {
            Some(n) => out.push_str(captures.get(n).map_or("", |m| m.as_str())),
            None => out.push_str(&rest[pos..pos + 1 + digits]),
        }
        rest = &after[digits..];
    }
    out.push_str(rest);
    out
}

fn compile(glob: &str) -> Result<Regex> {
    let body = glob
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("(.*)");
    Regex::new(&format!("{body}$")).map_err(|source| Error::InvalidRule {
        pattern: glob.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_captures_in_order() {
        let rules = RuleSet::new([("/users/*/orders/*", "/user/$1/order/$2")]).unwrap();
        assert_eq!(rules.apply("/users/123/orders/456").as_deref(), Some("/user/123/order/456"));
        assert_eq!(rules.apply("/x"), None);
    }

    #[test]
    fn first_rule_wins() {
        let rules = RuleSet::new([("/old/*", "/first/$1"), ("/old/a", "/second")]).unwrap();
        assert_eq!(rules.apply("/old/a").as_deref(), Some("/first/a"));
    }

    #[test]
    fn literals_are_escaped() {
        let rules = RuleSet::new([("/file.txt", "/doc")]).unwrap();
        assert_eq!(rules.apply("/file.txt").as_deref(), Some("/doc"));
        assert_eq!(rules.apply("/fileXtxt"), None);
    }

    #[test]
    fn anchored_at_end_only() {
        let rules = RuleSet::new([("/params", "/with_params")]).unwrap();
        assert_eq!(rules.apply("/params").as_deref(), Some("/with_params"));
        assert_eq!(rules.apply("/params/more"), None);
    }

    #[test]
    fn double_digit_captures() {
        let glob = "/*/*/*/*/*/*/*/*/*/*";
        let rules = RuleSet::new([(glob, "$10-$1")]).unwrap();
        assert_eq!(rules.apply("/a/b/c/d/e/f/g/h/i/j").as_deref(), Some("j-a"));
    }

    #[test]
    fn captured_dollar_signs_are_not_expanded_again() {
        let rules = RuleSet::new([("/*/*", "/$2/$1")]).unwrap();
        assert_eq!(rules.apply("/x/$1").as_deref(), Some("/$1/x"));
        assert_eq!(rules.apply("/$2/y").as_deref(), Some("/y/$2"));
    }

    #[test]
    fn unknown_indexes_stay_literal() {
        let rules = RuleSet::new([("/p/*", "/$0/$1/$7/$")]).unwrap();
        assert_eq!(rules.apply("/p/q").as_deref(), Some("/$0/q/$7/$"));
    }
}
