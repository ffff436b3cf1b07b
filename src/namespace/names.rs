//! Keyword name matching.
//!
//! Keyword names compare case-, space- and underscore-insensitively after Unicode NFC
//! normalisation. Calls may carry a BDD prefix (`Given`, `When`, `Then`, `And`, `But`) and may be
//! qualified with the owning library or resource (`Collections.Append To List`). User keywords
//! whose names contain `${arg}` placeholders match calls through a regular expression.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static EMBEDDED_ARG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}:]+)(?::([^}]+))?\}").expect("static regex"));

const BDD_PREFIXES: [&str; 5] = ["given", "when", "then", "and", "but"];

pub fn normalize(name: &str) -> String {
    name.nfc()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn eq(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Split a leading BDD prefix off a call: `("Given ", "user logs in")`.
pub fn split_bdd(call: &str) -> Option<(&str, &str)> {
    let (word, _) = call.split_once(char::is_whitespace)?;
    if !BDD_PREFIXES.iter().any(|p| p.eq_ignore_ascii_case(word)) {
        return None;
    }
    let rest = call[word.len()..].trim_start();
    let prefix = &call[..call.len() - rest.len()];
    (!rest.is_empty()).then_some((prefix, rest))
}

/// Every way of reading `call` as `owner.keyword`; keyword names may contain dots themselves.
pub fn split_qualified(call: &str) -> Vec<(&str, &str)> {
    call.match_indices('.')
        .map(|(idx, _)| (&call[..idx], &call[idx + 1..]))
        .filter(|(owner, name)| !owner.trim().is_empty() && !name.trim().is_empty())
        .collect()
}

pub fn has_embedded_args(name: &str) -> bool {
    EMBEDDED_ARG.is_match(name)
}

/// Matches calls against one keyword definition.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    name: String,
    normalized: String,
    embedded: Option<Regex>,
}

impl KeywordMatcher {
    pub fn new(name: &str) -> Self {
        let embedded = has_embedded_args(name)
            .then(|| embedded_pattern(name))
            .and_then(|pattern| match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!("[Names] Ignoring embedded arguments of '{}': {}", name, e);
                    None
                }
            });
        KeywordMatcher {
            name: name.to_string(),
            normalized: normalize(name),
            embedded,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Match an unqualified call, with or without a BDD prefix.
    pub fn matches(&self, call: &str) -> bool {
        self.matches_exact(call) || split_bdd(call).is_some_and(|(_, rest)| self.matches_exact(rest))
    }

    fn matches_exact(&self, call: &str) -> bool {
        if normalize(call) == self.normalized {
            return true;
        }
        self.embedded
            .as_ref()
            .is_some_and(|re| re.is_match(call.trim()))
    }

    /// Match `owner.keyword` where `owner` is one of `owners` (library or resource names).
    pub fn matches_qualified(&self, call: &str, owners: &[String]) -> bool {
        let call = split_bdd(call).map(|(_, rest)| rest).unwrap_or(call);
        split_qualified(call).into_iter().any(|(owner, rest)| {
            owners.iter().any(|o| eq(o, owner)) && self.matches_exact(rest)
        })
    }

    /// Rewrite a call of this keyword to `new_name`, keeping any BDD prefix and qualifier.
    /// Calls matched only through embedded arguments are left alone.
    pub fn rename_call(&self, call: &str, new_name: &str) -> Option<String> {
        let (prefix, rest) = split_bdd(call).unwrap_or(("", call));
        if normalize(rest) == self.normalized {
            return Some(format!("{prefix}{new_name}"));
        }
        if normalize(call) == self.normalized {
            return Some(new_name.to_string());
        }
        split_qualified(rest)
            .into_iter()
            .find(|(_, name)| normalize(name) == self.normalized)
            .map(|(owner, _)| format!("{prefix}{owner}.{new_name}"))
    }
}

fn embedded_pattern(name: &str) -> String {
    let mut pattern = String::from("(?i)^");
    let mut last = 0;
    for caps in EMBEDDED_ARG.captures_iter(name) {
        let Some(whole) = caps.get(0) else { continue };
        pattern.push_str(&regex::escape(&name[last..whole.start()]));
        match caps.get(2) {
            Some(custom) => pattern.push_str(&format!("({})", custom.as_str())),
            None => pattern.push_str("(.+?)"),
        }
        last = whole.end();
    }
    pattern.push_str(&regex::escape(&name[last..]));
    pattern.push('$');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_ignores_case_space_and_underscores() {
        assert!(eq("My KW", "my_kw"));
        assert!(eq("Log To Console", "logtoconsole"));
        assert!(!eq("My KW", "My KW 2"));
        // NFC: precomposed and combining forms are the same keyword
        assert!(eq("Caf\u{e9}", "cafe\u{301}"));
    }

    #[test]
    fn bdd_prefix_and_qualifier() {
        let matcher = KeywordMatcher::new("User Logs In");
        assert!(matcher.matches("Given user logs in"));
        assert!(matcher.matches("and User_Logs_In"));
        assert!(!matcher.matches("Givenuser logs in"));
        assert!(matcher.matches_qualified("common.User Logs In", &["Common".to_string()]));
        assert!(!matcher.matches_qualified("other.User Logs In", &["Common".to_string()]));
    }

    #[test]
    fn embedded_arguments_match_by_pattern() {
        let matcher = KeywordMatcher::new("Open ${page} Page");
        assert!(matcher.matches("Open Login Page"));
        assert!(matcher.matches("When open main page"));
        assert!(!matcher.matches("Open Page"));
        let numeric = KeywordMatcher::new("Wait ${n:\\d+} Seconds");
        assert!(numeric.matches("Wait 10 Seconds"));
        assert!(!numeric.matches("Wait ten Seconds"));
    }

    #[test]
    fn rename_keeps_prefix_and_owner() {
        let matcher = KeywordMatcher::new("My KW");
        assert_eq!(matcher.rename_call("my kw", "Renamed").as_deref(), Some("Renamed"));
        assert_eq!(
            matcher.rename_call("Then My KW", "Renamed").as_deref(),
            Some("Then Renamed")
        );
        assert_eq!(
            matcher.rename_call("res.My_KW", "Renamed").as_deref(),
            Some("res.Renamed")
        );
        assert_eq!(matcher.rename_call("Other", "Renamed"), None);
    }
}
