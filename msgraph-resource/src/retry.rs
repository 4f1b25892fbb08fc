use std::sync::OnceLock;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Retry a request when its error message matches any of the expressions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub error_message_regex: Vec<String>,
    /// Compiled on first use; `None` when an expression does not compile.
    #[serde(skip)]
    compiled: OnceLock<Option<RegexSet>>,
}

impl PartialEq for RetryPolicy {
    fn eq(&self, other: &Self) -> bool {
        self.error_message_regex == other.error_message_regex
    }
}

impl Eq for RetryPolicy {}

impl RetryPolicy {
    /// Directory objects are not always readable right after they are created.
    pub const READ_AFTER_CREATE: &'static [&'static str] = &[
        "ResourceNotFound",
        "Request_ResourceNotFound",
        "does not exist",
    ];

    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RetryPolicy {
            error_message_regex: patterns.into_iter().map(Into::into).collect(),
            compiled: OnceLock::new(),
        }
    }

    /// Check the expressions and compile them for [`Self::matches`].
    pub fn validate(&self) -> Result<()> {
        if self.error_message_regex.is_empty() {
            return Err(Error::InvalidConfig(
                "retry.error_message_regex must contain at least one expression".to_string(),
            ));
        }
        for (i, pattern) in self.error_message_regex.iter().enumerate() {
            if self.error_message_regex[..i].contains(pattern) {
                return Err(Error::InvalidConfig(format!(
                    "retry.error_message_regex contains {:?} more than once",
                    pattern
                )));
            }
            regex::Regex::new(pattern).map_err(|e| {
                Error::InvalidConfig(format!(
                    "retry.error_message_regex: invalid expression {:?}: {}",
                    pattern, e
                ))
            })?;
        }
        self.regex_set();
        Ok(())
    }

    /// The policy for reading back a resource that was just created: the
    /// user's expressions, followed by [`Self::READ_AFTER_CREATE`].
    pub fn read_after_create(user: Option<&RetryPolicy>) -> RetryPolicy {
        let mut error_message_regex: Vec<String> = user
            .map(|p| p.error_message_regex.clone())
            .unwrap_or_default();
        for pattern in Self::READ_AFTER_CREATE {
            if !error_message_regex.iter().any(|p| p == pattern) {
                error_message_regex.push(pattern.to_string());
            }
        }
        RetryPolicy::new(error_message_regex)
    }

    fn regex_set(&self) -> Option<&RegexSet> {
        self.compiled
            .get_or_init(|| match RegexSet::new(&self.error_message_regex) {
                Ok(set) => Some(set),
                Err(e) => {
                    tracing::warn!("Ignoring retry policy: {}", e);
                    None
                }
            })
            .as_ref()
    }

    pub fn matches(&self, message: &str) -> bool {
        self.regex_set().is_some_and(|set| set.is_match(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(patterns: &[&str]) -> RetryPolicy {
        RetryPolicy::new(patterns.iter().copied())
    }

    #[test]
    fn validate_accepts_valid_policy() {
        policy(&["ResourceNotFound", "^Throttled: .*$"])
            .validate()
            .unwrap();
    }

    #[test]
    fn validate_rejects_empty() {
        assert!(matches!(
            policy(&[]).validate(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_duplicates() {
        assert!(matches!(
            policy(&["a", "b", "a"]).validate(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_regex() {
        assert!(matches!(
            policy(&["(unclosed"]).validate(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn read_after_create_without_user_policy() {
        assert_eq!(
            RetryPolicy::read_after_create(None).error_message_regex,
            RetryPolicy::READ_AFTER_CREATE
        );
    }

    #[test]
    fn read_after_create_merges_user_first() {
        let merged = RetryPolicy::read_after_create(Some(&policy(&["Throttled", "does not exist"])));
        assert_eq!(
            merged.error_message_regex,
            vec![
                "Throttled",
                "does not exist",
                "ResourceNotFound",
                "Request_ResourceNotFound"
            ]
        );
    }

    #[test]
    fn matches_any_expression() {
        let p = RetryPolicy::read_after_create(None);
        assert!(p.matches("Resource 'abc' does not exist or one of its queried reference-property objects are not present."));
        assert!(p.matches("404: Request_ResourceNotFound"));
        assert!(!p.matches("Insufficient privileges to complete the operation."));
    }

    #[test]
    fn validate_compiles_once() {
        let p = policy(&["Throttled"]);
        p.validate().unwrap();
        assert!(p.compiled.get().is_some_and(Option::is_some));
        // Clones share the compiled set.
        let copy = p.clone();
        assert!(copy.compiled.get().is_some());
        assert!(copy.matches("Throttled: slow down"));
        assert_eq!(copy, policy(&["Throttled"]));
    }

    #[test]
    fn invalid_policy_never_matches() {
        let p = policy(&["(unclosed"]);
        assert!(!p.matches("(unclosed"));
        assert!(p.compiled.get().is_some_and(Option::is_none));
    }

    #[test]
    fn deserialize_leaves_set_uncompiled() {
        let p: RetryPolicy =
            serde_json::from_value(serde_json::json!({"error_message_regex": ["a"]})).unwrap();
        assert!(p.compiled.get().is_none());
        assert!(p.matches("abc"));
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            serde_json::json!({"error_message_regex": ["a"]})
        );
    }
}
