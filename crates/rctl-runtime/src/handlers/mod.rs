#![forbid(unsafe_code)]

//! Subsystem handlers owned by the control thread.
//!
//! Each handler keeps the state for one family of control messages. They
//! know nothing about dispatch; the control thread unpacks messages and
//! calls into them.

pub mod appcache;
pub mod dns_prefetch;
pub mod extensions;
pub mod histograms;
pub mod user_scripts;
pub mod visited_links;

pub use appcache::AppCacheDispatcher;
pub use dns_prefetch::DnsPrefetcher;
pub use extensions::ExtensionBindings;
pub use histograms::HistogramSnapshots;
pub use user_scripts::{RunLocation, UserScript, UserScriptTable};
pub use visited_links::VisitedLinkTable;

/// Match `text` against a pattern where `*` stands for any run of
/// characters (including none). Every other character matches itself.
#[must_use]
pub fn glob_matches(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    // Position of the last `*` and the text index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == b'*')
}

#[cfg(test)]
mod tests {
    use super::glob_matches;
    use proptest::prelude::*;

    #[test]
    fn literal_and_star_patterns() {
        assert!(glob_matches("http://a.test/", "http://a.test/"));
        assert!(!glob_matches("http://a.test/", "http://a.test/x"));
        assert!(glob_matches("http://*.test/*", "http://www.a.test/path"));
        assert!(glob_matches("*", ""));
        assert!(!glob_matches("a*c", "abd"));
        assert!(glob_matches("a**c", "abbbc"));
    }

    proptest! {
        #[test]
        fn star_matches_everything(s in ".*") {
            prop_assert!(glob_matches("*", &s));
        }

        #[test]
        fn text_matches_itself_without_stars(s in "[a-z:/.]{0,24}") {
            prop_assert!(glob_matches(&s, &s));
        }
    }
}
