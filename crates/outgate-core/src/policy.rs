//! Path classification for application requests.
//!
//! [`PathPolicy`] decides what happens to a request whose session is not
//! authenticated. Two independent rule sets (deny and redirect) are evaluated
//! together and the matching pattern with the longest source text wins. On a
//! length tie the deny set wins. No match means the path is public.

use http::StatusCode;
use regex::Regex;

use crate::error::{Error, Result};

/// Outcome of classifying a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Public path; the request goes upstream whatever the verdict.
    Allow,
    /// Unauthenticated requests are rejected with this status.
    Deny(StatusCode),
    /// Unauthenticated requests are sent to the login flow with this status.
    Redirect(StatusCode),
}

impl Outcome {
    /// The response status this outcome stands for (`200` for [`Outcome::Allow`]).
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Allow => StatusCode::OK,
            Self::Deny(status) | Self::Redirect(status) => *status,
        }
    }

    /// Returns `true` for [`Outcome::Allow`].
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Compiled path rules.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    skipped: Vec<Regex>,
    deny: Vec<Regex>,
    deny_status: StatusCode,
    redirect: Vec<Regex>,
    redirect_status: StatusCode,
}

impl PathPolicy {
    /// Create a policy from already compiled rule sets.
    pub fn new(
        deny: Vec<Regex>,
        deny_status: StatusCode,
        redirect: Vec<Regex>,
        redirect_status: StatusCode,
    ) -> Self {
        Self {
            skipped: Vec::new(),
            deny,
            deny_status,
            redirect,
            redirect_status,
        }
    }

    /// Set the paths that bypass the authenticator entirely.
    #[must_use]
    pub fn with_skipped(mut self, skipped: Vec<Regex>) -> Self {
        self.skipped = skipped;
        self
    }

    /// Whether a path bypasses authentication without asking the authenticator.
    pub fn is_skipped(&self, path: &str) -> bool {
        self.skipped.iter().any(|re| re.is_match(path))
    }

    /// Classify a request path.
    ///
    /// The path is matched as given; no normalization happens here.
    pub fn classify(&self, path: &str) -> Outcome {
        let mut best: Option<(usize, Outcome)> = None;

        let candidates = self
            .deny
            .iter()
            .map(|re| (re, Outcome::Deny(self.deny_status)))
            .chain(
                self.redirect
                    .iter()
                    .map(|re| (re, Outcome::Redirect(self.redirect_status))),
            );

        // Deny rules come first, so a strict comparison keeps them on ties.
        for (re, outcome) in candidates {
            if !re.is_match(path) {
                continue;
            }
            let len = re.as_str().len();
            if best.is_none_or(|(best_len, _)| len > best_len) {
                best = Some((len, outcome));
            }
        }

        best.map_or(Outcome::Allow, |(_, outcome)| outcome)
    }
}

/// Compile a list of path patterns, naming the offending entry on failure.
pub fn compile_patterns(name: &str, patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .enumerate()
        .map(|(idx, pattern)| {
            Regex::new(pattern)
                .map_err(|e| Error::config(format!("{name}[{idx}] is not valid: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DENY: StatusCode = StatusCode::UNAUTHORIZED;
    const REDIRECT: StatusCode = StatusCode::FOUND;

    fn policy(deny: &[&str], redirect: &[&str]) -> PathPolicy {
        let deny: Vec<String> = deny.iter().map(|s| s.to_string()).collect();
        let redirect: Vec<String> = redirect.iter().map(|s| s.to_string()).collect();
        PathPolicy::new(
            compile_patterns("unauthorized_paths", &deny).unwrap(),
            DENY,
            compile_patterns("redirect_paths", &redirect).unwrap(),
            REDIRECT,
        )
    }

    #[test]
    fn test_no_rules_allows_everything() {
        let p = policy(&[], &[]);
        assert_eq!(p.classify("/"), Outcome::Allow);
        assert_eq!(p.classify("/anything/at/all"), Outcome::Allow);
    }

    #[test]
    fn test_no_match_allows() {
        let p = policy(&["^/admin"], &["^/app"]);
        assert_eq!(p.classify("/public"), Outcome::Allow);
        assert_eq!(p.classify("/public").status(), StatusCode::OK);
    }

    #[test]
    fn test_single_set_matches() {
        let p = policy(&["^/admin"], &["^/app"]);
        assert_eq!(p.classify("/admin/users"), Outcome::Deny(DENY));
        assert_eq!(p.classify("/app/home"), Outcome::Redirect(REDIRECT));
    }

    #[test]
    fn test_longest_pattern_wins_across_sets() {
        let p = policy(&["^/test"], &["^/.*"]);
        assert_eq!(p.classify("/test"), Outcome::Deny(DENY));
        assert_eq!(p.classify("/other"), Outcome::Redirect(REDIRECT));

        let p = policy(&["^/.*"], &["^/login"]);
        assert_eq!(p.classify("/login"), Outcome::Redirect(REDIRECT));
        assert_eq!(p.classify("/api"), Outcome::Deny(DENY));
    }

    #[test]
    fn test_longest_pattern_wins_within_set() {
        let p = policy(&["^/", "^/api/private"], &["^/api"]);
        assert_eq!(p.classify("/api/private/x"), Outcome::Deny(DENY));
        assert_eq!(p.classify("/api/public"), Outcome::Redirect(REDIRECT));
    }

    #[test]
    fn test_equal_length_tie_goes_to_deny() {
        let p = policy(&["^/test/?"], &["^/test/+"]);
        assert_eq!(p.classify("/test/"), Outcome::Deny(DENY));
    }

    #[test]
    fn test_non_matching_longer_pattern_is_ignored() {
        let p = policy(&["^/a"], &["^/a/very/long/pattern$"]);
        assert_eq!(p.classify("/a/short"), Outcome::Deny(DENY));
    }

    #[test]
    fn test_patterns_are_unanchored() {
        let p = policy(&["secret"], &[]);
        assert_eq!(p.classify("/files/secret/x"), Outcome::Deny(DENY));
    }

    #[test]
    fn test_path_is_not_normalized() {
        let p = policy(&["^/admin$"], &[]);
        assert_eq!(p.classify("/admin/"), Outcome::Allow);
        assert_eq!(p.classify("//admin"), Outcome::Allow);
    }

    #[test]
    fn test_skipped_paths() {
        let p = policy(&["^/.*$"], &[])
            .with_skipped(compile_patterns("skipped_paths", &["^/health$".to_string()]).unwrap());
        assert!(p.is_skipped("/health"));
        assert!(!p.is_skipped("/healthz"));
        assert!(!policy(&[], &[]).is_skipped("/health"));
    }

    #[test]
    fn test_compile_patterns_reports_index() {
        let err = compile_patterns("redirect_paths", &["^/ok".to_string(), "(".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("redirect_paths[1] is not valid"));
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(Outcome::Allow.status(), StatusCode::OK);
        assert_eq!(Outcome::Deny(DENY).status(), DENY);
        assert_eq!(Outcome::Redirect(REDIRECT).status(), REDIRECT);
        assert!(Outcome::Allow.is_allow());
        assert!(!Outcome::Deny(DENY).is_allow());
    }
}
