//! Path patterns (C2): pure predicates for filtering paths against
//! allow/deny wildcard or regex lists, as consulted by the dispatcher (C12)
//! through the pattern-matching handlers (C13).
//!
//! Grounded on `watchdog.utils.dirsnapshot`'s glob conventions and
//! `watchdog.events.{PatternMatchingEventHandler, RegexMatchingEventHandler}`;
//! implemented with `globset`/`regex`, the idiomatic crates for this in the
//! Rust ecosystem (as opposed to hand-rolling glob matching).

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::RegexSet;

use crate::error::{Error, ErrorKind, Result};

/// Returns `true` iff `path` matches at least one glob in `allow` and no
/// glob in `deny`.
///
/// `allow` defaults to "match everything" when empty, matching watchdog's
/// `PatternMatchingEventHandler` semantics. Passing allow/deny sets built
/// with inconsistent case-sensitivity is not representable here since
/// case-sensitivity is baked in at [`GlobPatterns::new`] time; both sets
/// share one setting.
pub fn matches(path: &Path, allow: &GlobPatterns, deny: &GlobPatterns) -> bool {
    (allow.is_empty() || allow.is_match(path)) && !deny.is_match(path)
}

/// Filters `paths`, keeping only those that [`matches`] against `allow`/`deny`.
pub fn filter<'a>(
    paths: impl IntoIterator<Item = &'a Path>,
    allow: &GlobPatterns,
    deny: &GlobPatterns,
) -> Vec<&'a Path> {
    paths
        .into_iter()
        .filter(|p| matches(p, allow, deny))
        .collect()
}

/// A compiled, case-sensitivity-aware set of glob patterns.
#[derive(Debug, Clone)]
pub struct GlobPatterns {
    set: GlobSet,
    empty: bool,
}

impl GlobPatterns {
    /// Compiles `patterns` into a matchable set.
    ///
    /// Returns [`ErrorKind::InvalidPattern`] if any pattern fails to parse.
    pub fn new(patterns: &[String], case_sensitive: bool) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for p in patterns {
            let glob = GlobBuilder::new(p)
                .case_insensitive(!case_sensitive)
                .build()
                .map_err(|e| Error::new(ErrorKind::InvalidPattern(e.to_string())))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| Error::new(ErrorKind::InvalidPattern(e.to_string())))?;
        Ok(GlobPatterns {
            set,
            empty: patterns.is_empty(),
        })
    }

    /// An empty pattern set, matching nothing (used as an empty `deny` list).
    pub fn none() -> Self {
        GlobPatterns {
            set: GlobSetBuilder::new().build().expect("empty globset builds"),
            empty: true,
        }
    }

    fn is_empty(&self) -> bool {
        self.empty
    }

    fn is_match(&self, path: &Path) -> bool {
        self.set.is_match(path)
    }
}

/// Returns `true` iff `path`'s string form matches at least one regex in
/// `allow` and none in `deny`, mirroring [`matches`] but with compiled
/// regular expressions (watchdog's `RegexMatchingEventHandler`).
pub fn matches_regex(path: &Path, allow: &RegexPatterns, deny: &RegexPatterns) -> bool {
    let text = path.to_string_lossy();
    (allow.is_empty() || allow.is_match(&text)) && !deny.is_match(&text)
}

/// A compiled set of regular expressions.
#[derive(Debug, Clone)]
pub struct RegexPatterns {
    set: RegexSet,
    empty: bool,
}

impl RegexPatterns {
    /// Compiles `patterns` into a matchable set.
    pub fn new(patterns: &[String], case_sensitive: bool) -> Result<Self> {
        let prefixed: Vec<String> = patterns
            .iter()
            .map(|p| {
                if case_sensitive {
                    p.clone()
                } else {
                    format!("(?i){}", p)
                }
            })
            .collect();
        let set = RegexSet::new(&prefixed)
            .map_err(|e| Error::new(ErrorKind::InvalidPattern(e.to_string())))?;
        Ok(RegexPatterns {
            set,
            empty: patterns.is_empty(),
        })
    }

    /// An empty pattern set, matching nothing.
    pub fn none() -> Self {
        RegexPatterns {
            set: RegexSet::new::<_, &str>([]).expect("empty regexset builds"),
            empty: true,
        }
    }

    fn is_empty(&self) -> bool {
        self.empty
    }

    fn is_match(&self, text: &str) -> bool {
        self.set.is_match(text)
    }
}

/// Validates that two pattern-source lists are being compiled with the same
/// case-sensitivity setting, per spec.md §4.2: "passing inconsistent
/// case-sensitivity settings yields a validation failure, not a silent
/// boolean." Callers that build one [`GlobPatterns`]/[`RegexPatterns`] pair
/// for allow and one for deny should route both through this check before
/// compiling.
pub fn validate_case_sensitivity(allow_cs: bool, deny_cs: bool) -> Result<()> {
    if allow_cs != deny_cs {
        return Err(Error::new(ErrorKind::InvalidConfig(
            "allow and deny pattern lists must share one case-sensitivity setting".into(),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn globs(pats: &[&str]) -> GlobPatterns {
        let owned: Vec<String> = pats.iter().map(|s| s.to_string()).collect();
        GlobPatterns::new(&owned, true).unwrap()
    }

    #[test]
    fn allow_empty_matches_everything_unless_denied() {
        let allow = GlobPatterns::none();
        let deny = globs(&["*.tmp"]);
        assert!(matches(&PathBuf::from("a.rs"), &allow, &deny));
        assert!(!matches(&PathBuf::from("a.tmp"), &allow, &deny));
    }

    #[test]
    fn allow_list_restricts_matches() {
        let allow = globs(&["*.rs"]);
        let deny = GlobPatterns::none();
        assert!(matches(&PathBuf::from("a.rs"), &allow, &deny));
        assert!(!matches(&PathBuf::from("a.py"), &allow, &deny));
    }

    #[test]
    fn inconsistent_case_sensitivity_is_rejected() {
        assert!(validate_case_sensitivity(true, false).is_err());
        assert!(validate_case_sensitivity(true, true).is_ok());
    }

    #[test]
    fn case_insensitive_glob_matches_differing_case() {
        let allow = GlobPatterns::new(&["*.TXT".to_string()], false).unwrap();
        let deny = GlobPatterns::none();
        assert!(matches(&PathBuf::from("foo.txt"), &allow, &deny));
        assert!(matches(&PathBuf::from("foo.TXT"), &allow, &deny));
    }

    #[test]
    fn regex_variant_matches_same_way() {
        let allow = RegexPatterns::new(&[r"\.rs$".to_string()], true).unwrap();
        let deny = RegexPatterns::none();
        assert!(matches_regex(&PathBuf::from("a.rs"), &allow, &deny));
        assert!(!matches_regex(&PathBuf::from("a.py"), &allow, &deny));
    }
}
