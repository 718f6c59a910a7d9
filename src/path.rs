//! Canonical name handling for tar members (C1).
//!
//! Every name-based comparison in the squash engine goes through
//! [`normalise`] first: tar entries themselves keep their original
//! name when written back out, but all skip-table lookups, opaque-dir
//! checks, and "already emitted" checks compare normalised forms.

/// Strip a leading `./`, a leading `/`, and a trailing `/` from a tar
/// member name, yielding the canonical form used for equality and
/// prefix comparisons throughout the squash engine.
pub fn normalise(name: &str) -> String {
    let mut s = name;
    if let Some(rest) = s.strip_prefix("./") {
        s = rest;
    }
    s = s.trim_start_matches('/');
    s = s.trim_end_matches('/');
    s.to_string()
}

/// The directory component of a normalised name, or `""` at the root.
pub fn dirname(name: &str) -> String {
    match normalise(name).rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    }
}

/// True if `name` is `prefix` itself or a path beneath it. An empty
/// `prefix` never matches: it denotes "no directory" (e.g. a root-level
/// opaque marker, whose `dirname` is `""`), not the tree root, so it
/// must not be treated as a wildcard that masks every entry.
pub fn is_under(name: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return false;
    }
    name == prefix || name.starts_with(&format!("{prefix}/"))
}

/// True if `name` falls under any of `prefixes` (used for opaque-dir masking).
pub fn is_under_any(name: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| is_under(name, p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_dot_slash() {
        assert_eq!(normalise("./foo/bar"), "foo/bar");
    }

    #[test]
    fn strips_leading_slash() {
        assert_eq!(normalise("/foo/bar"), "foo/bar");
    }

    #[test]
    fn strips_trailing_slash() {
        assert_eq!(normalise("foo/bar/"), "foo/bar");
    }

    #[test]
    fn leaves_already_canonical_names_alone() {
        assert_eq!(normalise("foo/bar"), "foo/bar");
    }

    #[test]
    fn dirname_of_nested_path() {
        assert_eq!(dirname("a/b/c"), "a/b");
    }

    #[test]
    fn dirname_of_root_entry() {
        assert_eq!(dirname("a"), "");
    }

    #[test]
    fn is_under_matches_exact_and_descendants() {
        assert!(is_under("d", "d"));
        assert!(is_under("d/a", "d"));
        assert!(!is_under("dd/a", "d"));
    }

    #[test]
    fn is_under_never_matches_an_empty_prefix() {
        assert!(!is_under("anything", ""));
        assert!(!is_under("", ""));
    }
}
