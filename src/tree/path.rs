//! Slash-separated workspace paths. Empty string addresses the tree root;
//! leading, trailing and doubled slashes are tolerated and skipped.

/// Split a path into its non-empty segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Join a parent path and a leaf name, avoiding a leading slash at root.
pub fn join(parent: &str, leaf: &str) -> String {
    let parent = parent.trim_matches('/');
    if parent.is_empty() {
        leaf.to_string()
    } else {
        format!("{parent}/{leaf}")
    }
}

/// Split a path into its parent path and leaf name.
pub fn parent_and_leaf(path: &str) -> (String, String) {
    let trimmed = path.trim_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, leaf)) => (parent.to_string(), leaf.to_string()),
        None => (String::new(), trimmed.to_string()),
    }
}

/// Split a file leaf like `index.js` into `("index", "js")`. A leaf without
/// a dot has an empty extension.
pub fn split_file_name(leaf: &str) -> (String, String) {
    match leaf.rsplit_once('.') {
        Some((name, ext)) if !name.is_empty() => (name.to_string(), ext.to_string()),
        _ => (leaf.to_string(), String::new()),
    }
}

/// True when `path` is `prefix` itself or lies underneath it.
pub fn is_under(path: &str, prefix: &str) -> bool {
    let path = path.trim_matches('/');
    let prefix = prefix.trim_matches('/');
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

/// Rewrite the `old_prefix` portion of `path` to `new_prefix`.
pub fn reroot(path: &str, old_prefix: &str, new_prefix: &str) -> String {
    let trimmed = path.trim_matches('/');
    let old_prefix = old_prefix.trim_matches('/');
    if trimmed == old_prefix {
        new_prefix.to_string()
    } else if let Some(rest) = trimmed.strip_prefix(&format!("{old_prefix}/")) {
        join(new_prefix, rest)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_skip_empty() {
        assert_eq!(segments(""), Vec::<&str>::new());
        assert_eq!(segments("/src//lib"), vec!["src", "lib"]);
    }

    #[test]
    fn test_join_at_root_has_no_leading_slash() {
        assert_eq!(join("", "index.js"), "index.js");
        assert_eq!(join("src", "index.js"), "src/index.js");
        assert_eq!(join("/src/", "index.js"), "src/index.js");
    }

    #[test]
    fn test_parent_and_leaf() {
        assert_eq!(
            parent_and_leaf("src/app/main.rs"),
            ("src/app".to_string(), "main.rs".to_string())
        );
        assert_eq!(
            parent_and_leaf("main.rs"),
            (String::new(), "main.rs".to_string())
        );
    }

    #[test]
    fn test_split_file_name_uses_last_dot() {
        assert_eq!(
            split_file_name("archive.tar.gz"),
            ("archive.tar".to_string(), "gz".to_string())
        );
        assert_eq!(
            split_file_name("Makefile"),
            ("Makefile".to_string(), String::new())
        );
        assert_eq!(
            split_file_name(".env"),
            (".env".to_string(), String::new())
        );
    }

    #[test]
    fn test_reroot_rewrites_prefix_only() {
        assert_eq!(reroot("src/a.js", "src", "lib"), "lib/a.js");
        assert_eq!(reroot("src", "src", "lib"), "lib");
        assert_eq!(reroot("other/a.js", "src", "lib"), "other/a.js");
        assert!(is_under("src/a.js", "src"));
        assert!(!is_under("srcx/a.js", "src"));
    }
}
