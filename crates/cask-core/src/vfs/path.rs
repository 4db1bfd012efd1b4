use std::cmp::Ordering;

fn depth(path: &str) -> usize {
    path.bytes().filter(|&b| b == b'/').count()
}

/// Order paths by depth first, then bytewise.
///
/// Under this order the children of a directory form one contiguous run
/// starting at `dir + "/"`, and every directory sorts before anything
/// below it.
#[allow(clippy::ptr_arg)]
pub fn path_cmp(a: &String, b: &String) -> Ordering {
    depth(a).cmp(&depth(b)).then_with(|| a.as_bytes().cmp(b.as_bytes()))
}

/// Normalize to an absolute path without `.`/`..` components, repeated
/// slashes or a trailing slash. `..` at the root stays at the root.
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for part in parts {
        out.push('/');
        out.push_str(part);
    }
    out
}

/// Parent of a clean path; the root is its own parent.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Final component of a clean path; `/` for the root.
pub fn base_name(path: &str) -> &str {
    if path == "/" {
        return "/";
    }
    path.rsplit('/').next().unwrap_or(path)
}

pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Key prefix shared by the immediate children of `dir`.
pub fn child_prefix(dir: &str) -> String {
    if dir == "/" {
        "/".to_string()
    } else {
        format!("{dir}/")
    }
}

/// Whether `path` is `ancestor` itself or lies below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    ancestor == "/" || path == ancestor || path.starts_with(&child_prefix(ancestor))
}

/// Number of components: 0 for `/`, 1 for `/a`.
pub fn component_count(path: &str) -> usize {
    if path == "/" {
        0
    } else {
        depth(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> String {
        v.to_string()
    }

    #[test]
    fn clean_path_normalizes() {
        assert_eq!(clean_path(""), "/");
        assert_eq!(clean_path("/"), "/");
        assert_eq!(clean_path("a/b"), "/a/b");
        assert_eq!(clean_path("/a//b/"), "/a/b");
        assert_eq!(clean_path("/a/./b/../c"), "/a/c");
        assert_eq!(clean_path("/../.."), "/");
    }

    #[test]
    fn parent_and_name() {
        assert_eq!(parent_path("/"), "/");
        assert_eq!(parent_path("/a"), "/");
        assert_eq!(parent_path("/a/b"), "/a");
        assert_eq!(base_name("/"), "/");
        assert_eq!(base_name("/a/b"), "b");
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
    }

    #[test]
    fn directory_precedes_descendants() {
        let mut paths = vec![s("/b/c/d"), s("/a/z"), s("/b"), s("/"), s("/a"), s("/b/c"), s("/ab")];
        paths.sort_by(path_cmp);
        assert_eq!(paths, vec![s("/"), s("/a"), s("/ab"), s("/b"), s("/a/z"), s("/b/c"), s("/b/c/d")]);
        for (i, p) in paths.iter().enumerate() {
            for q in &paths[..i] {
                assert_ne!(path_cmp(q, p), Ordering::Greater);
            }
        }
    }

    #[test]
    fn children_are_contiguous() {
        let mut paths = vec![s("/a/x"), s("/a/y/z"), s("/ab/x"), s("/a/y"), s("/a/b")];
        paths.sort_by(path_cmp);
        let start = paths.iter().position(|p| p.starts_with("/a/")).unwrap();
        let run: Vec<&String> = paths[start..]
            .iter()
            .take_while(|p| p.starts_with("/a/") && component_count(p) == 2)
            .collect();
        assert_eq!(run, vec!["/a/b", "/a/x", "/a/y"]);
    }

    #[test]
    fn within() {
        assert!(is_within("/a/b", "/a"));
        assert!(is_within("/a", "/a"));
        assert!(!is_within("/ab", "/a"));
        assert!(is_within("/anything", "/"));
    }
}
