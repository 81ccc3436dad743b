//! Directory-style path algebra.
//!
//! All functions are purely lexical (no store access) and every path they
//! return is canonical: `.`/`..` resolved, no empty segments, and always
//! ending with the separator. Absolute paths start with the separator;
//! the canonical empty relative path is `./`.
//!
//! ```rust
//! use structkv_core_store::path;
//!
//! assert_eq!(path::clean("/a/./b/../c"), "/a/c/");
//! assert_eq!(path::join(&["/a", "b/", "c"]), "/a/b/c/");
//! assert_eq!(path::depth("/a/b/"), 2);
//! assert_eq!(path::parent_d("/a/b/c/", 1), "/a/");
//! assert_eq!(path::common_parent("/a/b/x/", "/a/b/y/"), "/a/b/");
//! ```

/// The path separator.
pub const SEPARATOR: char = '/';

/// Canonical root path.
pub const ROOT: &str = "/";

const CURRENT: &str = "./";

/// Resolve `.` and `..` segments lexically.
///
/// `..` above the root of an absolute path clamps to the root; on a relative
/// path excess `..` segments are kept as a leading run.
pub fn clean(p: &str) -> String {
    let rooted = is_abs(p);
    let mut out: Vec<&str> = Vec::new();
    for segment in p.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                if out.last().is_some_and(|s| *s != "..") {
                    out.pop();
                } else if !rooted {
                    out.push("..");
                }
            }
            s => out.push(s),
        }
    }

    match (rooted, out.is_empty()) {
        (true, true) => ROOT.to_string(),
        (true, false) => format!("/{}/", out.join("/")),
        (false, true) => CURRENT.to_string(),
        (false, false) => format!("{}/", out.join("/")),
    }
}

/// Force a leading separator, then [`clean`].
pub fn abs(p: &str) -> String {
    if is_abs(p) {
        clean(p)
    } else {
        clean(&format!("/{}", p))
    }
}

/// The non-empty segments of `p`, without any cleaning.
pub fn branches(p: &str) -> Vec<&str> {
    p.split(SEPARATOR).filter(|s| !s.is_empty()).collect()
}

/// Lexically join `elems` (skipping empty ones) and [`clean`] the result.
pub fn join<S: AsRef<str>>(elems: &[S]) -> String {
    let joined = elems
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    clean(&joined)
}

pub fn is_abs(p: &str) -> bool {
    p.starts_with(SEPARATOR)
}

pub fn is_root(p: &str) -> bool {
    clean(p) == ROOT
}

/// Segments of an already-clean path; the canonical empty path has none.
fn segments(cleaned: &str) -> Vec<&str> {
    if cleaned == CURRENT {
        Vec::new()
    } else {
        branches(cleaned)
    }
}

/// Number of segments in the cleaned path. The root has depth 0.
pub fn depth(p: &str) -> usize {
    segments(&clean(p)).len()
}

/// The ancestor of `p` made of its first `d` segments.
///
/// Returns the cleaned `p` itself when `d >= depth(p)`.
pub fn parent_d(p: &str, d: usize) -> String {
    let cleaned = clean(p);
    let segs = segments(&cleaned);
    if d >= segs.len() {
        return cleaned;
    }
    let parent = join(&segs[..d]);
    if is_abs(&cleaned) {
        abs(&parent)
    } else {
        parent
    }
}

/// The trailing `d` segments of `p`, as a bare relative path.
///
/// Returns every segment when `d >= depth(p)`.
pub fn sub_d(p: &str, d: usize) -> String {
    let cleaned = clean(p);
    let segs = segments(&cleaned);
    let start = segs.len().saturating_sub(d);
    join(&segs[start..])
}

/// The last segment of `p`, if it has one.
pub fn base(p: &str) -> Option<&str> {
    branches(p).pop()
}

/// Longest common ancestor of two paths.
///
/// Comparing an absolute path with a relative one is undefined and yields
/// the empty string.
pub fn common_parent(p1: &str, p2: &str) -> String {
    let c1 = clean(p1);
    let c2 = clean(p2);
    if is_abs(&c1) != is_abs(&c2) {
        return String::new();
    }

    let common: Vec<&str> = segments(&c1)
        .into_iter()
        .zip(segments(&c2))
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a)
        .collect();

    let parent = join(&common);
    if is_abs(&c1) {
        abs(&parent)
    } else {
        parent
    }
}

/// Whether `ancestor` is `p` itself or one of its ancestors.
///
/// Both arguments must already be clean.
pub fn is_ancestor(ancestor: &str, p: &str) -> bool {
    p.starts_with(ancestor)
}
