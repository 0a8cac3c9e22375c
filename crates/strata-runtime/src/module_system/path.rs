// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bundle path helpers.
//!
//! Module paths are bundle-relative, always `/`-separated, and never touch
//! the file system.

/// Whether a request is written as a path rather than an id or alias
pub fn is_relative_request(request: &str) -> bool {
    request.starts_with("./") || request.starts_with("../") || request == "." || request == ".."
}

/// Whether a request is rooted at the bundle root
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Directory part of a path
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Join `request` onto the directory of `from_path` and normalize
pub fn join(dir: &str, request: &str) -> String {
    if is_absolute(request) {
        return normalize(request);
    }
    if dir.is_empty() {
        normalize(request)
    } else {
        normalize(&format!("{}/{}", dir, request))
    }
}

/// Collapse `.`/`..` segments and duplicate separators.
///
/// Leading `..` segments that would escape the bundle root are dropped, and
/// the result never starts with `./`.
pub fn normalize(path: &str) -> String {
    let absolute = is_absolute(path);
    let mut components: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                components.pop();
            }
            c => components.push(c),
        }
    }

    let joined = components.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Normalized, root-relative form used as the path index key
pub fn canonical(path: &str) -> String {
    normalize(path).trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical() {
        assert_eq!(canonical("/src/./a.js"), "src/a.js");
        assert_eq!(canonical("./b.js"), "b.js");
    }

    #[test]
    fn test_dirname() {
        assert_eq!(dirname("src/app/main.js"), "src/app");
        assert_eq!(dirname("/main.js"), "/");
        assert_eq!(dirname("main.js"), "");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("./src//app/../utils/x.js"), "src/utils/x.js");
        assert_eq!(normalize("/a/./b/../c"), "/a/c");
        assert_eq!(normalize("../../escape.js"), "escape.js");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("src/app", "./button.js"), "src/app/button.js");
        assert_eq!(join("src/app", "../lib"), "src/lib");
        assert_eq!(join("", "./subfolder"), "subfolder");
        assert_eq!(join("src/app", "/root.js"), "/root.js");
    }

    #[test]
    fn test_is_relative_request() {
        assert!(is_relative_request("./x"));
        assert!(is_relative_request("../x"));
        assert!(!is_relative_request("lodash"));
        assert!(!is_relative_request("@components/Button"));
    }
}
