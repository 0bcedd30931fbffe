use crate::path::{file_name, is_git_internal, is_legal_tree_path, is_skippable, join, sanitize};

const SAMPLES: &[&str] = &[
    "",
    ".",
    "..",
    "/",
    "a",
    "../../etc/passwd",
    "./a/./b/../c",
    "dir\\sub\\file.txt",
    "//leading//and//trailing//",
    "my file (1).txt",
    "a%2Fb%2fc",
    "tab\tand\nnewline",
    "naïve/résumé.md",
    "...",
    "a/.../b",
    "a/ ./b",
    "..hidden/.config",
    "\0null",
];

#[test]
fn sanitize_strips_traversal_segments() {
    assert_eq!(sanitize("../../etc/passwd"), "etc/passwd");
    assert_eq!(sanitize("./a/./b/../c"), "a/b/c");
    assert_eq!(sanitize(".."), "");
    assert_eq!(sanitize("."), "");
}

#[test]
fn sanitize_normalizes_separators() {
    assert_eq!(sanitize("dir\\sub\\file.txt"), "dir/sub/file.txt");
    assert_eq!(sanitize("//leading//and//trailing//"), "leading/and/trailing");
    assert_eq!(sanitize("a%2Fb%2fc"), "a_b_c");
}

#[test]
fn sanitize_replaces_disallowed_characters() {
    assert_eq!(sanitize("my file (1).txt"), "my_file__1_.txt");
    assert_eq!(sanitize("tab\tand\nnewline"), "tab_and_newline");
    assert_eq!(sanitize("naïve/résumé.md"), "na_ve/r_sum_.md");
    assert_eq!(sanitize("\0null"), "_null");
}

#[test]
fn sanitize_keeps_dot_names_that_are_not_traversal() {
    assert_eq!(sanitize("..."), "...");
    assert_eq!(sanitize("..hidden/.config"), "..hidden/.config");
}

#[test]
fn sanitize_all_invalid_is_empty() {
    assert_eq!(sanitize("/"), "");
    assert_eq!(sanitize("./../."), "");
    assert!(is_skippable(&sanitize("../..")));
}

#[test]
fn sanitize_output_is_legal_or_empty() {
    for sample in SAMPLES {
        let clean = sanitize(sample);
        assert!(
            clean.is_empty() || is_legal_tree_path(&clean),
            "{sample:?} -> {clean:?}"
        );
        assert!(!clean.starts_with('/') && !clean.ends_with('/'));
        assert!(clean.split('/').all(|s| s != "." && s != ".."));
    }
}

#[test]
fn sanitize_is_idempotent() {
    for sample in SAMPLES {
        let once = sanitize(sample);
        assert_eq!(sanitize(&once), once, "{sample:?}");
    }
}

#[test]
fn join_stays_under_prefix() {
    assert_eq!(join("uploads", "../../etc/passwd"), "uploads/etc/passwd");
    assert_eq!(join("", "a/b"), "a/b");
    assert_eq!(join("up loads/", "/x"), "up_loads/x");
}

#[test]
fn legal_tree_paths() {
    assert!(is_legal_tree_path("a/b.txt"));
    assert!(!is_legal_tree_path(""));
    assert!(!is_legal_tree_path("/a"));
    assert!(!is_legal_tree_path("a/"));
    assert!(!is_legal_tree_path("a//b"));
    assert!(!is_legal_tree_path("a/../b"));
    assert!(!is_legal_tree_path("./a"));
    assert!(!is_legal_tree_path("a\0b"));
}

#[test]
fn git_internal_paths() {
    assert!(is_git_internal(".git/config"));
    assert!(is_git_internal("project/.git/HEAD"));
    assert!(!is_git_internal(".gitignore"));
    assert!(!is_git_internal("src/git/mod.rs"));
}

#[test]
fn file_names() {
    assert_eq!(file_name("a/b/c.txt"), "c.txt");
    assert_eq!(file_name("c.txt"), "c.txt");
}
