use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const THIS_FILE: &str = "no_ignored_tests.rs";

fn ignore_attribute() -> Regex {
    // Plain `#[ignore]`, `#[ignore = "..."]` and `#[cfg_attr(..., ignore)]`.
    Regex::new(r"^\s*#\[\s*(ignore\b|cfg_attr\(.*\bignore\b)").unwrap()
}

fn rust_sources(dir: &str) -> Vec<PathBuf> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join(dir);
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "rs"))
        .filter(|path| !path.ends_with(THIS_FILE))
        .collect()
}

fn location(path: &Path, line: usize) -> String {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    format!("{}:{line}", path.strip_prefix(root).unwrap_or(path).display())
}

/// Lines carrying an ignore attribute, and whether each sits below a
/// `#[cfg(test)]` marker in the same file.
fn ignored_lines(path: &Path, pattern: &Regex) -> Vec<(usize, bool)> {
    let Ok(contents) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut in_test_module = false;
    let mut found = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim_start().starts_with("#[cfg(test)]") {
            in_test_module = true;
        }
        if pattern.is_match(line) {
            found.push((idx + 1, in_test_module));
        }
    }
    found
}

#[test]
fn unit_test_modules_have_no_ignored_tests() {
    let pattern = ignore_attribute();
    let mut violations = Vec::new();
    for path in rust_sources("src") {
        for (line, in_test_module) in ignored_lines(&path, &pattern) {
            let scope = if in_test_module {
                "unit test"
            } else {
                "outside any #[cfg(test)] module"
            };
            violations.push(format!("{} ({scope})", location(&path, line)));
        }
    }

    assert!(
        violations.is_empty(),
        "Unit tests must run on every `cargo test`; fix or delete instead of ignoring:\n{}",
        violations.join("\n")
    );
}

#[test]
fn integration_tests_have_no_ignored_tests() {
    let pattern = ignore_attribute();
    let violations: Vec<_> = rust_sources("tests")
        .iter()
        .flat_map(|path| {
            ignored_lines(path, &pattern)
                .into_iter()
                .map(move |(line, _)| location(path, line))
        })
        .collect();

    assert!(
        violations.is_empty(),
        "Integration tests drive fake supervisors and temp databases, so none \
         needs to be skipped; found #[ignore] at:\n{}",
        violations.join("\n")
    );
}

#[test]
fn ignore_pattern_catches_every_spelling() {
    let pattern = ignore_attribute();
    for line in [
        "#[ignore]",
        "    #[ignore = \"slow\"]",
        "#[cfg_attr(windows, ignore)]",
    ] {
        assert!(pattern.is_match(line), "{line}");
    }
    for line in ["// ignored when empty", "let ignore = true;", "#[test]"] {
        assert!(!pattern.is_match(line), "{line}");
    }
}
