//! Source hygiene budgets for the library crates.
//!
//! Scans the production sources of `canvas` and `journal` (test modules
//! excluded) for patterns that crash, swallow errors or bypass `tracing`.
//! Every budget is zero. Raising one means fixing an existing hit first.

use std::fs;
use std::path::{Path, PathBuf};

struct Rule {
    pattern: &'static str,
    max: usize,
    hint: &'static str,
}

const RULES: &[Rule] = &[
    Rule { pattern: ".unwrap()", max: 0, hint: "propagate with `?` or handle the None/Err arm" },
    Rule { pattern: ".expect(", max: 0, hint: "propagate with `?` or handle the None/Err arm" },
    Rule { pattern: "panic!(", max: 0, hint: "return an error variant" },
    Rule { pattern: "unreachable!(", max: 0, hint: "make the state unrepresentable" },
    Rule { pattern: "todo!(", max: 0, hint: "finish the stub" },
    Rule { pattern: "unimplemented!(", max: 0, hint: "finish the stub" },
    Rule { pattern: "let _ =", max: 0, hint: "inspect or log the discarded result" },
    Rule { pattern: ".ok()", max: 0, hint: "log the error before dropping it" },
    Rule { pattern: "#[allow(dead_code)]", max: 0, hint: "delete the unused item" },
    Rule { pattern: "println!(", max: 0, hint: "library code logs through tracing" },
    Rule { pattern: "eprintln!(", max: 0, hint: "library code logs through tracing" },
    Rule { pattern: "dbg!(", max: 0, hint: "remove debugging output" },
];

/// Production `.rs` files under the given crate roots, `_test.rs` excluded.
fn source_files() -> Vec<(PathBuf, String)> {
    let mut files = Vec::new();
    for root in [Path::new("src"), Path::new("../journal/src")] {
        collect(root, &mut files);
    }
    assert!(!files.is_empty(), "no sources found; run from the canvas crate root");
    files
}

fn collect(dir: &Path, out: &mut Vec<(PathBuf, String)>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|e| e.path()) {
        if path.is_dir() {
            collect(&path, out);
            continue;
        }
        let is_source = path.extension().is_some_and(|e| e == "rs");
        let is_test = path.to_string_lossy().ends_with("_test.rs");
        if is_source && !is_test {
            if let Ok(content) = fs::read_to_string(&path) {
                out.push((path, content));
            }
        }
    }
}

/// `(file, line number)` of every non-comment line containing `pattern`.
fn hits(files: &[(PathBuf, String)], pattern: &str) -> Vec<(String, usize)> {
    files
        .iter()
        .flat_map(|(path, content)| {
            content
                .lines()
                .enumerate()
                .filter(move |(_, line)| {
                    let code = line.trim_start();
                    !code.starts_with("//") && code.contains(pattern)
                })
                .map(move |(n, _)| (path.display().to_string(), n + 1))
        })
        .collect()
}

#[test]
fn every_budget_holds() {
    let files = source_files();
    let mut report = Vec::new();
    for rule in RULES {
        let found = hits(&files, rule.pattern);
        if found.len() > rule.max {
            let locations: Vec<_> = found.iter().map(|(path, line)| format!("    {path}:{line}")).collect();
            report.push(format!(
                "`{}`: {} found, budget {} ({})\n{}",
                rule.pattern,
                found.len(),
                rule.max,
                rule.hint,
                locations.join("\n")
            ));
        }
    }
    assert!(report.is_empty(), "hygiene budgets exceeded:\n{}", report.join("\n"));
}

#[test]
fn scanner_sees_both_crates() {
    let files = source_files();
    assert!(files.iter().any(|(p, _)| p.ends_with("engine.rs")));
    assert!(files.iter().any(|(p, _)| p.starts_with("../journal/src")));
    assert!(files.iter().all(|(p, _)| !p.to_string_lossy().ends_with("_test.rs")));
}
