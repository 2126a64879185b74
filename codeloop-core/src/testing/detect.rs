//! Deterministic detection of test files, config files, and frameworks
//!
//! Pure file-existence and content scans; the oracle is only consulted
//! for the recommendation text, never for detection itself.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use walkdir::WalkDir;

const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "target",
    ".git",
    "venv",
    "__pycache__",
    "dist",
    "build",
    "vendor",
    "coverage",
];

const CONFIG_FILES: &[&str] = &[
    // Python
    "pytest.ini",
    "setup.cfg",
    "tox.ini",
    "pyproject.toml",
    // JavaScript / TypeScript
    "jest.config.js",
    "jest.config.ts",
    "vitest.config.js",
    "vitest.config.ts",
    "karma.conf.js",
    // Rust
    "Cargo.toml",
    // Java
    "pom.xml",
    "build.gradle",
    // Ruby
    "Rakefile",
    // Go
    "go.mod",
    // PHP
    "phpunit.xml",
];

fn is_skipped(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIP_DIRS.contains(&name))
            .unwrap_or(false)
}

/// Find test files under `dir` by filename heuristics, skipping
/// vendored and cache directories.
pub fn find_test_files(dir: impl AsRef<Path>) -> Vec<PathBuf> {
    let mut found = Vec::new();

    for entry in WalkDir::new(dir.as_ref())
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else { continue };
        let lower = name.to_lowercase();

        let looks_like_test = lower.starts_with("test")
            || lower.ends_with("_test.py")
            || lower.ends_with("_test.go")
            || lower.ends_with("_test.rb")
            || lower.ends_with(".test.js")
            || lower.ends_with(".test.ts")
            || lower.ends_with(".spec.js")
            || lower.ends_with(".spec.ts")
            || lower.ends_with("test.java")
            || lower.ends_with("tests.java");

        if looks_like_test {
            found.push(entry.into_path());
        }
    }

    found.sort();
    found
}

/// Find known test configuration files directly under `dir`.
pub fn find_config_files(dir: impl AsRef<Path>) -> Vec<(String, PathBuf)> {
    CONFIG_FILES
        .iter()
        .filter_map(|name| {
            let path = dir.as_ref().join(name);
            path.exists().then(|| (name.to_string(), path))
        })
        .collect()
}

/// Detect the test framework for a directory: config indicators first,
/// then package.json dev-dependencies, then requirements.txt, then a
/// source-extension fallback.
pub fn detect_framework(dir: impl AsRef<Path>) -> String {
    let dir = dir.as_ref();

    let indicators: &[(&str, &[&str])] = &[
        ("cargo", &["Cargo.toml"]),
        ("pytest", &["pytest.ini", "tox.ini", "setup.cfg"]),
        ("jest", &["jest.config.js", "jest.config.ts"]),
        ("vitest", &["vitest.config.js", "vitest.config.ts"]),
        ("mocha", &[".mocharc.json", ".mocharc.js"]),
        ("junit", &["pom.xml", "build.gradle"]),
        ("rspec", &[".rspec"]),
        ("phpunit", &["phpunit.xml", "phpunit.xml.dist"]),
        ("go", &["go.mod"]),
    ];

    for (framework, files) in indicators {
        if files.iter().any(|f| dir.join(f).exists()) {
            return framework.to_string();
        }
    }

    if let Ok(content) = fs::read_to_string(dir.join("package.json")) {
        if let Ok(json) = serde_json::from_str::<Value>(&content) {
            if let Some(dev_deps) = json.get("devDependencies").and_then(Value::as_object) {
                for candidate in ["jest", "vitest", "mocha"] {
                    if dev_deps.contains_key(candidate) {
                        return candidate.to_string();
                    }
                }
            }
        }
    }

    if let Ok(content) = fs::read_to_string(dir.join("requirements.txt")) {
        if content.contains("pytest") {
            return "pytest".to_string();
        }
        if content.contains("unittest") || content.contains("nose") {
            return "unittest".to_string();
        }
    }

    // Fall back on source file extensions.
    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(Result::ok)
    {
        let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else { continue };
        match ext {
            "py" => return "pytest".to_string(),
            "js" | "ts" => return "jest".to_string(),
            "java" => return "junit".to_string(),
            "go" => return "go".to_string(),
            "rs" => return "cargo".to_string(),
            _ => {}
        }
    }

    "unknown".to_string()
}
