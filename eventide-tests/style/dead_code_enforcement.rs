//! Dead Code Enforcement
//!
//! Enforces that production code in the eventide crates does not carry
//! #[allow(dead_code)] attributes. Test code is exempt.

use std::fs;
use std::path::{Path, PathBuf};

/// A dead code allowance found in production code
#[derive(Debug)]
struct DeadCodeViolation {
    file_path: String,
    line_number: usize,
    context: String,
}

/// Checker for dead code allowances in the workspace crates
struct DeadCodeChecker {
    violations: Vec<DeadCodeViolation>,
    files_checked: usize,
}

impl DeadCodeChecker {
    fn new() -> Self {
        Self {
            violations: Vec::new(),
            files_checked: 0,
        }
    }

    /// Workspace root, one level above this crate
    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".."))
    }

    /// Find the Rust sources of every `eventide-*` crate
    fn find_rust_files(&self) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(Self::workspace_root())? {
            let path = entry?.path();
            let is_crate = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with("eventide-"));
            if is_crate && path.is_dir() {
                Self::find_rust_files_recursive(&path, &mut files, 0)?;
            }
        }
        Ok(files)
    }

    fn find_rust_files_recursive(
        dir: &Path,
        files: &mut Vec<PathBuf>,
        depth: usize,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if depth > 10 {
            return Ok(());
        }

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();

            if let Some(name) = path.file_name()
                && (name.to_string_lossy().starts_with('.') || name == "target")
            {
                continue;
            }

            if path.is_dir() {
                Self::find_rust_files_recursive(&path, files, depth + 1)?;
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
        Ok(())
    }

    /// Check if a file path represents test or bench code
    fn is_test_file(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy().replace('\\', "/").to_lowercase();

        path_str.contains("/tests/")
            || path_str.contains("/benches/")
            || path_str.contains("eventide-tests/")
            || path_str.ends_with("tests.rs")
            || path_str.contains("test_")
            || path_str.contains("_test")
    }

    /// Records every dead code allowance in `content`
    fn scan(&mut self, file_path: &str, content: &str) {
        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.starts_with("#[allow(") && trimmed.contains("dead_code") {
                self.violations.push(DeadCodeViolation {
                    file_path: file_path.to_string(),
                    line_number: index + 1,
                    context: line.to_string(),
                });
            }
        }
    }

    fn check_file(&mut self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if self.is_test_file(path) {
            return Ok(());
        }

        let content = fs::read_to_string(path)?;
        self.files_checked += 1;
        self.scan(&path.to_string_lossy(), &content);
        Ok(())
    }

    fn check_workspace(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        for file in self.find_rust_files()? {
            self.check_file(&file)?;
        }
        Ok(())
    }

    /// Report violations and return whether the check passed
    fn report_violations(&self) -> bool {
        if self.violations.is_empty() {
            println!(
                "Dead code enforcement: {} files checked, no violations found",
                self.files_checked
            );
            return true;
        }

        println!("Dead code enforcement violations found:");
        println!();
        for violation in &self.violations {
            println!("{}:{}", violation.file_path, violation.line_number);
            println!("  {}", violation.context.trim());
            println!();
        }
        println!(
            "Found {} violation(s) in {} file(s) checked",
            self.violations.len(),
            self.files_checked
        );
        println!("Remove the unused item or use it; test files are exempt.");

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_test_file() {
        let checker = DeadCodeChecker::new();

        assert!(checker.is_test_file(Path::new("eventide-core/src/simulator/tests.rs")));
        assert!(checker.is_test_file(Path::new("eventide-core/benches/scheduler.rs")));
        assert!(checker.is_test_file(Path::new("eventide-tests/integration/fd_bridge.rs")));

        assert!(!checker.is_test_file(Path::new("eventide-core/src/lib.rs")));
        assert!(!checker.is_test_file(Path::new("eventide-io/src/fd_reader.rs")));
        assert!(!checker.is_test_file(Path::new("eventide-core/src/scheduler/calendar.rs")));
    }

    #[test]
    fn test_dead_code_detection() {
        let mut checker = DeadCodeChecker::new();
        let content = r#"
use std::collections::HashMap;

#[allow(dead_code)]
struct UnusedStruct {
    field: u32,
}

#[allow(clippy::missing_docs, dead_code)]
fn unused_function() {}

// mentions #[allow(dead_code)] in a comment
"#;
        checker.scan("sample.rs", content);

        assert_eq!(checker.violations.len(), 2);
        assert_eq!(checker.violations[0].line_number, 4);
        assert_eq!(checker.violations[1].line_number, 9);
    }

    #[test]
    fn dead_code_enforcement() {
        let mut checker = DeadCodeChecker::new();
        checker
            .check_workspace()
            .expect("Failed to check workspace");

        assert!(checker.files_checked > 0, "no eventide sources found");
        assert!(
            checker.report_violations(),
            "Dead code allowance violations found in production code - see output above"
        );
    }
}
