/// Parse a unified diff to extract which lines were added in each file.
/// This is used for computing "diff coverage": what share of newly
/// added statements are covered by tests.
///
/// Also provides a [`DiffSource`] trait that abstracts over different
/// ways to obtain a diff (stdin, git, a file, the GitHub API).
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{PrcovError, Result};
use crate::model::DiffAddedLines;

// ---------------------------------------------------------------------------
// Diff sources
// ---------------------------------------------------------------------------

/// A source for obtaining a unified diff.
pub trait DiffSource {
    /// Fetch the diff text.
    fn fetch_diff(&self) -> Result<String>;
}

/// Diff from stdin.
pub struct StdinDiff;

impl DiffSource for StdinDiff {
    fn fetch_diff(&self) -> Result<String> {
        Ok(std::io::read_to_string(std::io::stdin())?)
    }
}

/// Diff from a git command (e.g., `git diff HEAD~1`).
pub struct GitDiff {
    /// Arguments to pass to `git diff`.
    pub args: String,
}

impl DiffSource for GitDiff {
    fn fetch_diff(&self) -> Result<String> {
        let diff_args: Vec<&str> = self.args.split_whitespace().collect();
        let output = Command::new("git").arg("diff").args(&diff_args).output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PrcovError::Configuration(format!("git diff failed: {stderr}")));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| PrcovError::InvalidDiffFormat("git diff output not valid UTF-8".to_string()))
    }
}

/// Diff saved to a file (e.g. `git diff > changes.diff`).
pub struct FileDiff {
    pub path: PathBuf,
}

impl DiffSource for FileDiff {
    fn fetch_diff(&self) -> Result<String> {
        Ok(std::fs::read_to_string(&self.path)?)
    }
}

// ---------------------------------------------------------------------------
// Diff parsing
// ---------------------------------------------------------------------------

/// `@@ -old_start[,old_count] +new_start[,new_count] @@`
static HUNK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@@ -\d+(?:,\d+)? \+(\d+)(?:,(\d+))? @@").unwrap());

/// Prepend a path prefix to all file paths in a diff result.
pub fn apply_path_prefix(diff_lines: DiffAddedLines, prefix: &str) -> DiffAddedLines {
    let prefix = prefix.trim_end_matches('/');
    diff_lines
        .into_iter()
        .map(|(path, lines)| (format!("{prefix}/{path}"), lines))
        .collect()
}

/// Parse a unified diff (e.g., `git diff`) and return a map of
/// file path -> sorted list of added line numbers (in the new file).
///
/// Files without added lines are left out. A hunk that adds lines before
/// any `+++` file header is an [`PrcovError::InvalidDiffFormat`]; a hunk
/// that adds nothing does not need one.
pub fn parse_diff(diff_text: &str) -> Result<DiffAddedLines> {
    let lines: Vec<&str> = diff_text.lines().collect();
    let mut result = DiffAddedLines::new();
    let mut current_file: Option<String> = None;
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        index += 1;

        if let Some(rest) = line.strip_prefix("+++ ") {
            current_file = new_file_path(rest);
            continue;
        }

        let Some((start, length)) = parse_hunk_header(line) else {
            continue;
        };
        let (added, consumed) = read_hunk(&lines[index..], start, length)
            .ok_or_else(|| PrcovError::InvalidDiffFormat(format!("hunk '{line}' runs past the last line number")))?;
        index += consumed;

        if added.is_empty() {
            continue;
        }
        let Some(file) = current_file.as_ref() else {
            return Err(PrcovError::InvalidDiffFormat(format!(
                "hunk '{line}' adds lines before any '+++ b/<path>' header"
            )));
        };
        result.entry(file.clone()).or_default().extend(added);
    }

    for added in result.values_mut() {
        added.sort_unstable();
        added.dedup();
    }
    Ok(result)
}

/// Path of the new file from the text following `+++ `. `None` for a
/// deleted file.
fn new_file_path(rest: &str) -> Option<String> {
    // `diff -u` appends a tab and a timestamp after the name.
    let rest = rest.split('\t').next().unwrap_or(rest);
    if rest == "/dev/null" {
        return None;
    }
    // Strip common VCS prefixes: "b/" (default git), "a/" (some tools).
    // Also handles --no-prefix diffs where no prefix is present.
    let path = rest
        .strip_prefix("b/")
        .or_else(|| rest.strip_prefix("a/"))
        .unwrap_or(rest);
    Some(path.to_string())
}

/// Parse the new-file start line and length from a hunk header like
/// "@@ -10,5 +20,8 @@". The length defaults to 1 when omitted.
fn parse_hunk_header(line: &str) -> Option<(u32, u32)> {
    let caps = HUNK_RE.captures(line)?;
    let start = caps.get(1)?.as_str().parse().ok()?;
    let length = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 1,
    };
    Some((start, length))
}

/// Consume the body of a hunk until `length` new-file lines have been seen.
/// Returns the added line numbers and how many input lines were consumed,
/// or `None` when the hunk numbers lines beyond `u32::MAX`.
fn read_hunk(lines: &[&str], start: u32, length: u32) -> Option<(Vec<u32>, usize)> {
    let mut added = Vec::new();
    // `None` once the previous slot was line `u32::MAX`.
    let mut next_line = Some(start);
    let mut slots = 0;
    let mut consumed = 0;

    for line in lines {
        if slots >= length {
            break;
        }
        if line.starts_with('+') || line.starts_with(' ') {
            let line_number = next_line?;
            if line.starts_with('+') {
                added.push(line_number);
            }
            next_line = line_number.checked_add(1);
            slots += 1;
        } else if line.starts_with('-') || line.starts_with('\\') {
            // Removed line or "\ No newline at end of file": old side only.
        } else {
            break;
        }
        consumed += 1;
    }

    if slots < length {
        debug!(start, length, seen = slots, "hunk ended before its announced length");
    }
    Some((added, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // -- Diff parsing tests -------------------------------------------------

    #[test]
    fn test_parse_hunk_header() {
        assert_eq!(parse_hunk_header("@@ -10,5 +20,8 @@"), Some((20, 8)));
        assert_eq!(parse_hunk_header("@@ -0,0 +1,3 @@"), Some((1, 3)));
        assert_eq!(parse_hunk_header("@@ -5 +5 @@"), Some((5, 1)));
        assert_eq!(parse_hunk_header("@@ -60,0 +61 @@ def compute_files("), Some((61, 1)));
        assert_eq!(parse_hunk_header("@@ garbage @@"), None);
        assert_eq!(parse_hunk_header(" context"), None);
    }

    #[test]
    fn test_parse_diff_single_line_hunk() {
        let diff = "+++ b/codecov/main.py\n@@ -60,0 +61 @@ def compute_files(\n+    line\n";
        let result = parse_diff(diff).unwrap();
        assert_eq!(result.get("codecov/main.py").unwrap(), &[61]);
    }

    #[test]
    fn test_parse_diff_multi_line_hunk() {
        let mut diff = String::from("+++ b/codecov/main.py\n@@ -60,0 +61,9 @@\n");
        for _ in 0..9 {
            diff.push_str("+added\n");
        }
        let result = parse_diff(&diff).unwrap();
        assert_eq!(
            result.get("codecov/main.py").unwrap(),
            &[61, 62, 63, 64, 65, 66, 67, 68, 69]
        );
    }

    #[test]
    fn test_parse_diff_context_and_removed_lines() {
        let diff = "\
diff --git a/sample.py b/sample.py
--- a/sample.py
+++ b/sample.py
@@ -15,6 +15,8 @@ def main():
             print('Processing item:', item)
             result = process_item(item)
-            if result:
-                print('Result:', result)
+                logger.debug('Item processed successfully')
+            else:
+                print('Item processing failed')
";
        let result = parse_diff(diff).unwrap();
        assert_eq!(result.get("sample.py").unwrap(), &[17, 18, 19]);
    }

    #[test]
    fn test_parse_diff_removed_line_between_added_and_context() {
        let diff = "\
--- a/test.py
+++ b/test.py
@@ -5,5 +5,7 @@ def calculate_sum(a, b):
     return a + b
 def test_calculate_sum():
+    assert calculate_sum(2, 3) == 5
-    assert calculate_sum(0, 0) == 0
     assert calculate_sum(-1, 1) == 0
";
        let result = parse_diff(diff).unwrap();
        assert_eq!(result.get("test.py").unwrap(), &[7]);
    }

    #[test]
    fn test_parse_diff_context_only_hunk_needs_no_file() {
        let diff = "\
@@ -5,5 +5,7 @@ def calculate_sum(a, b):
     return a + b
 def test_calculate_sum():
     assert calculate_sum(-1, 1) == 0
";
        let result = parse_diff(diff).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_parse_diff_added_lines_without_file_is_invalid() {
        let diff = "\
diff --git a/test.py b/test.py
--- a/test.py
@@ -5,5 +5,7 @@ def calculate_sum(a, b):
     return a + b
+    assert calculate_sum(2, 3) == 5
";
        let err = parse_diff(diff).unwrap_err();
        assert!(matches!(err, PrcovError::InvalidDiffFormat(_)));
    }

    #[test]
    fn test_parse_diff_hunk_stops_after_length() {
        // The second `+` line lies past the announced hunk length and is
        // not part of the hunk.
        let diff = "+++ b/a.py\n@@ -1,0 +1 @@\n+one\n+two\n";
        let result = parse_diff(diff).unwrap();
        assert_eq!(result.get("a.py").unwrap(), &[1]);
    }

    #[test]
    fn test_parse_diff_added_line_that_looks_like_header() {
        // "++ b/x" added to a file renders as "+++ b/x" inside the hunk.
        let diff = "+++ b/a.py\n@@ -0,0 +1,2 @@\n+++ b/x\n+two\n";
        let result = parse_diff(diff).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.get("a.py").unwrap(), &[1, 2]);
    }

    #[test]
    fn test_parse_diff_new_file() {
        let diff = "\
diff --git a/src/new.py b/src/new.py
new file mode 100644
--- /dev/null
+++ b/src/new.py
@@ -0,0 +1,3 @@
+def f():
+    return 1
+
";
        let result = parse_diff(diff).unwrap();
        assert_eq!(result.get("src/new.py").unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_parse_diff_deleted_file() {
        let diff = "\
diff --git a/src/old.py b/src/old.py
deleted file mode 100644
--- a/src/old.py
+++ /dev/null
@@ -1,2 +0,0 @@
-def f():
-    return 1
";
        let result = parse_diff(diff).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_parse_diff_no_newline_at_eof() {
        let diff = "\
--- a/lib.py
+++ b/lib.py
@@ -1,2 +1,3 @@
 print('hello')
-print('x')
\\ No newline at end of file
+print('world')
+print('x')
\\ No newline at end of file
";
        let result = parse_diff(diff).unwrap();
        // The marker must not shift line numbers.
        assert_eq!(result.get("lib.py").unwrap(), &[2, 3]);
    }

    #[test]
    fn test_parse_diff_multiple_files_and_hunks() {
        let diff = "\
--- a/a.py
+++ b/a.py
@@ -1,2 +1,3 @@
 one
+two
 three
@@ -10,2 +11,3 @@
 ten
+eleven
 twelve
--- a/b.py
+++ b/b.py
@@ -1 +1,2 @@
 first
+second
";
        let result = parse_diff(diff).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.get("a.py").unwrap(), &[2, 12]);
        assert_eq!(result.get("b.py").unwrap(), &[2]);
    }

    #[test]
    fn test_parse_diff_unified_diff_timestamps() {
        let diff = "--- a.py\t2024-01-01 10:00:00\n+++ a.py\t2024-01-02 10:00:00\n@@ -1 +1,2 @@\n x\n+y\n";
        let result = parse_diff(diff).unwrap();
        assert_eq!(result.get("a.py").unwrap(), &[2]);
    }

    #[test]
    fn test_parse_diff_line_numbers_past_u32_max() {
        let diff = "+++ b/a.py\n@@ -1 +4294967295,2 @@\n+x\n+y\n";
        let err = parse_diff(diff).unwrap_err();
        assert!(matches!(err, PrcovError::InvalidDiffFormat(_)), "{err:?}");
    }

    #[test]
    fn test_parse_diff_last_representable_line() {
        let diff = "+++ b/a.py\n@@ -1 +4294967295 @@\n+x\n";
        let result = parse_diff(diff).unwrap();
        assert_eq!(result.get("a.py").unwrap(), &[u32::MAX]);
    }

    #[test]
    fn test_parse_diff_blank_line_ends_hunk_early() {
        // A context line whose single space was stripped ends the hunk, so
        // the `+b` after it is not counted.
        let diff = "+++ b/a.py\n@@ -1,3 +1,4 @@\n a\n\n+b\n c\n";
        let result = parse_diff(diff).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_apply_path_prefix() {
        let mut lines = DiffAddedLines::new();
        lines.insert("app.py".to_string(), vec![1, 2]);
        let prefixed = apply_path_prefix(lines, "project/");
        assert_eq!(prefixed.get("project/app.py").unwrap(), &[1, 2]);
    }

    // -- Properties ---------------------------------------------------------

    proptest! {
        /// 0 = context, 1 = added, 2 = removed.
        #[test]
        fn prop_added_lines_follow_new_file_numbering(
            start in 1u32..500,
            ops in prop::collection::vec(0u8..3, 0..60),
        ) {
            let length = ops.iter().filter(|&&op| op != 2).count() as u32;
            let mut diff = format!("+++ b/f.py\n@@ -1,{} +{start},{length} @@\n", ops.len());
            let mut expected = Vec::new();
            let mut line = start;
            for op in &ops {
                match op {
                    0 => {
                        diff.push_str(" ctx\n");
                        line += 1;
                    }
                    1 => {
                        diff.push_str("+add\n");
                        expected.push(line);
                        line += 1;
                    }
                    _ => diff.push_str("-del\n"),
                }
            }

            let result = parse_diff(&diff).unwrap();
            if expected.is_empty() {
                prop_assert!(result.is_empty());
            } else {
                prop_assert_eq!(result.get("f.py").unwrap(), &expected);
            }
        }
    }
}
