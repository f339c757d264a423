#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use prcov::error::Result;
use prcov::github::{Method, Request, Response, Transport, GITHUB_API_URL, JSON_MEDIA_TYPE};
use prcov::model::{BranchPair, Coverage, CoverageInfo, CoverageMetadata, FileCoverage};

/// Annotated source for `codebase/code.py`: executed [1, 2, 3, 14],
/// missing [6, 8, 11], branches on 5, 10 and 13.
pub const CODE: &str = "
# file: codebase/code.py
1 line covered
2 line covered
3 line covered
4
5 branch partial
6 line missing
7
8 line missing
9
10 branch missing
11 line missing
12
13 branch covered
14 line covered
";

/// A second file whose missing lines are split by an executed line.
pub const OTHER: &str = "
# file: codebase/other.py
1
2 line missing
3 branch missing
4 line covered
5 branch partial
6 line missing
7 line missing
8
9 line missing
10 branch missing
11 line covered
12 line covered
13 branch covered
";

/// Build a coverage report from annotated source. Each `# file: <path>`
/// line starts a file; every other non-blank line is the next line of that
/// file and may carry `line covered|missing|excluded` or
/// `branch covered|missing|partial`. A branch on line N is the arc
/// `[N, N + 1]`.
pub fn make_coverage(code: &str) -> Coverage {
    let mut files = BTreeMap::new();
    let mut current: Option<(String, Builder)> = None;

    for line in code.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(path) = line.strip_prefix("# file:") {
            if let Some((path, builder)) = current.take() {
                files.insert(path.clone(), builder.build(path));
            }
            current = Some((path.trim().to_string(), Builder::default()));
            continue;
        }
        let (_, builder) = current.as_mut().expect("annotated code must start with '# file:'");
        builder.push(line);
    }
    if let Some((path, builder)) = current {
        files.insert(path.clone(), builder.build(path));
    }

    let mut totals = CoverageInfo::from_lines(0, 0, 0, 0);
    let (mut covered, mut statements, mut missing, mut excluded) = (0, 0, 0, 0);
    let (mut branches, mut partial, mut covered_branches, mut missing_branches) = (0, 0, 0, 0);
    for file in files.values() {
        covered += file.info.covered_lines;
        statements += file.info.num_statements;
        missing += file.info.missing_lines;
        excluded += file.info.excluded_lines;
        branches += file.info.num_branches.unwrap_or(0);
        partial += file.info.num_partial_branches.unwrap_or(0);
        covered_branches += file.info.covered_branches.unwrap_or(0);
        missing_branches += file.info.missing_branches.unwrap_or(0);
    }
    if !files.is_empty() {
        totals = CoverageInfo::from_lines(covered, statements, missing, excluded);
        totals.num_branches = Some(branches);
        totals.num_partial_branches = Some(partial);
        totals.covered_branches = Some(covered_branches);
        totals.missing_branches = Some(missing_branches);
    }

    Coverage {
        meta: CoverageMetadata {
            version: "1.2.3".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2000, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap(),
            branch_coverage: true,
            show_contexts: false,
        },
        info: totals,
        files,
    }
}

#[derive(Default)]
struct Builder {
    line_number: u32,
    statements: u32,
    executed: Vec<u32>,
    missing: Vec<u32>,
    excluded: Vec<u32>,
    executed_branches: Vec<BranchPair>,
    missing_branches: Vec<BranchPair>,
    partial_branches: u32,
    covered_branches: u32,
    missed_branches: u32,
}

impl Builder {
    fn push(&mut self, line: &str) {
        self.line_number += 1;
        let n = self.line_number;

        if ["line ", "branch "].iter().any(|m| line.contains(m)) {
            self.statements += 1;
        }
        if line.contains("line covered") {
            self.executed.push(n);
        } else if line.contains("line missing") {
            self.missing.push(n);
        } else if line.contains("line excluded") {
            self.excluded.push(n);
        }

        if line.contains("branch ") {
            self.executed_branches.push(BranchPair::lines(n, n + 1));
            if line.contains("branch partial") {
                self.missing_branches.push(BranchPair::lines(n, n + 1));
                self.partial_branches += 1;
            } else if line.contains("branch missing") {
                self.missing_branches.push(BranchPair::lines(n, n + 1));
                self.missed_branches += 1;
            } else if line.contains("branch covered") {
                self.covered_branches += 1;
            }
        }
    }

    fn build(self, path: String) -> FileCoverage {
        let mut info = CoverageInfo::from_lines(
            self.executed.len() as u32,
            self.statements,
            self.missing.len() as u32,
            self.excluded.len() as u32,
        );
        info.num_branches = Some(self.executed_branches.len() as u32);
        info.num_partial_branches = Some(self.partial_branches);
        info.covered_branches = Some(self.covered_branches);
        info.missing_branches = Some(self.missed_branches);

        FileCoverage {
            path,
            executed_lines: self.executed,
            missing_lines: self.missing,
            excluded_lines: self.excluded,
            executed_branches: Some(self.executed_branches),
            missing_branches: Some(self.missing_branches),
            info,
        }
    }
}

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// In-memory GitHub API. Routes are matched on method, URL (relative to the
/// API root) and Accept header; anything unregistered answers 404.
#[derive(Default)]
pub struct FakeTransport {
    routes: HashMap<(Method, String, &'static str), Response>,
    requests: RefCell<Vec<Request>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, method: Method, path: &str, status: u16, body: impl Into<String>) -> Self {
        self.on_accept(method, path, JSON_MEDIA_TYPE, status, body)
    }

    pub fn on_accept(
        mut self,
        method: Method,
        path: &str,
        accept: &'static str,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        self.routes.insert(
            (method, path.to_string(), accept),
            Response {
                status,
                body: body.into(),
            },
        );
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }

    /// Requests sent with the given method, as paths relative to the API root.
    pub fn paths(&self, method: Method) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method)
            .map(|r| r.url.trim_start_matches(GITHUB_API_URL).to_string())
            .collect()
    }
}

impl Transport for FakeTransport {
    fn send(&self, request: &Request) -> Result<Response> {
        self.requests.borrow_mut().push(request.clone());
        let path = request.url.trim_start_matches(GITHUB_API_URL).to_string();
        Ok(self
            .routes
            .get(&(request.method, path, request.accept))
            .cloned()
            .unwrap_or(Response {
                status: 404,
                body: r#"{"message": "Not Found"}"#.to_string(),
            }))
    }
}
