//! GitHub API helpers: find the pull request, fetch its diff, post the
//! coverage comment and push annotations to a data branch.
//!
//! HTTP goes through the [`Transport`] trait so the client can be driven by
//! an in-memory fake in tests; [`UreqTransport`] is the real one.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::annotation::{annotations_file_name, Annotation};
use crate::diff::DiffSource;
use crate::error::{PrcovError, Result};

pub const GITHUB_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
pub const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
pub const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";

/// Identity used when the token cannot read its own user (Actions token).
pub const BOT_LOGIN: &str = "CI-codecov[bot]";
pub const COMMIT_MESSAGE: &str = "Update annotations data";
/// GitHub refuses comments longer than this.
pub const MAX_COMMENT_LENGTH: usize = 65536;
const PER_PAGE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Put => "PUT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub accept: &'static str,
    pub body: Option<serde_json::Value>,
}

impl Request {
    fn new(method: Method, url: String) -> Self {
        Self {
            method,
            url,
            accept: JSON_MEDIA_TYPE,
            body: None,
        }
    }

    fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

/// Sends one HTTP request. Error statuses are returned as responses, only
/// transport failures are errors.
pub trait Transport {
    fn send(&self, request: &Request) -> Result<Response>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &Request) -> Result<Response> {
        (**self).send(request)
    }
}

/// Blocking HTTP transport authenticated with a token.
pub struct UreqTransport {
    agent: ureq::Agent,
    token: String,
}

impl UreqTransport {
    pub fn new(token: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .build();
        Self {
            agent,
            token: token.into(),
        }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &Request) -> Result<Response> {
        let call = self
            .agent
            .request(request.method.as_str(), &request.url)
            .set("Authorization", &format!("token {}", self.token))
            .set("Accept", request.accept)
            .set("User-Agent", "prcov")
            .set("X-GitHub-Api-Version", API_VERSION);

        let result = match &request.body {
            Some(body) => call.send_json(body),
            None => call.call(),
        };

        match result {
            Ok(resp) => {
                let status = resp.status();
                Ok(Response {
                    status,
                    body: resp.into_string()?,
                })
            }
            Err(ureq::Error::Status(status, resp)) => Ok(Response {
                status,
                body: resp.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(e)) => Err(PrcovError::Http(e.to_string())),
        }
    }
}

/// Committer identity for the annotations branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub email: String,
    pub login: String,
}

#[derive(Deserialize)]
struct ApiUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct PullRequest {
    number: u64,
    state: String,
    head: PullRequestHead,
}

#[derive(Deserialize)]
struct PullRequestHead {
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Deserialize)]
struct Comment {
    id: u64,
    body: Option<String>,
    user: Option<CommentAuthor>,
}

#[derive(Deserialize)]
struct CommentAuthor {
    login: String,
}

#[derive(Deserialize)]
struct Branch {
    protected: bool,
}

#[derive(Deserialize)]
struct ContentFile {
    sha: String,
}

/// Client for one repository.
pub struct GitHubClient<T: Transport> {
    transport: T,
    api_url: String,
    repository: String,
}

impl<T: Transport> GitHubClient<T> {
    pub fn new(transport: T, repository: impl Into<String>) -> Self {
        Self {
            transport,
            api_url: GITHUB_API_URL.to_string(),
            repository: repository.into(),
        }
    }

    /// Point the client at another API root (GitHub Enterprise).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}{path}", self.api_url, self.repository)
    }

    fn send(&self, request: Request) -> Result<String> {
        debug!(method = request.method.as_str(), url = %request.url, "GitHub request");
        let response = self.transport.send(&request)?;
        if response.status >= 400 {
            debug!(status = response.status, "GitHub error response");
            return Err(PrcovError::from_status(response.status, response.body));
        }
        Ok(response.body)
    }

    fn get_json<D: DeserializeOwned>(&self, url: String) -> Result<D> {
        let body = self.send(Request::new(Method::Get, url))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Who the token belongs to. An Actions token cannot read its own user,
    /// so a 403 yields the bot identity.
    pub fn get_my_login(&self) -> Result<User> {
        match self.get_json::<ApiUser>(self.url("/user")) {
            Ok(user) => Ok(User {
                name: user.name.unwrap_or_else(|| user.login.clone()),
                email: user
                    .email
                    .unwrap_or_else(|| format!("{}+{}@users.noreply.github.com", user.id, user.login)),
                login: user.login,
            }),
            Err(PrcovError::Forbidden) => Ok(User {
                name: BOT_LOGIN.to_string(),
                email: String::new(),
                login: BOT_LOGIN.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Resolve the pull request to report on: the given number if it is an
    /// open PR, otherwise the open PR whose head branch is `branch`.
    pub fn get_pr_number(&self, pr_number: Option<u64>, branch: Option<&str>) -> Result<u64> {
        if let Some(number) = pr_number {
            match self.get_json::<PullRequest>(self.repo_url(&format!("/pulls/{number}"))) {
                Ok(pr) if pr.state == "open" => return Ok(pr.number),
                Ok(_) | Err(PrcovError::NotFound) => {
                    warn!("Pull request #{number} does not exist or is not open");
                }
                Err(PrcovError::Forbidden) => {
                    return Err(PrcovError::CannotGetPullRequest(format!(
                        "access to pull request #{number} is forbidden"
                    )))
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(branch) = branch {
            let url = self.repo_url(&format!("/pulls?state=open&sort=updated&per_page={PER_PAGE}"));
            let pulls: Vec<PullRequest> = self.get_json(url).map_err(|e| match e {
                PrcovError::Forbidden | PrcovError::NotFound => {
                    PrcovError::CannotGetPullRequest(format!("cannot list pull requests: {e}"))
                }
                other => other,
            })?;
            if let Some(pr) = pulls.iter().find(|pr| pr.head.git_ref == branch) {
                return Ok(pr.number);
            }
            error!("Checked the {PER_PAGE} most recently updated PRs, no open pull request found for branch {branch}");
            return Err(PrcovError::CannotGetPullRequest(format!(
                "no open pull request found for branch {branch}"
            )));
        }

        Err(PrcovError::CannotGetPullRequest(
            "this workflow is neither triggered on a pull_request event nor on a push to a branch".to_string(),
        ))
    }

    /// Unified diff of a pull request.
    pub fn get_pr_diff(&self, pr_number: u64) -> Result<String> {
        let mut request = Request::new(Method::Get, self.repo_url(&format!("/pulls/{pr_number}")));
        request.accept = DIFF_MEDIA_TYPE;
        self.send(request).map_err(|e| match e {
            PrcovError::Forbidden | PrcovError::NotFound => {
                PrcovError::CannotGetPullRequest(format!("cannot fetch the diff of #{pr_number}: {e}"))
            }
            other => other,
        })
    }

    fn find_comment(&self, user: &User, pr_number: u64, marker: &str) -> Result<Option<u64>> {
        let mut page = 1u32;
        loop {
            let url = self.repo_url(&format!(
                "/issues/{pr_number}/comments?per_page={PER_PAGE}&page={page}"
            ));
            let comments: Vec<Comment> = self.get_json(url)?;
            let found = comments.iter().find(|c| {
                c.user.as_ref().is_some_and(|u| u.login == user.login)
                    && c.body.as_deref().is_some_and(|body| body.contains(marker))
            });
            if let Some(comment) = found {
                return Ok(Some(comment.id));
            }
            if comments.len() < PER_PAGE {
                return Ok(None);
            }
            page += 1;
        }
    }

    /// Create or update our comment on the pull request. The comment is
    /// recognized by its author and the hidden marker.
    pub fn post_comment(&self, user: &User, pr_number: u64, contents: &str, marker: &str) -> Result<()> {
        if contents.len() > MAX_COMMENT_LENGTH {
            return Err(PrcovError::CannotPostComment(format!(
                "comment exceeds allowed size ({MAX_COMMENT_LENGTH})"
            )));
        }

        let body = json!({ "body": contents });
        let result = match self.find_comment(user, pr_number, marker)? {
            Some(id) => {
                info!("Update previous comment");
                self.send(
                    Request::new(Method::Patch, self.repo_url(&format!("/issues/comments/{id}"))).json(body),
                )
            }
            None => {
                info!("Adding new comment");
                self.send(
                    Request::new(Method::Post, self.repo_url(&format!("/issues/{pr_number}/comments")))
                        .json(body),
                )
            }
        };

        result.map(|_| ()).map_err(|e| match e {
            PrcovError::Http(_) => e,
            other => PrcovError::CannotPostComment(other.to_string()),
        })
    }

    /// Commit `<pr>-annotations.json` to `branch`, replacing an earlier
    /// version. Protected or missing branches are refused.
    pub fn write_annotations_to_branch(
        &self,
        user: &User,
        pr_number: u64,
        branch: &str,
        annotations: &[Annotation],
    ) -> Result<()> {
        let location = format!("{}/{branch}", self.repository);

        info!("Getting the annotations data branch.");
        match self.get_json::<Branch>(self.repo_url(&format!("/branches/{branch}"))) {
            Ok(data_branch) if data_branch.protected => {
                return Err(PrcovError::CannotGetBranch(format!(
                    "branch \"{location}\" is protected"
                )))
            }
            Ok(_) => {}
            Err(PrcovError::NotFound) => {
                warn!("Branch \"{location}\" does not exist.");
                return Err(PrcovError::CannotGetBranch(format!("branch \"{location}\" does not exist")));
            }
            Err(PrcovError::Forbidden) => {
                return Err(PrcovError::CannotGetBranch(format!(
                    "forbidden access to branch \"{location}\""
                )))
            }
            Err(e) => return Err(e),
        }

        let file_name = annotations_file_name(pr_number);
        let contents_url = self.repo_url(&format!("/contents/{file_name}"));
        let sha = match self.get_json::<ContentFile>(format!("{contents_url}?ref={branch}")) {
            Ok(file) => Some(file.sha),
            Err(PrcovError::NotFound) => None,
            Err(PrcovError::Forbidden) => {
                error!("Forbidden access to branch \"{location}\".");
                return Err(PrcovError::CannotGetBranch(format!(
                    "forbidden access to branch \"{location}\""
                )));
            }
            Err(e) => return Err(e),
        };

        info!("Writing annotations to branch.");
        let mut body = json!({
            "message": COMMIT_MESSAGE,
            "branch": branch,
            "committer": { "name": user.name, "email": user.email },
            "content": Annotation::encode(annotations)?,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }

        self.send(Request::new(Method::Put, contents_url).json(body))
            .map(|_| ())
            .map_err(|e| {
                let reason = match e {
                    PrcovError::NotFound => format!("branch \"{location}\" does not exist"),
                    PrcovError::Forbidden => format!("forbidden access to branch \"{location}\""),
                    PrcovError::Conflict => format!("conflict writing to branch \"{location}\""),
                    PrcovError::ValidationFailed => "validation failed on committer name or email".to_string(),
                    other => return other,
                };
                error!("{reason}");
                PrcovError::CannotGetBranch(reason)
            })
    }
}

/// The diff of a pull request, fetched from the API.
pub struct PullRequestDiff<'a, T: Transport> {
    pub client: &'a GitHubClient<T>,
    pub pr_number: u64,
}

impl<T: Transport> DiffSource for PullRequestDiff<'_, T> {
    fn fetch_diff(&self) -> Result<String> {
        info!(
            "Fetching diff for {}/pull/{} ...",
            self.client.repository(),
            self.pr_number
        );
        self.client.get_pr_diff(self.pr_number)
    }
}
