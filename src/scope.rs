//! Org and project detection for scoped fact storage.
//!
//! The org id comes from the `origin` remote URL of the codebase's git
//! repository; the project id is a stable hash of the codebase root path.
//! Detection never fails: a missing or unparseable remote yields
//! [`UNKNOWN_ORG`], and no root yields an empty project id.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::debug;

use memory_harness_core::models::{ScopeIdentity, UNKNOWN_ORG};

/// Timeout for the `git remote get-url` call.
const GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote URL patterns, checked in order; the first capture group is the org.
///
/// Azure DevOps SSH (`git@ssh.dev.azure.com:v3/{org}/...`) precedes the
/// generic SSH form, which would otherwise capture `v3`.
static ORG_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^git@ssh\.dev\.azure\.com:v3/([^/]+)/",
        r"^git@[^:]+:([^/]+)/",
        r"^https?://dev\.azure\.com/([^/]+)/",
        r"^https?://[^/]+/([^/]+)/",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid org pattern"))
    .collect()
});

/// Resolve the (org, project) identity for a codebase root.
pub fn detect_org_and_project(codebase_root: Option<&Path>) -> ScopeIdentity {
    let org_id = detect_org(codebase_root);
    let project_id = compute_project_id(codebase_root);
    debug!(org = %org_id, project = %project_id, "resolved scope identity");
    ScopeIdentity { org_id, project_id }
}

fn detect_org(codebase_root: Option<&Path>) -> String {
    match git_remote_url(codebase_root) {
        Some(url) => parse_org_from_url(&url),
        None => UNKNOWN_ORG.to_string(),
    }
}

/// Parse the organization from a git remote URL.
///
/// Handles the SSH and HTTPS forms of GitHub, GitLab, Bitbucket, and Azure
/// DevOps remotes. Returns [`UNKNOWN_ORG`] when nothing matches.
pub fn parse_org_from_url(url: &str) -> String {
    let url = url.trim();
    ORG_PATTERNS
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_ORG.to_string())
}

/// First 16 hex chars of SHA-256 over the resolved absolute root path.
///
/// Empty when no root is given. A root that cannot be canonicalized (e.g.
/// it does not exist) is made absolute against the current directory.
pub fn compute_project_id(codebase_root: Option<&Path>) -> String {
    let Some(root) = codebase_root else {
        return String::new();
    };
    let resolved = std::fs::canonicalize(root).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(root))
            .unwrap_or_else(|_| root.to_path_buf())
    });

    let mut hasher = Sha256::new();
    hasher.update(resolved.to_string_lossy().as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(16);
    id
}

/// Run `git remote get-url origin`, giving up after [`GIT_TIMEOUT`].
fn git_remote_url(codebase_root: Option<&Path>) -> Option<String> {
    let mut cmd = Command::new("git");
    cmd.args(["remote", "get-url", "origin"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    if let Some(root) = codebase_root {
        cmd.current_dir(root);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            debug!("failed to run git: {}", e);
            return None;
        }
    };

    let deadline = Instant::now() + GIT_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(20));
            }
            Ok(None) => {
                debug!("git remote get-url timed out");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
            Err(e) => {
                debug!("failed waiting on git: {}", e);
                return None;
            }
        }
    }

    let output = child.wait_with_output().ok()?;
    if !output.status.success() {
        debug!("git remote get-url exited with {}", output.status);
        return None;
    }

    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if url.is_empty() {
        None
    } else {
        Some(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_all_org_patterns_compile() {
        assert_eq!(ORG_PATTERNS.len(), 4);
    }

    #[test]
    fn test_github_ssh() {
        assert_eq!(parse_org_from_url("git@github.com:parslee-ai/neo.git"), "parslee-ai");
    }

    #[test]
    fn test_github_https() {
        assert_eq!(parse_org_from_url("https://github.com/rust-lang/cargo.git"), "rust-lang");
        assert_eq!(parse_org_from_url("http://gitlab.com/group/project"), "group");
    }

    #[test]
    fn test_azure_ssh_before_generic_ssh() {
        assert_eq!(
            parse_org_from_url("git@ssh.dev.azure.com:v3/contoso/platform/api"),
            "contoso"
        );
    }

    #[test]
    fn test_azure_https() {
        assert_eq!(
            parse_org_from_url("https://dev.azure.com/contoso/platform/_git/api"),
            "contoso"
        );
    }

    #[test]
    fn test_unparseable_is_unknown() {
        assert_eq!(parse_org_from_url("not a url"), "unknown");
        assert_eq!(parse_org_from_url("https://example.com"), "unknown");
        assert_eq!(parse_org_from_url(""), "unknown");
    }

    #[test]
    fn test_whitespace_trimmed() {
        assert_eq!(parse_org_from_url("  git@github.com:acme/x.git\n"), "acme");
    }

    #[test]
    fn test_project_id_empty_without_root() {
        assert_eq!(compute_project_id(None), "");
    }

    #[test]
    fn test_project_id_stable_and_sized() {
        let tmp = TempDir::new().unwrap();
        let a = compute_project_id(Some(tmp.path()));
        let b = compute_project_id(Some(tmp.path()));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        let other = TempDir::new().unwrap();
        assert_ne!(a, compute_project_id(Some(other.path())));
    }

    #[test]
    fn test_project_id_matches_sha256_of_path() {
        let tmp = TempDir::new().unwrap();
        let resolved = std::fs::canonicalize(tmp.path()).unwrap();
        let expected = hex::encode(Sha256::digest(resolved.to_string_lossy().as_bytes()));
        assert_eq!(compute_project_id(Some(tmp.path())), expected[..16]);
    }

    #[test]
    fn test_non_repo_dir_is_unknown_org() {
        let tmp = TempDir::new().unwrap();
        let identity = detect_org_and_project(Some(tmp.path()));
        assert_eq!(identity.org_id, "unknown");
        assert_eq!(identity.project_id.len(), 16);
    }
}
