use std::collections::HashMap;

use super::Event;

/// Read-only key/value lookup, normally the process environment.
pub trait Environment {
    fn var(&self, key: &str) -> Option<String>;

    fn contains(&self, key: &str) -> bool {
        self.var(key).is_some()
    }
}

/// The real process environment.
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// CI providers whose environment we know how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Travis,
    CircleCi,
    GitLab,
    Buildkite,
    JenkinsX,
    GoogleCloudBuild,
    AzurePipelines,
    GitHubActions,
    BitbucketPipelines,
}

// Checked in order; the first marker variable present wins
const DETECTION_ORDER: &[(&str, ProviderKind)] = &[
    ("TRAVIS", ProviderKind::Travis),
    ("CIRCLECI", ProviderKind::CircleCi),
    ("GITLAB_CI", ProviderKind::GitLab),
    ("BUILDKITE", ProviderKind::Buildkite),
    ("JENKINS-X", ProviderKind::JenkinsX),
    ("GOOGLE-CLOUD-BUILD", ProviderKind::GoogleCloudBuild),
    ("TF_BUILD", ProviderKind::AzurePipelines),
    ("GITHUB_ACTIONS", ProviderKind::GitHubActions),
    ("BITBUCKET_BUILD_NUMBER", ProviderKind::BitbucketPipelines),
];

impl ProviderKind {
    /// Canonical name, as sent in the `ci_provider` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Travis => "Travis-CI",
            Self::CircleCi => "CircleCI",
            Self::GitLab => "GitLab-CI",
            Self::Buildkite => "Buildkite",
            Self::JenkinsX => "Jenkins-X",
            Self::GoogleCloudBuild => "Google-Cloud-Build",
            Self::AzurePipelines => "Azure-Pipelines",
            Self::GitHubActions => "GitHub-Actions",
            Self::BitbucketPipelines => "Bitbucket-Pipelines",
        }
    }

    /// Parses a user-supplied provider name, accepting the usual spellings.
    pub fn parse(name: &str) -> Option<Self> {
        let kind = match name.trim().to_lowercase().as_str() {
            "travis-ci" | "travisci" | "travis" => Self::Travis,
            "circleci" | "circle-ci" | "circle" => Self::CircleCi,
            "gitlab-ci" | "gitlabci" | "gitlab" => Self::GitLab,
            "buildkite" | "buildkiteci" | "build-kite" => Self::Buildkite,
            "jenkinsx" | "jenkins-x" => Self::JenkinsX,
            "google-cloud-build" | "cloud-build" | "gcb" => Self::GoogleCloudBuild,
            "azure-pipelines" | "azure-devops" | "vsts" | "tfs" => Self::AzurePipelines,
            "github-actions" | "githubactions" | "github" | "gha-buildevents" => {
                Self::GitHubActions
            }
            "bitbucket-pipelines" | "bitbucketpipelines" | "bitbucket" => {
                Self::BitbucketPipelines
            }
            _ => return None,
        };
        Some(kind)
    }

    /// Guesses the provider from well-known marker variables.
    pub fn detect(env: &dyn Environment) -> Option<Self> {
        DETECTION_ORDER
            .iter()
            .find(|(marker, _)| env.contains(marker))
            .map(|(_, kind)| *kind)
    }

    /// Environment variable → event field name.
    pub fn env_fields(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::CircleCi => &[
                ("CIRCLE_BRANCH", "branch"),
                ("CIRCLE_BUILD_NUM", "build_num"),
                ("CIRCLE_BUILD_URL", "build_url"),
                ("CIRCLE_JOB", "job_name"),
                ("CIRCLE_PR_NUMBER", "pr_number"),
                ("CIRCLE_PR_REPONAME", "pr_repo"),
                ("CIRCLE_PR_USER", "pr_user"),
                ("CIRCLE_REPOSITORY_URL", "repo"),
            ],
            Self::Travis => &[
                ("TRAVIS_BRANCH", "branch"),
                ("TRAVIS_BUILD_NUMBER", "build_num"),
                ("TRAVIS_BUILD_WEB_URL", "build_url"),
                ("TRAVIS_PULL_REQUEST", "pr_number"),
                ("TRAVIS_PULL_REQUEST_BRANCH", "pr_branch"),
                ("TRAVIS_PULL_REQUEST_SLUG", "pr_repo"),
                ("TRAVIS_REPO_SLUG", "repo"),
            ],
            Self::GitLab => &[
                ("CI_COMMIT_REF_NAME", "branch"),
                ("CI_PIPELINE_ID", "build_num"),
                ("CI_PIPELINE_URL", "build_url"),
                ("CI_MERGE_REQUEST_ID", "pr_number"),
                ("CI_MERGE_REQUEST_SOURCE_BRANCH_NAME", "pr_branch"),
                ("CI_MERGE_REQUEST_SOURCE_PROJECT_PATH", "pr_repo"),
                ("CI_PROJECT_URL", "repo"),
            ],
            Self::Buildkite => &[
                ("BUILDKITE_BRANCH", "branch"),
                ("BUILDKITE_BUILD_NUMBER", "build_num"),
                ("BUILDKITE_BUILD_URL", "build_url"),
                ("BUILDKITE_PULL_REQUEST", "pr_number"),
                ("BUILDKITE_PULL_REQUEST_REPO", "pr_repo"),
                ("BUILDKITE_REPO", "repo"),
            ],
            Self::JenkinsX => &[
                ("BRANCH_NAME", "branch"),
                ("BUILD_NUMBER", "build_num"),
                ("PULL_NUMBER", "pr_number"),
                ("REPO_NAME", "repo"),
            ],
            Self::GoogleCloudBuild => &[
                ("BRANCH_NAME", "branch"),
                ("BUILD_ID", "build_num"),
                ("HEAD_BRANCH", "pr_branch"),
                ("REPO_OWNER", "pr_user"),
                ("REPO_NAME", "repo"),
            ],
            Self::AzurePipelines => &[
                ("BUILD_SOURCEBRANCHNAME", "branch"),
                ("BUILD_BUILDID", "build_id"),
                ("BUILD_BUILDNUMBER", "build_number"),
                ("SYSTEM_JOBDISPLAYNAME", "job_name"),
                ("SYSTEM_STAGEDISPLAYNAME", "stage_name"),
                ("SYSTEM_PULLREQUEST_PULLREQUESTID", "pr_id"),
                ("SYSTEM_PULLREQUEST_PULLREQUESTNUMBER", "pr_number"),
                ("SYSTEM_PULLREQUEST_SOURCEBRANCH", "pr_branch"),
                ("BUILD_REQUESTEDFOR", "build_user"),
                ("BUILD_REPOSITORY_URI", "repo"),
            ],
            Self::GitHubActions => &[
                ("GITHUB_REF", "branch"),
                ("GITHUB_RUN_ID", "build_num"),
                ("GITHUB_WORKFLOW", "workflow_name"),
                ("GITHUB_HEAD_REF", "pr_branch"),
                ("GITHUB_ACTOR", "pr_user"),
                ("GITHUB_REPOSITORY", "repo"),
            ],
            Self::BitbucketPipelines => &[
                ("BITBUCKET_BRANCH", "branch"),
                ("BITBUCKET_PIPELINE_UUID", "pipeline_id"),
                ("BITBUCKET_BUILD_NUMBER", "build_num"),
                ("BITBUCKET_REPO_FULL_NAME", "repo"),
                ("BITBUCKET_PR_ID", "pr_id"),
                ("BITBUCKET_STEP_TRIGGERER_UUID", "build_user"),
            ],
        }
    }
}

/// Copies the provider's well-known build variables onto `event`.
pub fn add_provider_fields(provider: Option<&str>, env: &dyn Environment, event: &mut Event) {
    let Some(kind) = provider.and_then(ProviderKind::parse) else {
        return;
    };

    for (var, field) in kind.env_fields() {
        if let Some(value) = env.var(var) {
            event.add_field(*field, value);
        }
    }
}
