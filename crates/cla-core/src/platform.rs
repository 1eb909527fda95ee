//! Platform correlation carried through the provider callback URL.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Post-signature behaviour family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Github,
    Gitlab,
    Gerrit,
    Corporate,
}

impl PlatformKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Gerrit => "gerrit",
            Self::Corporate => "corporate",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an individual signature request originated, chosen once at request entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "return_url_type", rename_all = "lowercase")]
pub enum IndividualPlatform {
    Github {
        installation_id: i64,
        repository_id: i64,
        pull_request_id: i64,
    },
    Gitlab {
        organization_id: i64,
        repository_id: i64,
        merge_request_id: i64,
    },
    Gerrit,
}

impl IndividualPlatform {
    pub fn kind(&self) -> PlatformKind {
        match self {
            Self::Github { .. } => PlatformKind::Github,
            Self::Gitlab { .. } => PlatformKind::Gitlab,
            Self::Gerrit => PlatformKind::Gerrit,
        }
    }

    pub fn callback_target(&self, user_id: &str) -> CallbackTarget {
        match *self {
            Self::Github {
                installation_id,
                repository_id,
                pull_request_id,
            } => CallbackTarget::GithubIndividual {
                installation_id,
                repository_id,
                pull_request_id,
            },
            Self::Gitlab {
                organization_id,
                repository_id,
                merge_request_id,
            } => CallbackTarget::GitlabIndividual {
                user_id: user_id.to_string(),
                organization_id,
                repository_id,
                merge_request_id,
            },
            Self::Gerrit => CallbackTarget::GerritIndividual {
                user_id: user_id.to_string(),
            },
        }
    }
}

/// Correlation ids embedded in (and recovered from) a callback URL path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum CallbackTarget {
    GithubIndividual {
        installation_id: i64,
        repository_id: i64,
        pull_request_id: i64,
    },
    GitlabIndividual {
        user_id: String,
        organization_id: i64,
        repository_id: i64,
        merge_request_id: i64,
    },
    GerritIndividual {
        user_id: String,
    },
    Corporate {
        company_id: String,
        project_id: String,
    },
}

impl CallbackTarget {
    pub fn kind(&self) -> PlatformKind {
        match self {
            Self::GithubIndividual { .. } => PlatformKind::Github,
            Self::GitlabIndividual { .. } => PlatformKind::Gitlab,
            Self::GerritIndividual { .. } => PlatformKind::Gerrit,
            Self::Corporate { .. } => PlatformKind::Corporate,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Self::GithubIndividual {
                installation_id,
                repository_id,
                pull_request_id,
            } => format!(
                "/v4/signed/individual/{}/{}/{}",
                installation_id, repository_id, pull_request_id
            ),
            Self::GitlabIndividual {
                user_id,
                organization_id,
                repository_id,
                merge_request_id,
            } => format!(
                "/v4/signed/gitlab/individual/{}/{}/{}/{}",
                user_id, organization_id, repository_id, merge_request_id
            ),
            Self::GerritIndividual { user_id } => {
                format!("/v4/signed/gerrit/individual/{}", user_id)
            }
            Self::Corporate {
                company_id,
                project_id,
            } => format!("/v4/signed/corporate/{}/{}", company_id, project_id),
        }
    }

    pub fn callback_url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_paths_match_contract() {
        let base = "https://api.example.org/";
        assert_eq!(
            CallbackTarget::GithubIndividual {
                installation_id: 7,
                repository_id: 8,
                pull_request_id: 9
            }
            .callback_url(base),
            "https://api.example.org/v4/signed/individual/7/8/9"
        );
        assert_eq!(
            IndividualPlatform::Gitlab {
                organization_id: 2,
                repository_id: 3,
                merge_request_id: 4
            }
            .callback_target("u-1")
            .path(),
            "/v4/signed/gitlab/individual/u-1/2/3/4"
        );
        assert_eq!(
            IndividualPlatform::Gerrit.callback_target("u-1").path(),
            "/v4/signed/gerrit/individual/u-1"
        );
        assert_eq!(
            CallbackTarget::Corporate {
                company_id: "c".into(),
                project_id: "p".into()
            }
            .path(),
            "/v4/signed/corporate/c/p"
        );
    }

    #[test]
    fn individual_platform_is_tagged_by_return_url_type() {
        let platform: IndividualPlatform = serde_json::from_str(
            r#"{"return_url_type":"github","installation_id":1,"repository_id":2,"pull_request_id":3}"#,
        )
        .unwrap();
        assert_eq!(platform.kind(), PlatformKind::Github);

        let gerrit: IndividualPlatform =
            serde_json::from_str(r#"{"return_url_type":"gerrit"}"#).unwrap();
        assert_eq!(gerrit, IndividualPlatform::Gerrit);
    }
}
