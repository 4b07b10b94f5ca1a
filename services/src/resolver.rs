//! Artifact URL resolution.
//!
//! Computes download URLs for plugins, the Jenkins core WAR, and evergreen
//! distribution packages. Incremental versions (e.g. `3.9.0-rc1234.abcdef`)
//! resolve against the incrementals repository, everything else against
//! releases or the WAR mirror.

use crate::manifest::{CoreArtifact, PluginArtifact};

const INCREMENTALS: &str = "https://repo.jenkins-ci.org/incrementals/";
const RELEASES: &str = "https://repo.jenkins-ci.org/releases/";
const WAR_MIRROR: &str = "http://mirrors.jenkins.io/war/";
const EVERGREEN_RELEASES: &str = "https://github.com/jenkins-infra/evergreen/releases/download/";

/// URL of the evergreen support package zip for a flavor and version.
pub fn evergreen_release(flavor: &str, version: &str) -> String {
    format!("{}{}/evergreen-{}.zip", EVERGREEN_RELEASES, version, flavor)
}

/// Mirror or incrementals URL for the given core record.
pub fn artifact_for_core(core: &CoreArtifact) -> String {
    if is_incremental(&core.version) {
        format!(
            "{}org/jenkins-ci/main/jenkins-war/{}/jenkins-war-{}.war",
            INCREMENTALS, core.version, core.version
        )
    } else {
        format!("{}{}/jenkins.war", WAR_MIRROR, core.version)
    }
}

/// Repository URL for the given plugin record.
pub fn artifact_for_plugin(plugin: &PluginArtifact) -> String {
    let group_path = plugin.group_id.replace('.', "/");
    let repository = if is_incremental(&plugin.version) {
        INCREMENTALS
    } else {
        RELEASES
    };
    format!(
        "{}{}/{}/{}/{}-{}.hpi",
        repository,
        group_path,
        plugin.artifact_id,
        plugin.version,
        plugin.artifact_id,
        plugin.version
    )
}

/// Whether a version string denotes an incremental build (`<v>-rc<N>.<hash>`).
pub fn is_incremental(version: &str) -> bool {
    let Some(index) = version.find("-rc") else {
        return false;
    };
    let rest = &version[index + 3..];
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && rest[digits..].starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin(group_id: &str, artifact_id: &str, version: &str) -> PluginArtifact {
        PluginArtifact {
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
            version: version.to_string(),
        }
    }

    #[test]
    fn test_is_incremental() {
        assert!(is_incremental("3.9.0-rc1234.abcdef"));
        assert!(is_incremental("1.0-rc1.deadbeef"));
        assert!(!is_incremental("3.9.0"));
        assert!(!is_incremental("2.0-rc.nope"));
        assert!(!is_incremental("2.0-rc5"));
        assert!(!is_incremental("2.0-beta1"));
    }

    #[test]
    fn test_release_plugin_url() {
        let url = artifact_for_plugin(&plugin("org.jenkins-ci.plugins", "git", "3.9.0"));
        assert_eq!(
            url,
            "https://repo.jenkins-ci.org/releases/org/jenkins-ci/plugins/git/3.9.0/git-3.9.0.hpi"
        );
    }

    #[test]
    fn test_incremental_plugin_url() {
        let url = artifact_for_plugin(&plugin(
            "io.jenkins.plugins",
            "essentials",
            "1.7-rc123.abc",
        ));
        assert_eq!(
            url,
            "https://repo.jenkins-ci.org/incrementals/io/jenkins/plugins/essentials/1.7-rc123.abc/essentials-1.7-rc123.abc.hpi"
        );
    }

    #[test]
    fn test_core_urls() {
        let mirror = artifact_for_core(&CoreArtifact {
            version: "2.121.1".to_string(),
        });
        assert_eq!(mirror, "http://mirrors.jenkins.io/war/2.121.1/jenkins.war");

        let incremental = artifact_for_core(&CoreArtifact {
            version: "2.122-rc77.f00d".to_string(),
        });
        assert_eq!(
            incremental,
            "https://repo.jenkins-ci.org/incrementals/org/jenkins-ci/main/jenkins-war/2.122-rc77.f00d/jenkins-war-2.122-rc77.f00d.war"
        );
    }

    #[test]
    fn test_evergreen_release_url() {
        assert_eq!(
            evergreen_release("docker-cloud", "1.0.0"),
            "https://github.com/jenkins-infra/evergreen/releases/download/1.0.0/evergreen-docker-cloud.zip"
        );
    }
}
