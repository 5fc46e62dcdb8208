//! Runtime drivers and their identifier constraints.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;

/// Maximum length of a DNS label, which kubernetes uses for object names.
pub const DNS_LABEL_MAX: usize = 63;
/// Length of the random suffix appended to truncated kubernetes names.
pub const SUFFIX_LEN: usize = 6;

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Execution runtime a compiled pipeline is destined for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Docker,
    Kubernetes,
}

impl Driver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Docker => "docker",
            Driver::Kubernetes => "kubernetes",
        }
    }

    /// Rewrite `id` so the runtime accepts it as a container name.
    ///
    /// Docker ids are stable under repeated sanitizing. Kubernetes ids longer
    /// than a DNS label are truncated with a fresh random suffix every time.
    pub fn sanitize_id(&self, id: &str) -> String {
        match self {
            Driver::Docker => id.replace([' ', '/'], "-"),
            Driver::Kubernetes => {
                let id = id.replace([' ', '_', '.', '/'], "-").to_lowercase();
                if id.chars().count() <= DNS_LABEL_MAX {
                    return id;
                }

                let keep = DNS_LABEL_MAX - 1 - SUFFIX_LEN;
                let mut truncated: String = id.chars().take(keep).collect();
                truncated.push('-');
                truncated.push_str(&random_suffix(SUFFIX_LEN));
                debug!(original = %id, sanitized = %truncated, "truncated kubernetes identifier");
                truncated
            }
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Driver {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker" => Ok(Driver::Docker),
            "kubernetes" => Ok(Driver::Kubernetes),
            other => Err(PipelineError::UnsupportedDriver(other.to_string())),
        }
    }
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_from_str() {
        assert_eq!("docker".parse::<Driver>().unwrap(), Driver::Docker);
        assert_eq!("kubernetes".parse::<Driver>().unwrap(), Driver::Kubernetes);

        let err = "podman".parse::<Driver>().unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedDriver(ref d) if d == "podman"));
    }

    #[test]
    fn test_docker_replaces_space_and_slash() {
        let id = "github octocat._1_init/init";
        assert_eq!(Driver::Docker.sanitize_id(id), "github-octocat._1_init-init");
    }

    #[test]
    fn test_kubernetes_replaces_and_lowercases() {
        let id = "GitHub octocat._1_init/init";
        assert_eq!(Driver::Kubernetes.sanitize_id(id), "github-octocat--1-init-init");
    }

    #[test]
    fn test_kubernetes_truncates_with_suffix() {
        let id = "a".repeat(80);
        let out = Driver::Kubernetes.sanitize_id(&id);
        assert_eq!(out.chars().count(), DNS_LABEL_MAX);
        assert!(out.starts_with(&"a".repeat(DNS_LABEL_MAX - 1 - SUFFIX_LEN)));

        let suffix = &out[out.len() - SUFFIX_LEN - 1..];
        assert!(suffix.starts_with('-'));
        assert!(suffix[1..]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_kubernetes_exact_limit_untouched() {
        let id = "b".repeat(DNS_LABEL_MAX);
        assert_eq!(Driver::Kubernetes.sanitize_id(&id), id);
    }

    #[test]
    fn test_kubernetes_counts_runes_not_bytes() {
        // 40 two-byte runes: 80 bytes but under the rune limit
        let id = "é".repeat(40);
        assert_eq!(Driver::Kubernetes.sanitize_id(&id), id);
    }
}
