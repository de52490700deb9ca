//! Owner type definitions
//!
//! Closed set of mechanisms that can be responsible for a resource's desired
//! state. Used by the ownership resolver, flattened records and the query
//! language instead of passing owner names around as strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Enumeration of all owner types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OwnerType {
    ConfigHub,
    Flux,
    ArgoCD,
    Helm,
    Terraform,
    /// Owned by another in-cluster object through ownerReferences
    Native,
    Unknown,
}

impl OwnerType {
    /// Get the display name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::ConfigHub => "ConfigHub",
            OwnerType::Flux => "Flux",
            OwnerType::ArgoCD => "ArgoCD",
            OwnerType::Helm => "Helm",
            OwnerType::Terraform => "Terraform",
            OwnerType::Native => "Native",
            OwnerType::Unknown => "Unknown",
        }
    }

    /// Get all owner types
    pub fn all() -> &'static [Self] {
        &[
            OwnerType::ConfigHub,
            OwnerType::Flux,
            OwnerType::ArgoCD,
            OwnerType::Helm,
            OwnerType::Terraform,
            OwnerType::Native,
            OwnerType::Unknown,
        ]
    }

    /// Try to parse a string (case-insensitive) into an OwnerType
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "confighub" | "cub" => Some(OwnerType::ConfigHub),
            "flux" | "fluxcd" => Some(OwnerType::Flux),
            "argocd" | "argo" => Some(OwnerType::ArgoCD),
            "helm" => Some(OwnerType::Helm),
            "terraform" | "tf" => Some(OwnerType::Terraform),
            "native" | "k8s" => Some(OwnerType::Native),
            "unknown" | "unmanaged" => Some(OwnerType::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OwnerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_case_insensitive(s).ok_or_else(|| format!("Unknown owner type: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_round_trips_through_parse() {
        for owner in OwnerType::all() {
            assert_eq!(owner.as_str().parse::<OwnerType>(), Ok(*owner));
        }
    }

    #[test]
    fn test_from_str_case_insensitive_aliases() {
        assert_eq!(
            OwnerType::from_str_case_insensitive("argo"),
            Some(OwnerType::ArgoCD)
        );
        assert_eq!(
            OwnerType::from_str_case_insensitive("FLUX"),
            Some(OwnerType::Flux)
        );
        assert_eq!(OwnerType::from_str_case_insensitive("pulumi"), None);
    }
}
