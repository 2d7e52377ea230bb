use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::records::PatentMetadata;

/// Technology center used when nothing in the record identifies one.
pub const DEFAULT_TECH_CENTER: &str = "2100";

/// Reference text describing the conventions of one technology area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainPack {
    pub code: String,
    pub name: String,
    pub content: String,
}

#[async_trait]
pub trait DomainPackLoader: Send + Sync {
    /// Never fails. Unknown codes resolve to the default pack, and a pack that
    /// cannot be read is replaced by placeholder text.
    async fn load_domain_pack(&self, code: &str) -> DomainPack;
}

/// Picks the technology center for a run: explicit override, then the
/// extracted tech center, then the art unit's group prefix, then the default.
pub fn resolve_tech_center(override_code: Option<&str>, metadata: &PatentMetadata) -> String {
    if let Some(code) = override_code.map(str::trim).filter(|c| !c.is_empty()) {
        return code.to_string();
    }
    if let Some(tc) = metadata.tech_center.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        return tc.to_string();
    }
    if let Some(prefix) = metadata
        .art_unit
        .as_deref()
        .map(str::trim)
        .and_then(|au| au.get(..2))
        .filter(|p| p.chars().all(|c| c.is_ascii_digit()))
    {
        return format!("{prefix}00");
    }
    DEFAULT_TECH_CENTER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(tc: Option<&str>, au: Option<&str>) -> PatentMetadata {
        PatentMetadata {
            tech_center: tc.map(String::from),
            art_unit: au.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn override_wins() {
        assert_eq!(resolve_tech_center(Some("1600"), &meta(Some("2400"), None)), "1600");
    }

    #[test]
    fn extracted_tech_center_before_art_unit() {
        assert_eq!(resolve_tech_center(None, &meta(Some("2800"), Some("3715"))), "2800");
    }

    #[test]
    fn art_unit_prefix() {
        assert_eq!(resolve_tech_center(Some("  "), &meta(None, Some("3715"))), "3700");
    }

    #[test]
    fn falls_back_to_default() {
        assert_eq!(resolve_tech_center(None, &meta(None, Some("x"))), DEFAULT_TECH_CENTER);
        assert_eq!(resolve_tech_center(None, &meta(None, Some("AU12"))), DEFAULT_TECH_CENTER);
    }
}
