use std::path::PathBuf;

use async_trait::async_trait;
use patentflow_core::domain::{DomainPack, DomainPackLoader, DEFAULT_TECH_CENTER};
use tracing::{info, warn};

pub const PLACEHOLDER_NAME: &str = "default";
pub const PLACEHOLDER_CONTENT: &str = "# Tech Pack Not Available\n\nNo specific tech pack guidance available.";

/// Known USPTO technology centers and the file holding each pack.
pub const TECH_PACKS: [(&str, &str, &str); 9] = [
    ("1600", "Biotechnology and organic chemistry", "TECH_BIOTECH_TC1600_OptionB.md"),
    ("1700", "Chemical and materials engineering", "TECH_Chemistry_TC1700.md"),
    ("2100", "Computer architecture and software", "TECH_SOFTWARE_TC2100.md"),
    ("2400", "Networking and security", "TECH_NETWORKING_TC2400.md"),
    ("2600", "Communications", "TECH_COMMUNICATIONS_TC2600.md"),
    ("2800", "Semiconductors and electrical systems", "TECH_SEMICONDUCTORS_TC2800.md"),
    ("2900", "Designs", "TECH_DESIGNS_TC2900.md"),
    ("3600", "E-commerce and business methods", "TECH_ECOM_BUSINESS_TC3600.md"),
    ("3700", "Mechanical engineering and medical devices", "TECH_MECH_MED_TC3700.md"),
];

/// Tech packs read from a directory of Markdown files.
pub struct TechPackLibrary {
    dir: PathBuf,
}

impl TechPackLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Table entry for `code`; unknown codes map to the default center.
    pub fn entry(code: &str) -> (&'static str, &'static str, &'static str) {
        let lookup = |c: &str| TECH_PACKS.iter().copied().find(|(k, _, _)| *k == c);
        lookup(code)
            .or_else(|| lookup(DEFAULT_TECH_CENTER))
            .unwrap_or(TECH_PACKS[2])
    }
}

#[async_trait]
impl DomainPackLoader for TechPackLibrary {
    async fn load_domain_pack(&self, code: &str) -> DomainPack {
        let (pack_code, name, file) = Self::entry(code);
        if pack_code != code {
            info!(requested = %code, using = %pack_code, "no tech pack for center, using default");
        }

        let path = self.dir.join(file);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => DomainPack {
                code: pack_code.to_string(),
                name: name.to_string(),
                content,
            },
            Err(e) => {
                warn!(path = %path.display(), "tech pack unavailable: {e}");
                DomainPack {
                    code: pack_code.to_string(),
                    name: PLACEHOLDER_NAME.to_string(),
                    content: PLACEHOLDER_CONTENT.to_string(),
                }
            }
        }
    }
}
