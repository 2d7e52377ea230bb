// Tests for the tech-pack library and prompt overrides.

use std::fs;

use patentflow_core::{domain::DomainPackLoader, types::StageKind};
use patentflow_domains::{
    load_prompts, patent_prompts,
    techpacks::{PLACEHOLDER_CONTENT, PLACEHOLDER_NAME},
    TechPackLibrary,
};
use tempfile::TempDir;

// =============================================================================
// Tech packs
// =============================================================================

#[tokio::test]
async fn known_center_reads_its_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("TECH_MECH_MED_TC3700.md"), "# Mechanical\n\nMeans-plus-function is common.").unwrap();
    let library = TechPackLibrary::new(dir.path());

    let pack = library.load_domain_pack("3700").await;

    assert_eq!(pack.code, "3700");
    assert_eq!(pack.name, "Mechanical engineering and medical devices");
    assert!(pack.content.contains("Means-plus-function"));
}

#[tokio::test]
async fn unknown_center_falls_back_to_software_pack() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("TECH_SOFTWARE_TC2100.md"), "# Software").unwrap();
    let library = TechPackLibrary::new(dir.path());

    let pack = library.load_domain_pack("4200").await;

    assert_eq!(pack.code, "2100");
    assert_eq!(pack.content, "# Software");
}

#[tokio::test]
async fn missing_file_yields_placeholder() {
    let dir = TempDir::new().unwrap();
    let library = TechPackLibrary::new(dir.path().join("absent"));

    let pack = library.load_domain_pack("1600").await;

    assert_eq!(pack.code, "1600");
    assert_eq!(pack.name, PLACEHOLDER_NAME);
    assert_eq!(pack.content, PLACEHOLDER_CONTENT);
}

#[test]
fn every_entry_is_unique() {
    let mut codes: Vec<&str> = patentflow_domains::techpacks::TECH_PACKS.iter().map(|(c, _, _)| *c).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), 9);
}

// =============================================================================
// Prompt overrides
// =============================================================================

#[test]
fn override_file_replaces_only_that_instruction() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("write.md"), "Write a two-page memo instead.").unwrap();
    fs::write(dir.path().join("qc.md"), "   \n").unwrap();

    let prompts = load_prompts(dir.path());
    let builtin = patent_prompts();

    let write = prompts.get(StageKind::Write);
    assert_eq!(write.instruction, "Write a two-page memo instead.");
    assert_eq!(write.system, builtin.get(StageKind::Write).system);
    assert_eq!(prompts.get(StageKind::Qc), builtin.get(StageKind::Qc));
}

#[test]
fn missing_override_dir_keeps_builtins() {
    let prompts = load_prompts("/nonexistent/prompts");
    assert_eq!(
        prompts.get(StageKind::Extract),
        patent_prompts().get(StageKind::Extract)
    );
}
