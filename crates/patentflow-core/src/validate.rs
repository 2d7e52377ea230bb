//! Strict row schemas for stage outputs. Checked after every structured stage;
//! mismatches are reported for logging and never reject the output.

#![allow(dead_code)]

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::records::{ClaimConstruction, Extraction, SearchTechnical, TimelineSynthesis};

#[derive(Deserialize)]
struct Metadata {
    application_number: String,
    title: String,
}

#[derive(Deserialize)]
struct ProsecutionEvent {
    date: String,
    document_code: String,
    document_description: String,
}

#[derive(Deserialize)]
struct ClaimsDiffEntry {
    claim_number: i64,
    claim_type: String,
    final_text: String,
}

#[derive(Deserialize)]
struct RecordDiscrepancy {
    discrepancy_type: String,
    description: String,
    potential_impact: String,
}

#[derive(Deserialize)]
struct ClaimConstructionRow {
    claim_number: i64,
    claim_term: String,
    plain_meaning: String,
    specification_support: String,
    prosecution_history_context: String,
    proposed_construction: String,
    construction_rationale: String,
}

#[derive(Deserialize)]
struct EstoppelMatrixRow {
    claim_number: i64,
    amendment_date: String,
    original_language: String,
    amended_language: String,
    reason_for_amendment: String,
    surrendered_scope: String,
    estoppel_strength: String,
    litigation_impact: String,
    doctrine_of_equivalents_risk: String,
}

#[derive(Deserialize)]
struct TechnicalRep {
    rep_id: String,
    source_document: String,
    representation_text: String,
    context: String,
    technical_accuracy: String,
}

#[derive(Deserialize)]
struct SearchGapEntry {
    gap_type: String,
    description: String,
    recommended_search: String,
}

#[derive(Deserialize)]
struct ConvergenceRow {
    convergence_id: String,
    primary_reference: String,
    combination_rationale: String,
    obviousness_strength: String,
}

#[derive(Deserialize)]
struct EventForensic {
    event_date: String,
    event_type: String,
    forensic_significance: String,
    litigation_relevance: String,
    evidence_quality: String,
}

#[derive(Deserialize)]
struct GlobalFindings {
    overall_prosecution_quality: String,
    invalidity_attack_strength: String,
    infringement_defense_strength: String,
}

fn check<T: DeserializeOwned>(section: &str, value: &Value, problems: &mut Vec<String>) {
    if let Err(e) = T::deserialize(value) {
        problems.push(format!("{section}: {e}"));
    }
}

fn check_rows<T: DeserializeOwned>(section: &str, rows: &[Value], problems: &mut Vec<String>) {
    for (i, row) in rows.iter().enumerate() {
        check::<T>(&format!("{section}[{i}]"), row, problems);
    }
}

pub fn extraction(ex: &Extraction) -> Vec<String> {
    let mut problems = Vec::new();
    if ex.metadata.application_number.is_none() {
        problems.push("metadata: missing field `application_number`".to_string());
    }
    if ex.metadata.title.is_none() {
        problems.push("metadata: missing field `title`".to_string());
    }
    check_rows::<ProsecutionEvent>("events", &ex.events, &mut problems);
    check_rows::<ClaimsDiffEntry>("claims_diff", &ex.claims_diff, &mut problems);
    check_rows::<RecordDiscrepancy>("record_discrepancies", &ex.record_discrepancies, &mut problems);
    problems
}

pub fn claim_construction(a: &ClaimConstruction) -> Vec<String> {
    let mut problems = Vec::new();
    check_rows::<ClaimConstructionRow>("claim_construction_rows", &a.claim_construction_rows, &mut problems);
    check_rows::<EstoppelMatrixRow>("estoppel_matrix_rows", &a.estoppel_matrix_rows, &mut problems);
    problems
}

pub fn search_technical(b: &SearchTechnical) -> Vec<String> {
    let mut problems = Vec::new();
    check_rows::<TechnicalRep>("technical_reps", &b.technical_reps, &mut problems);
    check_rows::<SearchGapEntry>("search_gap_analysis", &b.search_gap_analysis, &mut problems);
    check_rows::<ConvergenceRow>("convergence_rows", &b.convergence_rows, &mut problems);
    problems
}

pub fn timeline(c: &TimelineSynthesis) -> Vec<String> {
    let mut problems = Vec::new();
    check_rows::<EventForensic>("event_forensics", &c.event_forensics, &mut problems);
    if let Some(findings) = &c.global_findings {
        check::<GlobalFindings>("global_findings", findings, &mut problems);
    }
    problems
}
