use crate::records::{ClaimConstruction, ForensicRecord, SearchTechnical, TimelineSynthesis};

/// One analysis sub-record on its way into the forensic record.
#[derive(Debug, Clone, PartialEq)]
pub enum ForensicSection {
    ClaimConstruction(ClaimConstruction),
    SearchTechnical(SearchTechnical),
    Timeline(TimelineSynthesis),
}

/// Copies each section's keys into a fresh record. Sections own disjoint keys,
/// so input order does not matter; a missing section leaves its keys empty.
pub fn merge_sections<I>(sections: I) -> ForensicRecord
where
    I: IntoIterator<Item = ForensicSection>,
{
    let mut record = ForensicRecord::default();
    for section in sections {
        match section {
            ForensicSection::ClaimConstruction(a) => {
                record.claim_construction_rows = a.claim_construction_rows;
                record.estoppel_matrix_rows = a.estoppel_matrix_rows;
                record.construction_summary = a.construction_summary;
                record.estoppel_summary = a.estoppel_summary;
            }
            ForensicSection::SearchTechnical(b) => {
                record.technical_reps = b.technical_reps;
                record.search_gap_analysis = b.search_gap_analysis;
                record.convergence_rows = b.convergence_rows;
                record.technical_summary = b.technical_summary;
                record.search_summary = b.search_summary;
            }
            ForensicSection::Timeline(c) => {
                record.event_forensics = c.event_forensics;
                record.global_findings = c.global_findings;
                record.timeline_summary = c.timeline_summary;
            }
        }
    }
    record
}

pub fn merge(
    a: &ClaimConstruction,
    b: &SearchTechnical,
    c: &TimelineSynthesis,
) -> ForensicRecord {
    merge_sections([
        ForensicSection::ClaimConstruction(a.clone()),
        ForensicSection::SearchTechnical(b.clone()),
        ForensicSection::Timeline(c.clone()),
    ])
}
