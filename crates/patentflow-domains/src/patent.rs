use std::path::Path;

use patentflow_core::{prompt::PromptSet, types::StageKind};
use tracing::{debug, info};

/// Built-in prompts for every model-backed stage.
pub fn patent_prompts() -> PromptSet {
    PromptSet::new()
        .with(StageKind::Extract, EXTRACTOR_SYSTEM, EXTRACT_INSTRUCTION)
        .with(StageKind::ClaimConstruction, ANALYST_SYSTEM, CLAIM_CONSTRUCTION_INSTRUCTION)
        .with(StageKind::SearchTechnical, ANALYST_SYSTEM, SEARCH_TECHNICAL_INSTRUCTION)
        .with(StageKind::Timeline, ANALYST_SYSTEM, TIMELINE_INSTRUCTION)
        .with(StageKind::Write, WRITER_SYSTEM, WRITE_INSTRUCTION)
        .with(StageKind::Revise, WRITER_SYSTEM, REVISE_INSTRUCTION)
        .with(StageKind::Qc, QC_SYSTEM, QC_INSTRUCTION)
        .with(StageKind::Clarify, ANALYST_SYSTEM, CLARIFY_INSTRUCTION)
        .with(StageKind::SearchIntel, ANALYST_SYSTEM, SEARCH_INTEL_INSTRUCTION)
}

/// Built-in prompts with instructions replaced by `<dir>/<stage>.md` where
/// such a file exists. A missing directory leaves the built-ins untouched.
pub fn load_prompts(dir: impl AsRef<Path>) -> PromptSet {
    let dir = dir.as_ref();
    let mut prompts = patent_prompts();
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "no prompt override directory");
        return prompts;
    }
    for stage in StageKind::ALL {
        let path = dir.join(format!("{}.md", stage.as_str()));
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }
        info!(stage = %stage, path = %path.display(), "prompt instruction overridden");
        prompts.override_instruction(stage, text);
    }
    prompts
}

// ── System prompts ───────────────────────────────────────────────────────

const EXTRACTOR_SYSTEM: &str = "\
You are a high-precision RECORD EXTRACTOR. You read patent prosecution file wrappers \
and issued patents and convert them into well-structured JSON.\n\
You are a parser, not an analyst. Extract verbatim text, normalize structure and \
preserve exact quotes with pin cites. Do not interpret or draw conclusions.";

const ANALYST_SYSTEM: &str = "\
You are a patent forensic analyst preparing material for litigation counsel. You work \
only from the record supplied to you and cite it for every finding. Where the record is \
silent, say so rather than speculate.";

const WRITER_SYSTEM: &str = "\
You are a patent litigation report writer. You turn forensic analysis into a clear, \
well-organized report for trial counsel. Every factual statement must trace to the \
extraction or forensic record provided.";

const QC_SYSTEM: &str = "\
You are a quality assurance auditor for patent litigation reports. You verify a draft \
against its source data, identify citation errors, factual mismatches, missing analysis \
and unclear reasoning, and you correct what can be corrected from the record.";

// ── Stage instructions ───────────────────────────────────────────────────

const EXTRACT_INSTRUCTION: &str = "\
Read the attached prosecution history (and the issued patent, if attached) and return a \
single JSON object with exactly these keys:\n\
- `metadata`: application_number, patent_number, title, filing_date, issue_date, \
inventors, assignee, art_unit, tech_center, examiner\n\
- `events`: every prosecution event in date order, with date, type, document and pin cite\n\
- `claims_diff`: each claim's original and final text with the amendments between them\n\
- `key_quotes`: verbatim applicant and examiner statements that bear on claim scope\n\
- `search_records`: the examiner's search strategies, databases and classifications\n\
- `record_discrepancies`: anything in the record that is internally inconsistent\n\
Return JSON only.";

const CLAIM_CONSTRUCTION_INSTRUCTION: &str = "\
Perform Stage 2A: claim construction and prosecution history estoppel. Using the \
extraction and tech pack below, return JSON with:\n\
- `claim_construction_rows`: one row per disputed or narrowed term with the construction \
supported by the record and its citations\n\
- `estoppel_matrix_rows`: one row per claim element surrendered by amendment or argument\n\
- `construction_summary` and `estoppel_summary`: short prose summaries\n\
Return JSON only.";

const SEARCH_TECHNICAL_INSTRUCTION: &str = "\
Perform Stage 2B: search quality and technical premise. Using the extraction, the 2A \
claim construction and the tech pack, return JSON with:\n\
- `technical_reps`: technical representations the applicant made to gain allowance\n\
- `search_gap_analysis`: areas the examiner's search did not reach\n\
- `convergence_rows`: prior art references and the claim elements each one reaches\n\
- `technical_summary` and `search_summary`\n\
Return JSON only.";

const TIMELINE_INSTRUCTION: &str = "\
Perform Stage 2C: timeline and global synthesis. Using the extraction events, the 2A claim \
construction and the tech pack, return JSON with:\n\
- `event_forensics`: one row per significant event with its litigation significance\n\
- `global_findings`: patterns across the whole prosecution, or null if none\n\
- `timeline_summary`\n\
Return JSON only.";

const WRITE_INSTRUCTION: &str = "\
Write the Stage 3 patent litigation report in Markdown from the extraction and the \
forensic record below. Include an executive summary, claim construction, estoppel, \
prior art and search analysis, a prosecution timeline and strategic recommendations. \
If clarifications are provided, incorporate them. Return only the report.";

const REVISE_INSTRUCTION: &str = "\
Revise the current report to resolve every QC issue listed. Keep everything that is \
correct, fix what is wrong, and add analysis the issues say is missing. Return only the \
full revised report in Markdown.";

const QC_INSTRUCTION: &str = "\
Perform Stage 4 quality control on the report below against the extraction and forensic \
record. Respond with exactly two sections.\n\n\
### QC_JSON_OUTPUT\n\
A ```json block with `quality_grade` (A-F), `qc_issues` (each with `type`, `severity` \
critical|major|minor, `location`, `description`, `correction`), `auto_fixes_applied` and \
`summary`. Use type `missing_analysis`, `unclear_reasoning` or `data_mismatch` when the \
issue cannot be fixed without further information.\n\n\
### FINAL_REPORT_OUTPUT\n\
A ```markdown block with the corrected report.";

const CLARIFY_INSTRUCTION: &str = "\
Answer each question below using only the extraction and forensic record. Return a JSON \
object mapping each question, verbatim, to its answer. If the record cannot answer a \
question, say so in the answer.";

const SEARCH_INTEL_INSTRUCTION: &str = "\
Prepare a search intelligence report in Markdown. From the examiner's search records, the \
convergence analysis and the technical representations, assess what the examiner searched, \
what was missed, and where invalidity searching should focus. Return only the report.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_model_stage_has_a_prompt() {
        let prompts = patent_prompts();
        for stage in [
            StageKind::Extract,
            StageKind::ClaimConstruction,
            StageKind::SearchTechnical,
            StageKind::Timeline,
            StageKind::Write,
            StageKind::Revise,
            StageKind::Qc,
            StageKind::Clarify,
            StageKind::SearchIntel,
        ] {
            assert!(prompts.contains(stage), "{stage}");
            assert!(!prompts.get(stage).system.is_empty());
        }
        assert!(!prompts.contains(StageKind::Ingest));
    }

    #[test]
    fn qc_prompt_names_both_markers() {
        let qc = patent_prompts().get(StageKind::Qc).instruction;
        assert!(qc.contains("QC_JSON_OUTPUT"));
        assert!(qc.contains("FINAL_REPORT_OUTPUT"));
    }
}
