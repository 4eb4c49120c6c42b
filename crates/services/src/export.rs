use std::sync::Arc;

use collect_core::model::{ANONYMOUS_PARTICIPANT, AnswerRecord, PersonalityCode};
use collect_core::{Clock, Schedule};
use tracing::{info, warn};

use crate::archive::{ArchivalService, UploadReceipt, UploadRequest};
use crate::error::ExportError;

const HEADER_WITH_CODE: [&str; 10] = [
    "Participant Name",
    "Personality Code",
    "Phase",
    "Element Type",
    "Cycle Number",
    "Question Number",
    "Question",
    "Answer",
    "Timestamp",
    "Session ID",
];

/// Knobs for export layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Emit the `Personality Code` column in per-phase uploads as well as in
    /// full exports.
    pub include_code_in_phase_upload: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_code_in_phase_upload: true,
        }
    }
}

/// A CSV artifact ready to be written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalExport {
    pub file_name: String,
    pub csv: String,
}

/// Flattens answer records into CSV and ships them locally or to the archive.
///
/// Rows always follow the order of the input records.
#[derive(Clone)]
pub struct ExportPipeline {
    schedule: Schedule,
    archive: Arc<dyn ArchivalService>,
    clock: Clock,
    options: ExportOptions,
}

impl ExportPipeline {
    #[must_use]
    pub fn new(schedule: Schedule, archive: Arc<dyn ArchivalService>) -> Self {
        Self {
            schedule,
            archive,
            clock: Clock::default_clock(),
            options: ExportOptions::default(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn options(&self) -> ExportOptions {
        self.options
    }

    /// CSV with the personality-code column, one row per record.
    #[must_use]
    pub fn to_csv(&self, records: &[AnswerRecord], code: Option<&PersonalityCode>) -> String {
        self.render(records, code, true)
    }

    /// Full dataset as a local CSV file named after the participant and the
    /// current time (to the millisecond).
    #[must_use]
    pub fn export_full(
        &self,
        records: &[AnswerRecord],
        participant_name: &str,
        code: Option<&PersonalityCode>,
    ) -> LocalExport {
        let name = safe_name(participant_name);
        let stamp = self.clock.now().format("%Y%m%d_%H%M%S_%3f");
        LocalExport {
            file_name: format!("{name}_{stamp}.csv"),
            csv: self.to_csv(records, code),
        }
    }

    /// Upload one phase's records tagged with the phase's element and cycle.
    ///
    /// Returns `Ok(None)` without contacting the archive when `records` is empty.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::Upload` if the archive rejects or cannot receive the data.
    ///
    /// # Panics
    ///
    /// Panics if `phase` is zero.
    pub async fn export_phase(
        &self,
        records: &[AnswerRecord],
        phase: u32,
        participant_name: &str,
        code: Option<&PersonalityCode>,
    ) -> Result<Option<UploadReceipt>, ExportError> {
        if records.is_empty() {
            return Ok(None);
        }

        let element_id = self.schedule.element_id(phase);
        let cycle_number = self.schedule.cycle(phase);
        let request = UploadRequest {
            participant_name: safe_name(participant_name),
            personality_code: code.map(|c| c.as_str().to_owned()).unwrap_or_default(),
            csv_content: self.render(records, code, self.options.include_code_in_phase_upload),
            element_id: Some(element_id),
            cycle_number: Some(cycle_number),
        };

        let receipt = self.archive.upload(&request).await?;
        info!(
            phase,
            element_id = element_id.value(),
            cycle_number,
            rows = records.len(),
            file = %receipt.file_name,
            "phase export uploaded"
        );
        Ok(Some(receipt))
    }

    /// Upload the full dataset. Returns `false` on any failure so the caller can
    /// retry or fall back to [`export_full`](Self::export_full).
    pub async fn export_all(
        &self,
        records: &[AnswerRecord],
        participant_name: &str,
        code: Option<&PersonalityCode>,
    ) -> bool {
        let request = UploadRequest {
            participant_name: safe_name(participant_name),
            personality_code: code.map(|c| c.as_str().to_owned()).unwrap_or_default(),
            csv_content: self.to_csv(records, code),
            element_id: None,
            cycle_number: None,
        };

        match self.archive.upload(&request).await {
            Ok(receipt) => {
                info!(rows = records.len(), file = %receipt.file_name, "full export uploaded");
                true
            }
            Err(err) => {
                warn!(error = %err, rows = records.len(), "full export upload failed");
                false
            }
        }
    }

    fn render(
        &self,
        records: &[AnswerRecord],
        code: Option<&PersonalityCode>,
        include_code: bool,
    ) -> String {
        let mut out = String::new();
        let header: Vec<&str> = HEADER_WITH_CODE
            .iter()
            .copied()
            .filter(|column| include_code || *column != "Personality Code")
            .collect();
        push_row(&mut out, header.iter().map(|c| (*c).to_owned()));

        for record in records {
            let mut row = Vec::with_capacity(HEADER_WITH_CODE.len());
            row.push(record.participant_name.clone());
            if include_code {
                row.push(self.code_letter(record, code));
            }
            row.push(record.phase.to_string());
            row.push(record.element_type.clone());
            row.push(record.cycle_number.to_string());
            row.push(record.question_number_in_phase.to_string());
            row.push(record.question.clone());
            row.push(record.answer.clone());
            row.push(record.timestamp_iso());
            row.push(
                record
                    .session_id
                    .as_ref()
                    .map(|id| id.as_str().to_owned())
                    .unwrap_or_default(),
            );
            push_row(&mut out, row.into_iter());
        }
        out
    }

    fn code_letter(&self, record: &AnswerRecord, code: Option<&PersonalityCode>) -> String {
        if record.phase == 0 {
            return String::new();
        }
        code.and_then(|code| code.letter_for(self.schedule.element_index(record.phase)))
            .map(String::from)
            .unwrap_or_default()
    }
}

fn push_row(out: &mut String, fields: impl Iterator<Item = String>) {
    for (index, field) in fields.enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push_str(&escape_field(&field));
    }
    out.push('\n');
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

fn safe_name(participant_name: &str) -> String {
    let trimmed = participant_name.trim();
    if trimmed.is_empty() {
        return ANONYMOUS_PARTICIPANT.to_owned();
    }
    trimmed.replace(['/', '\\'], "_")
}
