//! Prompts for the extraction call and the four correction passes.
//!
//! Every pass after the first answers with deltas only: the record number
//! plus the fields it wants to change, or `[]` when nothing needs fixing.
//! That contract is what lets [`crate::pipeline::merge`] apply the passes
//! as patches instead of diffing whole records.
//!
//! Callers can override the system prompt via
//! [`crate::config::ExtractionConfig::system_prompt`]; the pass prompts are
//! fixed because the merge engine depends on their reply shape.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default system prompt sent at the top of every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a meticulous data-entry assistant for an Indonesian community health clinic.
You read photographed or scanned patient registers (often handwritten, sometimes mixing Indonesian and Javanese) and turn them into JSON.

Always answer with a JSON array and nothing else: no prose, no explanations, no Markdown fences."#;

/// Instructions for the base extraction call.
///
/// Sent together with the address reference dataset and the page image.
pub const EXTRACTION_PROMPT: &str = r#"The JSON document that follows this message is the official address reference (alamat.json). Use it to spell places correctly.

Extract every patient entry from the attached clinic note. For each patient produce one JSON object with exactly these keys:
- "No"                 row number as written on the note (or 1, 2, 3, … in reading order)
- "Nama Pasien"        patient name, without honorifics such as Tn, Ny, Nn, Sdr, dr, An, By
- "Alamat"             address
- "NIK"                national identity number (Nomor Induk Kependudukan)
- "Suhu Badan"         body temperature in °C
- "Tekanan Darah"      blood pressure in mmHg, e.g. "120/80"
- "Berat Badan"        weight in kg
- "Tanggal Kunjungan"  visit date
- "Tanggal Lahir"      birth date
- "Jenis Kelamin"      sex
- "Usia"               age as written
- "Diagnosa"           diagnosis
- "Obat/Tindakan"      medication or treatment

Rules:
- Write every date as DD-MM-YYYY.
- Use an empty string for any field the note does not contain. Never invent values.
- Answer with a JSON array of these objects."#;

/// The four correction passes, in the order they are issued and merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrectionPass {
    /// Normalise addresses against the reference dataset.
    Address,
    /// Re-read patient names and visit dates.
    NameAndVisitDate,
    /// Complete birth dates and recompute ages.
    BirthDateAndAge,
    /// Fix spelling of diagnoses.
    Diagnosis,
}

impl CorrectionPass {
    /// Call order on the shared conversation, which is also the merge order:
    /// a later pass wins when two passes set the same field of a record.
    pub const ORDER: [CorrectionPass; 4] = [
        CorrectionPass::Address,
        CorrectionPass::NameAndVisitDate,
        CorrectionPass::BirthDateAndAge,
        CorrectionPass::Diagnosis,
    ];

    /// Short name used in logs and progress output.
    pub fn name(self) -> &'static str {
        match self {
            CorrectionPass::Address => "address",
            CorrectionPass::NameAndVisitDate => "name/visit date",
            CorrectionPass::BirthDateAndAge => "birth date/age",
            CorrectionPass::Diagnosis => "diagnosis",
        }
    }

    /// Whether the address reference dataset travels with this pass.
    pub fn needs_reference(self) -> bool {
        matches!(self, CorrectionPass::Address)
    }

    /// Pass-specific instructions. `year` fills in missing years and anchors
    /// age arithmetic.
    pub fn instructions(self, year: i32) -> String {
        match self {
            CorrectionPass::Address => ADDRESS_PROMPT.to_string(),
            CorrectionPass::NameAndVisitDate => NAME_AND_VISIT_DATE_PROMPT.replace("{year}", &year.to_string()),
            CorrectionPass::BirthDateAndAge => BIRTH_DATE_AND_AGE_PROMPT.replace("{year}", &year.to_string()),
            CorrectionPass::Diagnosis => DIAGNOSIS_PROMPT.to_string(),
        }
    }
}

impl fmt::Display for CorrectionPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const DELTA_RULES: &str = r#"Reply ONLY with the records you changed, each as an object holding "No" and the corrected fields.
If nothing needs correcting, reply with an empty JSON array: []"#;

const ADDRESS_PROMPT: &str = r#"Correct the "Alamat" field only.

RT (Rukun Tetangga) and RW (Rukun Warga) are the smallest administrative units in Indonesia. They are followed by a number or code, e.g. RT 1 RW 2, RT 4A, RT 17, RW 14.

Write addresses as: Dukuh RT RW, Desa/Kelurahan, Kecamatan, Kabupaten.
The JSON document after these instructions is the official list of districts (kecamatan), villages (desa/kelurahan) and hamlets (dukuh); match names against it.
If a patient has no address, leave it empty.

Examples of correctly formatted addresses:
- "PIJILAN RT 16 RW 1, JAMBANAN, SIDOHARJO, SRAGEN"
- "PIJILAN RT 4A, JAMBANAN, SIDOHARJO, SRAGEN"
- "GROMPOLAN, JAMBANAN, SIDOHARJO, SRAGEN"

Example reply:
[{"No": "5", "Alamat": "PIJILAN RT 16 RW 1, JAMBANAN, SIDOHARJO, SRAGEN"}]
"#;

const NAME_AND_VISIT_DATE_PROMPT: &str = r#"Compare the JSON with the attached clinic note again and correct "Nama Pasien" and "Tanggal Kunjungan" only.

Names are Indonesian; use your knowledge of common Indonesian and Javanese names to resolve unclear handwriting.

Visit dates:
- If the year of a visit date is unknown, use {year}.
- On photographed registers the visit date is usually the largest writing on the page (often in marker) and applies to the rows below it.
- Rows above the first such date belong to the previous day: use that date minus one day.

Example reply:
[{"No": "5", "Nama Pasien": "SUGIYANTO", "Tanggal Kunjungan": "05-08-{year}"}, {"No": "8", "Tanggal Kunjungan": "05-08-{year}"}]
"#;

const BIRTH_DATE_AND_AGE_PROMPT: &str = r#"Compare the JSON with the attached clinic note again and correct "Tanggal Lahir" and "Usia" only.

Birth dates:
- Only a year is known (e.g. 1975): use 31-12-1975.
- A two-digit year (e.g. 75) means 1975.
- No birth date but an age is known: birth year = {year} - age, month 12, day 31.

Age: compute "Usia" as the visit date minus the birth date, written like "30 tahun 2 bulan 3 hari".

Example reply:
[{"No": "5", "Tanggal Lahir": "31-12-1975", "Usia": "49 tahun 7 bulan 5 hari"}]
"#;

const DIAGNOSIS_PROMPT: &str = r#"Act as a medical professional. Compare the JSON with the attached clinic note again and correct "Diagnosa" only.

Diagnoses are often written in a mix of Indonesian and Javanese. Fix spelling mistakes (e.g. "ademponan" -> "adem panas") without translating between the two languages.

Example reply:
[{"No": "3", "Diagnosa": "adem panas"}]
"#;

/// Build the user message for a correction pass.
///
/// Always embeds the original extraction, never an already-patched version,
/// so each pass corrects the same baseline.
pub fn correction_message(base_json: &str, pass: CorrectionPass, year: i32) -> String {
    format!(
        "JSON data to correct:\n{}\n\n{}\n{}",
        base_json,
        pass.instructions(year),
        DELTA_RULES
    )
}
