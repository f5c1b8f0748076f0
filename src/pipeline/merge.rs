//! Patch merge engine.
//!
//! Correction passes answer with deltas only: for each record they want to
//! change, the record number plus the corrected fields. This module folds an
//! ordered list of those delta arrays onto the base records.
//!
//! Rules:
//! - the base must be a JSON array of records, anything else fails the merge;
//! - a patch array that does not parse is treated as `[]`;
//! - patch entries without a record number are dropped silently;
//! - patches apply in the order given, later ones winning per field.

use crate::error::MergeError;
use crate::record::{Patch, Record};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Record number → patch, built from one patch array.
#[derive(Debug, Default)]
pub struct PatchMap {
    patches: HashMap<String, Patch>,
}

impl PatchMap {
    /// Build a map from a sanitized patch array.
    ///
    /// Never fails: text that is not a JSON array contributes an empty map.
    pub fn from_json(text: &str) -> Self {
        let entries = match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                warn!("Patch is not a JSON array; skipping it");
                Vec::new()
            }
            Err(e) => {
                warn!("Patch is not valid JSON ({e}); skipping it");
                Vec::new()
            }
        };
        Self::from_values(entries)
    }

    fn from_values(entries: Vec<Value>) -> Self {
        let mut patches = HashMap::with_capacity(entries.len());
        for entry in entries {
            let patch = match Patch::from_json_value(entry) {
                Ok(p) => p,
                Err(e) => {
                    debug!("Dropping invalid patch entry: {e}");
                    continue;
                }
            };
            if let Some(id) = &patch.no {
                patches.insert(id.key(), patch);
            }
        }
        Self { patches }
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    fn get(&self, record: &Record) -> Option<&Patch> {
        record.no.as_ref().and_then(|id| self.patches.get(&id.key()))
    }
}

/// Parse the base records.
pub fn parse_base(base: &str) -> Result<Vec<Record>, MergeError> {
    let entries = match serde_json::from_str::<Value>(base) {
        Ok(Value::Array(entries)) => entries,
        Ok(other) => return Err(MergeError::NotAnArray(type_name(&other).to_string())),
        Err(e) => return Err(MergeError::NotAnArray(e.to_string())),
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            Record::from_json_value(entry).map_err(|e| MergeError::InvalidRecord {
                index,
                detail: e.to_string(),
            })
        })
        .collect()
}

/// Apply patch maps to records in order.
///
/// Records without a record number pass through unmodified.
pub fn apply_patches(mut records: Vec<Record>, maps: &[PatchMap]) -> Vec<Record> {
    for record in &mut records {
        for map in maps {
            if let Some(patch) = map.get(record) {
                patch.apply_to(record);
            }
        }
    }
    records
}

/// Merge base records with patch arrays, returning typed records.
pub fn merge_records<S: AsRef<str>>(base: &str, patches: &[S]) -> Result<Vec<Record>, MergeError> {
    let records = parse_base(base)?;
    let maps: Vec<PatchMap> = patches
        .iter()
        .map(|p| PatchMap::from_json(p.as_ref()))
        .collect();
    debug!(
        "Merging {} records with {} patch arrays ({} entries)",
        records.len(),
        maps.len(),
        maps.iter().map(PatchMap::len).sum::<usize>()
    );
    Ok(apply_patches(records, &maps))
}

/// Merge base records with patch arrays, returning pretty-printed JSON.
pub fn merge<S: AsRef<str>>(base: &str, patches: &[S]) -> Result<String, MergeError> {
    let records = merge_records(base, patches)?;
    Ok(serde_json::to_string_pretty(&records)?)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordId;
    use serde_json::json;

    const NO_PATCHES: [&str; 0] = [];

    fn as_value(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn later_patch_wins_per_field() {
        let base = r#"[{"No":"1","Nama Pasien":"SUGIYANTO"}]"#;
        let p1 = r#"[{"No":"1","Tanggal Kunjungan":"05-08-2025"}]"#;
        let p2 = r#"[{"No":"1","Nama Pasien":"SUGIYANTO WIBOWO"}]"#;
        let merged = merge(base, &[p1, p2]).unwrap();
        assert_eq!(
            as_value(&merged),
            json!([{"No":"1","Nama Pasien":"SUGIYANTO WIBOWO","Tanggal Kunjungan":"05-08-2025"}])
        );
    }

    #[test]
    fn order_is_significant() {
        let base = r#"[{"No":"1","Alamat":"A"}]"#;
        let first = r#"[{"No":"1","Alamat":"B"}]"#;
        let second = r#"[{"No":"1","Alamat":"C"}]"#;
        let ab = merge_records(base, &[first, second]).unwrap();
        let ba = merge_records(base, &[second, first]).unwrap();
        assert_eq!(ab[0].address.as_deref(), Some("C"));
        assert_eq!(ba[0].address.as_deref(), Some("B"));
    }

    #[test]
    fn untouched_fields_keep_base_value() {
        let base = r#"[{"No":1,"Nama Pasien":"SRI","Diagnosa":"batuk"},{"No":2,"Nama Pasien":"TONO"}]"#;
        let p = r#"[{"No":2,"Diagnosa":"adem panas"}]"#;
        let merged = merge_records(base, &[p]).unwrap();
        assert_eq!(merged[0].diagnosis.as_deref(), Some("batuk"));
        assert_eq!(merged[0].name.as_deref(), Some("SRI"));
        assert_eq!(merged[1].name.as_deref(), Some("TONO"));
        assert_eq!(merged[1].diagnosis.as_deref(), Some("adem panas"));
    }

    #[test]
    fn zero_patches_is_identity() {
        let base = r#"[{"No":"1","Nama Pasien":"SRI","Usia":"30 tahun"},{"Alamat":"X"}]"#;
        let merged = merge(base, &NO_PATCHES).unwrap();
        assert_eq!(as_value(&merged), as_value(base));
    }

    #[test]
    fn patch_without_id_is_dropped() {
        let base = r#"[{"No":"1","Nama Pasien":"SRI"}]"#;
        let p = r#"[{"Nama Pasien":"SRI WAHYUNI"}]"#;
        let merged = merge_records(base, &[p]).unwrap();
        assert_eq!(merged[0].name.as_deref(), Some("SRI"));
        assert!(PatchMap::from_json(p).is_empty());
    }

    #[test]
    fn malformed_patch_is_treated_as_empty() {
        let base = r#"[{"No":"1","Nama Pasien":"SRI"}]"#;
        let good = r#"[{"No":"1","Usia":"40 tahun"}]"#;
        let merged = merge_records(base, &["not json", good, r#"{"No":"1"}"#]).unwrap();
        assert_eq!(merged[0].age.as_deref(), Some("40 tahun"));
        assert_eq!(merged[0].name.as_deref(), Some("SRI"));
    }

    #[test]
    fn invalid_patch_entries_are_dropped_individually() {
        let map = PatchMap::from_json(r#"[42, {"No":{"x":1},"Diagnosa":"ISPA"}, {"No":"2","Usia":"5 tahun"}]"#);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn base_without_id_passes_through() {
        let base = r#"[{"Nama Pasien":"ANON"}]"#;
        let p = r#"[{"No":"1","Nama Pasien":"X"}]"#;
        let merged = merge_records(base, &[p]).unwrap();
        assert_eq!(merged[0].name.as_deref(), Some("ANON"));
    }

    #[test]
    fn numeric_patch_id_matches_text_base_id() {
        let base = r#"[{"No":"3","Alamat":"TARAMAN"}]"#;
        let p = r#"[{"No":3,"Alamat":"TARAMAN RT 12, TARAMAN, SIDOHARJO, SRAGEN"}]"#;
        let merged = merge_records(base, &[p]).unwrap();
        assert_eq!(
            merged[0].address.as_deref(),
            Some("TARAMAN RT 12, TARAMAN, SIDOHARJO, SRAGEN")
        );
        assert_eq!(merged[0].no, Some(RecordId::Text("3".into())));
    }

    #[test]
    fn duplicate_ids_in_one_patch_last_wins() {
        let base = r#"[{"No":"1"}]"#;
        let p = r#"[{"No":"1","Usia":"1 tahun"},{"No":"1","Usia":"2 tahun"}]"#;
        let merged = merge_records(base, &[p]).unwrap();
        assert_eq!(merged[0].age.as_deref(), Some("2 tahun"));
    }

    #[test]
    fn base_not_an_array_fails() {
        assert!(matches!(
            merge(r#"{"No":"1"}"#, &NO_PATCHES),
            Err(MergeError::NotAnArray(_))
        ));
        assert!(matches!(
            merge("garbage", &NO_PATCHES),
            Err(MergeError::NotAnArray(_))
        ));
    }

    #[test]
    fn base_with_invalid_element_fails() {
        let err = merge(r#"[{"No":"1"}, "two"]"#, &NO_PATCHES).unwrap_err();
        assert!(matches!(err, MergeError::InvalidRecord { index: 1, .. }));
    }
}
