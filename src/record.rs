//! Patient records and correction patches.
//!
//! The model is asked for a closed set of columns, so a [`Record`] is a
//! fixed-schema struct rather than an open JSON map. Keys outside the schema
//! are ignored on input; absent fields are omitted on output.
//!
//! Values are kept as strings. Models frequently answer `"Suhu Badan": 36.5`
//! instead of `"36.5"`; scalars of any JSON type are accepted and stored as
//! their JSON text. A list such as `["Paracetamol", "CTM"]` is joined with
//! `", "`, and an object is kept as its JSON text, so one odd cell never
//! costs the whole row.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Record number assigned by the model (string or integer in the JSON).
///
/// It is the only merge key. Two ids match when their trimmed textual forms
/// are equal, so `"1"` and `1` refer to the same record.
#[derive(Debug, Clone)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl RecordId {
    /// Canonical key used for matching patches to records.
    pub fn key(&self) -> String {
        match self {
            RecordId::Number(n) => n.to_string(),
            RecordId::Text(s) => s.trim().to_string(),
        }
    }
}

impl PartialEq for RecordId {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for RecordId {}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{n}"),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl From<usize> for RecordId {
    fn from(n: usize) -> Self {
        RecordId::Number(n as i64)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Text(s.to_string())
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RecordId::Number(n) => serializer.serialize_i64(*n),
            RecordId::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(RecordId::Number(i)),
                None => Ok(RecordId::Text(n.to_string())),
            },
            Value::String(s) => Ok(RecordId::Text(s)),
            other => Err(D::Error::custom(format!(
                "record number must be a string or integer, got {other}"
            ))),
        }
    }
}

/// Accept any JSON scalar as an optional string; `null` means absent.
fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(Value::Array(items)) => {
            let joined = items
                .iter()
                .filter_map(cell_text)
                .collect::<Vec<_>>()
                .join(", ");
            Ok((!joined.is_empty()).then_some(joined))
        }
        Some(other @ Value::Object(_)) => Ok(Some(other.to_string())),
    }
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Alternative keys models use for a column, mapped to its label.
const KEY_ALIASES: [(&str, &str); 7] = [
    ("Nomor Induk Kependudukan (NIK)", "NIK"),
    ("Nomor Induk Kependudukan", "NIK"),
    ("Suhu Badan (Celsius)", "Suhu Badan"),
    ("Tekanan Darah (mmHg)", "Tekanan Darah"),
    ("Berat Badan (kg)", "Berat Badan"),
    ("Obat", "Obat/Tindakan"),
    ("Tindakan", "Obat/Tindakan"),
];

/// Rewrite alias keys of a JSON object to their column label.
///
/// When a label and one of its aliases are both present, the first non-null
/// value wins, looking at the label itself before any alias.
fn canonical_keys(value: Value) -> Value {
    let Value::Object(entries) = value else {
        return value;
    };
    let mut out = Map::with_capacity(entries.len());
    let mut aliased = Vec::new();
    for (key, v) in entries {
        match KEY_ALIASES.iter().find(|(alias, _)| *alias == key) {
            Some((_, label)) => aliased.push((*label, v)),
            None => {
                out.insert(key, v);
            }
        }
    }
    for (label, v) in aliased {
        if out.get(label).is_none_or(Value::is_null) {
            out.insert(label.to_string(), v);
        }
    }
    Value::Object(out)
}

/// Like [`scalar`], but remembers that the key was present.
///
/// Only called by serde when the key exists, so `Some(None)` is an explicit
/// `null` and the outer `None` (from `#[serde(default)]`) is an absent key.
fn present<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Option<String>>, D::Error> {
    scalar(deserializer).map(Some)
}

/// One patient entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "No", default, skip_serializing_if = "Option::is_none")]
    pub no: Option<RecordId>,

    #[serde(
        rename = "Nama Pasien",
        default,
        deserialize_with = "scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,

    #[serde(
        rename = "Alamat",
        default,
        deserialize_with = "scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub address: Option<String>,

    #[serde(
        rename = "NIK",
        default,
        deserialize_with = "scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub nik: Option<String>,

    #[serde(
        rename = "Suhu Badan",
        default,
        deserialize_with = "scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub temperature: Option<String>,

    #[serde(
        rename = "Tekanan Darah",
        default,
        deserialize_with = "scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub blood_pressure: Option<String>,

    #[serde(
        rename = "Berat Badan",
        default,
        deserialize_with = "scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub weight: Option<String>,

    #[serde(
        rename = "Tanggal Kunjungan",
        default,
        deserialize_with = "scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub visit_date: Option<String>,

    #[serde(
        rename = "Tanggal Lahir",
        default,
        deserialize_with = "scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub birth_date: Option<String>,

    #[serde(
        rename = "Jenis Kelamin",
        default,
        deserialize_with = "scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub sex: Option<String>,

    #[serde(
        rename = "Usia",
        default,
        deserialize_with = "scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub age: Option<String>,

    #[serde(
        rename = "Diagnosa",
        default,
        deserialize_with = "scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub diagnosis: Option<String>,

    #[serde(
        rename = "Obat/Tindakan",
        default,
        deserialize_with = "scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub treatment: Option<String>,
}

impl Record {
    /// Build a record from one element of a model reply, accepting the
    /// alternative column names models tend to use.
    pub fn from_json_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(canonical_keys(value))
    }

    /// Value of a data column (everything except the record number).
    pub fn get(&self, field: Field) -> Option<&str> {
        self.slot(field).as_deref()
    }

    /// Overwrite a data column.
    pub fn set(&mut self, field: Field, value: Option<String>) {
        *self.slot_mut(field) = value;
    }

    fn slot(&self, field: Field) -> &Option<String> {
        match field {
            Field::Name => &self.name,
            Field::Address => &self.address,
            Field::Nik => &self.nik,
            Field::Temperature => &self.temperature,
            Field::BloodPressure => &self.blood_pressure,
            Field::Weight => &self.weight,
            Field::VisitDate => &self.visit_date,
            Field::BirthDate => &self.birth_date,
            Field::Sex => &self.sex,
            Field::Age => &self.age,
            Field::Diagnosis => &self.diagnosis,
            Field::Treatment => &self.treatment,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Name => &mut self.name,
            Field::Address => &mut self.address,
            Field::Nik => &mut self.nik,
            Field::Temperature => &mut self.temperature,
            Field::BloodPressure => &mut self.blood_pressure,
            Field::Weight => &mut self.weight,
            Field::VisitDate => &mut self.visit_date,
            Field::BirthDate => &mut self.birth_date,
            Field::Sex => &mut self.sex,
            Field::Age => &mut self.age,
            Field::Diagnosis => &mut self.diagnosis,
            Field::Treatment => &mut self.treatment,
        }
    }
}

/// A partial [`Record`] returned by a correction pass.
///
/// Each field is `None` when the key was absent (leave the record alone) and
/// `Some(value)` when present, where `Some(None)` is an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Patch {
    #[serde(rename = "No", default)]
    pub no: Option<RecordId>,

    #[serde(rename = "Nama Pasien", default, deserialize_with = "present")]
    pub name: Option<Option<String>>,

    #[serde(rename = "Alamat", default, deserialize_with = "present")]
    pub address: Option<Option<String>>,

    #[serde(
        rename = "NIK",
        default,
        deserialize_with = "present"
    )]
    pub nik: Option<Option<String>>,

    #[serde(
        rename = "Suhu Badan",
        default,
        deserialize_with = "present"
    )]
    pub temperature: Option<Option<String>>,

    #[serde(
        rename = "Tekanan Darah",
        default,
        deserialize_with = "present"
    )]
    pub blood_pressure: Option<Option<String>>,

    #[serde(
        rename = "Berat Badan",
        default,
        deserialize_with = "present"
    )]
    pub weight: Option<Option<String>>,

    #[serde(rename = "Tanggal Kunjungan", default, deserialize_with = "present")]
    pub visit_date: Option<Option<String>>,

    #[serde(rename = "Tanggal Lahir", default, deserialize_with = "present")]
    pub birth_date: Option<Option<String>>,

    #[serde(rename = "Jenis Kelamin", default, deserialize_with = "present")]
    pub sex: Option<Option<String>>,

    #[serde(rename = "Usia", default, deserialize_with = "present")]
    pub age: Option<Option<String>>,

    #[serde(rename = "Diagnosa", default, deserialize_with = "present")]
    pub diagnosis: Option<Option<String>>,

    #[serde(
        rename = "Obat/Tindakan",
        default,
        deserialize_with = "present"
    )]
    pub treatment: Option<Option<String>>,
}

impl Patch {
    /// Build a patch from one element of a correction reply.
    pub fn from_json_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(canonical_keys(value))
    }

    /// Shallow field-level overwrite: every field present in the patch
    /// replaces the record's value, absent fields are left untouched.
    ///
    /// The record number is never rewritten.
    pub fn apply_to(&self, record: &mut Record) {
        overwrite(&mut record.name, &self.name);
        overwrite(&mut record.address, &self.address);
        overwrite(&mut record.nik, &self.nik);
        overwrite(&mut record.temperature, &self.temperature);
        overwrite(&mut record.blood_pressure, &self.blood_pressure);
        overwrite(&mut record.weight, &self.weight);
        overwrite(&mut record.visit_date, &self.visit_date);
        overwrite(&mut record.birth_date, &self.birth_date);
        overwrite(&mut record.sex, &self.sex);
        overwrite(&mut record.age, &self.age);
        overwrite(&mut record.diagnosis, &self.diagnosis);
        overwrite(&mut record.treatment, &self.treatment);
    }
}

fn overwrite(slot: &mut Option<String>, value: &Option<Option<String>>) {
    if let Some(v) = value {
        *slot = v.clone();
    }
}

/// Data columns of a [`Record`], in display and export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Name,
    Address,
    Nik,
    Temperature,
    BloodPressure,
    Weight,
    VisitDate,
    BirthDate,
    Sex,
    Age,
    Diagnosis,
    Treatment,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::Name,
        Field::Address,
        Field::Nik,
        Field::Temperature,
        Field::BloodPressure,
        Field::Weight,
        Field::VisitDate,
        Field::BirthDate,
        Field::Sex,
        Field::Age,
        Field::Diagnosis,
        Field::Treatment,
    ];

    /// Column label, identical to the JSON key.
    pub fn label(self) -> &'static str {
        match self {
            Field::Name => "Nama Pasien",
            Field::Address => "Alamat",
            Field::Nik => "NIK",
            Field::Temperature => "Suhu Badan",
            Field::BloodPressure => "Tekanan Darah",
            Field::Weight => "Berat Badan",
            Field::VisitDate => "Tanggal Kunjungan",
            Field::BirthDate => "Tanggal Lahir",
            Field::Sex => "Jenis Kelamin",
            Field::Age => "Usia",
            Field::Diagnosis => "Diagnosa",
            Field::Treatment => "Obat/Tindakan",
        }
    }

    /// Look a column up by its label (case-insensitive).
    pub fn from_label(label: &str) -> Option<Field> {
        let label = label.trim();
        Field::ALL
            .into_iter()
            .find(|f| f.label().eq_ignore_ascii_case(label))
    }
}

/// Label of the record-number column.
pub const ID_LABEL: &str = "No";
