use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminator written into every record so rich queries
///  can scope themselves to this entity in a shared keyspace
pub const DOC_TYPE: &str = "cidRecord";

/// Current on-ledger schema version. Records written before the
///  field existed deserialize with version `0`.
pub const SCHEMA_VERSION: u32 = 1;

fn default_doc_type() -> String {
    DOC_TYPE.to_string()
}

/// Ownership record for a piece of externally stored content.
///
/// Field names on the wire match the ledger format (`cid`, `fileName`,
///  `docType`) so records written by earlier deployments still read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CidRecord {
    /// Content fingerprint, opaque to the store
    #[serde(rename = "cid")]
    pub fingerprint: String,
    /// Identity of the submitting client, never taken from input
    pub owner: String,
    /// Transaction time of the write
    pub timestamp: DateTime<Utc>,
    pub file_name: String,
    #[serde(rename = "docType", default = "default_doc_type")]
    pub record_type: String,
    #[serde(default)]
    pub schema_version: u32,
}

impl CidRecord {
    pub fn new(
        fingerprint: impl Into<String>,
        owner: impl Into<String>,
        file_name: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            owner: owner.into(),
            timestamp,
            file_name: file_name.into(),
            record_type: default_doc_type(),
            schema_version: SCHEMA_VERSION,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Whether the record was written before schema versioning
    pub fn is_legacy(&self) -> bool {
        self.schema_version == 0
    }
}

/// An entry returned by an owner-wide scan.
///
/// Values that no longer decode as a [`CidRecord`] are surfaced as their
///  raw text rather than failing the whole scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LedgerEntry {
    Record(CidRecord),
    Raw(String),
}

impl LedgerEntry {
    pub fn record(&self) -> Option<&CidRecord> {
        match self {
            LedgerEntry::Record(record) => Some(record),
            LedgerEntry::Raw(_) => None,
        }
    }

    pub fn into_record(self) -> Option<CidRecord> {
        match self {
            LedgerEntry::Record(record) => Some(record),
            LedgerEntry::Raw(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let record = CidRecord::new("Qm123", "user1", "photo.png", Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["cid"], "Qm123");
        assert_eq!(value["owner"], "user1");
        assert_eq!(value["fileName"], "photo.png");
        assert_eq!(value["docType"], DOC_TYPE);
        assert_eq!(value["schemaVersion"], SCHEMA_VERSION);
        assert!(value["timestamp"].as_str().is_some());
    }

    #[test]
    fn test_reads_legacy_records() {
        // written by the first generation contract: no docType, no schema version,
        //  local offset on the timestamp
        let legacy = br#"{"cid":"Qm123","owner":"user1","timestamp":"2024-03-01T10:00:00.5+02:00","fileName":"a.txt"}"#;
        let record = CidRecord::from_slice(legacy).unwrap();
        assert_eq!(record.fingerprint, "Qm123");
        assert_eq!(record.record_type, DOC_TYPE);
        assert!(record.is_legacy());
        assert_eq!(record.timestamp.to_rfc3339(), "2024-03-01T08:00:00.500+00:00");
    }

    #[test]
    fn test_ledger_entry_untagged() {
        let raw = LedgerEntry::Raw("not a record".to_string());
        assert_eq!(serde_json::to_string(&raw).unwrap(), "\"not a record\"");

        let record = CidRecord::new("Qm123", "user1", "a.txt", Utc::now());
        let entry: LedgerEntry =
            serde_json::from_value(serde_json::to_value(&record).unwrap()).unwrap();
        assert_eq!(entry.record(), Some(&record));
    }
}
