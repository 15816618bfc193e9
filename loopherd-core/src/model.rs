use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Lifecycle of a loop specification. Anything containing "archive" is
/// treated as archived so legacy records ("archived", "archive:2020")
/// stay dormant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopStatus {
    Active,
    Muted,
    Archived,
    Other(String),
}

impl LoopStatus {
    pub fn parse(raw: &str) -> Self {
        if raw.contains("archive") {
            LoopStatus::Archived
        } else {
            match raw {
                "active" | "" => LoopStatus::Active,
                "muted" => LoopStatus::Muted,
                other => LoopStatus::Other(other.to_string()),
            }
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LoopStatus::Active => "active",
            LoopStatus::Muted => "muted",
            LoopStatus::Archived => "archived",
            LoopStatus::Other(s) => s,
        }
    }
}

/// A persisted playback specification bound to a source. Absent hash
/// fields stay `None`; the reconciler skips what it cannot compare.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopRecord {
    pub uuid: String,
    pub filename: String,
    pub filehash: Option<String>,
    pub status: LoopStatus,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub volume: Option<String>,
    pub pid: Option<i32>,
}

impl LoopRecord {
    /// Build from a stored hash. `None` when the record is unusable
    /// (no uuid or no filename to play).
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        let uuid = fields.get("uuid")?.clone();
        let filename = fields.get("filename")?.clone();
        Some(Self {
            uuid,
            filename,
            filehash: fields.get("filehash").cloned(),
            status: fields
                .get("status")
                .map(|s| LoopStatus::parse(s))
                .unwrap_or(LoopStatus::Active),
            start: fields.get("start").and_then(|v| v.parse().ok()),
            end: fields.get("end").and_then(|v| v.parse().ok()),
            volume: fields.get("volume").cloned(),
            pid: fields.get("pid").and_then(|v| v.parse().ok()),
        })
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("uuid".into(), self.uuid.clone()),
            ("filename".into(), self.filename.clone()),
            ("status".into(), self.status.as_str().to_string()),
        ];
        if let Some(hash) = &self.filehash {
            fields.push(("filehash".into(), hash.clone()));
        }
        if let Some(start) = self.start {
            fields.push(("start".into(), start.to_string()));
        }
        if let Some(end) = self.end {
            fields.push(("end".into(), end.to_string()));
        }
        if let Some(volume) = &self.volume {
            fields.push(("volume".into(), volume.clone()));
        }
        if let Some(pid) = self.pid {
            fields.push(("pid".into(), pid.to_string()));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn status_parsing() {
        assert_eq!(LoopStatus::parse("active"), LoopStatus::Active);
        assert_eq!(LoopStatus::parse("archived"), LoopStatus::Archived);
        assert_eq!(LoopStatus::parse("archive:old"), LoopStatus::Archived);
        assert_eq!(LoopStatus::parse("muted"), LoopStatus::Muted);
        assert_eq!(
            LoopStatus::parse("pinned"),
            LoopStatus::Other("pinned".into())
        );
    }

    #[test]
    fn record_from_full_hash() {
        let rec = LoopRecord::from_fields(&fields(&[
            ("uuid", "u1"),
            ("filename", "clip.mp4"),
            ("filehash", "abcd"),
            ("status", "active"),
            ("start", "10"),
            ("end", "20.5"),
            ("volume", "85"),
            ("pid", "4242"),
        ]))
        .unwrap();
        assert_eq!(rec.start, Some(10.0));
        assert_eq!(rec.end, Some(20.5));
        assert_eq!(rec.volume.as_deref(), Some("85"));
        assert_eq!(rec.pid, Some(4242));
    }

    #[test]
    fn absent_fields_are_none_not_errors() {
        let rec =
            LoopRecord::from_fields(&fields(&[("uuid", "u1"), ("filename", "clip.mp4")])).unwrap();
        assert_eq!(rec.start, None);
        assert_eq!(rec.end, None);
        assert_eq!(rec.volume, None);
        assert_eq!(rec.pid, None);
        assert_eq!(rec.status, LoopStatus::Active);
    }

    #[test]
    fn unusable_record_is_rejected() {
        assert!(LoopRecord::from_fields(&fields(&[("uuid", "u1")])).is_none());
        assert!(LoopRecord::from_fields(&fields(&[("filename", "f")])).is_none());
    }

    #[test]
    fn round_trip_through_fields() {
        let rec = LoopRecord {
            uuid: "u9".into(),
            filename: "a.mp4".into(),
            filehash: Some("ff".into()),
            status: LoopStatus::Muted,
            start: Some(1.5),
            end: None,
            volume: Some("100".into()),
            pid: None,
        };
        let map: HashMap<String, String> = rec.to_fields().into_iter().collect();
        assert_eq!(LoopRecord::from_fields(&map).unwrap(), rec);
    }
}
