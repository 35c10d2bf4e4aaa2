//! NVD CVE API 2.0 response decoding.
//!
//! Every "field may be missing" rule lives here, so the rest of the crate
//! works with a fully-shaped [`FeedRecord`].

use serde::Deserialize;

use crate::Result;

pub const UNKNOWN_ID: &str = "Unknown ID";

/// A single disclosure entry, decoded once at the client boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedRecord {
    pub id: String,
    /// First English description, if any.
    pub description: Option<String>,
    /// Feed-assigned publication timestamp, as sent (e.g. `2024-01-02T10:15:00.000`).
    pub published_at: Option<String>,
    pub references: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CveResponse {
    #[serde(default)]
    vulnerabilities: Vec<VulnerabilityItem>,
}

#[derive(Debug, Deserialize)]
struct VulnerabilityItem {
    #[serde(default)]
    cve: CveItem,
}

#[derive(Debug, Deserialize)]
struct CveItem {
    #[serde(default = "unknown_id")]
    id: String,
    #[serde(default)]
    descriptions: Vec<LangString>,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    references: Vec<Reference>,
}

#[derive(Debug, Deserialize)]
struct LangString {
    #[serde(default)]
    lang: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Reference {
    url: String,
}

fn unknown_id() -> String {
    UNKNOWN_ID.to_string()
}

impl Default for CveItem {
    fn default() -> Self {
        Self {
            id: unknown_id(),
            descriptions: Vec::new(),
            published: None,
            references: Vec::new(),
        }
    }
}

impl From<CveItem> for FeedRecord {
    fn from(cve: CveItem) -> Self {
        let description = cve
            .descriptions
            .into_iter()
            .find(|d| d.lang == "en")
            .map(|d| d.value);

        Self {
            id: cve.id,
            description,
            published_at: cve.published.filter(|p| !p.trim().is_empty()),
            references: cve.references.into_iter().map(|r| r.url).collect(),
        }
    }
}

/// Decode a response body into records, preserving feed order.
pub fn decode_batch(body: &[u8]) -> Result<Vec<FeedRecord>> {
    let resp: CveResponse = serde_json::from_slice(body)?;
    Ok(resp
        .vulnerabilities
        .into_iter()
        .map(|v| FeedRecord::from(v.cve))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_full_record() {
        let body = json!({
          "resultsPerPage": 1,
          "vulnerabilities": [{
            "cve": {
              "id": "CVE-2024-0001",
              "published": "2024-01-02T10:15:00.000",
              "descriptions": [
                { "lang": "es", "value": "hola" },
                { "lang": "en", "value": "A flaw." }
              ],
              "references": [
                { "url": "https://example.com/a", "source": "x" },
                { "url": "https://example.com/b" }
              ]
            }
          }]
        });

        let batch = decode_batch(body.to_string().as_bytes()).unwrap();
        assert_eq!(
            batch,
            vec![FeedRecord {
                id: "CVE-2024-0001".to_string(),
                description: Some("A flaw.".to_string()),
                published_at: Some("2024-01-02T10:15:00.000".to_string()),
                references: vec![
                    "https://example.com/a".to_string(),
                    "https://example.com/b".to_string()
                ],
            }]
        );
    }

    #[test]
    fn missing_fields_take_defaults() {
        let body = json!({
          "vulnerabilities": [
            { "cve": { "descriptions": [{ "lang": "fr", "value": "bonjour" }] } },
            { "cve": { "id": "CVE-2024-0002", "published": "" } }
          ]
        });

        let batch = decode_batch(body.to_string().as_bytes()).unwrap();
        assert_eq!(batch[0].id, UNKNOWN_ID);
        assert_eq!(batch[0].description, None);
        assert_eq!(batch[1].published_at, None);
        assert!(batch[1].references.is_empty());
    }

    #[test]
    fn missing_vulnerabilities_is_empty_batch() {
        let batch = decode_batch(br#"{"totalResults": 0}"#).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn non_json_is_an_error() {
        assert!(decode_batch(b"<html>maintenance</html>").is_err());
    }

    #[test]
    fn keeps_feed_order() {
        let body = json!({
          "vulnerabilities": [
            { "cve": { "id": "B", "published": "2024-01-01" } },
            { "cve": { "id": "A", "published": "2024-01-03" } },
            { "cve": { "id": "C", "published": "2024-01-02" } }
          ]
        });
        let ids: Vec<String> = decode_batch(body.to_string().as_bytes())
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["B", "A", "C"]);
    }
}
