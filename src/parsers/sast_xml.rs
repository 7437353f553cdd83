//! Vendor-native SAST XML report parser.
//!
//! Deserializes the scanner's XML result document (`<CxXMLResults>` with
//! `<Query>` groups containing `<Result>` occurrences) while preserving
//! document order, which downstream conversion relies on.

use serde::Deserialize;

use crate::errors::AppError;

/// Root of the native XML report: scan metadata plus per-rule result groups.
#[derive(Debug, Deserialize)]
pub struct CxXmlResults {
    #[serde(rename = "@ScanId", default)]
    pub scan_id: Option<i64>,
    #[serde(rename = "@ProjectId", default)]
    pub project_id: Option<i64>,
    #[serde(rename = "@ProjectName", default)]
    pub project_name: String,
    #[serde(rename = "@TeamFullPathOnReportDate", default)]
    pub team: String,
    #[serde(rename = "@ScanStart", default)]
    pub scan_start: String,
    #[serde(rename = "@CheckmarxVersion", default)]
    pub engine_version: Option<String>,
    #[serde(rename = "@DeepLink", default)]
    pub deep_link: Option<String>,
    #[serde(rename = "Query", default)]
    pub queries: Vec<XmlQuery>,
}

/// One rule (query) with its occurrences, in document order.
#[derive(Debug, Deserialize)]
pub struct XmlQuery {
    #[serde(rename = "@id")]
    pub id: u64,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@cweId", default)]
    pub cwe_id: Option<u32>,
    #[serde(rename = "@Severity", default)]
    pub severity: String,
    #[serde(rename = "@group", default)]
    pub group: Option<String>,
    #[serde(rename = "@Language", default)]
    pub language: Option<String>,
    #[serde(rename = "Result", default)]
    pub results: Vec<XmlResult>,
}

/// One finding occurrence. Attack path nodes below `<Result>` are not
/// consumed by this pipeline and are skipped during deserialization.
#[derive(Debug, Deserialize)]
pub struct XmlResult {
    #[serde(rename = "@FileName", default)]
    pub file_name: String,
    #[serde(rename = "@Line", default)]
    pub line: Option<i32>,
    #[serde(rename = "@Column", default)]
    pub column: Option<i32>,
    #[serde(rename = "@Status", default)]
    pub status: Option<String>,
    #[serde(rename = "@FalsePositive", default)]
    pub false_positive: Option<String>,
    #[serde(rename = "@Severity", default)]
    pub severity: Option<String>,
    #[serde(rename = "@DeepLink", default)]
    pub deep_link: Option<String>,
}

impl CxXmlResults {
    /// Total finding count across all queries.
    pub fn result_count(&self) -> usize {
        self.queries.iter().map(|q| q.results.len()).sum()
    }
}

/// Parse a native XML report from raw provider bytes.
pub fn parse(data: &[u8]) -> Result<CxXmlResults, AppError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| AppError::Internal(format!("report is not valid UTF-8: {e}")))?;
    let report: CxXmlResults = quick_xml::de::from_str(text)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<CxXMLResults ScanId="555" ProjectId="100" ProjectName="App1"
              TeamFullPathOnReportDate="/Org/TeamA"
              ScanStart="Monday, January 1, 2024 12:00:00 AM"
              CheckmarxVersion="9.6.0">
  <Query id="594" cweId="89" name="SQL_Injection" group="CSharp_High_Risk"
         Severity="High" Language="CSharp">
    <Result FileName="src/dao/UserDao.cs" Line="45" Column="12"
            Status="New" FalsePositive="False" Severity="High">
      <Path ResultId="555" PathId="1" SimilarityId="12345"/>
    </Result>
    <Result FileName="src/dao/OrderDao.cs" Line="88" Column="4"
            Status="Recurrent" FalsePositive="False" Severity="High"/>
  </Query>
  <Query id="591" cweId="79" name="Reflected_XSS" group="CSharp_High_Risk"
         Severity="Medium" Language="CSharp">
    <Result FileName="src/web/Search.cs" Line="10" Column="2"
            Status="New" FalsePositive="False" Severity="Medium"/>
  </Query>
</CxXMLResults>"#;

    #[test]
    fn parses_scan_metadata() {
        let report = parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(report.scan_id, Some(555));
        assert_eq!(report.project_id, Some(100));
        assert_eq!(report.project_name, "App1");
        assert_eq!(report.team, "/Org/TeamA");
        assert_eq!(report.engine_version.as_deref(), Some("9.6.0"));
    }

    #[test]
    fn preserves_document_order() {
        let report = parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(report.queries.len(), 2);
        assert_eq!(report.queries[0].id, 594);
        assert_eq!(report.queries[0].name, "SQL_Injection");
        assert_eq!(report.queries[1].id, 591);
        assert_eq!(report.result_count(), 3);
        assert_eq!(report.queries[0].results[0].file_name, "src/dao/UserDao.cs");
        assert_eq!(report.queries[0].results[1].file_name, "src/dao/OrderDao.cs");
    }

    #[test]
    fn result_attributes_extracted() {
        let report = parse(SAMPLE.as_bytes()).unwrap();
        let first = &report.queries[0].results[0];
        assert_eq!(first.line, Some(45));
        assert_eq!(first.column, Some(12));
        assert_eq!(first.status.as_deref(), Some("New"));
        assert_eq!(first.false_positive.as_deref(), Some("False"));
    }

    #[test]
    fn rejects_non_utf8_input() {
        let err = parse(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn empty_report_has_no_queries() {
        let report = parse(br#"<CxXMLResults ProjectName="Empty"/>"#).unwrap();
        assert!(report.queries.is_empty());
        assert_eq!(report.result_count(), 0);
    }
}
