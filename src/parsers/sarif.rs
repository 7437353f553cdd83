//! SARIF 2.1.0 report converter.
//!
//! Maps the vendor-native XML result document plus per-rule risk and
//! recommendation text into a SARIF log. Conversion is pure and
//! deterministic: finding order follows the native document, rules appear
//! in first-seen order, and map-valued fields use ordered containers so
//! re-converting identical inputs yields byte-identical output.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::errors::AppError;
use crate::parsers::sast_xml::{self, CxXmlResults};
use crate::services::fingerprint;

pub const SARIF_VERSION: &str = "2.1.0";
pub const SARIF_SCHEMA: &str =
    "https://docs.oasis-open.org/sarif/sarif/v2.1.0/cos02/schemas/sarif-schema-2.1.0.json";

// -- SARIF 2.1.0 schema (subset this pipeline populates) --

#[derive(Debug, Serialize)]
pub struct SarifLog {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub version: String,
    pub runs: Vec<SarifRun>,
}

#[derive(Debug, Serialize)]
pub struct SarifRun {
    pub tool: SarifTool,
    pub results: Vec<SarifResult>,
    pub properties: RunProperties,
}

#[derive(Debug, Serialize)]
pub struct SarifTool {
    pub driver: SarifDriver,
}

#[derive(Debug, Serialize)]
pub struct SarifDriver {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub rules: Vec<SarifRule>,
}

#[derive(Debug, Serialize)]
pub struct SarifRule {
    pub id: String,
    pub name: String,
    #[serde(rename = "fullDescription", skip_serializing_if = "Option::is_none")]
    pub full_description: Option<SarifMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<SarifMessage>,
    #[serde(rename = "defaultConfiguration")]
    pub default_configuration: SarifConfiguration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<RuleProperties>,
}

#[derive(Debug, Serialize)]
pub struct SarifMessage {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SarifConfiguration {
    pub level: String,
}

#[derive(Debug, Serialize)]
pub struct RuleProperties {
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SarifResult {
    #[serde(rename = "ruleId")]
    pub rule_id: String,
    #[serde(rename = "ruleIndex")]
    pub rule_index: usize,
    pub level: String,
    pub message: SarifMessage,
    pub locations: Vec<SarifLocation>,
    #[serde(rename = "partialFingerprints")]
    pub partial_fingerprints: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct SarifLocation {
    #[serde(rename = "physicalLocation")]
    pub physical_location: SarifPhysicalLocation,
}

#[derive(Debug, Serialize)]
pub struct SarifPhysicalLocation {
    #[serde(rename = "artifactLocation")]
    pub artifact_location: SarifArtifactLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<SarifRegion>,
}

#[derive(Debug, Serialize)]
pub struct SarifArtifactLocation {
    pub uri: String,
}

#[derive(Debug, Serialize)]
pub struct SarifRegion {
    #[serde(rename = "startLine", skip_serializing_if = "Option::is_none")]
    pub start_line: Option<i32>,
    #[serde(rename = "startColumn", skip_serializing_if = "Option::is_none")]
    pub start_column: Option<i32>,
}

/// Run metadata carried alongside the results. The scan start timestamp
/// comes from the native report, never from the wall clock, so identical
/// inputs convert to identical bytes.
#[derive(Debug, Serialize)]
pub struct RunProperties {
    #[serde(rename = "projectId", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    #[serde(rename = "projectName")]
    pub project_name: String,
    pub team: String,
    #[serde(rename = "scanId", skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<i64>,
    #[serde(rename = "scanStart")]
    pub scan_start: String,
}

/// Map vendor severity to SARIF level.
pub fn sarif_level(severity: &str) -> &'static str {
    match severity.to_ascii_lowercase().as_str() {
        "high" | "critical" => "error",
        "medium" => "warning",
        "low" => "note",
        "information" | "info" => "none",
        _ => "warning",
    }
}

/// Convert a parsed native report into a SARIF log, attaching per-rule
/// risk text (`fullDescription`) and recommendation text (`help`) from the
/// supplied mappings.
pub fn to_sarif(
    native: &CxXmlResults,
    risk_by_rule: &HashMap<u64, String>,
    recommendation_by_rule: &HashMap<u64, String>,
) -> SarifLog {
    let mut rules: Vec<SarifRule> = Vec::new();
    let mut rule_index_by_id: HashMap<u64, usize> = HashMap::new();

    for query in &native.queries {
        if rule_index_by_id.contains_key(&query.id) {
            continue;
        }
        rule_index_by_id.insert(query.id, rules.len());
        rules.push(SarifRule {
            id: query.id.to_string(),
            name: query.name.clone(),
            full_description: non_empty_message(risk_by_rule.get(&query.id)),
            help: non_empty_message(recommendation_by_rule.get(&query.id)),
            default_configuration: SarifConfiguration {
                level: sarif_level(&query.severity).to_string(),
            },
            properties: query.cwe_id.map(|cwe| RuleProperties {
                tags: vec![format!("CWE-{cwe}")],
            }),
        });
    }

    let mut results: Vec<SarifResult> = Vec::new();
    for query in &native.queries {
        let rule_index = rule_index_by_id[&query.id];
        for result in &query.results {
            let severity = result.severity.as_deref().unwrap_or(&query.severity);
            let mut partial_fingerprints = BTreeMap::new();
            partial_fingerprints.insert(
                fingerprint::SCHEME.to_string(),
                fingerprint::compute(&native.project_name, &result.file_name, query.id),
            );
            results.push(SarifResult {
                rule_id: query.id.to_string(),
                rule_index,
                level: sarif_level(severity).to_string(),
                message: SarifMessage {
                    text: query.name.clone(),
                },
                locations: vec![SarifLocation {
                    physical_location: SarifPhysicalLocation {
                        artifact_location: SarifArtifactLocation {
                            uri: result.file_name.clone(),
                        },
                        region: Some(SarifRegion {
                            start_line: result.line,
                            start_column: result.column,
                        }),
                    },
                }],
                partial_fingerprints,
            });
        }
    }

    SarifLog {
        schema: SARIF_SCHEMA.to_string(),
        version: SARIF_VERSION.to_string(),
        runs: vec![SarifRun {
            tool: SarifTool {
                driver: SarifDriver {
                    name: "Checkmarx SAST".to_string(),
                    version: native.engine_version.clone(),
                    rules,
                },
            },
            results,
            properties: RunProperties {
                project_id: native.project_id,
                project_name: native.project_name.clone(),
                team: native.team.clone(),
                scan_id: native.scan_id,
                scan_start: native.scan_start.clone(),
            },
        }],
    }
}

/// Parse native report bytes and convert in one step.
pub fn convert(
    data: &[u8],
    risk_by_rule: &HashMap<u64, String>,
    recommendation_by_rule: &HashMap<u64, String>,
) -> Result<SarifLog, AppError> {
    let native = sast_xml::parse(data)?;
    Ok(to_sarif(&native, risk_by_rule, recommendation_by_rule))
}

fn non_empty_message(text: Option<&String>) -> Option<SarifMessage> {
    text.filter(|t| !t.is_empty()).map(|t| SarifMessage {
        text: t.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<CxXMLResults ScanId="555" ProjectId="100"
        ProjectName="App1" TeamFullPathOnReportDate="/Org/TeamA"
        ScanStart="Monday, January 1, 2024 12:00:00 AM" CheckmarxVersion="9.6.0">
      <Query id="594" cweId="89" name="SQL_Injection" Severity="High">
        <Result FileName="src/a.cs" Line="45" Column="12" Severity="High"/>
        <Result FileName="src/b.cs" Line="88" Column="4" Severity="High"/>
      </Query>
      <Query id="591" cweId="79" name="Reflected_XSS" Severity="Medium">
        <Result FileName="src/c.cs" Line="10" Column="2" Severity="Medium"/>
      </Query>
    </CxXMLResults>"#;

    fn maps() -> (HashMap<u64, String>, HashMap<u64, String>) {
        let mut risk = HashMap::new();
        risk.insert(594, "Attacker-controlled SQL.".to_string());
        risk.insert(591, "Script injection into responses.".to_string());
        let mut rec = HashMap::new();
        rec.insert(594, "Use parameterized queries.".to_string());
        (risk, rec)
    }

    #[test]
    fn finding_order_matches_native_order() {
        let (risk, rec) = maps();
        let log = convert(SAMPLE.as_bytes(), &risk, &rec).unwrap();
        let run = &log.runs[0];
        assert_eq!(run.results.len(), 3);
        let uris: Vec<_> = run
            .results
            .iter()
            .map(|r| r.locations[0].physical_location.artifact_location.uri.as_str())
            .collect();
        assert_eq!(uris, vec!["src/a.cs", "src/b.cs", "src/c.cs"]);
    }

    #[test]
    fn conversion_is_deterministic() {
        let (risk, rec) = maps();
        let first = serde_json::to_vec(&convert(SAMPLE.as_bytes(), &risk, &rec).unwrap()).unwrap();
        let second = serde_json::to_vec(&convert(SAMPLE.as_bytes(), &risk, &rec).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rules_in_first_seen_order_with_descriptions() {
        let (risk, rec) = maps();
        let log = convert(SAMPLE.as_bytes(), &risk, &rec).unwrap();
        let rules = &log.runs[0].tool.driver.rules;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, "594");
        assert_eq!(rules[0].name, "SQL_Injection");
        assert_eq!(
            rules[0].full_description.as_ref().unwrap().text,
            "Attacker-controlled SQL."
        );
        assert_eq!(
            rules[0].help.as_ref().unwrap().text,
            "Use parameterized queries."
        );
        // Rule 591 has no recommendation in the map
        assert!(rules[1].help.is_none());
        assert_eq!(rules[1].properties.as_ref().unwrap().tags, vec!["CWE-79"]);
    }

    #[test]
    fn severity_maps_to_sarif_level() {
        assert_eq!(sarif_level("High"), "error");
        assert_eq!(sarif_level("Medium"), "warning");
        assert_eq!(sarif_level("Low"), "note");
        assert_eq!(sarif_level("Information"), "none");
        assert_eq!(sarif_level("odd"), "warning");
    }

    #[test]
    fn results_reference_rules_by_index() {
        let (risk, rec) = maps();
        let log = convert(SAMPLE.as_bytes(), &risk, &rec).unwrap();
        let run = &log.runs[0];
        assert_eq!(run.results[0].rule_index, 0);
        assert_eq!(run.results[2].rule_index, 1);
        assert_eq!(run.results[2].rule_id, "591");
        assert_eq!(run.results[2].level, "warning");
    }

    #[test]
    fn run_metadata_carried_from_native_report() {
        let (risk, rec) = maps();
        let log = convert(SAMPLE.as_bytes(), &risk, &rec).unwrap();
        let props = &log.runs[0].properties;
        assert_eq!(props.project_id, Some(100));
        assert_eq!(props.scan_id, Some(555));
        assert_eq!(props.project_name, "App1");
        assert_eq!(props.team, "/Org/TeamA");
        assert_eq!(props.scan_start, "Monday, January 1, 2024 12:00:00 AM");
    }

    #[test]
    fn fingerprints_are_stable_per_location() {
        let (risk, rec) = maps();
        let log = convert(SAMPLE.as_bytes(), &risk, &rec).unwrap();
        let run = &log.runs[0];
        let fp0 = &run.results[0].partial_fingerprints[fingerprint::SCHEME];
        let fp1 = &run.results[1].partial_fingerprints[fingerprint::SCHEME];
        assert_eq!(fp0.len(), 64);
        assert_ne!(fp0, fp1);
    }

    #[test]
    fn empty_description_maps_omit_rule_text() {
        let log = convert(SAMPLE.as_bytes(), &HashMap::new(), &HashMap::new()).unwrap();
        let rules = &log.runs[0].tool.driver.rules;
        assert!(rules[0].full_description.is_none());
        assert!(rules[0].help.is_none());
    }
}
