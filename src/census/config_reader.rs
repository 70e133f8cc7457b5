use crate::census::*;

use serde::{Deserialize, Serialize};
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RawColumnConfig {
    pub name: Option<String>,
    pub column_type: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SurveyImportConfig {
    #[serde(rename = "surveyId")]
    pub survey_id: Option<JSValue>,
    #[serde(rename = "fieldMapping")]
    pub field_mapping: Option<JSMap<String, JSValue>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CensusSettings {
    pub columns: Option<Vec<RawColumnConfig>>,
    #[serde(rename = "surveyImport")]
    pub survey_import: Option<SurveyImportConfig>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    #[serde(rename = "electionId")]
    pub election_id: String,
    #[serde(rename = "censusFile")]
    pub census_file: String,
    #[serde(rename = "censusSettings")]
    pub census_settings: Option<CensusSettings>,
}

impl ElectionConfig {
    pub fn raw_columns(&self) -> Vec<RawColumn> {
        self.census_settings
            .as_ref()
            .and_then(|cs| cs.columns.as_ref())
            .map(|cols| {
                cols.iter()
                    .map(|c| RawColumn {
                        name: c.name.clone(),
                        column_type: c.column_type.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn survey_id(&self) -> Option<String> {
        self.survey_import()
            .and_then(|si| si.survey_id.as_ref())
            .and_then(|js| read_js_id(js).ok())
    }

    /// The field mapping of the survey import. Missing when no survey is configured.
    pub fn field_mapping(&self) -> CensusResult<FieldMapping> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        if let Some(fm) = self.survey_import().and_then(|si| si.field_mapping.as_ref()) {
            for (column, question) in fm.iter() {
                let q = match question {
                    JSValue::Null => "".to_string(),
                    js => read_js_id(js)?,
                };
                pairs.push((column.clone(), q));
            }
        }
        Ok(FieldMapping::new(&pairs))
    }

    fn survey_import(&self) -> Option<&SurveyImportConfig> {
        self.census_settings
            .as_ref()
            .and_then(|cs| cs.survey_import.as_ref())
    }
}

pub fn read_config(path: &str) -> CensusResult<ElectionConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: ElectionConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

pub fn read_summary(path: &str) -> CensusResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

/// Reads an identifier written either as a JSON string or as a JSON integer.
pub fn read_js_id(x: &JSValue) -> CensusResult<String> {
    match x {
        JSValue::Number(n) => n
            .as_u64()
            .map(|x| x.to_string())
            .context(ParsingJsonNumberSnafu {}),
        JSValue::String(s) => Ok(s.trim().to_string()),
        _ => None.context(ParsingJsonNumberSnafu {}),
    }
}
