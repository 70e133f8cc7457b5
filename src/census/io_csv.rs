// Reading of census uploads.

use std::fs::File;
use std::io::BufReader;

use crate::census::*;

pub fn read_census_upload(
    path: &str,
    schema: &ColumnSchema,
    registry: &TypeRegistry,
) -> CensusResult<CensusData> {
    info!("Attempting to read census upload {:?}", path);
    let file = File::open(path).context(OpeningCsvSnafu { path })?;
    let data = run_census_import_from(BufReader::new(file), schema, registry);
    for issue in data.issues.iter() {
        warn!("read_census_upload: {}: {}", path, issue);
    }
    Ok(data)
}

pub fn census_data_to_json(data: &CensusData) -> JSValue {
    let issues: Vec<JSValue> = data.issues.iter().map(issue_to_json).collect();
    json!({
        "headers": data.headers,
        "records": data.records.len(),
        "duplicatesRemoved": data.duplicates_removed,
        "blankRows": data.blank_rows,
        "alreadyInCensus": data.already_in_census,
        "issues": issues,
    })
}

fn issue_to_json(issue: &ValidationIssue) -> JSValue {
    match issue {
        ValidationIssue::CsvError { message } => {
            json!({"code": issue.code(), "message": message})
        }
        ValidationIssue::HeaderError { columns, .. } => {
            json!({"code": issue.code(), "columns": columns})
        }
        ValidationIssue::RowError { row, column, kind } => {
            json!({"code": issue.code(), "row": row, "column": column, "error": kind.as_str()})
        }
    }
}
