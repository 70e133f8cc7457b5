use log::{debug, info, warn};

use census_pipeline::entry::{find_voter, identity_predicate, list_voters, prepare_entry};
use census_pipeline::survey::{
    classify_respondents, status_counts, valid_records, Answer, FieldMapping, Respondent,
    SurveyEntry,
};
use census_pipeline::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::{Args, Command, SurveySource};
use crate::census::census_file::{record_to_json, CensusFile};
use crate::census::config_reader::*;
use crate::census::io_common::resolve_path;

pub mod census_file;
pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_msforms;
pub mod io_survey;

#[derive(Debug, Snafu)]
pub enum CensusError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error serializing the summary"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Expected an identifier (string or positive integer)"))]
    ParsingJsonNumber {},
    #[snafu(display("Error opening the census upload {path}"))]
    OpeningCsv {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The Excel file has no data"))]
    EmptyExcel {},
    #[snafu(display("The worksheet {worksheet} cannot be found in {path}"))]
    MissingWorksheet { path: String, worksheet: String },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("The census file {path} belongs to the election {found}, not {expected}"))]
    ElectionMismatch {
        path: String,
        expected: String,
        found: String,
    },
    #[snafu(display("The census columns are not configured"))]
    ColumnsNotConfigured {},
    #[snafu(display("Invalid census columns: {}", issues.join("; ")))]
    InvalidColumns { issues: Vec<String> },
    #[snafu(display("Invalid survey field mapping: {}", issues.join("; ")))]
    InvalidMapping { issues: Vec<String> },
    #[snafu(display("The upload was rejected: {}", issues.join("; ")))]
    RejectedUpload { issues: Vec<String> },
    #[snafu(display("The census already has {count} voters (use --remove-all to replace them)"))]
    CensusNotEmpty { count: usize },
    #[snafu(display("No valid respondent to import"))]
    NoValidRespondents {},
    #[snafu(display("The entry was refused: {}", issues.join("; ")))]
    EntryRefused { issues: Vec<String> },
    #[snafu(display("No census field was given"))]
    MissingIdentity {},
    #[snafu(display("Input type {input_type} is not supported (json, msforms)"))]
    UnknownInputType { input_type: String },
    #[snafu(display("Census storage error"))]
    Store { source: StoreError },
    #[snafu(display("The summary differs from the reference {path}"))]
    ReferenceMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CensusResult<T> = Result<T, CensusError>;

/// An election, as described by its configuration file.
pub struct Election {
    pub config: ElectionConfig,
    pub root: PathBuf,
    pub registry: TypeRegistry,
}

impl Election {
    pub fn load(config_path: &str) -> CensusResult<Election> {
        let config = read_config(config_path)?;
        info!("Election {:?}, config {:?}", config.election_id, config_path);
        let root = Path::new(config_path)
            .parent()
            .context(MissingParentDirSnafu {})?
            .to_path_buf();
        Ok(Election {
            config,
            root,
            registry: TypeRegistry::builtin(),
        })
    }

    /// The census columns, refused when the configuration is invalid or empty.
    pub fn schema(&self) -> CensusResult<ColumnSchema> {
        let raw = self.config.raw_columns();
        ensure!(!raw.is_empty(), ColumnsNotConfiguredSnafu {});
        check_columns_issues(&raw, &self.registry)?;
        Ok(ColumnSchema::normalize(&raw))
    }

    pub fn open_census(&self) -> CensusResult<CensusFile> {
        let path = resolve_path(&self.root, &self.config.census_file);
        CensusFile::open(&path, &self.config.election_id)
    }

    fn input_path(&self, input: &str) -> String {
        resolve_path(&self.root, input).display().to_string()
    }
}

fn check_columns_issues(raw: &[RawColumn], registry: &TypeRegistry) -> CensusResult<()> {
    let issues = ColumnSchema::check(raw, registry);
    if !issues.is_empty() {
        return InvalidColumnsSnafu {
            issues: issues.iter().map(|i| i.to_string()).collect::<Vec<String>>(),
        }
        .fail();
    }
    Ok(())
}

pub fn run_command(args: &Args) -> CensusResult<()> {
    let election = Election::load(&args.config)?;
    let summary = match &args.command {
        Command::CheckColumns => check_columns(&election)?,
        Command::ImportCsv { input, remove_all } => import_csv(&election, input, *remove_all)?,
        Command::SurveyPreview(source) => survey_preview(&election, source)?,
        Command::ImportSurvey(source) => import_survey(&election, source)?,
        Command::AddEntry { fields } => add_entry(&election, fields)?,
        Command::RemoveEntry { fields } => remove_entry(&election, fields)?,
        Command::FindVoter { fields } => find_entry(&election, fields)?,
        Command::ListVoters { query } => list_census(&election, query)?,
        Command::Clear => clear_census(&election)?,
    };
    emit_summary(&summary, &args.out, &args.reference)
}

pub fn check_columns(election: &Election) -> CensusResult<JSValue> {
    let schema = election.schema()?;
    let columns: Vec<JSValue> = schema
        .columns()
        .iter()
        .map(|c| json!({"name": c.name, "column_type": c.type_tag.as_str()}))
        .collect();
    let known_types: Vec<String> = election
        .registry
        .known_tags()
        .iter()
        .map(|t| t.as_str().to_string())
        .collect();
    Ok(json!({
        "electionId": election.config.election_id,
        "columns": columns,
        "knownTypes": known_types,
    }))
}

pub fn import_csv(election: &Election, input: &str, remove_all: bool) -> CensusResult<JSValue> {
    let schema = election.schema()?;
    let mut census = election.open_census()?;
    ensure!(
        remove_all || census.is_empty(),
        CensusNotEmptySnafu { count: census.len() }
    );

    let data = io_csv::read_census_upload(&election.input_path(input), &schema, &election.registry)?;
    if !data.is_valid() {
        return RejectedUploadSnafu {
            issues: data
                .issues
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<String>>(),
        }
        .fail();
    }
    // With --remove-all, the voters are only removed when the whole upload is stored.
    let (data, outcome) = if remove_all {
        let outcome = replace_census(&mut census, &data.records).context(StoreSnafu {})?;
        (data, outcome)
    } else {
        let data = data.without_persisted(&census);
        let outcome = import_batch(&mut census, &data.records).context(StoreSnafu {})?;
        (data, outcome)
    };
    if outcome.removed > 0 {
        info!("import_csv: {:?} voters replaced", outcome.removed);
    }

    let mut summary = io_csv::census_data_to_json(&data);
    summary["electionId"] = json!(election.config.election_id);
    summary["removed"] = json!(outcome.removed);
    summary["imported"] = json!(outcome.imported);
    summary["skipped"] = json!(outcome.skipped);
    Ok(summary)
}

fn read_respondents(election: &Election, source: &SurveySource) -> CensusResult<Vec<Respondent>> {
    let path = election.input_path(&source.input);
    match source.input_type.as_deref().unwrap_or("json") {
        "json" => io_survey::read_survey_json(&path),
        "msforms" => io_msforms::read_msforms_answers(&path, &source.excel_worksheet_name),
        x => UnknownInputTypeSnafu { input_type: x }.fail(),
    }
}

fn classify_survey(
    election: &Election,
    source: &SurveySource,
    census: &CensusFile,
) -> CensusResult<Vec<SurveyEntry>> {
    let schema = election.schema()?;
    let mapping: FieldMapping = election.config.field_mapping()?;
    let respondents = read_respondents(election, source)?;
    let known = io_survey::known_questions(&respondents);
    let issues = mapping.check(&schema, &known);
    if !issues.is_empty() {
        return InvalidMappingSnafu {
            issues: issues.iter().map(|i| i.to_string()).collect::<Vec<String>>(),
        }
        .fail();
    }
    Ok(classify_respondents(
        &schema,
        &election.registry,
        &mapping,
        &respondents,
        census,
    ))
}

fn counts_to_json(entries: &[SurveyEntry]) -> JSValue {
    let (valid, incomplete, invalid) = status_counts(entries);
    json!({"valid": valid, "incomplete": incomplete, "invalid": invalid})
}

pub fn survey_preview(election: &Election, source: &SurveySource) -> CensusResult<JSValue> {
    let census = election.open_census()?;
    let entries = classify_survey(election, source, &census)?;
    let entries_js: Vec<JSValue> = entries
        .iter()
        .map(|e| {
            json!({
                "respondent": e.respondent_id,
                "status": e.status.as_str(),
                "record": record_to_json(&e.record),
                "rawValues": record_to_json(&e.raw_values),
            })
        })
        .collect();
    Ok(json!({
        "electionId": election.config.election_id,
        "surveyId": election.config.survey_id(),
        "entries": entries_js,
        "counts": counts_to_json(&entries),
    }))
}

pub fn import_survey(election: &Election, source: &SurveySource) -> CensusResult<JSValue> {
    let mut census = election.open_census()?;
    let entries = classify_survey(election, source, &census)?;
    let records = valid_records(&entries);
    ensure!(!records.is_empty(), NoValidRespondentsSnafu {});
    let outcome = import_batch(&mut census, &records).context(StoreSnafu {})?;
    Ok(json!({
        "electionId": election.config.election_id,
        "surveyId": election.config.survey_id(),
        "imported": outcome.imported,
        "skipped": outcome.skipped,
        "counts": counts_to_json(&entries),
    }))
}

fn fields_to_record(fields: &[(String, String)]) -> Record {
    fields.iter().cloned().collect()
}

pub fn add_entry(election: &Election, fields: &[(String, String)]) -> CensusResult<JSValue> {
    let schema = election.schema()?;
    let mut census = election.open_census()?;
    let record = match prepare_entry(
        &schema,
        &election.registry,
        &census,
        &fields_to_record(fields),
    ) {
        Ok(r) => r,
        Err(issues) => {
            return EntryRefusedSnafu {
                issues: issues.iter().map(|i| i.to_string()).collect::<Vec<String>>(),
            }
            .fail();
        }
    };
    census.insert(record.clone()).context(StoreSnafu {})?;
    Ok(json!({
        "electionId": election.config.election_id,
        "added": record_to_json(&record),
        "voters": census.len(),
    }))
}

pub fn remove_entry(election: &Election, fields: &[(String, String)]) -> CensusResult<JSValue> {
    let schema = election.schema()?;
    let mut census = election.open_census()?;
    let predicate = identity_predicate(&schema, &election.registry, &fields_to_record(fields))
        .context(MissingIdentitySnafu {})?;
    let removed = census.remove(&predicate)?;
    if removed == 0 {
        warn!("remove_entry: no voter matches {:?}", predicate.clauses());
    }
    Ok(json!({
        "electionId": election.config.election_id,
        "removed": removed,
        "voters": census.len(),
    }))
}

pub fn find_entry(election: &Election, fields: &[(String, String)]) -> CensusResult<JSValue> {
    let schema = election.schema()?;
    let census = election.open_census()?;
    let data = fields_to_record(fields);
    ensure!(
        identity_predicate(&schema, &election.registry, &data).is_some(),
        MissingIdentitySnafu {}
    );
    let voter = find_voter(&schema, &election.registry, &census, &data);
    Ok(json!({
        "electionId": election.config.election_id,
        "found": voter.is_some(),
        "voter": voter.as_ref().map(record_to_json),
    }))
}

pub fn list_census(election: &Election, query: &Option<String>) -> CensusResult<JSValue> {
    let schema = election.schema()?;
    let census = election.open_census()?;
    let voters: Vec<JSMap<String, JSValue>> =
        list_voters(&schema, census.census().voters(), query.as_deref())
            .into_iter()
            .map(record_to_json)
            .collect();
    info!("list_census: {:?} of {:?} voters", voters.len(), census.len());
    Ok(json!({
        "electionId": election.config.election_id,
        "query": query,
        "count": voters.len(),
        "voters": voters,
    }))
}

pub fn clear_census(election: &Election) -> CensusResult<JSValue> {
    let mut census = election.open_census()?;
    let removed = census.remove_all().context(StoreSnafu {})?;
    Ok(json!({
        "electionId": election.config.election_id,
        "removed": removed,
    }))
}

/// Writes the summary, and compares it to the reference when one is given.
pub fn emit_summary(
    summary: &JSValue,
    out: &Option<String>,
    reference: &Option<String>,
) -> CensusResult<()> {
    let pretty_js_stats = serde_json::to_string_pretty(summary).context(SerializingJsonSnafu {})?;
    match out.as_deref() {
        None | Some("stdout") => println!("{}", pretty_js_stats),
        Some(path) => {
            fs::write(path, &pretty_js_stats).context(WritingJsonSnafu { path })?;
            info!("Summary written to {:?}", path);
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = reference {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(SerializingJsonSnafu {})?;
        debug!("emit_summary: reference: {}", pretty_js_summary_ref);
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            return ReferenceMismatchSnafu { path: summary_p }.fail();
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("censusctl-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_js(election_id: &str) -> JSValue {
        json!({
            "electionId": election_id,
            "censusFile": "census.json",
            "censusSettings": {
                "columns": [
                    {"name": "DNI", "column_type": "alphanumeric"},
                    {"name": "Birth date", "column_type": "date"}
                ],
                "surveyImport": {"surveyId": 7, "fieldMapping": {"DNI": 11, "Birth date": 12}}
            }
        })
    }

    /// Writes the configuration and the given files in a fresh directory.
    fn setup(test_name: &str, config: &JSValue, files: &[(&str, &str)]) -> (PathBuf, Election) {
        let dir = test_dir(test_name);
        let config_path = dir.join("election.json");
        fs::write(&config_path, config.to_string()).unwrap();
        for (name, content) in files.iter() {
            fs::write(dir.join(name), content).unwrap();
        }
        let election = Election::load(config_path.to_str().unwrap()).unwrap();
        (dir, election)
    }

    fn field(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    fn source(input: &str) -> SurveySource {
        SurveySource {
            input: input.to_string(),
            input_type: None,
            excel_worksheet_name: None,
        }
    }

    const UPLOAD: &str = "DNI;Birth date\n1234-A;1990-01-01\n1234A;1990-01-01\n5678B;02/03/1985\n";

    #[test]
    fn imports_a_csv_upload() {
        let (_, election) = setup("import_csv", &config_js("e1"), &[("upload.csv", UPLOAD)]);
        let summary = import_csv(&election, "upload.csv", false).unwrap();
        assert_eq!(summary["imported"], json!(2));
        assert_eq!(summary["duplicatesRemoved"], json!(1));
        assert_eq!(election.open_census().unwrap().len(), 2);

        // A second upload needs the census to be emptied first.
        let r = import_csv(&election, "upload.csv", false);
        assert!(matches!(r, Err(CensusError::CensusNotEmpty { count: 2 })));
        let summary = import_csv(&election, "upload.csv", true).unwrap();
        assert_eq!(summary["removed"], json!(2));
        assert_eq!(summary["imported"], json!(2));
    }

    #[test]
    fn replacing_the_census_with_blank_rows() {
        let (_, election) = setup("import_csv_blank", &config_js("e1"), &[("upload.csv", UPLOAD)]);
        import_csv(&election, "upload.csv", false).unwrap();

        fs::write(
            election.root.join("blank.csv"),
            "DNI;Birth date\n;\n9999C;1990-01-01\n-;\n",
        )
        .unwrap();
        let summary = import_csv(&election, "blank.csv", true).unwrap();
        assert_eq!(summary["removed"], json!(2));
        assert_eq!(summary["imported"], json!(1));
        assert_eq!(summary["blankRows"], json!(2));
        assert_eq!(
            election.open_census().unwrap().census().voters(),
            &[[("DNI", "9999C"), ("Birth date", "1990-01-01")]
                .iter()
                .cloned()
                .collect::<Record>()]
        );
    }

    #[test]
    fn rejected_replacement_keeps_the_census() {
        let (_, election) = setup(
            "import_csv_keep",
            &config_js("e1"),
            &[("upload.csv", UPLOAD), ("bad.csv", "DNI;Birth date\n1;someday\n")],
        );
        import_csv(&election, "upload.csv", false).unwrap();
        let r = import_csv(&election, "bad.csv", true);
        assert!(matches!(r, Err(CensusError::RejectedUpload { .. })));
        assert_eq!(election.open_census().unwrap().len(), 2);
    }

    #[test]
    fn lists_the_voters() {
        let (_, election) = setup("list_voters", &config_js("e1"), &[("upload.csv", UPLOAD)]);
        import_csv(&election, "upload.csv", false).unwrap();
        let all = list_census(&election, &None).unwrap();
        assert_eq!(all["count"], json!(2));
        assert_eq!(all["voters"][0]["DNI"], json!("5678B"));
        let some = list_census(&election, &Some("34a".to_string())).unwrap();
        assert_eq!(some["count"], json!(1));
        assert_eq!(some["voters"][0]["DNI"], json!("1234A"));
    }

    #[test]
    fn rejected_upload_is_not_imported() {
        let (_, election) = setup(
            "import_csv_rejected",
            &config_js("e1"),
            &[("upload.csv", "DNI;Birth date;Zip\n1;someday;0\n")],
        );
        let r = import_csv(&election, "upload.csv", false);
        match r {
            Err(CensusError::RejectedUpload { issues }) => assert_eq!(issues.len(), 2),
            x => panic!("unexpected result {:?}", x),
        }
        assert!(election.open_census().unwrap().is_empty());
    }

    #[test]
    fn unconfigured_columns_are_refused() {
        let config = json!({"electionId": "e1", "censusFile": "census.json"});
        let (_, election) = setup("unconfigured", &config, &[("upload.csv", UPLOAD)]);
        let r = import_csv(&election, "upload.csv", false);
        assert!(matches!(r, Err(CensusError::ColumnsNotConfigured {})));

        let config = json!({
            "electionId": "e1",
            "censusFile": "census.json",
            "censusSettings": {"columns": [{"name": " ", "column_type": "postal"}]}
        });
        let (_, election) = setup("invalid_columns", &config, &[]);
        match check_columns(&election) {
            Err(CensusError::InvalidColumns { issues }) => assert_eq!(issues.len(), 2),
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn previews_and_imports_a_survey() {
        let answers = json!([
            {"sessionToken": "a", "questionId": 11, "body": "1234-A"},
            {"sessionToken": "a", "questionId": 12, "body": "1990-01-01"},
            {"sessionToken": "b", "questionId": 11, "body": "5678B"},
            {"sessionToken": "c", "questionId": 11, "body": "9999C"},
            {"sessionToken": "c", "questionId": 12, "body": "", "choices": ["yesterday"]}
        ]);
        let (_, election) = setup(
            "survey",
            &config_js("e1"),
            &[("answers.json", answers.to_string().as_str())],
        );
        let preview = survey_preview(&election, &source("answers.json")).unwrap();
        assert_eq!(
            preview["counts"],
            json!({"valid": 1, "incomplete": 1, "invalid": 1})
        );
        assert_eq!(preview["entries"][0]["record"], json!({"DNI": "1234A", "Birth date": "1990-01-01"}));
        assert_eq!(preview["surveyId"], json!("7"));

        let summary = import_survey(&election, &source("answers.json")).unwrap();
        assert_eq!(summary["imported"], json!(1));
        // The imported respondent is not listed anymore.
        let preview = survey_preview(&election, &source("answers.json")).unwrap();
        assert_eq!(
            preview["counts"],
            json!({"valid": 0, "incomplete": 1, "invalid": 1})
        );
        let r = import_survey(&election, &source("answers.json"));
        assert!(matches!(r, Err(CensusError::NoValidRespondents {})));
    }

    #[test]
    fn mapping_must_match_the_survey() {
        let answers = json!([{"sessionToken": "a", "questionId": 11, "body": "1"}]);
        let (_, election) = setup(
            "survey_mapping",
            &config_js("e1"),
            &[("answers.json", answers.to_string().as_str())],
        );
        let r = survey_preview(&election, &source("answers.json"));
        assert!(matches!(r, Err(CensusError::InvalidMapping { .. })));
        let mut bad = source("answers.json");
        bad.input_type = Some("xml".to_string());
        let r = survey_preview(&election, &bad);
        assert!(matches!(r, Err(CensusError::UnknownInputType { .. })));
    }

    #[test]
    fn manual_entries() {
        let (_, election) = setup("entries", &config_js("e1"), &[]);
        let fields = vec![field("dni", "1234-A"), field("Birth date", "1990-01-01")];
        let summary = add_entry(&election, &fields).unwrap();
        assert_eq!(summary["added"]["DNI"], json!("1234A"));

        let r = add_entry(&election, &fields);
        match r {
            Err(CensusError::EntryRefused { issues }) => assert_eq!(issues.len(), 1),
            x => panic!("unexpected result {:?}", x),
        }
        let r = add_entry(&election, &[field("DNI", "1")]);
        assert!(matches!(r, Err(CensusError::EntryRefused { .. })));

        let found = find_entry(&election, &[field("DNI", "1234A")]).unwrap();
        assert_eq!(found["found"], json!(true));
        assert!(matches!(
            find_entry(&election, &[field("Zip", "1")]),
            Err(CensusError::MissingIdentity {})
        ));

        let removed = remove_entry(&election, &[field("DNI", "1234 A")]).unwrap();
        assert_eq!(removed["removed"], json!(1));
        let found = find_entry(&election, &[field("DNI", "1234A")]).unwrap();
        assert_eq!(found["found"], json!(false));
        assert_eq!(clear_census(&election).unwrap()["removed"], json!(0));
    }

    #[test]
    fn compares_with_the_reference() {
        let dir = test_dir("reference");
        let reference = dir.join("expected.json");
        let out = dir.join("out.json");
        fs::write(&reference, r#"{"removed": 1}"#).unwrap();
        let out_s = Some(out.display().to_string());
        let reference_s = Some(reference.display().to_string());
        assert!(emit_summary(&json!({"removed": 1}), &out_s, &reference_s).is_ok());
        assert!(out.exists());
        let r = emit_summary(&json!({"removed": 2}), &out_s, &reference_s);
        assert!(matches!(r, Err(CensusError::ReferenceMismatch { .. })));
    }

    #[test]
    fn census_files_are_scoped_to_an_election() {
        let (dir, election) = setup("scoped", &config_js("e1"), &[]);
        add_entry(&election, &[field("DNI", "1"), field("Birth date", "1990-01-01")]).unwrap();
        fs::write(dir.join("election.json"), config_js("e2").to_string()).unwrap();
        let other = Election::load(dir.join("election.json").to_str().unwrap()).unwrap();
        assert!(matches!(
            other.open_census(),
            Err(CensusError::ElectionMismatch { .. })
        ));
    }
}
