use clap::{Parser, Subcommand};

/// This is a census import program for elections.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The file containing the configuration of the election, in JSON format.
    /// It names the census file and describes the census columns.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference file containing the expected summary in JSON format. If provided, censusctl will
    /// check that the printed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary will be written in JSON format to the given
    /// location. It is printed to the standard output otherwise.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Checks the census columns of the configuration.
    CheckColumns,
    /// Imports a census upload (delimited text with a header line).
    ImportCsv {
        /// (file path) The upload.
        #[clap(short, long, value_parser)]
        input: String,
        /// Replaces all the voters of the census with the upload.
        #[clap(long, takes_value = false)]
        remove_all: bool,
    },
    /// Shows how the respondents of a survey would be imported.
    SurveyPreview(SurveySource),
    /// Imports the valid respondents of a survey.
    ImportSurvey(SurveySource),
    /// Adds one voter.
    AddEntry {
        /// (NAME=VALUE) A census field. Repeat for every column.
        #[clap(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Removes the voters matching the given fields.
    RemoveEntry {
        #[clap(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Looks up a voter with the given fields.
    FindVoter {
        #[clap(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Lists the voters, newest first.
    ListVoters {
        /// Only the voters whose first column contains this text (ignoring case).
        #[clap(short, long, value_parser)]
        query: Option<String>,
    },
    /// Removes all the voters of the census.
    Clear,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SurveySource {
    /// (file path) The export of the survey answers.
    #[clap(short, long, value_parser)]
    pub input: String,

    /// (default json) The type of the export: json or msforms (Excel).
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// When using an Excel file, indicates the name of the worksheet to use.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,
}

fn parse_field(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got {:?}", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        let args = Args::parse_from([
            "censusctl",
            "--config",
            "election.json",
            "add-entry",
            "--field",
            "DNI=123=A",
            "-f",
            " Birth date =1990-01-01",
        ]);
        assert_eq!(args.config, "election.json");
        match args.command {
            Command::AddEntry { fields } => assert_eq!(
                fields,
                vec![
                    ("DNI".to_string(), "123=A".to_string()),
                    ("Birth date".to_string(), "1990-01-01".to_string())
                ]
            ),
            c => panic!("unexpected command {:?}", c),
        }
    }

    #[test]
    fn parses_list_voters() {
        let args = Args::parse_from(["censusctl", "-c", "e.json", "list-voters", "--query", "12"]);
        assert!(matches!(
            args.command,
            Command::ListVoters { query: Some(q) } if q == "12"
        ));
        let args = Args::parse_from(["censusctl", "-c", "e.json", "list-voters"]);
        assert!(matches!(args.command, Command::ListVoters { query: None }));
    }

    #[test]
    fn refuses_fields_without_name() {
        assert!(parse_field("=1").is_err());
        assert!(parse_field("DNI").is_err());
        assert_eq!(
            parse_field("DNI="),
            Ok(("DNI".to_string(), "".to_string()))
        );
    }
}
