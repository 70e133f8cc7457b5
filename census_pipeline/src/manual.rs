/*!

This is the long-form manual for `census_pipeline` and `censusctl`.

## Column types

Each census column has a type. A type checks the values of an upload and
normalizes them before they are stored.

| type           | accepted values                           | stored value                        |
|----------------|-------------------------------------------|-------------------------------------|
| `free_text`    | anything                                  | unchanged                           |
| `text_trim`    | anything                                  | without leading/trailing whitespace |
| `alphanumeric` | anything                                  | only the ASCII letters and digits   |
| `number`       | ASCII digits only (`007` is fine)         | unchanged                           |
| `date`         | a full calendar date, see below           | unchanged                           |

Blank cells are never checked: a missing value is not an error in an upload.

Dates are accepted in the ISO notation (`2024-01-15`), with slashes
(`15/01/2024` or `01/15/2024`), dots, dashes or with the month written out
(`15 January 2024`, `Jan 15, 2024`). The year must have four digits. Dates
are stored as written: `01/02/2024` is read day first for the check, but
nothing is rewritten, so the voter must type it back the same way.

A column without a type is a `free_text` column. Any other type name is
refused when the columns are saved.

## Uploads

The census is uploaded as a delimited text file:
- the first line holds the column names. They are compared to the
  configured columns ignoring case and surrounding spaces.
- the separator is `;`, `,` or a tab, whichever appears the most on the first line.
- an UTF-8 byte order mark is ignored.
- values can be quoted: `"Doe; John"`.

All the problems of a file are reported at once: missing columns, unexpected
columns and the cells refused by their type (with the line number, the
header being line 1). A file with any problem is not imported at all.
A file without any data line is valid and imports nothing, whatever its
column names.

Lines that are identical once normalized are imported once, and lines left
without any value once normalized are skipped. Voters already in the census
are skipped: all the values must be the same, blank ones included.

`import-csv` refuses to add to a census that already has voters. With
`--remove-all`, the voters are replaced by the upload in a single step: when
the upload is refused or cannot be stored, the census is left as it was.

## Configuration

`censusctl` reads the configuration of an election from a JSON file:

```json
{
  "electionId": "2026-board",
  "censusFile": "census.json",
  "censusSettings": {
    "columns": [
      {"name": "DNI", "column_type": "alphanumeric"},
      {"name": "Birth date", "column_type": "date"}
    ],
    "surveyImport": {"surveyId": "7", "fieldMapping": {"DNI": "11", "Birth date": "12"}}
  }
}
```

The census file is created when missing. Paths are relative to the configuration file.

## Survey imports

Voters can also be taken from the answers to a survey. The field mapping tells
which question feeds each column. Every column must be mapped.

Survey answers are read from:
* `json` a list of answers: `[{"sessionToken": "a1", "questionId": 11, "body": "12345678A", "choices": []}]`.
  The answers of a respondent share the same session token.
* `msforms` an Excel export (Microsoft Forms, Google Forms). The first line holds the
  question ids. An `id` first column identifies the respondents.

Each respondent is classified:
* `valid`: all the columns are filled and accepted by their type
* `incomplete`: at least one column has no answer
* `invalid`: an answer is refused by its type

Respondents already in the census are not listed. Only the valid respondents
are imported, all at once: if one of them cannot be stored, none is.

## Commands

```text
censusctl --config election.json check-columns
censusctl --config election.json import-csv --input census.csv
censusctl --config election.json survey-preview --input answers.json
censusctl --config election.json import-survey --input answers.xlsx --input-type msforms
censusctl --config election.json add-entry --field DNI=12345678A --field "Birth date=1990-01-01"
censusctl --config election.json find-voter --field DNI=12345678A
censusctl --config election.json remove-entry --field DNI=12345678A
censusctl --config election.json list-voters --query 1234
censusctl --config election.json clear
```

Each command prints a JSON summary. With `--reference <file>`, the summary is
compared to the content of the file and the differences are printed.

`list-voters` shows the newest voters first. The query keeps the voters whose
first column contains it, ignoring case. `find-voter` and `remove-entry` only
compare the fields that are given.

*/
