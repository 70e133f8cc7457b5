// Survey exports from Microsoft Forms and Google Forms (Excel).

use calamine::{open_workbook, DataType, Reader, Xlsx};
use chrono::{Duration, NaiveDate};

use crate::census::{io_common::make_default_id, *};

/// Reads one respondent per row. The header row holds the question ids.
///
/// The respondent ids are taken from the first column when its header is `id`.
pub fn read_msforms_answers(
    path: &str,
    worksheet_name: &Option<String>,
) -> CensusResult<Vec<Respondent>> {
    let default_id = make_default_id(path);

    let wrange = get_range(path, worksheet_name)?;

    let header = wrange.rows().next().context(EmptyExcelSnafu {})?;
    debug!("read_msforms_answers: header: {:?}", header);

    let mut questions: Vec<Option<String>> = Vec::new();
    for cell in header.iter() {
        let q = read_cell(cell)?;
        questions.push(if q.is_empty() { None } else { Some(q) });
    }
    let has_id_column = matches!(
        questions.first(),
        Some(Some(q)) if q.eq_ignore_ascii_case("id")
    );
    debug!("read_msforms_answers: has_id_column: {:?}", has_id_column);

    let mut res: Vec<Respondent> = Vec::new();
    // The header is row 1.
    for (idx, row) in wrange.rows().enumerate().skip(1) {
        let lineno = idx + 1;
        let mut id: Option<String> = None;
        let mut answers: Vec<Answer> = Vec::new();
        for (col, cell) in row.iter().enumerate() {
            let value = read_cell(cell)?;
            if col == 0 && has_id_column {
                if !value.is_empty() {
                    id = Some(value);
                }
                continue;
            }
            if let (Some(Some(question)), false) = (questions.get(col), value.is_empty()) {
                answers.push(Answer {
                    question: question.clone(),
                    body: Some(value),
                    choices: vec![],
                });
            }
        }
        if answers.is_empty() && id.is_none() {
            debug!("read_msforms_answers: skipping empty row {:?}", lineno);
            continue;
        }
        res.push(Respondent {
            id: id.unwrap_or_else(|| default_id(lineno)),
            answers,
        });
    }
    info!(
        "read_msforms_answers: {:?} respondents in {:?}",
        res.len(),
        path
    );
    Ok(res)
}

fn read_cell(cell: &DataType) -> CensusResult<String> {
    match cell {
        DataType::String(s) => Ok(s.trim().to_string()),
        DataType::Int(i) => Ok(i.to_string()),
        DataType::Float(f) if f.fract() == 0.0 => Ok(format!("{}", *f as i64)),
        DataType::Float(f) => Ok(f.to_string()),
        DataType::Bool(b) => Ok(b.to_string()),
        DataType::DateTime(serial) => excel_date(*serial),
        DataType::Empty => Ok("".to_string()),
        other => whatever!("read_cell: could not understand cell {:?}", other),
    }
}

/// Excel stores dates as a number of days since 1899-12-30.
fn excel_date(serial: f64) -> CensusResult<String> {
    let date = NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|epoch| epoch.checked_add_signed(Duration::days(serial.trunc() as i64)));
    match date {
        Some(d) => Ok(d.format("%Y-%m-%d").to_string()),
        None => whatever!("excel_date: date out of range: {}", serial),
    }
}

fn get_range(path: &str, worksheet_name_o: &Option<String>) -> CensusResult<calamine::Range<DataType>> {
    debug!(
        "get_range: path: {:?} worksheet: {:?}",
        path, worksheet_name_o
    );
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet_name) = worksheet_name_o {
        let wrange = workbook
            .worksheet_range(worksheet_name)
            .context(MissingWorksheetSnafu {
                path,
                worksheet: worksheet_name.clone(),
            })?
            .context(OpeningExcelSnafu { path })?;
        Ok(wrange)
    } else {
        let all_worksheets = workbook.worksheets();
        match all_worksheets.as_slice() {
            [] => EmptyExcelSnafu {}.fail(),
            [(worksheet_name, wrange)] => {
                debug!("get_range: path: {:?} worksheet: {:?}", path, worksheet_name);
                Ok(wrange.clone())
            }
            _ => whatever!(
                "{}: too many worksheets, the worksheet name must be provided",
                path
            ),
        }
    }
}
