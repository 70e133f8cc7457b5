// Survey exports in JSON: a flat list of answers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::census::*;

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRow {
    #[serde(rename = "sessionToken")]
    pub session_token: String,
    #[serde(rename = "questionId")]
    pub question_id: JSValue,
    pub body: Option<String>,
    #[serde(default)]
    pub choices: Vec<String>,
}

pub fn read_survey_json(path: &str) -> CensusResult<Vec<Respondent>> {
    info!("Attempting to read survey answers {:?}", path);
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let rows: Vec<AnswerRow> =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    group_answers(&rows)
}

/// Groups the answers by respondent, in the order respondents first appear.
pub fn group_answers(rows: &[AnswerRow]) -> CensusResult<Vec<Respondent>> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut respondents: Vec<Respondent> = Vec::new();
    for row in rows.iter() {
        let answer = Answer {
            question: read_js_id(&row.question_id)?,
            body: row.body.clone(),
            choices: row.choices.clone(),
        };
        let idx = *positions
            .entry(row.session_token.clone())
            .or_insert_with(|| {
                respondents.push(Respondent {
                    id: row.session_token.clone(),
                    answers: vec![],
                });
                respondents.len() - 1
            });
        respondents[idx].answers.push(answer);
    }
    debug!(
        "group_answers: {:?} answers, {:?} respondents",
        rows.len(),
        respondents.len()
    );
    Ok(respondents)
}

/// The questions answered at least once, in order of appearance.
pub fn known_questions(respondents: &[Respondent]) -> Vec<String> {
    let mut res: Vec<String> = Vec::new();
    for a in respondents.iter().flat_map(|r| r.answers.iter()) {
        if !res.contains(&a.question) {
            res.push(a.question.clone());
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_session_token() {
        let rows: Vec<AnswerRow> = serde_json::from_value(json!([
            {"sessionToken": "b", "questionId": 11, "body": "X1"},
            {"sessionToken": "a", "questionId": "11", "body": "X2"},
            {"sessionToken": "b", "questionId": 12, "body": null, "choices": ["1990-01-01"]}
        ]))
        .unwrap();
        let respondents = group_answers(&rows).unwrap();
        let ids: Vec<&str> = respondents.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(respondents[0].answers.len(), 2);
        assert_eq!(respondents[0].answers[1].value(), Some("1990-01-01"));
        assert_eq!(known_questions(&respondents), vec!["11", "12"]);
    }

    #[test]
    fn refuses_bad_question_ids() {
        let rows: Vec<AnswerRow> = serde_json::from_value(json!([
            {"sessionToken": "b", "questionId": true, "body": "X1"}
        ]))
        .unwrap();
        assert!(group_answers(&rows).is_err());
    }
}
