// The census of an election, persisted as a JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Map as JSMap;

use crate::census::*;

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
struct CensusFileContent {
    #[serde(rename = "electionId")]
    election_id: String,
    voters: Vec<JSMap<String, JSValue>>,
}

/// A census store backed by a JSON file.
///
/// The file is rewritten after every insert made outside of a transaction, and on commit.
#[derive(Debug, Clone)]
pub struct CensusFile {
    path: PathBuf,
    election_id: String,
    census: MemoryCensus,
}

impl CensusFile {
    /// Opens the census of an election. A missing file is an empty census.
    pub fn open(path: &Path, election_id: &str) -> CensusResult<CensusFile> {
        let path_s = path.display().to_string();
        if !path.exists() {
            info!("CensusFile::open: {:?} does not exist, starting an empty census", path_s);
            return Ok(CensusFile {
                path: path.to_path_buf(),
                election_id: election_id.to_string(),
                census: MemoryCensus::new(),
            });
        }
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path: &path_s })?;
        let content: CensusFileContent =
            serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path: &path_s })?;
        ensure!(
            content.election_id == election_id,
            ElectionMismatchSnafu {
                path: &path_s,
                expected: election_id,
                found: content.election_id.clone(),
            }
        );
        let mut voters: Vec<Record> = Vec::new();
        for voter in content.voters.iter() {
            let mut record = Record::new();
            for (name, value) in voter.iter() {
                let v = match value {
                    JSValue::String(s) => s.clone(),
                    JSValue::Null => "".to_string(),
                    js => js.to_string(),
                };
                record.insert(name, &v);
            }
            voters.push(record);
        }
        debug!("CensusFile::open: {:?} voters in {:?}", voters.len(), path_s);
        Ok(CensusFile {
            path: path.to_path_buf(),
            election_id: election_id.to_string(),
            census: MemoryCensus::from_records(voters),
        })
    }

    pub fn census(&self) -> &MemoryCensus {
        &self.census
    }

    pub fn len(&self) -> usize {
        self.census.len()
    }

    pub fn is_empty(&self) -> bool {
        self.census.is_empty()
    }

    pub fn remove(&mut self, predicate: &MatchPredicate) -> CensusResult<usize> {
        let removed = self.census.remove(predicate);
        if removed > 0 {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn save(&self) -> CensusResult<()> {
        self.write(&self.census)
    }

    fn write(&self, census: &MemoryCensus) -> CensusResult<()> {
        let path_s = self.path.display().to_string();
        let content = CensusFileContent {
            election_id: self.election_id.clone(),
            voters: census.voters().iter().map(record_to_json).collect(),
        };
        let pretty = serde_json::to_string_pretty(&content).context(SerializingJsonSnafu {})?;
        fs::write(&self.path, pretty).context(WritingJsonSnafu { path: &path_s })?;
        debug!("CensusFile::write: {:?} voters in {:?}", census.len(), path_s);
        Ok(())
    }

    fn write_for_store(&self, census: &MemoryCensus) -> Result<(), StoreError> {
        self.write(census).map_err(|e| StoreError::Backend(e.to_string()))
    }
}

pub fn record_to_json(record: &Record) -> JSMap<String, JSValue> {
    record
        .iter()
        .map(|(n, v)| (n.to_string(), json!(v)))
        .collect()
}

impl CensusStore for CensusFile {
    fn find_match(&self, predicate: &MatchPredicate) -> Option<&Record> {
        self.census.find_match(predicate)
    }

    fn insert(&mut self, record: Record) -> Result<(), StoreError> {
        self.census.insert(record)?;
        if !self.census.in_transaction() {
            self.write_for_store(&self.census)?;
        }
        Ok(())
    }

    fn remove_all(&mut self) -> Result<usize, StoreError> {
        let removed = self.census.remove_all()?;
        if !self.census.in_transaction() {
            self.write_for_store(&self.census)?;
        }
        Ok(removed)
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        self.census.begin()
    }

    /// The file is written first: when it cannot be, the transaction stays open.
    fn commit(&mut self) -> Result<(), StoreError> {
        let mut committed = self.census.clone();
        committed.commit()?;
        self.write_for_store(&committed)?;
        self.census = committed;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.census.rollback()
    }
}
