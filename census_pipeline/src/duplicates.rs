//! Detection of records already present in a census, and the census stores.

use log::{debug, info, warn};

use crate::config::{Record, StoreError};
use crate::types::is_blank;

/// A conjunction of equality clauses over the fields of a record.
///
/// An empty predicate would match every voter: it can only be built from
/// a record that has at least one field.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct MatchPredicate {
    clauses: Vec<(String, String)>,
}

impl MatchPredicate {
    /// One clause per field, blank values included.
    ///
    /// Returns None for a record without fields.
    pub fn for_record(record: &Record) -> Option<MatchPredicate> {
        MatchPredicate::from_clauses(
            record
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// One clause per non-blank field, for lookups on part of a record.
    ///
    /// Returns None when all the fields of the record are blank.
    pub fn for_values(record: &Record) -> Option<MatchPredicate> {
        MatchPredicate::from_clauses(
            record
                .iter()
                .filter(|(_, v)| !is_blank(v))
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn from_clauses(clauses: Vec<(String, String)>) -> Option<MatchPredicate> {
        if clauses.is_empty() {
            None
        } else {
            Some(MatchPredicate { clauses })
        }
    }

    pub fn clauses(&self) -> &[(String, String)] {
        &self.clauses
    }

    /// Exact comparison: values are expected to be transformed already.
    pub fn matches(&self, candidate: &Record) -> bool {
        self.clauses
            .iter()
            .all(|(n, v)| candidate.get(n) == Some(v.as_str()))
    }
}

/// The persisted census of an election.
pub trait CensusStore {
    /// The first voter matching the predicate, as seen from the open transaction.
    fn find_match(&self, predicate: &MatchPredicate) -> Option<&Record>;

    fn any_match(&self, predicate: &MatchPredicate) -> bool {
        self.find_match(predicate).is_some()
    }

    fn insert(&mut self, record: Record) -> Result<(), StoreError>;

    /// Removes every voter and returns how many there were.
    ///
    /// Inside a transaction, the removal only takes effect on commit.
    fn remove_all(&mut self) -> Result<usize, StoreError>;

    fn begin(&mut self) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;
}

/// True if a voter has the same value for every field of the record.
///
/// A record without fields never matches.
pub fn exists<S: CensusStore + ?Sized>(store: &S, record: &Record) -> bool {
    match MatchPredicate::for_record(record) {
        Some(p) => store.any_match(&p),
        None => false,
    }
}

#[derive(Debug, Clone, Default)]
struct Staged {
    records: Vec<Record>,
    remove_all: bool,
}

/// A census held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCensus {
    voters: Vec<Record>,
    staged: Option<Staged>,
}

impl MemoryCensus {
    pub fn new() -> MemoryCensus {
        MemoryCensus::default()
    }

    pub fn from_records(voters: Vec<Record>) -> MemoryCensus {
        MemoryCensus {
            voters,
            staged: None,
        }
    }

    /// The committed voters.
    pub fn voters(&self) -> &[Record] {
        &self.voters
    }

    pub fn len(&self) -> usize {
        self.voters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }

    pub fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    /// Removes the committed voters matching the predicate and returns how many were removed.
    pub fn remove(&mut self, predicate: &MatchPredicate) -> usize {
        let before = self.voters.len();
        self.voters.retain(|v| !predicate.matches(v));
        before - self.voters.len()
    }

    /// The voters as seen from the open transaction.
    fn visible(&self) -> impl Iterator<Item = &Record> {
        let committed: &[Record] = match &self.staged {
            Some(staged) if staged.remove_all => &[],
            _ => &self.voters,
        };
        committed
            .iter()
            .chain(self.staged.iter().flat_map(|s| s.records.iter()))
    }
}

impl CensusStore for MemoryCensus {
    fn find_match(&self, predicate: &MatchPredicate) -> Option<&Record> {
        self.visible().find(|v| predicate.matches(v))
    }

    fn insert(&mut self, record: Record) -> Result<(), StoreError> {
        if record.iter().all(|(_, v)| is_blank(v)) {
            return Err(StoreError::EmptyRecord);
        }
        if self.visible().any(|v| *v == record) {
            return Err(StoreError::DuplicateEntry);
        }
        match self.staged.as_mut() {
            Some(staged) => staged.records.push(record),
            None => self.voters.push(record),
        }
        Ok(())
    }

    fn remove_all(&mut self) -> Result<usize, StoreError> {
        let count = self.visible().count();
        match self.staged.as_mut() {
            Some(staged) => {
                staged.records.clear();
                staged.remove_all = true;
            }
            None => self.voters.clear(),
        }
        Ok(count)
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        if self.staged.is_some() {
            return Err(StoreError::TransactionInProgress);
        }
        self.staged = Some(Staged::default());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        match self.staged.take() {
            Some(staged) => {
                debug!(
                    "commit: {:?} records, remove_all: {:?}",
                    staged.records.len(),
                    staged.remove_all
                );
                if staged.remove_all {
                    self.voters.clear();
                }
                self.voters.extend(staged.records);
                Ok(())
            }
            None => Err(StoreError::NoTransaction),
        }
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        match self.staged.take() {
            Some(staged) => {
                debug!("rollback: {:?} records discarded", staged.records.len());
                Ok(())
            }
            None => Err(StoreError::NoTransaction),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct BatchOutcome {
    pub imported: usize,
    /// Records matching a voter of the census, or an earlier record of the batch.
    pub skipped: usize,
    /// Voters removed before the import, when the batch replaces the census.
    pub removed: usize,
}

/// Inserts a batch of records in a single transaction.
///
/// Records already in the census are skipped. Any failure rolls back the whole batch.
pub fn import_batch<S: CensusStore + ?Sized>(
    store: &mut S,
    records: &[Record],
) -> Result<BatchOutcome, StoreError> {
    run_batch(store, records, false)
}

/// Replaces all the voters of the census with a batch of records, in a single transaction.
///
/// When the batch fails, the census keeps its voters.
pub fn replace_census<S: CensusStore + ?Sized>(
    store: &mut S,
    records: &[Record],
) -> Result<BatchOutcome, StoreError> {
    run_batch(store, records, true)
}

fn run_batch<S: CensusStore + ?Sized>(
    store: &mut S,
    records: &[Record],
    remove_all: bool,
) -> Result<BatchOutcome, StoreError> {
    store.begin()?;
    let staged = stage_batch(store, records, remove_all);
    match staged.and_then(|outcome| store.commit().map(|_| outcome)) {
        Ok(outcome) => {
            info!(
                "run_batch: {:?} imported, {:?} skipped, {:?} removed",
                outcome.imported, outcome.skipped, outcome.removed
            );
            Ok(outcome)
        }
        Err(e) => {
            warn!("run_batch: rolling back after failure: {}", e);
            store.rollback()?;
            Err(e)
        }
    }
}

fn stage_batch<S: CensusStore + ?Sized>(
    store: &mut S,
    records: &[Record],
    remove_all: bool,
) -> Result<BatchOutcome, StoreError> {
    let mut outcome = BatchOutcome::default();
    if remove_all {
        outcome.removed = store.remove_all()?;
    }
    for record in records.iter() {
        if exists(&*store, record) {
            outcome.skipped += 1;
            continue;
        }
        store.insert(record.clone())?;
        outcome.imported += 1;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(&str, &str)]) -> Record {
        pairs.iter().cloned().collect()
    }

    fn census() -> MemoryCensus {
        MemoryCensus::from_records(vec![rec(&[("dni", "12345678A"), ("birth_date", "1990-01-01")])])
    }

    #[test]
    fn matches_on_every_field() {
        let c = census();
        assert!(exists(
            &c,
            &rec(&[("dni", "12345678A"), ("birth_date", "1990-01-01")])
        ));
        assert!(!exists(
            &c,
            &rec(&[("dni", "12345678A"), ("birth_date", "1991-01-01")])
        ));
        assert!(!exists(&c, &rec(&[("dni", "12345678a")])));
        // A subset of the fields is enough when all of them match.
        assert!(exists(&c, &rec(&[("dni", "12345678A")])));
    }

    #[test]
    fn blank_fields_are_part_of_the_match() {
        let c = census();
        assert!(!exists(&c, &rec(&[("dni", "12345678A"), ("birth_date", "")])));

        let with_blank = MemoryCensus::from_records(vec![rec(&[("Name", "John"), ("ID", "")])]);
        assert!(exists(&with_blank, &rec(&[("Name", "John"), ("ID", "")])));
        assert!(!exists(&with_blank, &rec(&[("Name", "John"), ("ID", "123")])));
    }

    #[test]
    fn lookups_use_the_non_blank_values() {
        let c = census();
        let p = MatchPredicate::for_values(&rec(&[("dni", "12345678A"), ("birth_date", " ")])).unwrap();
        assert_eq!(p.clauses(), &[("dni".to_string(), "12345678A".to_string())]);
        assert!(c.any_match(&p));
        assert_eq!(MatchPredicate::for_values(&rec(&[("dni", " ")])), None);
    }

    #[test]
    fn records_without_fields_never_match() {
        let c = census();
        assert_eq!(MatchPredicate::for_record(&Record::new()), None);
        assert!(MatchPredicate::for_record(&rec(&[("dni", " ")])).is_some());
        assert!(!exists(&c, &rec(&[("dni", ""), ("birth_date", "  ")])));
        assert!(!exists(&c, &Record::new()));
    }

    #[test]
    fn insert_rejects_empty_and_identical_records() {
        let mut c = census();
        assert_eq!(c.insert(rec(&[("dni", "")])), Err(StoreError::EmptyRecord));
        assert_eq!(
            c.insert(rec(&[("dni", "12345678A"), ("birth_date", "1990-01-01")])),
            Err(StoreError::DuplicateEntry)
        );
        assert_eq!(c.insert(rec(&[("dni", "87654321B")])), Ok(()));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn transactions_stage_records() {
        let mut c = census();
        c.begin().unwrap();
        assert_eq!(c.begin(), Err(StoreError::TransactionInProgress));
        c.insert(rec(&[("dni", "1")])).unwrap();
        // Staged records are visible to the checks of the same transaction.
        assert!(exists(&c, &rec(&[("dni", "1")])));
        assert_eq!(c.len(), 1);
        c.rollback().unwrap();
        assert!(!exists(&c, &rec(&[("dni", "1")])));
        assert_eq!(c.commit(), Err(StoreError::NoTransaction));

        c.begin().unwrap();
        c.insert(rec(&[("dni", "2")])).unwrap();
        c.commit().unwrap();
        assert_eq!(c.len(), 2);
        assert!(!c.in_transaction());
    }

    #[test]
    fn staged_removal_waits_for_the_commit() {
        let mut c = census();
        c.begin().unwrap();
        assert_eq!(c.remove_all(), Ok(1));
        assert_eq!(c.len(), 1);
        assert!(!exists(&c, &rec(&[("dni", "12345678A")])));
        c.rollback().unwrap();
        assert!(exists(&c, &rec(&[("dni", "12345678A")])));

        c.begin().unwrap();
        c.remove_all().unwrap();
        c.insert(rec(&[("dni", "2")])).unwrap();
        c.commit().unwrap();
        assert_eq!(c.voters(), &[rec(&[("dni", "2")])]);
    }

    #[test]
    fn batch_skips_known_and_repeated_records() {
        let mut c = census();
        let batch = vec![
            rec(&[("dni", "12345678A"), ("birth_date", "1990-01-01")]),
            rec(&[("dni", "2"), ("birth_date", "2000-02-02")]),
            rec(&[("dni", "2"), ("birth_date", "2000-02-02")]),
        ];
        let outcome = import_batch(&mut c, &batch).unwrap();
        assert_eq!(
            outcome,
            BatchOutcome {
                imported: 1,
                skipped: 2,
                removed: 0
            }
        );
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn failed_batch_is_rolled_back() {
        let mut c = census();
        let batch = vec![rec(&[("dni", "3")]), rec(&[("dni", "")])];
        assert_eq!(import_batch(&mut c, &batch), Err(StoreError::EmptyRecord));
        assert_eq!(c.len(), 1);
        assert!(!c.in_transaction());
    }

    #[test]
    fn replacing_the_census() {
        let mut c = census();
        let batch = vec![
            rec(&[("dni", "12345678A"), ("birth_date", "1990-01-01")]),
            rec(&[("dni", "3"), ("birth_date", "")]),
        ];
        let outcome = replace_census(&mut c, &batch).unwrap();
        assert_eq!(
            outcome,
            BatchOutcome {
                imported: 2,
                skipped: 0,
                removed: 1
            }
        );
        assert_eq!(c.voters(), batch.as_slice());
    }

    #[test]
    fn failed_replacement_keeps_the_voters() {
        let mut c = census();
        let batch = vec![rec(&[("dni", "3")]), rec(&[("dni", "")])];
        assert_eq!(replace_census(&mut c, &batch), Err(StoreError::EmptyRecord));
        assert_eq!(c.voters(), census().voters());
        assert!(!c.in_transaction());
    }

    #[test]
    fn remove_and_remove_all() {
        let mut c = census();
        c.insert(rec(&[("dni", "2"), ("birth_date", "2000-02-02")]))
            .unwrap();
        let p = MatchPredicate::for_values(&rec(&[("dni", "2")])).unwrap();
        assert_eq!(c.remove(&p), 1);
        assert_eq!(c.remove_all(), Ok(1));
        assert!(c.is_empty());
    }
}
