//! Schema inference by sampling.
//!
//! Each non-null value casts one vote for the narrowest type that describes
//! it; a column's type is resolved from the set of votes it received. Any
//! combination that is not explicitly resolvable falls back to `string`.

use std::collections::BTreeSet;

use sluice_types::record::Record;
use sluice_types::schema::{Column, DataType, Schema};
use sluice_types::value::{parse_iso_date, parse_iso_datetime, Value};

pub const DEFAULT_SAMPLE_SIZE: usize = 100;

/// Result of [`infer`]: the schema plus how many records backed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaInference {
    pub schema: Schema,
    pub rows_sampled: usize,
}

impl SchemaInference {
    /// The sample was empty; the schema has zero columns.
    #[must_use]
    pub fn is_no_data(&self) -> bool {
        self.rows_sampled == 0
    }
}

/// Narrowest type a single non-null value fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Vote {
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    Text,
}

fn vote(value: &Value) -> Option<Vote> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(Vote::Boolean),
        Value::Int(_) => Some(Vote::Integer),
        Value::Float(_) => Some(Vote::Float),
        Value::Date(_) => Some(Vote::Date),
        Value::DateTime(_) => Some(Vote::Datetime),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(classify_text(s)),
    }
}

fn classify_text(s: &str) -> Vote {
    let trimmed = s.trim();
    if trimmed.parse::<i64>().is_ok() {
        Vote::Integer
    } else if trimmed.parse::<f64>().is_ok_and(f64::is_finite) {
        Vote::Float
    } else if matches!(
        trimmed.to_ascii_lowercase().as_str(),
        "true" | "false" | "yes" | "no"
    ) {
        Vote::Boolean
    } else if parse_iso_date(trimmed).is_some() {
        Vote::Date
    } else if parse_iso_datetime(trimmed).is_some() {
        Vote::Datetime
    } else {
        Vote::Text
    }
}

fn resolve(votes: &BTreeSet<Vote>) -> DataType {
    use Vote::{Boolean, Date, Datetime, Float, Integer};
    let only = |allowed: &[Vote]| votes.iter().all(|v| allowed.contains(v));
    if votes.is_empty() {
        DataType::String
    } else if only(&[Integer]) {
        DataType::Integer
    } else if only(&[Integer, Float]) {
        DataType::Float
    } else if only(&[Boolean]) {
        DataType::Boolean
    } else if only(&[Date]) {
        DataType::Date
    } else if only(&[Date, Datetime]) {
        DataType::Datetime
    } else {
        DataType::String
    }
}

struct ColumnTally {
    name: String,
    votes: BTreeSet<Vote>,
    nullable: bool,
}

/// Infer a schema from at most `sample_size` records, pulling lazily from
/// `samples`. Column order follows first appearance.
pub fn infer<I>(samples: I, sample_size: usize) -> SchemaInference
where
    I: IntoIterator<Item = Record>,
{
    let mut tallies: Vec<ColumnTally> = Vec::new();
    let mut rows_sampled = 0;

    for record in samples.into_iter().take(sample_size) {
        rows_sampled += 1;
        for tally in &mut tallies {
            if !record.contains(&tally.name) {
                tally.nullable = true;
            }
        }
        for (name, value) in record.iter() {
            let idx = match tallies.iter().position(|t| t.name == name) {
                Some(idx) => idx,
                None => {
                    tallies.push(ColumnTally {
                        name: name.to_owned(),
                        votes: BTreeSet::new(),
                        // Absent from every earlier record.
                        nullable: rows_sampled > 1,
                    });
                    tallies.len() - 1
                }
            };
            match vote(value) {
                Some(v) => {
                    tallies[idx].votes.insert(v);
                }
                None => tallies[idx].nullable = true,
            }
        }
    }

    let columns = tallies
        .into_iter()
        .map(|t| {
            let data_type = resolve(&t.votes);
            Column::new(t.name, data_type, t.nullable || t.votes.is_empty())
        })
        .collect();

    SchemaInference {
        schema: Schema::new(columns),
        rows_sampled,
    }
}
