//! Pull-based record streams and the stages that transform them.
//!
//! A pipeline is a [`RecordStream`] pulled by the worker loop. Transformations
//! are [`Stage`]s composed explicitly in a [`StageChain`]; each stage wraps the
//! upstream iterator and touches records only when the downstream asks for one.
//! Stopping the pull stops the whole chain.
//!
//! ```
//! use ironstream::stage::{BitextFilter, RecordStream, StageChain, Tag, from_records};
//! use ironstream::Record;
//!
//! let input: RecordStream = from_records(vec![Record::from_line("a\tb\tdoc1")]);
//! let out: Vec<Record> = StageChain::new()
//!     .then(Tag::new("<2de> "))
//!     .then(BitextFilter::new(2))
//!     .apply(input)
//!     .collect::<anyhow::Result<_>>()?;
//! assert_eq!(out[0].to_line_all(), "<2de> a\tb");
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::record::Record;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use std::sync::Arc;

/// A lazy, possibly infinite stream of records. Errors travel in-band.
pub type RecordStream = Box<dyn Iterator<Item = Result<Record>>>;

/// Wrap an in-memory list as a stream.
#[must_use]
pub fn from_records(records: Vec<Record>) -> RecordStream {
    Box::new(records.into_iter().map(Ok::<Record, anyhow::Error>))
}

/// One transformation step.
pub trait Stage {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Wrap `input`, returning the transformed stream.
    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream;
}

/// An ordered list of stages applied front to back.
#[derive(Default)]
pub struct StageChain {
    stages: Vec<Box<dyn Stage>>,
}

impl StageChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    #[must_use]
    pub fn then<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn apply(self, input: RecordStream) -> RecordStream {
        self.stages
            .into_iter()
            .fold(input, |stream, stage| stage.apply(stream))
    }
}

/// Per-record fallible mapping.
pub struct MapStage<F> {
    name: String,
    f: F,
}

impl<F> MapStage<F>
where
    F: FnMut(Record) -> Result<Record> + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Stage for MapStage<F>
where
    F: FnMut(Record) -> Result<Record> + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        let mut f = self.f;
        Box::new(input.map(move |r| r.and_then(&mut f)))
    }
}

/// Keeps records for which the predicate holds.
pub struct FilterStage<F> {
    name: String,
    pred: F,
}

impl<F> FilterStage<F>
where
    F: FnMut(&Record) -> bool + 'static,
{
    pub fn new(name: impl Into<String>, pred: F) -> Self {
        Self {
            name: name.into(),
            pred,
        }
    }
}

impl<F> Stage for FilterStage<F>
where
    F: FnMut(&Record) -> bool + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        let mut pred = self.pred;
        Box::new(input.filter(move |r| match r {
            Ok(record) => pred(record),
            Err(_) => true,
        }))
    }
}

fn map_fields(mut record: Record, fields: &[usize], f: impl Fn(&str) -> String) -> Record {
    for &i in fields {
        let value = f(record.get(i).unwrap_or(""));
        record.set(i, value);
    }
    record
}

/// Prefix fields (default: the source field) with a tag.
pub struct Tag {
    tag: String,
    fields: Vec<usize>,
}

impl Tag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self::on_fields(tag, vec![0])
    }

    pub fn on_fields(tag: impl Into<String>, fields: Vec<usize>) -> Self {
        Self {
            tag: tag.into(),
            fields,
        }
    }
}

impl Stage for Tag {
    fn name(&self) -> &str {
        "tag"
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        let Tag { tag, fields } = *self;
        Box::new(input.map(move |r| r.map(|rec| map_fields(rec, &fields, |s| format!("{tag}{s}")))))
    }
}

/// Lowercase the given fields.
pub struct Lowercase {
    fields: Vec<usize>,
}

impl Lowercase {
    #[must_use]
    pub fn new(fields: Vec<usize>) -> Self {
        Self { fields }
    }
}

impl Stage for Lowercase {
    fn name(&self) -> &str {
        "lowercase"
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        let fields = self.fields;
        Box::new(input.map(move |r| r.map(|rec| map_fields(rec, &fields, str::to_lowercase))))
    }
}

/// Title-case the given fields: first letter of every word upper, rest lower.
pub struct TitleCase {
    fields: Vec<usize>,
}

impl TitleCase {
    #[must_use]
    pub fn new(fields: Vec<usize>) -> Self {
        Self { fields }
    }
}

impl Stage for TitleCase {
    fn name(&self) -> &str {
        "titlecase"
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        let fields = self.fields;
        Box::new(input.map(move |r| r.map(|rec| map_fields(rec, &fields, title_case))))
    }
}

/// Upper-case the first alphabetic character after every non-alphabetic one.
#[must_use]
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// Randomly recase records: unchanged, lowercased source, or title-cased
/// source and target, in the given proportions.
pub struct CaseMix {
    weights: [f64; 3],
    rng: StdRng,
}

impl CaseMix {
    /// `weights` are `[unchanged, lowercase, titlecase]` and should sum to one.
    #[must_use]
    pub fn new(weights: [f64; 3], seed: u64) -> Self {
        Self {
            weights,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Stage for CaseMix {
    fn name(&self) -> &str {
        "case-mix"
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        let CaseMix { weights, mut rng } = *self;
        Box::new(input.map(move |r| {
            r.map(|rec| {
                let u: f64 = rng.random();
                if u < weights[0] {
                    rec
                } else if u < weights[0] + weights[1] {
                    map_fields(rec, &[0], str::to_lowercase)
                } else {
                    map_fields(rec, &[0, 1], title_case)
                }
            })
        }))
    }
}

/// Keep only the first `keep` fields.
pub struct BitextFilter {
    keep: usize,
}

impl BitextFilter {
    #[must_use]
    pub const fn new(keep: usize) -> Self {
        Self { keep }
    }
}

impl Stage for BitextFilter {
    fn name(&self) -> &str {
        "bitext-filter"
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        let keep = self.keep;
        Box::new(input.map(move |r| {
            r.map(|mut rec| {
                rec.truncate(keep);
                rec
            })
        }))
    }
}

/// Drop records that are missing, or blank in, any of the given fields.
pub struct SkipBlanks {
    fields: Vec<usize>,
}

impl SkipBlanks {
    #[must_use]
    pub fn new(fields: Vec<usize>) -> Self {
        Self { fields }
    }
}

impl Stage for SkipBlanks {
    fn name(&self) -> &str {
        "skip-blanks"
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        let fields = self.fields;
        let pred = move |rec: &Record| fields.iter().all(|&i| rec.get(i).is_some_and(|f| !f.is_empty()));
        Box::new(FilterStage::new("skip-blanks", pred)).apply(input)
    }
}

/// Drop records where `regex` matches in any of the given fields. Inverted, keep
/// only records where it matches in all of them.
pub struct RegexFilter {
    regex: Regex,
    fields: Vec<usize>,
    invert: bool,
}

impl RegexFilter {
    /// # Errors
    /// Fails if `pattern` is not a valid regular expression.
    pub fn new(pattern: &str, fields: Vec<usize>, invert: bool) -> Result<Self> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            fields,
            invert,
        })
    }
}

impl Stage for RegexFilter {
    fn name(&self) -> &str {
        "regex-filter"
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        let RegexFilter {
            regex,
            fields,
            invert,
        } = *self;
        let pred = move |rec: &Record| {
            if rec.len() < fields.len() {
                return false;
            }
            let mut found = fields
                .iter()
                .map(|&i| regex.is_match(rec.get(i).unwrap_or("")));
            if invert {
                found.all(|hit| hit)
            } else {
                !found.any(|hit| hit)
            }
        };
        Box::new(FilterStage::new("regex-filter", pred)).apply(input)
    }
}

/// Subword tokenizer consumed by [`Encode`] / [`Decode`].
///
/// Both directions receive and return the source and target fields only.
pub trait Tokenizer {
    fn encode(&self, fields: &[String]) -> Result<Vec<String>>;

    fn decode(&self, fields: &[String]) -> Result<Vec<String>>;
}

fn rewrite_bitext(
    mut record: Record,
    f: impl FnOnce(&[String]) -> Result<Vec<String>>,
) -> Result<Record> {
    let pair = [
        record.get(0).unwrap_or("").to_string(),
        record.get(1).unwrap_or("").to_string(),
    ];
    for (i, value) in f(&pair)?.into_iter().take(2).enumerate() {
        record.set(i, value);
    }
    Ok(record)
}

/// Tokenize fields 0 and 1.
pub struct Encode {
    tokenizer: Arc<dyn Tokenizer>,
}

impl Encode {
    #[must_use]
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }
}

impl Stage for Encode {
    fn name(&self) -> &str {
        "encode"
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        let tok = self.tokenizer;
        Box::new(input.map(move |r| r.and_then(|rec| rewrite_bitext(rec, |f| tok.encode(f)))))
    }
}

/// Detokenize fields 0 and 1.
pub struct Decode {
    tokenizer: Arc<dyn Tokenizer>,
}

impl Decode {
    #[must_use]
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }
}

impl Stage for Decode {
    fn name(&self) -> &str {
        "decode"
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        let tok = self.tokenizer;
        Box::new(input.map(move |r| r.and_then(|rec| rewrite_bitext(rec, |f| tok.decode(f)))))
    }
}
