//! Row collections: a batch of same-shaped records edited together.
//!
//! A submission is bound against the records the caller is allowed to edit,
//! every row is validated, and only a fully valid submission produces a
//! [`RowBatch`]. Stores apply a batch as one unit, so a single bad row means
//! nothing is written.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Key used for errors that belong to a row or form as a whole.
pub const NON_FIELD: &str = "__all__";

/// A stored record that can be edited through a row collection.
pub trait Record {
    type Id: Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display;
    type Draft;

    fn id(&self) -> Self::Id;
}

/// Editable fields of one row.
pub trait RowFields {
    /// True when an added row was left empty and should be ignored.
    fn is_blank(&self) -> bool;
}

/// One submitted row. `id` is absent for added rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "Id: Deserialize<'de>, F: Deserialize<'de>"))]
pub struct RowInput<Id, F> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(default)]
    pub delete: bool,
    #[serde(flatten)]
    pub fields: F,
}

impl<Id, F> RowInput<Id, F> {
    pub fn added(fields: F) -> Self {
        Self {
            id: None,
            delete: false,
            fields,
        }
    }

    pub fn existing(id: Id, fields: F) -> Self {
        Self {
            id: Some(id),
            delete: false,
            fields,
        }
    }

    pub fn removed(id: Id, fields: F) -> Self {
        Self {
            id: Some(id),
            delete: true,
            fields,
        }
    }
}

/// Validated changes ready to be applied atomically.
#[derive(Debug)]
pub struct RowBatch<R: Record> {
    pub created: Vec<R::Draft>,
    pub updated: Vec<R>,
    pub deleted: Vec<R::Id>,
}

impl<R: Record> Default for RowBatch<R> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<R: Record> RowBatch<R> {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            created: self.created.len(),
            updated: self.updated.len(),
            deleted: self.deleted.len(),
        }
    }
}

/// Row counts reported after a batch has been applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Outcome of cleaning a single row.
#[derive(Debug)]
pub enum Cleaned<R: Record> {
    Create(R::Draft),
    Update(R),
}

/// Per-field messages for one form or row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(value)` when no message was recorded.
    pub fn finish<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

/// Errors for a whole row collection, keyed by submitted row position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RowErrors {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub rows: BTreeMap<usize, FieldErrors>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub non_row: Vec<String>,
}

impl RowErrors {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.non_row.is_empty()
    }

    pub fn row(&mut self, position: usize) -> &mut FieldErrors {
        self.rows.entry(position).or_default()
    }
}

/// Everything wrong with a submission: top-level form fields and/or rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors {
    #[serde(skip_serializing_if = "FieldErrors::is_empty")]
    pub fields: FieldErrors,
    #[serde(skip_serializing_if = "RowErrors::is_empty")]
    pub rows: RowErrors,
}

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.rows.is_empty()
    }
}

impl From<FieldErrors> for FormErrors {
    fn from(fields: FieldErrors) -> Self {
        Self {
            fields,
            rows: RowErrors::default(),
        }
    }
}

impl From<RowErrors> for FormErrors {
    fn from(rows: RowErrors) -> Self {
        Self {
            fields: FieldErrors::default(),
            rows,
        }
    }
}

/// Binding rules for a row collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowRules {
    /// The first `required_rows` rows must be present, kept, and non-blank.
    pub required_rows: usize,
}

impl RowRules {
    pub fn first_row_required() -> Self {
        Self { required_rows: 1 }
    }
}

/// Bind submitted rows to `existing` records and validate all of them.
///
/// Rows naming an id outside `existing` are rejected, so callers scope what
/// may be edited by what they pass in. Blank added rows are skipped unless
/// required. `clean` receives the stored record for edited rows.
pub fn bind_rows<R, F, C>(
    rows: &[RowInput<R::Id, F>],
    existing: &[R],
    rules: RowRules,
    mut clean: C,
) -> Result<RowBatch<R>, RowErrors>
where
    R: Record,
    F: RowFields,
    C: FnMut(&F, Option<&R>) -> Result<Cleaned<R>, FieldErrors>,
{
    let index: HashMap<R::Id, &R> = existing.iter().map(|record| (record.id(), record)).collect();
    let mut seen = HashSet::new();
    let mut batch = RowBatch::default();
    let mut errors = RowErrors::default();

    if rows.len() < rules.required_rows {
        errors.non_row.push(format!(
            "Please submit at least {} row{}.",
            rules.required_rows,
            if rules.required_rows == 1 { "" } else { "s" }
        ));
    }

    for (position, row) in rows.iter().enumerate() {
        let required = position < rules.required_rows;

        let current = match row.id {
            Some(id) => match index.get(&id) {
                Some(record) if seen.insert(id) => Some(*record),
                Some(_) => {
                    errors
                        .row(position)
                        .add("id", format!("Row {id} was submitted more than once."));
                    continue;
                }
                None => {
                    errors
                        .row(position)
                        .add("id", format!("Row {id} does not exist or cannot be edited here."));
                    continue;
                }
            },
            None => None,
        };

        if row.delete {
            if required {
                errors
                    .row(position)
                    .add(NON_FIELD, "This row is required and cannot be removed.");
            } else if let Some(record) = current {
                batch.deleted.push(record.id());
            }
            continue;
        }

        if current.is_none() && row.fields.is_blank() {
            if required {
                errors.row(position).add(NON_FIELD, "This row is required.");
            }
            continue;
        }

        match clean(&row.fields, current) {
            Ok(Cleaned::Create(draft)) => batch.created.push(draft),
            Ok(Cleaned::Update(record)) => batch.updated.push(record),
            Err(row_errors) => {
                errors.rows.insert(position, row_errors);
            }
        }
    }

    if errors.is_empty() {
        Ok(batch)
    } else {
        Err(errors)
    }
}

/// Trimmed copy of a text field, recording a message when it is required and empty.
pub(crate) fn required_text(
    errors: &mut FieldErrors,
    field: &str,
    value: &str,
    max_len: usize,
) -> String {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, "This field is required.");
    } else if value.chars().count() > max_len {
        errors.add(
            field,
            format!("Ensure this value has at most {max_len} characters."),
        );
    }
    value.to_string()
}

/// Unwraps a required value, recording a message when it is missing.
pub(crate) fn required_value<T: Copy>(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<T>,
) -> Option<T> {
    if value.is_none() {
        errors.add(field, "This field is required.");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: u64,
        text: String,
    }

    impl Record for Note {
        type Id = u64;
        type Draft = String;

        fn id(&self) -> u64 {
            self.id
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct NoteFields {
        #[serde(default)]
        text: String,
    }

    impl RowFields for NoteFields {
        fn is_blank(&self) -> bool {
            self.text.trim().is_empty()
        }
    }

    fn note(text: &str) -> NoteFields {
        NoteFields {
            text: text.to_string(),
        }
    }

    fn clean(fields: &NoteFields, current: Option<&Note>) -> Result<Cleaned<Note>, FieldErrors> {
        let mut errors = FieldErrors::new();
        let text = required_text(&mut errors, "text", &fields.text, 10);
        errors.finish(())?;
        Ok(match current {
            Some(note) => Cleaned::Update(Note { id: note.id, text }),
            None => Cleaned::Create(text),
        })
    }

    fn stored() -> Vec<Note> {
        vec![
            Note {
                id: 1,
                text: "one".to_string(),
            },
            Note {
                id: 2,
                text: "two".to_string(),
            },
        ]
    }

    #[test]
    fn splits_rows_into_creates_updates_and_deletes() {
        let rows = vec![
            RowInput::existing(1, note("uno")),
            RowInput::removed(2, note("two")),
            RowInput::added(note("three")),
            RowInput::added(note("   ")),
        ];

        let batch = bind_rows(&rows, &stored(), RowRules::default(), clean).expect("valid rows");

        assert_eq!(batch.created, vec!["three".to_string()]);
        assert_eq!(
            batch.updated,
            vec![Note {
                id: 1,
                text: "uno".to_string()
            }]
        );
        assert_eq!(batch.deleted, vec![2]);
        assert_eq!(
            batch.summary(),
            BatchSummary {
                created: 1,
                updated: 1,
                deleted: 1
            }
        );
    }

    #[test]
    fn one_invalid_row_rejects_the_whole_batch() {
        let rows = vec![
            RowInput::added(note("fine")),
            RowInput::existing(1, note("")),
            RowInput::added(note("far too long for the limit")),
        ];

        let errors = bind_rows(&rows, &stored(), RowRules::default(), clean).unwrap_err();

        assert_eq!(errors.rows.len(), 2);
        assert!(errors.rows[&1].get("text").is_some());
        assert!(errors.rows[&2].get("text").is_some());
    }

    #[test]
    fn rows_outside_the_editable_set_are_rejected() {
        let rows = vec![RowInput::existing(99, note("ghost"))];

        let errors = bind_rows(&rows, &stored(), RowRules::default(), clean).unwrap_err();

        assert!(errors.rows[&0].get("id").is_some());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let rows = vec![
            RowInput::existing(1, note("a")),
            RowInput::existing(1, note("b")),
        ];

        let errors = bind_rows(&rows, &stored(), RowRules::default(), clean).unwrap_err();

        assert_eq!(errors.rows.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn required_first_row_cannot_be_blank_missing_or_removed() {
        let rules = RowRules::first_row_required();

        let missing = bind_rows::<Note, NoteFields, _>(&[], &[], rules, clean).unwrap_err();
        assert_eq!(missing.non_row.len(), 1);

        let blank = bind_rows(&[RowInput::added(note(""))], &[], rules, clean).unwrap_err();
        assert_eq!(blank.rows[&0].get(NON_FIELD).map(<[String]>::len), Some(1));

        let removed =
            bind_rows(&[RowInput::removed(1, note("one"))], &stored(), rules, clean).unwrap_err();
        assert!(removed.rows[&0].get(NON_FIELD).is_some());

        let filled = bind_rows(&[RowInput::added(note("kept"))], &[], rules, clean)
            .expect("non-blank first row satisfies the rule");
        assert_eq!(filled.created.len(), 1);
    }

    #[test]
    fn rows_deserialize_with_flattened_fields() {
        let row: RowInput<u64, NoteFields> =
            serde_json::from_str(r#"{"id": 4, "delete": true, "text": "x"}"#).expect("json row");
        assert_eq!(row, RowInput::removed(4, note("x")));

        let added: RowInput<u64, NoteFields> =
            serde_json::from_str(r#"{"text": "new"}"#).expect("json row");
        assert_eq!(added, RowInput::added(note("new")));
    }
}
