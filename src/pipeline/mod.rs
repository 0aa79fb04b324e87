//! Email classification pipeline.
//!
//! Every submitted email flows through:
//! 1. `source`: subject/body from the first attachment when the form is incomplete
//! 2. `rules::RequestClassifier`: request type, sub-type and confidence
//! 3. `fields::FieldExtractor`: amount, date, deal, parties, account
//! 4. `duplicates::DuplicateDetector`: verdict against recent history
//!
//! Steps 2 and 3 read the same text and run concurrently.

pub mod duplicates;
pub mod fields;
pub mod processor;
pub mod rules;
pub mod source;
pub mod types;
