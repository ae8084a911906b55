//! Phase document contract shared by the template, engine and CLI crates.
//!
//! A [`PhaseDocument`] is the unit of work in an ACE session: one filled
//! template for one phase. Documents carry their declared [`Reference`]s to
//! earlier phases and, once complete, the collaborator's [`PhaseOutput`].
//!
//! # Purpose
//!
//! Keeps the document lifecycle in one place so that no other crate can move
//! a document backwards or edit a completed one.

pub mod document;
pub mod output;
pub mod reference;

pub use document::{DocumentId, NewDocument, PhaseDocument, TransitionRejected};
pub use output::{PhaseOutput, parse_sections, parse_verdict};
pub use reference::{Reference, ReferenceRule, ReferenceWhen, slot_key};

pub use ace_utils::types::{DocumentStatus, PhaseId, Verdict};
