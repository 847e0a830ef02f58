//! Step definitions, one module per feature area

mod event_validation;
mod login;
mod source_destination;
