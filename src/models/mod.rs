pub mod classify_types;
pub mod suggestion_types;
