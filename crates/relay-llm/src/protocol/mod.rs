//! Wire format types for each backend dialect
//!
//! Pure serde structs matching the JSON each backend speaks. They are only
//! used at the HTTP boundary; [`crate::convert`] maps them to canonical types.

pub mod lmstudio;
pub mod native;
pub mod ollama;
pub mod openai;
