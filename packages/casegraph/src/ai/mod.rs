//! Model clients behind the [`crate::traits::model`] seams.

#[cfg(feature = "gemini")]
pub mod gemini;
