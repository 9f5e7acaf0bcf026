//! Core pipeline implementation
//!
//! This module contains the match model, the backend orchestration, and the
//! witness/cause analyses behind the rexdiff commands.

pub mod analyze;
pub mod classify;
pub mod evaluate;
pub mod generate;
pub mod matching;
pub mod pool;
pub mod portability;
pub mod process;
pub mod witness;
