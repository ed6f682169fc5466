//! Search and evaluation for korppi: a multi-PV scout searcher with
//! iterative deepening, aspiration windows and a lock-free
//! transposition table.

pub mod eval;
pub mod score;
pub mod search;

pub use eval::{evaluate, mvv_lva, see};
pub use search::control::StopHandle;
pub use search::{Engine, EngineError, EngineOptions, SearchDetails, Variation};
