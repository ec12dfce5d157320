pub mod formula;
pub mod progress;
pub mod safe_eval;

pub use formula::{apply_formula, flt};
pub use progress::ProgressReporter;
pub use safe_eval::{safe_eval, FormulaError};
