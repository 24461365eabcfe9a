//! Formula language for `=` smart values.
//!
//! Formulas are small Python-flavoured expressions: arithmetic, comparisons,
//! boolean logic, list and dict literals, indexing and calls to a fixed set of
//! functions (`int`, `str`, `float`, `rand`, `randint`, `choice`, `ceil`,
//! `len`). Nothing else can be named, so a scene file cannot reach anything
//! outside the evaluator.
//!
//! ```
//! use ledgerops_formula::{Evaluator, FormulaRng};
//! use ledgerops_store::Value;
//!
//! let mut rng = FormulaRng::with_seed(42);
//! let mut evaluator = Evaluator::new(&mut rng);
//! assert_eq!(evaluator.evaluate("10**18").unwrap(), Value::Int(10i128.pow(18)));
//! ```

pub mod ast;
pub mod error;
pub mod eval;
pub mod parser;
pub mod rng;

pub use ast::Expr;
pub use error::{FormulaError, Result};
pub use eval::{evaluate, Evaluator, FUNCTIONS};
pub use parser::parse_formula;
pub use rng::FormulaRng;
