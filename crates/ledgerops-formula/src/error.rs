use thiserror::Error;

pub type Result<T, E = FormulaError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("cannot parse formula `{formula}` at offset {offset}: {message}")]
    Parse {
        formula: String,
        offset: usize,
        message: String,
    },

    #[error("unknown identifier `{0}`: only int, str, float, rand, randint, choice, ceil and len are available")]
    UnknownIdentifier(String),

    #[error("unsupported operand types for {op}: {left} and {right}")]
    OperandTypes {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("{0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in `{0}`")]
    Overflow(&'static str),

    #[error("{0}")]
    Index(String),

    #[error("{function}() {message}")]
    Argument {
        function: &'static str,
        message: String,
    },
}
