/// Error type for expression evaluation failures.
///
/// Each variant carries a human readable message. Callers that need to report the
/// failing expression wrap this error together with the expression text.
///
/// # Examples
///
/// ```rust
/// use atrius_fhirpath_support::EvaluationError;
///
/// let error = EvaluationError::TypeError("Expected Boolean, found Integer".to_string());
/// assert_eq!(error.to_string(), "Type Error: Expected Boolean, found Integer");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    /// The expression text could not be parsed.
    ///
    /// Example: "found ')' at 12, expected something else"
    ParseError(String),
    /// Type mismatch or incompatible type operation.
    ///
    /// Example: "Expected Boolean, found Integer"
    TypeError(String),
    /// Invalid argument provided to a function.
    ///
    /// Example: "substring() start must be an integer"
    InvalidArgument(String),
    /// Reference to a `%constant` that is neither built in nor supplied by the caller.
    UndefinedVariable(String),
    /// Incorrect number of arguments provided to a function.
    ///
    /// Example: "Function 'substring' expects 1 or 2 arguments, got 3"
    InvalidArity(String),
    /// Invalid collection index.
    InvalidIndex(String),
    /// Attempted division by zero.
    DivisionByZero,
    /// Invalid regular expression pattern.
    InvalidRegex(String),
    /// Operations expecting a single value received several.
    ///
    /// Example: "Expected singleton, found collection with 3 items"
    SingletonEvaluationError(String),
    /// A function name the evaluator does not know.
    UnsupportedFunction(String),
    /// Constant expansion recursed deeper than the evaluator allows.
    RecursionLimit(String),
    /// Generic error for cases not covered by specific variants.
    Other(String),
}

impl std::error::Error for EvaluationError {}

impl std::fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationError::ParseError(msg) => write!(f, "Parse Error: {}", msg),
            EvaluationError::TypeError(msg) => write!(f, "Type Error: {}", msg),
            EvaluationError::InvalidArgument(msg) => write!(f, "Invalid Argument: {}", msg),
            EvaluationError::UndefinedVariable(name) => write!(f, "Undefined Variable: {}", name),
            EvaluationError::InvalidArity(msg) => write!(f, "Invalid Arity: {}", msg),
            EvaluationError::InvalidIndex(msg) => write!(f, "Invalid Index: {}", msg),
            EvaluationError::DivisionByZero => write!(f, "Division by zero"),
            EvaluationError::InvalidRegex(msg) => write!(f, "Invalid Regex: {}", msg),
            EvaluationError::SingletonEvaluationError(msg) => {
                write!(f, "Singleton Evaluation Error: {}", msg)
            }
            EvaluationError::UnsupportedFunction(msg) => write!(f, "Unsupported Function: {}", msg),
            EvaluationError::RecursionLimit(msg) => write!(f, "Recursion Limit: {}", msg),
            EvaluationError::Other(msg) => write!(f, "Evaluation Error: {}", msg),
        }
    }
}
