use derive_more::{Display, Error};

/// Failure modes of the triplet / Harwell-Boeing sparse kernel.
#[derive(Debug, Display, Error, PartialEq, Clone, Copy)]
pub enum SparseMatrixError {
    #[display("matrix entry index out of range")]
    InvalidMatrixIndex,

    #[display("structure was already set on this matrix")]
    AlreadyInitialized,

    #[display("values were set before structure")]
    NotInitialized,

    #[display("duplicate (row, column) entry")]
    DuplicateEntry,

    #[display("matrix dimensions do not match the operand")]
    DimensionMismatch,
}

/// Failure modes of the elastic-QP builder.
#[derive(Debug, Display, Error, PartialEq, Clone, Copy)]
pub enum QpBuilderError {
    #[display("no update was staged since the last successful solve")]
    QpUnchanged,

    #[display("the builder was queried before an initial solve")]
    NotInitialized,

    #[display("underlying sparse matrix operation failed: {_0}")]
    Sparse(SparseMatrixError),

    #[display("QP solve did not reach optimality: {_0:?}")]
    NotOptimal(#[error(ignore)] crate::backend::BackendStatus),
}

/// Failure modes of the QP backend facade.
#[derive(Debug, Display, Error, PartialEq, Clone, Copy)]
pub enum QpBackendError {
    #[display("working-set label outside the 4-valued enumeration")]
    InvalidWorkingSet,

    #[display("backend reported an internal error")]
    Internal,

    #[display("linear system solve failed during the active-set pivot")]
    LinearSolveFailed,
}

/// Terminal failure modes of the outer SQP driver that propagate directly to
/// the caller (see spec §7: these are never locally recovered).
#[derive(Debug, Display, Error, PartialEq, Clone, Copy)]
pub enum DriverError {
    #[display("predicted reduction was non-positive: rho*eta - q = {pred}")]
    PredReductionNonPositive { pred: f64 },

    #[display("an NLP evaluator reported failure")]
    InvalidNlp,

    #[display("working-set label outside the 4-valued enumeration")]
    InvalidWorkingSet,
}

impl From<SparseMatrixError> for QpBuilderError {
    fn from(e: SparseMatrixError) -> Self {
        QpBuilderError::Sparse(e)
    }
}
