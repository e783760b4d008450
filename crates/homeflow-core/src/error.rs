use crate::io::status;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("No flow with name \"{0}\" found")]
    FlowNotFound(String),

    #[error("No operator with name \"{0}\" found")]
    OperatorNotFound(String),

    #[error("Flow \"{0}\" already exists, please explicitly delete the flow to continue")]
    AlreadyExists(String),

    #[error("Invalid flow id \"{0}\"")]
    InvalidFlowId(String),

    #[error("{0}")]
    Conversion(String),

    #[error("Storage error for {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowError {
    /// HTTP-style status used when the error ends up in an output envelope
    pub fn status_code(&self) -> u16 {
        match self {
            FlowError::Validation(ValidationError::UnknownOperator { .. }) => status::NOT_FOUND,
            FlowError::Validation(_) => status::BAD_REQUEST,
            FlowError::FlowNotFound(_) | FlowError::OperatorNotFound(_) => status::NOT_FOUND,
            FlowError::AlreadyExists(_) => status::CONFLICT,
            FlowError::InvalidFlowId(_) => status::BAD_REQUEST,
            FlowError::Conversion(_) => status::INTERNAL_SERVER_ERROR,
            FlowError::Storage { .. } | FlowError::Io(_) | FlowError::Serialization(_) => {
                status::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Reasons a flow description is rejected by `FlowDesc::complete`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No steps defined")]
    NoSteps,

    #[error("Step name cannot be \"_\"")]
    ReservedName,

    #[error("Step name \"{0}\" is used multiple times")]
    DuplicateName(String),

    #[error("Step \"{step}\" references unknown operator \"{operator}\"")]
    UnknownOperator { step: String, operator: String },

    #[error("Step \"{step}\" references unknown {field} \"{target}\"")]
    UnknownReference {
        step: String,
        field: &'static str,
        target: String,
    },

    #[error("Step \"{step}\" references the same {field} and executeOnFailOf \"{target}\"")]
    AmbiguousCondition {
        step: String,
        field: &'static str,
        target: String,
    },

    #[error("Flow description references unknown outputFrom \"{0}\"")]
    UnknownOutputFrom(String),
}

/// Failures while resolving `${...}` placeholders in step arguments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubstitutionError {
    #[error("Output \"{0}\" not found")]
    OutputNotFound(String),

    #[error("Cannot get \"{field}\" from \"{output}\": {reason}")]
    NotAMap {
        output: String,
        field: String,
        reason: String,
    },

    #[error("Variable \"{field}\" not found in output \"{output}\"")]
    FieldNotFound { output: String, field: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid duration \"{0}\"")]
pub struct DurationError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),

    #[error("Hook panicked: {0}")]
    Panicked(String),
}
