use thiserror::Error;

use crate::model::{ClassId, MethodId, MethodSig};

macro_rules! broken {
    // Single string version
    ($msg:expr) => {
        crate::Error::BrokenReference {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::BrokenReference {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers all fatal conditions of the transformation pipeline. Per-candidate pass
/// decisions (a call site that is not inlined, a class pair that is not merged) are *values*,
/// recorded in the event log, and never surface through this type.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::UnknownReference`] - A directive or reference names an entity that does not exist
/// - [`Error::DuplicateClass`] - Two class definitions share one identity
/// - [`Error::CyclicHierarchy`] - The supertype/implements graph contains a cycle
/// - [`Error::MalformedBody`] - A method body violates the linear-body well-formedness rules
///
/// ## Pipeline Defects
/// - [`Error::BrokenReference`] - A reference lost its resolving declaration after a
///   transformation; indicates an unsound pass and aborts the pipeline
/// - [`Error::AmbiguousDefaultMethod`] - Diamond default-method conflict with no override
///
/// ## Simulation Errors
/// - [`Error::Simulation`] - The execution simulator hit a fault (null receiver, failed cast,
///   fuel exhaustion) while evaluating a modeled program
#[derive(Error, Debug)]
pub enum Error {
    /// A directive or reference names an entity that does not exist in the program.
    ///
    /// Surfaced immediately during directive resolution or model commit; no partial
    /// output is produced.
    #[error("Unknown reference - {0}")]
    UnknownReference(String),

    /// A reference lost its resolving declaration after a transformation.
    ///
    /// This is an internal-consistency failure: some upstream pass removed, merged or
    /// relocated a declaration without rewriting every reference that depended on it.
    /// The pipeline aborts rather than emit unsound output. The error carries the source
    /// location where the inconsistency was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the reference that no longer resolves
    /// * `file` - Source file in which the inconsistency was detected
    /// * `line` - Source line in which the inconsistency was detected
    #[error("Broken reference - {file}:{line}: {message}")]
    BrokenReference {
        /// The message to be printed for the broken reference
        message: String,
        /// The source file in which this error was detected
        file: &'static str,
        /// The source line in which this error was detected
        line: u32,
    },

    /// Two unrelated interfaces provide default bodies for the same signature and the
    /// implementing class does not override it.
    ///
    /// Mirrors language-level ambiguity rules: the conflict must surface as an error
    /// rather than be resolved silently by first-match ordering.
    #[error("Ambiguous default method {signature} on {class}: provided by both {first} and {second}")]
    AmbiguousDefaultMethod {
        /// The implementing class on which the conflict was detected
        class: ClassId,
        /// The conflicting method signature
        signature: MethodSig,
        /// First conflicting default declaration
        first: MethodId,
        /// Second conflicting default declaration
        second: MethodId,
    },

    /// Two class definitions with the same identity were committed to one program.
    #[error("Duplicate class definition - {0}")]
    DuplicateClass(ClassId),

    /// The supertype/implements graph is not acyclic.
    ///
    /// The reported class participates in the cycle that was detected.
    #[error("Cyclic class hierarchy involving {0}")]
    CyclicHierarchy(ClassId),

    /// A method body violates the structural rules of the instruction model.
    ///
    /// Bodies are linear: every instruction except the trailing terminator must be a
    /// non-terminator, local slots must stay within the declared frame, and parameter
    /// slots must not exceed the frame size.
    #[error("Malformed body in {method}: {message}")]
    MalformedBody {
        /// The method whose body failed validation
        method: MethodId,
        /// Description of the violated rule
        message: String,
    },

    /// The execution simulator encountered a runtime fault.
    ///
    /// Raised for null receivers, failed casts, missing bodies and fuel exhaustion while
    /// evaluating a modeled program. Only ever produced by the simulator, never by the
    /// transformation passes themselves.
    #[error("Simulation fault - {0}")]
    Simulation(String),
}
