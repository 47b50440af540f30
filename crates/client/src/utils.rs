//! Utility macros shared by the client crate.

/// Returns early with an error if a precondition does not hold.
///
/// This is the non-panicking counterpart of `assert!`: contract violations such
/// as cyclic header defaults are reported to the offending call site instead
/// of tearing down the reactor thread.
///
/// # Example
///
/// ```ignore
/// ensure!(!self.has_in_chain(other), HeaderError::CyclicDefaults);
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
