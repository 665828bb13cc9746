//! Crate-wide error type for API-boundary failures.
//!
//! Only conditions detectable before (or instead of) doing work are errors:
//! bad parameters, unknown neighbourhood or solver symbols. Loops that run
//! out of iterations or hit numerical degeneracies still return their partial
//! result together with a [`Termination`](crate::segmentation::Termination)
//! status. Violated solver invariants are programming bugs and are checked
//! with `debug_assert!`.

/// Errors reported at the public API boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A caller-supplied parameter failed validation.
    InvalidArgument(String),
    /// The neighbourhood symbol does not name a known offset system.
    UnsupportedNeighbourhood(String),
    /// The max-flow selector does not name an available grid solver.
    UnknownSolver(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "{msg}"),
            Error::UnsupportedNeighbourhood(sym) => {
                write!(f, "Unsupported neighbourhood '{sym}'")
            }
            Error::UnknownSolver(sym) => {
                if sym.starts_with("GEN-") {
                    write!(
                        f,
                        "Unknown grid max-flow algorithm '{sym}' (general-graph solvers are not \
                         available through the grid factory)"
                    )
                } else {
                    write!(f, "Unknown grid max-flow algorithm '{sym}'")
                }
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_symbol() {
        let e = Error::UnsupportedNeighbourhood("N5".to_string());
        assert!(e.to_string().contains("Unsupported neighbourhood"));
        assert!(e.to_string().contains("N5"));

        let e = Error::UnknownSolver("GEN-BK".to_string());
        assert!(e.to_string().contains("GEN-BK"));
        assert!(e.to_string().contains("general-graph"));
    }
}
