//! SQL support module.
//!
//! The compiler assembles its output as text, so this module only carries
//! what needs to understand SQL rather than print it:
//!
//! - [`dialect`] - SQL dialect implementations
//! - [`qualify`] - expression parsing, column qualification and fragment classification

pub mod dialect;
pub mod qualify;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect};
pub use qualify::{classify, parse_expression, qualify_columns, validate_sql, FragmentKind};
