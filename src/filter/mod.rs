//! History rewriting that turns an instance repository into template shape.

/// Byte-level substitution of variable values and Jinja syntax.
pub(crate) mod replace;
/// Commit-by-commit rewrite of trees and refs.
pub(crate) mod rewrite;

pub use replace::{Replacements, VariableSelection};
pub use rewrite::{FilterReport, RepositoryFilter};
