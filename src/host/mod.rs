//! Native shell integration over stdin/stdout.

pub mod contract;
pub mod stdio;
