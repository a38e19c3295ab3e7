//! Regulatory rules: zone categories, jurisdiction rulebook, parameter
//! tables, the overlap resolver and compliance checks.

pub mod categories;
pub mod compliance;
pub mod parameters;
pub mod resolver;
pub mod rulebook;
