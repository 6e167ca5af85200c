//! SeaORM entity definitions

pub mod leases;
pub mod prelude;
pub mod resume;
