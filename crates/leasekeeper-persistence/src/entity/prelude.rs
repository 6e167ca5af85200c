pub use super::leases::Entity as Leases;
pub use super::resume::Entity as Resume;
