pub mod file;
pub mod xml;
pub(crate) mod zip;
