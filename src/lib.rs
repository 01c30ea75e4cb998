pub mod error;
pub mod mortgage;
pub mod report;
