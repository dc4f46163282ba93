pub mod bulk;
pub mod estimate;
pub mod monitor;
