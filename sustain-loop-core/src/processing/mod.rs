pub mod analysis;
pub mod constraint;
pub mod loop_search;
