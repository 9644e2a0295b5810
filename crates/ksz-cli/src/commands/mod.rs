pub mod cache;
pub mod plan;
pub mod run;
