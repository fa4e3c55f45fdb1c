pub mod assembler;
pub mod driver;
pub mod file;
pub mod pipeline;
pub mod plan;
pub mod planner;
pub mod summary;
pub mod tokens;
