pub mod next_stage;
pub mod prompt;
pub mod serve;
