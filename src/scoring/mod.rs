pub mod blend;
pub mod predictive;
pub mod retrospective;
pub mod tables;
