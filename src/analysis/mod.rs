pub mod backlog;
pub mod calendar;
pub mod dedup;
pub mod labels;
pub mod monthly;
pub mod resolution;
pub mod rules;
