pub mod issue;
pub mod kpi;
pub mod rules;
pub mod run;
