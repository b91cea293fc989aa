pub mod bronze;
pub mod db;
pub mod pipeline;
pub mod settings;
