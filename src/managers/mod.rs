pub mod logging;
pub mod runner;
