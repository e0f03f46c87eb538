pub mod config;
pub mod ics;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod session;
