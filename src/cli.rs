//! CLI domain: parse, route, and output only.
//! Commands drive a stack opened from [`crate::config::StackConfig`].

mod output;
mod parse;
mod route;

pub use output::{format_demo_report, format_records_json, format_records_table, map_error, DemoReport};
pub use parse::{Cli, Commands};
pub use route::RunContext;
