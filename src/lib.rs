pub mod adapters;
pub mod approval;
pub mod audit;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod evaluate;
pub mod exec;
pub mod issue;
pub mod notify;
pub mod server;
pub mod util;
