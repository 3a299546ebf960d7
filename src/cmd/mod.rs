//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `serve`    | `Serve`          |
//! | `evaluate` | `Evaluate`       |
//! | `audit`    | `Audit`          |

pub mod audit;
pub mod evaluate;
pub mod serve;

pub use audit::cmd_audit;
pub use evaluate::cmd_evaluate;
pub use serve::cmd_serve;
