//! CLI command implementations.
//!
//! | Module      | Commands handled            |
//! |-------------|-----------------------------|
//! | `diagnose`  | `Diagnose`, `Signatures`    |
//! | `config`    | `Config`                    |
//! | `audit`     | `Audit`                     |

pub mod audit;
pub mod config;
pub mod diagnose;

pub use audit::cmd_audit;
pub use config::cmd_config;
pub use diagnose::{DiagnoseOutput, cmd_diagnose, cmd_signatures};
