//! CLI command implementations.
//!
//! | Module   | Commands handled                         |
//! |----------|------------------------------------------|
//! | `serve`  | `Serve`                                  |
//! | `board`  | `InitDb`, `CheckBoard`, `Promote`        |
//! | `config` | `Config`                                 |

pub mod board;
pub mod config;
pub mod serve;

pub use board::{cmd_check_board, cmd_init_db, cmd_promote};
pub use config::cmd_config;
pub use serve::{ServeOverrides, cmd_serve};
