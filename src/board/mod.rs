//! Task board back-end.
//!
//! ## Overview
//!
//! Users own projects; a project's tasks sit in three status columns
//! (`todo`, `inprogress`, `done`) and are ordered inside each column by an
//! integer position. Clients drag cards between and within columns and send
//! the move to `PUT /api/tasks/reorder`; the server renumbers the affected
//! columns so that positions stay exactly `0..n`, and broadcasts the change
//! over a WebSocket.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    └─ api.rs  (handlers, extractors, AppState)   │
//! └──────────┘ WebSocket│         │                                        │
//!                       │         │ Caller + validated input               │
//!                       │         v                                        │
//!                       │  service.rs  (ownership checks, BoardLimits)     │
//!                       │         │                                        │
//!                       │         │ one transaction per operation          │
//!                       │         v                                        │
//!                       │  db.rs  (BoardDb, DbHandle)                      │
//!                       │         │                                        │
//!                       │         │ TaskStore                              │
//!                       │         v                                        │
//!                       │  position.rs  (reposition, close_gaps)           │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module   | Responsibility                                              |
//! |----------|-------------------------------------------------------------|
//! | `models` | Shared types: `Task`, `Project`, `TaskStatus`, `MoveTask`   |
//! | `auth`   | Password hashing, sessions, `Caller`, user administration   |
//! | `ws`     | `WsMessage` enum, `broadcast_event()`, socket keepalive     |
//!
//! ## Typical Request Flow (drag a card to another column)
//!
//! 1. `PUT /api/tasks/reorder` → the `Caller` extractor resolves the bearer
//!    token; the body is validated into a `MoveTask`.
//! 2. `service::reposition` checks that the caller owns the task's project.
//! 3. `BoardDb::reposition_task` opens a transaction and runs
//!    `position::reposition`, which locates the task by id, renumbers the
//!    source and destination columns and writes only the rows that changed.
//! 4. The handler broadcasts `TaskMoved` to sockets of the project owner
//!    (and admins) and replies `{ok, writes, task}`.

pub mod api;
pub mod auth;
pub mod db;
pub mod models;
pub mod position;
pub mod server;
pub mod service;
pub mod ws;
