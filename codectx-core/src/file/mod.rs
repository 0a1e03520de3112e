//! The file module is the substrate that lets an AI agent safely read and
//! mutate a project tree during an interactive session.
//!
//! ## Architecture
//!
//! ### ignore.rs
//! Compiles the project's `.gitignore` plus config-supplied patterns into a
//! single matcher via the `ignore` crate. A directory-level ignore covers
//! everything beneath it; config patterns are appended after VCS patterns so
//! they can re-ignore but never silently un-ignore.
//!
//! ### discovery.rs
//! The authoritative index of legitimate project files. Full recursive scan
//! filtered through the ignore rules, then incrementally patched by watcher
//! create/delete events. Snapshots are copy-on-write: readers clone an `Arc`
//! and never observe a half-updated set.
//!
//! ### watcher.rs / marker.rs
//! Background observer of the project tree. Structural changes feed the
//! discovery index; content changes are scanned for inline `AI:`-style
//! comment markers which auto-promote a file into the context registry and
//! emit an event for the interaction loop.
//!
//! ### context.rs
//! The curated subset of discovered files the agent may see this session,
//! each tagged Reference (read-only) or Mutable. The sole authority for
//! "may this file be edited". Entries can only exist for discovered files.
//!
//! ### modify/
//! Parses SEARCH/REPLACE blocks out of raw model output and applies them:
//! access check, unique exact match (with a whitespace-insensitive retry),
//! atomic write. Routine failures are values, not errors.
//!
//! ### manager.rs
//! Ties everything together: constructs the components in dependency order
//! and offers the command surface the interaction loop consumes.

pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod ignore;
pub mod manager;
pub mod marker;
pub mod modify;
pub mod watcher;
