// Library root
// -----------
// This crate exposes the pieces of the self-enrollment tool. The binary
// (`main.rs`) parses flags, sets up logging and calls `enroll::run`.
//
// Module responsibilities:
// - `cli` / `config`: flags, env vars and the optional config file,
//   resolved into a single `Settings`.
// - `api`: blocking HTTP client for the engine's JSON API and the
//   `EngineApi` trait the flow is written against.
// - `model`: the engine's `type`-tagged request/response objects.
// - `keyfile`: appending the engine key to a local file.
// - `enroll`: the linear enrollment flow.
pub mod api;
pub mod cli;
pub mod config;
pub mod enroll;
pub mod error;
pub mod keyfile;
pub mod model;
