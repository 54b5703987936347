// Library root
// -----------
// Terminal front-end for the invoice processing service: pick a folder,
// upload it to the merge or extract workflow, follow the server-side
// progress and save the result.
//
// Module responsibilities:
// - `selection`: walks the chosen folder and streams files with progress.
// - `progress`: JSON shapes returned by the task endpoints.
// - `workflow`: per-workflow endpoints, messages and status handling.
// - `api`: `TaskApi` seam and its blocking HTTP implementation.
// - `timer`: the recurring poll timer.
// - `controller`: one submit/poll/download run driving a `ProgressView`.
// - `ui`: terminal rendering and the interactive menu.
// - `cli`: argument parsing and dispatch.
pub mod api;
pub mod cli;
pub mod controller;
pub mod progress;
pub mod selection;
pub mod timer;
pub mod ui;
pub mod workflow;
