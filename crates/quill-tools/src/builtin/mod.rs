// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod ask_user;
mod bash;
mod edit_file;
mod fetch;
mod fs_list;
mod glob;
mod grep;
mod read_file;
mod todo;
mod write_file;

pub use ask_user::AskUserQuestionTool;
pub use bash::BashTool;
pub use edit_file::EditFileTool;
pub use fetch::FetchTool;
pub use fs_list::LsTool;
pub use glob::GlobTool;
pub use grep::GrepTool;
pub use read_file::ReadFileTool;
pub use todo::{TodoReadTool, TodoWriteTool};
pub use write_file::WriteFileTool;
