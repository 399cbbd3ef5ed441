use std::path::PathBuf;

use rustyline::{Config, Editor, Result};

pub fn generate_prompt(custom_prompt: Option<&str>) -> String {
    custom_prompt.unwrap_or("you> ").to_string()
}

/// Readline input history lives next to the user's home directory. This is
/// terminal plumbing only; the transcript itself is never persisted.
pub fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".socratica_history"))
}

pub fn rl() -> Result<Editor<()>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(rustyline::CompletionType::List)
        .build();
    Editor::with_config(config)
}
