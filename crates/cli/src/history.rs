//! Command history, appended to `~/.sdq/history` across sessions.

use std::io::Write;

pub fn append(line: &str) {
    let Some(home) = dirs::home_dir() else {
        return;
    };
    let dir = home.join(".sdq");
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }
    if let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("history"))
    {
        let _ = writeln!(file, "{line}");
    }
}
