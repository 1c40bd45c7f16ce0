use std::sync::Mutex;

pub const LOGIN_PATH: &str = "/login";

/// Routing collaborator. The client only ever asks it to go somewhere.
pub trait Navigator: Send + Sync {
    fn goto(&self, path: &str);
}

/// Login path, carrying the percent-encoded return URL when one is known.
pub fn login_path(callback: Option<&str>) -> String {
    match callback {
        Some(url) if !url.is_empty() => {
            format!("{}?callback={}", LOGIN_PATH, urlencoding::encode(url))
        }
        _ => LOGIN_PATH.to_string(),
    }
}

/// Navigator that only logs; used by headless callers such as the CLI.
#[derive(Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn goto(&self, path: &str) {
        log::info!("Navigation requested: {}", path);
    }
}

/// Navigator that records every requested path.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<String> {
        self.visited().pop()
    }
}

impl Navigator for RecordingNavigator {
    fn goto(&self, path: &str) {
        log::info!("Navigation requested: {}", path);
        if let Ok(mut visited) = self.visited.lock() {
            visited.push(path.to_string());
        }
    }
}
