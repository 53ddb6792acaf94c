use std::io::{IsTerminal, Write};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::util::format::{green, red};
use crate::wait::Progress;

const FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Terminal spinner used as wait feedback. Falls back to one line per
/// change when stdout is not a terminal.
pub struct Spinner {
    text: Arc<Mutex<String>>,
    handle: Option<JoinHandle<()>>,
    animated: bool,
}

impl Default for Spinner {
    fn default() -> Self {
        Self::new()
    }
}

impl Spinner {
    pub fn new() -> Self {
        Self {
            text: Arc::new(Mutex::new(String::new())),
            handle: None,
            animated: std::io::stdout().is_terminal(),
        }
    }

    fn set_text(&self, text: &str) {
        if let Ok(mut guard) = self.text.lock() {
            *guard = text.to_string();
        }
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            print!("\r\x1b[2K");
            let _ = std::io::stdout().flush();
        }
    }
}

impl Progress for Spinner {
    fn start(&mut self, text: &str) {
        self.stop();
        self.set_text(text);
        if !self.animated {
            println!("{}", text);
            return;
        }

        let shared = self.text.clone();
        self.handle = Some(tokio::spawn(async move {
            let mut i = 0;
            loop {
                let line = shared.lock().map(|t| t.clone()).unwrap_or_default();
                print!("\r\x1b[2K{} {}", FRAMES[i % FRAMES.len()], line);
                let _ = std::io::stdout().flush();
                tokio::time::sleep(Duration::from_millis(80)).await;
                i += 1;
            }
        }));
    }

    fn update(&mut self, text: &str) {
        self.set_text(text);
        if !self.animated {
            println!("{}", text);
        }
    }

    fn success(&mut self, text: &str) {
        self.stop();
        println!("{} {}", green("✔"), text);
    }

    fn fail(&mut self, text: &str) {
        self.stop();
        println!("{} {}", red("✖"), text);
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.stop();
    }
}
