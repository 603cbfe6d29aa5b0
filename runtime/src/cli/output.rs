//! Output mode flags, terminal styling and logging setup.
//!
//! `main` records the global `--json`, `--quiet`, `--verbose` and
//! `--no-color` flags as `HARVEST_*` environment variables so every command
//! (and every child process the dashboard launches) sees the same mode.

use serde_json::Value;
use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

fn flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| !v.is_empty() && v != "0")
}

pub fn is_json() -> bool {
    flag("HARVEST_JSON")
}

pub fn is_quiet() -> bool {
    flag("HARVEST_QUIET")
}

pub fn is_verbose() -> bool {
    flag("HARVEST_VERBOSE")
}

pub fn use_color() -> bool {
    !flag("HARVEST_NO_COLOR") && std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal()
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}

/// Install the global tracing subscriber. Logs go to stderr so stdout stays
/// free for results. `RUST_LOG` wins over the verbosity flags.
pub fn init_tracing() {
    let default = if is_verbose() {
        "harvest_runtime=debug,harvest=debug"
    } else if is_quiet() {
        "harvest_runtime=warn,harvest=warn"
    } else {
        "harvest_runtime=info,harvest=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    // try_init: a subscriber may already be installed.
    if is_json() {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.with_ansi(use_color()).try_init();
    }
}

/// ANSI styling that degrades to plain text.
pub struct Styled {
    color: bool,
}

impl Styled {
    pub fn new() -> Self {
        Self { color: use_color() }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    pub fn ok_sym(&self) -> String {
        self.paint("32", "✓")
    }

    pub fn warn_sym(&self) -> String {
        self.paint("33", "!")
    }

    pub fn fail_sym(&self) -> String {
        self.paint("31", "✗")
    }

    pub fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }

    pub fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }
}

impl Default for Styled {
    fn default() -> Self {
        Self::new()
    }
}
