// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! A small echo REPL exercising the full editing surface: multi-line
//! input, history with incremental and prefix search, completion hints,
//! kill ring, undo, bracketed paste.

use async_trait::async_trait;
use ril_core::complete::{Completed, Completer, Completion};
use ril_core::history::MemHistory;
use ril_core::interface::{prepare, run_interface};
use ril_core::mode::{default_prompt_keymap, PromptSpec};
use ril_core::{EditorOptions, ModalInterface};
use ril_terminal::CrosstermTerm;
use std::io::Write;
use std::sync::Arc;

struct RilConfig {
    log_file: Option<String>,
}

fn parse_args() -> RilConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut log_file = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--log" | "-l" => {
                if i + 1 < args.len() {
                    log_file = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    eprintln!("Error: --log requires a file path");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg => {
                eprintln!("Error: Unknown option '{arg}'");
                print_help();
                std::process::exit(1);
            }
        }
    }
    RilConfig { log_file }
}

fn print_help() {
    println!("Ril - Ryan's Input Line");
    println!();
    println!("USAGE:");
    println!("    ril [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -l, --log <FILE>     Write a trace log to FILE");
    println!("    -h, --help           Print this help message");
    println!();
    println!("KEYS:");
    println!("    Enter       submit (inserts a newline while brackets are open)");
    println!("    Up/Down     prefix history search");
    println!("    C-r / C-s   incremental history search");
    println!("    Tab         complete; C-y/M-y yank; C-_ undo; C-d exit");
}

/// Completes language keywords and words seen earlier in the session.
struct WordCompleter {
    keywords: Vec<String>,
}

impl WordCompleter {
    fn new() -> Self {
        WordCompleter {
            keywords: [
                "begin", "break", "catch", "continue", "else", "elseif", "end", "false", "for",
                "function", "if", "import", "module", "print", "println", "return", "struct",
                "true", "try", "using", "while",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[async_trait]
impl Completer for WordCompleter {
    async fn complete_line(
        &self,
        line: &str,
        position: usize,
        _scope: &str,
        _hint: bool,
    ) -> Completed {
        let start = line[..position]
            .rfind(|c: char| !c.is_alphanumeric() && c != '_')
            .map(|i| i + c_len(line, i))
            .unwrap_or(0);
        let partial = &line[start..position];
        let candidates: Vec<Completion> = if partial.is_empty() {
            Vec::new()
        } else {
            self.keywords
                .iter()
                .filter(|k| k.starts_with(partial))
                .map(|k| Completion::simple(k.as_str()))
                .collect()
        };
        Completed {
            candidates,
            range: start..position,
            should_complete: true,
        }
    }
}

fn c_len(s: &str, at: usize) -> usize {
    s[at..].chars().next().map(char::len_utf8).unwrap_or(1)
}

fn balanced(line: &str) -> bool {
    let mut depth = 0i32;
    for c in line.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    depth <= 0
}

fn exit_state() {
    let _ = crossterm::terminal::disable_raw_mode();
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(b"\x1b[?2004l");
    let _ = stdout.flush();
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let config = parse_args();

    if let Some(path) = &config.log_file {
        let file = std::fs::File::create(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "debug".into()),
            )
            .with_writer(file)
            .with_ansi(false)
            .init();
    }

    // leave the terminal usable even on a crash
    std::panic::set_hook(Box::new(|panic_info| {
        exit_state();
        eprintln!("ril crashed: {panic_info}");
    }));

    let term = CrosstermTerm::stdout();
    let mut modal = ModalInterface::new(term, EditorOptions::default());
    let mut spec = PromptSpec::new("ril> ", Arc::new(default_prompt_keymap()));
    spec.prompt_prefix = "\x1b[1;32m".to_string();
    spec.prompt_suffix = "\x1b[0m".to_string();
    spec.output_prefix = "=> ".to_string();
    spec.on_enter = Some(Arc::new(|line: &str| balanced(line)));
    let prompt = modal.add_prompt(spec);
    modal.set_history(prompt, Box::new(MemHistory::new()));
    modal.set_completer(prompt, Arc::new(WordCompleter::new()));

    let (shared, mut reader) = prepare(modal);
    loop {
        let result = run_interface(&shared, &mut reader).await?;
        tracing::debug!(accepted = result.accepted, len = result.line.len(), "session ended");
        if result.accepted {
            if !result.line.trim().is_empty() {
                println!("=> {}", result.line.replace('\n', "\n   "));
                shared.modal.lock().await.add_history(&result.line);
            }
        } else {
            // C-c or C-d; an empty unaccepted line ends the session
            if result.line.is_empty() {
                println!();
                break;
            }
            println!("^C");
        }
    }
    Ok(())
}
