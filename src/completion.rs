//! # Shell Completion Module
//!
//! Completion scripts for `memcoll`, generated from the clap definition,
//! plus a hidden helper command that lists the field names accepted by
//! `--order-by`, `--return`, `--filter` and `--function`.
//!
//! ## Usage
//!
//! ```bash
//! # Generate bash completions
//! memcoll completion bash > ~/.local/share/bash-completion/completions/memcoll
//!
//! # Generate zsh completions
//! memcoll completion zsh > ~/.config/zsh/completions/_memcoll
//! ```

use crate::cli::Shell;
use crate::meta::MetaField;
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io;

/// Generate shell completions for the given shell
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

/// Convert our Shell enum to clap_complete's Shell enum
pub fn shell_to_completion_shell(shell: Shell) -> CompletionShell {
    match shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Field names in declaration order
pub fn field_completions() -> Vec<&'static str> {
    MetaField::ALL.iter().map(|field| field.name()).collect()
}

/// Print one field name per line, for use by completion scripts
pub fn print_field_completions() {
    for name in field_completions() {
        println!("{name}");
    }
}
