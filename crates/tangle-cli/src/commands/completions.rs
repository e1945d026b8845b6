//! Shell completion scripts

use std::io::{self, Write};

use clap::{Args, CommandFactory};
use clap_complete::Shell;

use crate::Cli;

#[derive(Args)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn run(args: &CompletionsArgs) -> anyhow::Result<()> {
    render(args.shell, &mut io::stdout());
    Ok(())
}

/// Write the completion script for `shell`, named after the binary
fn render(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    let bin = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, bin, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum;

    #[test]
    fn test_every_shell_renders() {
        for shell in Shell::value_variants() {
            let mut script = Vec::new();
            render(*shell, &mut script);
            let script = String::from_utf8(script).unwrap();
            assert!(script.contains("tangle"), "{shell} script lacks the binary name");
        }
    }
}
