//! CLI command definitions and dispatch.

mod build;

use clap::{Parser, Subcommand};

/// bpfkit: build BPF programs and save them as OCI artifacts.
#[derive(Parser)]
#[command(name = "bpfkit", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Compile a BPF program and save it to the local artifact store
    Build(build::BuildArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Build(args) => build::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_command() {
        let cli = Cli::try_parse_from(["bpfkit", "build", "probe.c", "local/probe:v1"]).unwrap();
        let Command::Build(args) = cli.command;
        assert_eq!(args.source, std::path::PathBuf::from("probe.c"));
        assert_eq!(args.reference, "local/probe:v1");
        assert!(!args.local);
        assert!(!args.combined);
    }

    #[test]
    fn test_parse_build_flags() {
        let cli = Cli::try_parse_from([
            "bpfkit",
            "build",
            "probe.c",
            "local/probe:v1",
            "--local",
            "--combined",
            "--runner-image",
            "runner/base",
            "--runner-tag",
            "v2",
            "-o",
            "out/probe.o",
        ])
        .unwrap();
        let Command::Build(args) = cli.command;
        assert!(args.local);
        assert!(args.combined);
        assert_eq!(args.runner_image.as_deref(), Some("runner/base"));
        assert_eq!(args.runner_tag.as_deref(), Some("v2"));
        assert_eq!(
            args.output_file,
            Some(std::path::PathBuf::from("out/probe.o"))
        );
    }

    #[test]
    fn test_build_requires_reference() {
        let result = Cli::try_parse_from(["bpfkit", "build", "probe.c"]);
        assert!(result.is_err());
    }
}
