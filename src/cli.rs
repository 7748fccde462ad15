use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "workrecon")]
#[command(author, version, about = "Inventory ADO and Jira projects and reconcile their counts", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ~/.workrecon/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory reports are written to
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover every configured Azure DevOps project
    Ado,
    /// Discover every configured Jira project
    Jira,
    /// Compare a Jira statistics table against an ADO one
    Reconcile {
        /// Jira `jira_<project>_statistics.json`
        #[arg(long)]
        jira: PathBuf,
        /// ADO `ado_<project>_statistics.json`
        #[arg(long)]
        ado: PathBuf,
        /// Prefix of the written report file
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        jira_project: String,
        #[arg(long, default_value = "")]
        ado_project: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_discovery_subcommands() {
        let cli = Cli::try_parse_from(["workrecon", "ado", "-v"]).unwrap();
        assert!(matches!(cli.command, Command::Ado));
        assert!(cli.verbose);

        let cli =
            Cli::try_parse_from(["workrecon", "--output-dir", "out", "jira"]).unwrap();
        assert!(matches!(cli.command, Command::Jira));
        assert_eq!(cli.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn parses_reconcile() {
        let cli = Cli::try_parse_from([
            "workrecon",
            "reconcile",
            "--jira",
            "j.json",
            "--ado",
            "a.json",
            "--name",
            "Newt",
            "--ado-project",
            "Newt CAMPP1",
        ])
        .unwrap();
        match cli.command {
            Command::Reconcile {
                jira,
                name,
                jira_project,
                ado_project,
                ..
            } => {
                assert_eq!(jira, PathBuf::from("j.json"));
                assert_eq!(name, "Newt");
                assert_eq!(jira_project, "");
                assert_eq!(ado_project, "Newt CAMPP1");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn reconcile_requires_both_tables() {
        assert!(Cli::try_parse_from(["workrecon", "reconcile", "--jira", "j.json", "--name", "x"]).is_err());
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["workrecon"]).is_err());
    }
}
