use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "filebay", version, about = "Upload files to a filebay server")]
pub struct Cli {
    /// Config file (defaults to ~/.config/filebay/config.json).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload local files into a remote directory.
    Upload(UploadArgs),
    /// List uploads interrupted by an earlier run.
    Status,
    /// Forget interrupted uploads.
    Clear,
}

#[derive(Debug, clap::Args)]
pub struct UploadArgs {
    /// Local files to upload.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Remote destination directory ("" or "/" for the root).
    #[arg(long)]
    pub to: String,

    /// Simultaneous transfers.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Automatic retries per failed file (at most 3).
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    /// Server origin, e.g. http://localhost:8080.
    #[arg(long)]
    pub api_origin: Option<String>,

    /// Names already present in the destination; these are not uploaded.
    #[arg(long = "exists", value_name = "NAME")]
    pub existing: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upload() {
        let cli = Cli::try_parse_from([
            "filebay", "upload", "a.txt", "b.txt", "--to", "/docs", "--concurrency", "2",
            "--retries", "2", "--exists", "b.txt",
        ])
        .unwrap();
        let Command::Upload(args) = cli.command else {
            panic!("expected upload");
        };
        assert_eq!(args.files, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
        assert_eq!(args.to, "/docs");
        assert_eq!(args.concurrency, Some(2));
        assert_eq!(args.retries, 2);
        assert_eq!(args.existing, vec!["b.txt".to_string()]);
        assert!(args.api_origin.is_none());
    }

    #[test]
    fn upload_requires_files_and_target() {
        assert!(Cli::try_parse_from(["filebay", "upload", "--to", "docs"]).is_err());
        assert!(Cli::try_parse_from(["filebay", "upload", "a.txt"]).is_err());
    }

    #[test]
    fn global_config_flag() {
        let cli = Cli::try_parse_from(["filebay", "status", "--config", "/tmp/c.json"]).unwrap();
        assert!(matches!(cli.command, Command::Status));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
    }
}
