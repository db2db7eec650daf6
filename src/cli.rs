use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "zipname")]
#[command(version)]
#[command(about = "Zip archives whose entry names survive any byte content", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipname create photos/ backups/ -r     archive photos/ recursively into backups/photos.zip\n  \
  zipname create data -t                 store names relative to the working directory\n  \
  zipname extract backups/photos.zip out restore original names below out/")]
pub struct Cli {
    /// Print one line per file processed
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pack the files of a directory into an archive
    Create {
        /// Directory to pack
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// Archive file, or the directory to create `<SOURCE>.zip` in (default: working directory)
        #[arg(value_name = "TARGET")]
        target: Option<PathBuf>,

        /// Add to an existing archive instead of requiring a new one
        #[arg(short = 'u', long)]
        update: bool,

        /// Descend into subdirectories
        #[arg(short = 'r', long)]
        recursive: bool,

        /// Store names relative to the working directory
        #[arg(short = 't', long)]
        truncate: bool,
    },

    /// Unpack an archive, restoring the original entry names
    Extract {
        /// Archive to unpack
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// Existing destination directory (default: working directory)
        #[arg(value_name = "TARGET")]
        target: Option<PathBuf>,
    },
}

impl Cli {
    /// Filter used for the logger when `RUST_LOG` is unset
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose { "info" } else { "warn" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_flags() {
        let cli = Cli::parse_from(["zipname", "create", "src", "out.zip", "-u", "-r", "-t"]);
        match cli.command {
            Command::Create {
                source,
                target,
                update,
                recursive,
                truncate,
            } => {
                assert_eq!(source, PathBuf::from("src"));
                assert_eq!(target, Some(PathBuf::from("out.zip")));
                assert!(update && recursive && truncate);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(!cli.verbose);
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::parse_from(["zipname", "extract", "a.zip", "--verbose"]);
        assert!(cli.verbose);
        assert_eq!(cli.default_log_filter(), "info");
        assert!(matches!(cli.command, Command::Extract { target: None, .. }));
    }

    #[test]
    fn command_is_required() {
        assert!(Cli::try_parse_from(["zipname"]).is_err());
    }
}
