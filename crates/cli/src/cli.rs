use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Scheduled bulk mail from a recipient sheet.
///
/// Settings come from the environment (and `.env`); see `MAILCAST_PROFILE`
/// for switching between profiles.
#[derive(Parser, Debug)]
#[command(name = "mailcast", version, about = "Scheduled bulk mail from a recipient sheet")]
pub struct CliArgs {
    /// Configuration profile (overrides MAILCAST_PROFILE)
    #[arg(long, global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse a sheet and show the resulting tasks without storing or sending
    Preview {
        /// Recipient sheet (JSON rows or sheet document)
        file: PathBuf,
    },

    /// Parse a sheet, store the job, and send whatever is due
    Send {
        file: PathBuf,

        /// Only send to these addresses
        #[arg(long, num_args = 1..)]
        only: Vec<String>,

        /// Send every task now, ignoring its schedule
        #[arg(long)]
        force_all: bool,

        /// Leave out addresses already at the over-send threshold
        #[arg(long)]
        skip_oversent: bool,

        /// Skip the recipient deliverability check
        #[arg(long)]
        no_verify: bool,
    },

    /// Dispatch a stored job again (e.g. once deferred tasks are due)
    Dispatch {
        job_id: Uuid,

        #[arg(long)]
        force_all: bool,

        #[arg(long, num_args = 1..)]
        only: Vec<String>,

        #[arg(long)]
        no_verify: bool,
    },

    /// Show delivery history for addresses
    History {
        #[arg(required = true)]
        addresses: Vec<String>,
    },

    /// Write an empty recipient sheet with every recognised column
    Template { out: PathBuf },

    /// Write a job's per-task results (plus a failures-only sheet)
    Export { job_id: Uuid, out: PathBuf },

    /// Deliver due scheduled records
    Poll {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn parses_send_flags() {
        let args = CliArgs::parse_from([
            "mailcast", "send", "rows.json", "--only", "a@mail.io", "b@mail.io", "--force-all", "--no-verify",
        ]);
        match args.command {
            Command::Send { file, only, force_all, skip_oversent, no_verify } => {
                assert_eq!(file, PathBuf::from("rows.json"));
                assert_eq!(only, vec!["a@mail.io", "b@mail.io"]);
                assert!(force_all);
                assert!(!skip_oversent);
                assert!(no_verify);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn dispatch_requires_a_uuid() {
        assert!(CliArgs::try_parse_from(["mailcast", "dispatch", "not-a-uuid"]).is_err());
        let id = Uuid::new_v4();
        let args = CliArgs::try_parse_from(["mailcast", "dispatch", &id.to_string()]).unwrap();
        assert!(matches!(args.command, Command::Dispatch { job_id, .. } if job_id == id));
    }
}
