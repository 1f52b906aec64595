use crate::demo::{run_demo, DemoArgs};
use crate::export::{run_export, ExportArgs};
use crate::server;
use admission_desk::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Admission Desk",
    about = "Run the student admission service and its maintenance commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Write every application to a CSV file
    Export(ExportArgs),
    /// Submit and approve a sample application against a scratch directory
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Export(args) => run_export(args),
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_optional_and_accepts_overrides() {
        let cli = Cli::try_parse_from(["admission-desk"]).expect("parses");
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["admission-desk", "serve", "--port", "8080"])
            .expect("parses");
        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.port, Some(8080));
                assert!(args.host.is_none());
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn export_requires_an_output_path() {
        assert!(Cli::try_parse_from(["admission-desk", "export"]).is_err());
        let cli = Cli::try_parse_from([
            "admission-desk",
            "export",
            "--output",
            "applications.csv",
            "--status",
            "approved",
        ])
        .expect("parses");
        assert!(matches!(cli.command, Some(Command::Export(_))));
    }
}
