use gitshelf::cli::{self, Cli};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `gitshelf=debug`.
const LOG_ENV: &str = "GITSHELF_LOG";

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("gitshelf=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let args = Cli::parse_args();
    init_logging(args.debug);

    if let Err(err) = cli::run(args) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
