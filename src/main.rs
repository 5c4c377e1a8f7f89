use clap::Parser;
use ovm_cli::cli::Cli;
use ovm_cli::logging;

/// Every failure, usage errors included, exits with this code
const EXIT_FAILURE: i32 = 1;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => {
            // --help and --version
            let _ = e.print();
            std::process::exit(0);
        }
        Err(e) => {
            let _ = e.print();
            std::process::exit(EXIT_FAILURE);
        }
    };

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(EXIT_FAILURE);
        }
    };

    if let Err(e) = logging::init(&config.log_level) {
        eprintln!("error: {e}");
        std::process::exit(EXIT_FAILURE);
    }

    if let Err(e) = cli.run(&config) {
        tracing::error!("{e}");
        std::process::exit(EXIT_FAILURE);
    }
}
