use std::process::ExitCode;

use color_eyre::eyre::WrapErr;
use color_eyre::Result;

use pgbsync::cli::{parse_args, run_cli_command, CliCommand, Services, USAGE, VERSION};
use pgbsync::config::load_config;
use pgbsync::logging::init_tracing;

fn run() -> Result<u8> {
    let args = match parse_args(std::env::args()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            return Ok(2);
        }
    };

    // Answered before any config is loaded
    match args.command {
        CliCommand::Version => {
            println!("pgbsync {}", VERSION);
            return Ok(0);
        }
        CliCommand::Help => {
            print!("{}", USAGE);
            return Ok(0);
        }
        _ => {}
    }

    color_eyre::install()?;

    let config = match load_config(args.config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(e.exit_code());
        }
    };

    init_tracing(&config.log_level, args.verbose);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("failed to start the async runtime")?;

    runtime.block_on(async {
        let services = match Services::from_config(&config) {
            Ok(services) => services,
            Err(e) => {
                eprintln!("Error: {}", e);
                return Ok(e.exit_code());
            }
        };
        Ok(run_cli_command(args.command, &config, &services).await)
    })
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::from(2)
        }
    }
}
