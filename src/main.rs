//! rexdiff - cross-language regex differential tester
//!
//! Generate inputs, evaluate patterns in many language engines, explain the
//! disagreements.

mod cli;
mod core;
mod output;
mod record;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Logs go to stderr so NDJSON output on stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    use cli::{parse, Commands};

    let args = parse();

    let Some(command) = args.command else {
        eprintln!("rexdiff: cross-language regex differential tester");
        eprintln!();
        eprintln!("Usage: rexdiff <COMMAND>");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  gen-inputs  Generate candidate test inputs for a file of regex records");
        eprintln!("  test        Test regexes for different behavior in different languages");
        eprintln!("  analyze     Analyze tested records: witness kinds, language pairs, causes");
        eprintln!();
        eprintln!("Options:");
        eprintln!("  -f, --format <FORMAT>  Output format [text|json] (default: text)");
        eprintln!("  -h, --help             Print help");
        eprintln!("  -V, --version          Print version");
        return ExitCode::SUCCESS;
    };

    let format = args.format;

    let result = match command {
        Commands::GenInputs {
            regex_file,
            out_file,
            generators_dir,
            parallelism,
            seed,
            max_inputs_per_generator,
            generator_timeout,
            rate_limit,
            rate_window,
        } => cli::handle_gen_inputs(
            &regex_file,
            &out_file,
            generators_dir,
            parallelism,
            seed,
            max_inputs_per_generator,
            generator_timeout,
            rate_limit,
            rate_window,
            format,
        ),

        Commands::Test {
            regex_file,
            out_file,
            generators_dir,
            drivers_dir,
            languages,
            parallelism,
            seed,
            max_inputs_per_generator,
            generator_timeout,
            eval_timeout,
            rate_limit,
            rate_window,
        } => cli::handle_test(
            &regex_file,
            &out_file,
            generators_dir,
            drivers_dir,
            languages,
            parallelism,
            seed,
            max_inputs_per_generator,
            generator_timeout,
            eval_timeout,
            rate_limit,
            rate_window,
            format,
        ),

        Commands::Analyze {
            regex_file,
            unexplained_out,
        } => cli::handle_analyze(&regex_file, unexplained_out, format),
    };

    match result {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("rexdiff: error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
