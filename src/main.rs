//! thumbcache - on-disk thumbnail, mimetype and icon cache
//!
//! Entry point for the thumbcache CLI application.

use clap::Parser;
use thumbcache::{
    cli::Cli,
    error::{AppError, ExitCode, StructuredError},
};

fn main() {
    let cli = Cli::parse();
    let json_errors = cli.json_errors;

    match thumbcache::run_app(cli) {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            let exit_code = err
                .downcast_ref::<AppError>()
                .map_or(ExitCode::GeneralError, AppError::exit_code);

            if json_errors {
                let structured = StructuredError::new(&err, exit_code);
                match serde_json::to_string_pretty(&structured) {
                    Ok(json) => eprintln!("{}", json),
                    Err(_) => eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err),
                }
            } else {
                eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err);
            }

            std::process::exit(exit_code.as_i32());
        }
    }
}
