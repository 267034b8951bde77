//! # Shelob
//!
//! 🕷️ Shelob runs configurable map/filter pipelines over line-oriented JSON
//! document dumps to build corpora out of them.
//!
//! ## Getting started
//!
//! ```sh
//! shelob 0.1.0
//! corpus construction pipelines.
//!
//! USAGE:
//!     shelob <SUBCOMMAND>
//!
//! FLAGS:
//!     -h, --help       Prints help information
//!     -V, --version    Prints version information
//!
//! SUBCOMMANDS:
//!     help    Prints this message or the help of the given subcommand(s)
//!     run     Run a configured pipeline over a set of files
//! ```
//!
use std::collections::HashMap;
use std::fs;

use structopt::StructOpt;

#[macro_use]
extern crate log;

use shelob::config::Registry;
use shelob::error::Error;
use shelob::runner::Runner;

mod cli;

fn main() -> Result<(), Error> {
    env_logger::init();

    let opt = cli::Shelob::from_args();
    debug!("cli args\n{:#?}", opt);

    match opt {
        cli::Shelob::Run(r) => {
            let configuration = fs::read_to_string(&r.configuration)?;
            let mut vars = HashMap::new();
            for var in &r.vars {
                match var.split_once('=') {
                    Some((key, value)) => {
                        vars.insert(key.to_string(), value.to_string());
                    }
                    None => {
                        return Err(Error::Config(format!(
                            "variables are key=value, got '{}'",
                            var
                        )))
                    }
                }
            }

            let runner = Runner::new(
                configuration,
                r.input_dirs,
                r.output_dir,
                r.reduced_file,
                vars,
                r.processes,
            );
            let report = runner.run(&Registry::with_builtins())?;
            info!(
                "{} files processed, {} failed, {} values collected",
                report.processed, report.failed, report.collected
            );
        }
    };
    Ok(())
}
