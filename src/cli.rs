//! Command line arguments and parameters management/parsing.
use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "shelob", about = "corpus construction pipelines.")]
/// Holds every command that is callable by the `shelob` command.
pub enum Shelob {
    #[structopt(about = "Run a configured pipeline over a set of files")]
    Run(Run),
}

#[derive(Debug, StructOpt)]
/// Run command and parameters.
pub struct Run {
    #[structopt(
        parse(from_os_str),
        short = "c",
        long = "configuration",
        help = "pipeline configuration file"
    )]
    pub configuration: PathBuf,
    #[structopt(
        parse(from_os_str),
        short = "i",
        long = "input-dir",
        help = "input directory, walked recursively (repeatable)"
    )]
    pub input_dirs: Vec<PathBuf>,
    #[structopt(
        parse(from_os_str),
        short = "o",
        long = "output-dir",
        help = "output directory, mirrors the input tree"
    )]
    pub output_dir: Option<PathBuf>,
    #[structopt(
        parse(from_os_str),
        short = "r",
        long = "reduced-file",
        help = "where the reducer output goes (.json or .tsv)"
    )]
    pub reduced_file: Option<PathBuf>,
    #[structopt(
        short = "R",
        long = "var",
        help = "extra template variable, as key=value (repeatable)"
    )]
    pub vars: Vec<String>,
    #[structopt(
        short = "P",
        long = "processes",
        default_value = "1",
        help = "number of worker processes"
    )]
    pub processes: usize,
}
