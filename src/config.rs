use clap::Parser;
use std::env;
use std::path::PathBuf;

use crate::models::Source;

/// Scrape car-subscription quotes into dados_<site>.csv and dados.csv
#[derive(Debug, Parser)]
#[command(name = "subscription-scout", version, about)]
pub struct Args {
    /// Scrape livre.unidas.com.br
    #[arg(long)]
    pub unidas: bool,

    /// Scrape portosegurocarrofacil.com.br
    #[arg(long)]
    pub porto: bool,

    /// Scrape movidazerokm.com.br
    #[arg(long)]
    pub movida: bool,

    /// Scrape meuflua.com.br
    #[arg(long)]
    pub flua: bool,

    /// Keep the per-site files instead of merging them into dados.csv
    #[arg(long)]
    pub no_merge: bool,

    /// Run one site after the other
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Sites to scrape, in canonical order
    pub sites: Vec<Source>,
    pub merge: bool,
    pub parallel: bool,
    pub output_dir: PathBuf,
}

impl RunConfig {
    pub fn from_args(args: &Args, output_dir: impl Into<PathBuf>) -> Self {
        let flags = [args.unidas, args.porto, args.movida, args.flua];
        let sites: Vec<Source> = if flags.iter().any(|f| *f) {
            Source::ALL
                .iter()
                .zip(flags)
                .filter(|(_, selected)| *selected)
                .map(|(source, _)| *source)
                .collect()
        } else {
            Source::ALL.to_vec()
        };

        Self {
            sites,
            merge: !args.no_merge,
            parallel: !args.sequential,
            output_dir: output_dir.into(),
        }
    }
}

/// Chrome binary to launch instead of the one headless_chrome finds
pub fn chrome_path() -> Option<PathBuf> {
    env::var_os("CHROME_PATH")
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}
