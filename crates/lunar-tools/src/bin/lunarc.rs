// crates/lunar-tools/src/bin/lunarc.rs
//! Compilateur/lister de bytecode Lua 5.3 : charge des chunks précompilés,
//! les combine, les liste et les ré-écrit.
//!
//! Exemples :
//!   lunarc -l a.luac
//!   lunarc -l -l a.luac               (listing complet : constantes, locales, upvalues)
//!   lunarc -s -o all.luac a.luac b.luac
//!   cat a.luac | lunarc -p -l -
//!   lunarc -l                         (relit lunarc.out)
//!   lunarc -p a.luac --json | jq
//!
//! Options :
//!   -l          : listing (deux fois pour les tables de debug)
//!   -o <name>   : fichier de sortie (défaut "lunarc.out", '-' pour stdout)
//!   -p          : charge seulement, n'écrit rien
//!   -s          : retire les infos de debug
//!   -v          : version
//!   --json      : arbre combiné en JSON sur stdout
//!   --color     : auto|always|never
//!   --time      : chrono
//!   -q/--quiet, --verbose : niveau de logs (RUST_LOG prime)

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::debug;
use yansi::{Color, Paint};

use lunar_chunk::BinaryChunk;
use lunar_tools::prelude::*;

#[derive(Parser, Debug)]
#[command(
    name = "lunarc",
    about = "Listing, combinaison et ré-écriture de chunks Lua 5.3 précompilés",
    disable_version_flag = true
)]
struct Cli {
    /// Listing (use -l -l for full listing)
    #[arg(short = 'l', action = ArgAction::Count)]
    list: u8,

    /// Output to file 'name' ('-' for stdout)
    #[arg(short = 'o', value_name = "name", default_value = DEFAULT_OUTPUT, allow_hyphen_values = true)]
    output: String,

    /// Parse only
    #[arg(short = 'p')]
    parse_only: bool,

    /// Strip debug information
    #[arg(short = 's')]
    strip: bool,

    /// Show version information
    #[arg(short = 'v', action = ArgAction::Count)]
    version: u8,

    /// Print the combined prototype tree as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Couleurs des messages : auto|always|never
    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    color: ColorMode,

    /// Affiche la durée de traitement
    #[arg(long)]
    time: bool,

    /// Only errors in logs
    #[arg(short = 'q', long)]
    quiet: bool,

    /// More logs (repeatable)
    #[arg(long, action = ArgAction::Count)]
    verbose: u8,

    /// Input files ('-' for stdin)
    inputs: Vec<String>,
}

fn main() -> ExitCode {
    color_eyre::install().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };
    setup_colors(cli.color);
    init_logger(cli.verbose, cli.quiet);

    if cli.version > 0 {
        println!("{}", version_banner(PROGNAME));
        if cli.inputs.is_empty() && cli.list == 0 && !cli.parse_only && !cli.json {
            return ExitCode::SUCCESS;
        }
    }

    match real_main(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e:#}", PROGNAME.paint(Color::Red).bold());
            ExitCode::FAILURE
        }
    }
}

fn real_main(cli: &Cli) -> Result<()> {
    let timer = Timer::start();
    let opts = Options::resolve(cli.list, cli.parse_only, cli.strip, &cli.output, &cli.inputs)?;
    debug!("options: {opts:?}");

    let stdout = io::stdout();
    let root = {
        let mut out = stdout.lock();
        run(&opts, &BinaryChunk, &BinaryChunk, &mut out)?
    };

    if cli.json {
        let pretty = serde_json::to_string_pretty(&root).context("JSON serialization failed")?;
        let mut out = stdout.lock();
        writeln!(out, "{pretty}").context("cannot write stdout")?;
    }

    if cli.time {
        eprintln!("{} {}", "time".paint(Color::Blue), timer.pretty());
    }
    Ok(())
}
