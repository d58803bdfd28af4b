//! lunar-tools — Bibliothèque commune pour l'outil `lunarc`.
//!
//! Objectifs : mutualiser I/O, chrono, couleurs, logs et le pipeline
//! charger → combiner → lister → sérialiser.
//!
//! ## Modules & zones clés
//! - `prelude` : import rapide des types/fns usuels
//! - I/O       : `read_bytes`, `read_stdin_to_bytes`, `write_bytes`
//! - Time      : `Timer`, `human_millis`
//! - Couleurs  : `ColorMode`, `setup_colors`
//! - Logs      : `init_logger`
//! - Pipeline  : `Options`, `Input`, `Output`, `run`
//!
//! Les fonctions renvoient `anyhow::Result`; les erreurs du cœur
//! (`CoreError`) y sont converties telles quelles.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![cfg_attr(not(debug_assertions), warn(missing_docs))]

use std::fs;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};

use lunar_core::{combine, print_function, Dumper, ListingOptions, Loader, Prototype};

/// Version lisible du crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Nom du programme, préfixe des messages d'erreur.
pub const PROGNAME: &str = "lunarc";

/// Fichier de sortie par défaut.
pub const DEFAULT_OUTPUT: &str = "lunarc.out";

/// Petite bannière de version.
pub fn version_banner(tool: &str) -> String {
    format!("{tool} {VERSION} (lunar-tools, Lua 5.3 bytecode)")
}

/* ------------------------------------------------------------------------- */
/* Prelude                                                                   */
/* ------------------------------------------------------------------------- */

/// Prelude pratique pour les bins: re-exports compacts.
pub mod prelude {
    pub use anyhow::{anyhow, Context, Result};
    pub use camino::{Utf8Path, Utf8PathBuf};
    pub use crate::{
        version_banner, human_millis, init_logger,
        read_bytes, read_stdin_to_bytes, write_bytes,
        ColorMode, setup_colors, Timer,
        Input, Options, Output, run,
        DEFAULT_OUTPUT, PROGNAME,
    };
}

/* ------------------------------------------------------------------------- */
/* I/O utils                                                                 */
/* ------------------------------------------------------------------------- */

/// Lis un fichier binaire.
pub fn read_bytes(path: &Utf8Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("cannot open {path}"))
}

/// Lis tout `stdin` en bytes.
pub fn read_stdin_to_bytes() -> Result<Vec<u8>> {
    let mut v = Vec::new();
    io::stdin().read_to_end(&mut v).context("cannot read stdin")?;
    Ok(v)
}

/// Écrit des bytes. Crée les dossiers au besoin.
pub fn write_bytes(path: &Utf8Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("cannot open {path}"))?;
    }
    let mut f = fs::File::create(path).with_context(|| format!("cannot open {path}"))?;
    f.write_all(bytes).with_context(|| format!("cannot write {path}"))?;
    Ok(())
}

/* ------------------------------------------------------------------------- */
/* Time / chrono                                                             */
/* ------------------------------------------------------------------------- */

/// Chrono de scope simple; loggable ensuite.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Démarre un chrono.
    pub fn start() -> Self { Self { start: Instant::now() } }
    /// Durée écoulée.
    pub fn elapsed(&self) -> Duration { self.start.elapsed() }
    /// Format humain court.
    pub fn pretty(&self) -> String { human_millis(self.elapsed()) }
}

/// Format "humain" d'une durée.
pub fn human_millis(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1_000 { return format!("{ms} ms"); }
    let s = ms as f64 / 1000.0;
    if s < 60.0 { return format!("{s:.3} s"); }
    let m = (s / 60.0).floor();
    let rest = s - m * 60.0;
    format!("{m:.0} min {rest:.1} s")
}

/* ------------------------------------------------------------------------- */
/* Couleurs & logs                                                           */
/* ------------------------------------------------------------------------- */

/// Contrôle l'application de couleurs ANSI dans les sorties CLI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ColorMode {
    /// Active les couleurs seulement si la sortie supporte ANSI (auto-détection).
    Auto,
    /// Force l'activation des couleurs.
    Always,
    /// Désactive complètement les couleurs ANSI.
    Never,
}

/// Configure le mode couleur global pour yansi (si feature `colors` active).
pub fn setup_colors(mode: ColorMode) {
    #[cfg(feature = "colors")]
    {
        match mode {
            ColorMode::Auto => yansi::whenever(yansi::Condition::DEFAULT),
            ColorMode::Always => yansi::enable(),
            ColorMode::Never => yansi::disable(),
        }
    }
    #[cfg(not(feature = "colors"))]
    {
        let _ = mode;
        yansi::disable();
    }
}

/// Initialise `env_logger`. `RUST_LOG` prime sur le niveau déduit des flags.
pub fn init_logger(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .try_init();
}

/* ------------------------------------------------------------------------- */
/* Pipeline                                                                  */
/* ------------------------------------------------------------------------- */

/// Une entrée du pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Entrée standard (`-`).
    Stdin,
    /// Fichier.
    File(Utf8PathBuf),
}

impl Input {
    /// Interprète un argument de ligne de commande.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" { Input::Stdin } else { Input::File(Utf8PathBuf::from(arg)) }
    }

    /// Nom de chunk transmis au chargeur.
    pub fn chunkname(&self) -> String {
        match self {
            Input::Stdin => "=stdin".into(),
            Input::File(p) => format!("@{p}"),
        }
    }

    /// Lit le contenu brut.
    pub fn read(&self) -> Result<Vec<u8>> {
        match self {
            Input::Stdin => read_stdin_to_bytes(),
            Input::File(p) => read_bytes(p),
        }
    }
}

/// Destination de la sérialisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Sortie standard (`-o -`).
    Stdout,
    /// Fichier.
    File(Utf8PathBuf),
}

/// Configuration complète d'une exécution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// 0 : pas de listing; 1 : listing; 2+ : listing avec tables de debug.
    pub listing: u8,
    /// Sérialiser le résultat.
    pub dumping: bool,
    /// Retirer les infos de debug à la sérialisation.
    pub stripping: bool,
    /// Destination de la sérialisation.
    pub output: Output,
    /// Entrées, dans l'ordre.
    pub inputs: Vec<Input>,
}

impl Options {
    /// Construit les options à partir des arguments bruts.
    ///
    /// Sans entrée, `-l` ou `-p` relisent le fichier de sortie par défaut
    /// (et ne sérialisent rien); sinon c'est une erreur.
    pub fn resolve(listing: u8, parse_only: bool, stripping: bool, output: &str, inputs: &[String]) -> Result<Self> {
        let output = match output {
            "-" => Output::Stdout,
            o if o.is_empty() || o.starts_with('-') => bail!("'-o' needs argument"),
            path => Output::File(Utf8PathBuf::from(path)),
        };
        let mut dumping = !parse_only;
        let inputs = if inputs.is_empty() {
            if listing == 0 && dumping {
                bail!("no input files given");
            }
            dumping = false;
            vec![Input::File(Utf8PathBuf::from(DEFAULT_OUTPUT))]
        } else {
            inputs.iter().map(|a| Input::from_arg(a)).collect()
        };
        Ok(Self { listing, dumping, stripping, output, inputs })
    }

    /// Options du listing.
    pub fn listing_options(&self) -> ListingOptions { ListingOptions { debug_tables: self.listing > 1 } }
}

/// Exécute le pipeline : charge chaque entrée, combine, liste dans `listing`
/// (si demandé), puis sérialise (si demandé). Renvoie l'arbre combiné.
pub fn run<L, D>(opts: &Options, loader: &L, dumper: &D, listing: &mut dyn Write) -> Result<Prototype>
where
    L: Loader + ?Sized,
    D: Dumper + ?Sized,
{
    let mut protos = Vec::with_capacity(opts.inputs.len());
    for input in &opts.inputs {
        let bytes = input.read()?;
        let name = input.chunkname();
        debug!("load {name}: {} bytes", bytes.len());
        protos.push(loader.load(&bytes, &name)?);
    }

    let root = combine(protos)?;
    info!("{} input(s), {} function(s)", opts.inputs.len(), root.count());

    if opts.listing > 0 {
        print_function(listing, &root, opts.listing_options())?;
        listing.flush()?;
    }

    if opts.dumping {
        let mut buf = Vec::new();
        dumper.dump(&root, opts.stripping, &mut buf)?;
        match &opts.output {
            Output::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(&buf).context("cannot write stdout")?;
                out.flush().context("cannot write stdout")?;
            }
            Output::File(path) => write_bytes(path, &buf)?,
        }
        debug!("dumped {} bytes (strip={})", buf.len(), opts.stripping);
    }
    Ok(root)
}

/* ------------------------------------------------------------------------- */
/* Tests                                                                     */
/* ------------------------------------------------------------------------- */
