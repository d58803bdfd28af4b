//! lunar-core — modèle de prototypes, désassembleur et combinateur de chunks
//!
//! Fournit :
//! - `Instruction` (mot 32 bits) + `decode()` -> `Decoded { op, args }`
//! - table statique des opcodes (`OpCode`, `OpInfo`, `OpMode`, `OpArgMask`)
//! - `Prototype` et ses annexes (`Constant`, `ConstPool`, `UpvalDesc`, `LocVar`, `LineTable`)
//! - `render()` : texte exact et réversible d'une constante
//! - `print_function()` : listing (en-têtes, code annoté, tables de debug)
//! - `combine()` : fusion de N prototypes racines en un seul
//! - traits `Loader` / `Dumper` : collaborateurs externes (front-end, sérialiseur)
//! - Erreurs `CoreError` + alias `CoreResult<T>`
//!
//! Features :
//! - `serde` : derive (dé)sérialisation sur le modèle de prototypes

#![deny(missing_docs)]

/* ─────────────────────────── Imports ─────────────────────────── */

use std::io;

use thiserror::Error;

/* ─────────────────────────── Modules publics ─────────────────────────── */

/// Primitives de bytecode (instructions, prototypes, rendu, listing, combinaison).
pub mod bytecode;

/// Raccourci : le désassembleur textuel.
pub use bytecode::disasm;

pub use bytecode::{combine, print_function, render, ListingOptions, Prototype};

/* ─────────────────────────── Résultat commun ─────────────────────────── */

/// Alias résultat commun au core.
pub type CoreResult<T> = core::result::Result<T, CoreError>;

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs communes.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Le puits de sortie (ou d'entrée) a échoué.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// Opcode hors de la table (entrée mal formée).
    #[error("invalid opcode {raw}")]
    InvalidOpcode {
        /// Valeur brute du champ opcode.
        raw: u8,
    },
    /// Chunk binaire illisible.
    #[error("{chunk}: {reason}")]
    Format {
        /// Nom du chunk (pour les messages).
        chunk: String,
        /// Ce qui ne va pas.
        reason: &'static str,
    },
    /// `combine` appelé sans entrée.
    #[error("no prototypes to combine")]
    NothingToCombine,
    /// Plus d'entrées que ce qu'un CLOSURE peut adresser.
    #[error("too many inputs to combine: {count} (max {max})")]
    TooManyInputs {
        /// Nombre d'entrées reçues.
        count: usize,
        /// Maximum adressable.
        max: usize,
    },
}

impl CoreError {
    /// Construit une erreur de format.
    pub fn format(chunk: impl Into<String>, reason: &'static str) -> Self {
        CoreError::Format { chunk: chunk.into(), reason }
    }
}

/* ─────────────────────────── Collaborateurs externes ─────────────────────────── */

/// Front-end : produit un arbre de prototypes à partir d'octets.
pub trait Loader {
    /// Charge `bytes`; `chunkname` sert aux messages d'erreur.
    fn load(&self, bytes: &[u8], chunkname: &str) -> CoreResult<Prototype>;
}

/// Sérialiseur : persiste un arbre de prototypes dans un flux d'octets.
pub trait Dumper {
    /// Écrit `proto` dans `sink`, sans infos de debug si `strip`.
    fn dump(&self, proto: &Prototype, strip: bool, sink: &mut dyn io::Write) -> CoreResult<()>;
}

/* ─────────────────────────── Prélude (reexports utiles) ─────────────────────────── */

/// Prélude pratique pour importer les types/funcs clés du crate.
pub mod prelude {
    /// Réexports utiles pour une importation rapide.
    pub use super::bytecode::{
        combine, print_function, render, Args, ConstPool, Constant, Decoded, Instruction, LineTable,
        ListingOptions, LocVar, OpCode, OpMode, Prototype, Rk, UpvalDesc,
    };
    pub use super::{CoreError, CoreResult, Dumper, Loader};
}

/* ─────────────────────────── Tests ─────────────────────────── */
