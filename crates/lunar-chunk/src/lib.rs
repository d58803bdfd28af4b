//! lunar-chunk — chunks binaires précompilés (format Lua 5.3)
//!
//! Format :
//! ```text
//! Header : "\x1bLua" + version 0x53 + format 0 + "\x19\x93\r\n\x1a\n"
//!          + tailles int(4) size_t(8) Instruction(4) integer(8) number(8)
//!          + 0x5678 (i64) + 370.5 (f64) + nb d'upvalues du main (u8)
//! Function :
//!   source (string) | linedefined, lastlinedefined (int)
//!   numparams, is_vararg, maxstacksize (u8)
//!   code     = int n + n × u32
//!   consts   = int n + n × (tag u8 + payload)   tags : nil 0, bool 1, float 3,
//!                                                      int 19, str 4, long str 20
//!   upvals   = int n + n × (instack u8, idx u8)
//!   protos   = int n + n × Function
//!   debug    = lineinfo (int n + n × int), locvars (name, startpc, endpc),
//!              noms d'upvalues (int n + n × string)
//! String : 0 = null ; sinon taille+1 sur un octet (< 0xFF) ou 0xFF + size_t,
//!          puis les octets
//! ```
//!
//! Une source nulle dans une fonction imbriquée hérite de celle du parent.
//! Avec `strip`, toutes les sources sont nulles et les tables de debug vides.
//!
//! API :
//! - [`BinaryChunk`] : implémente `Loader` et `Dumper` de `lunar-core`
//! - [`undump()`] / [`dump()`] : accès direct
//!
//! Toutes les valeurs multi-octets sont little-endian.

#![deny(missing_docs)]

use std::io::Write;

use lunar_core::{CoreResult, Dumper, Loader, Prototype};

pub mod io;

mod dump;
mod undump;

pub use dump::dump_to;
pub use undump::undump;

/* ─────────────────────────── Constantes du header ─────────────────────────── */

/// Signature d'un chunk précompilé.
pub const SIGNATURE: &[u8; 4] = b"\x1bLua";
/// Version (majeure × 16 + mineure).
pub const VERSION: u8 = 0x53;
/// Format officiel.
pub const FORMAT: u8 = 0;
/// Octets de détection des conversions de fin de ligne.
pub const DATA: &[u8; 6] = b"\x19\x93\r\n\x1a\n";
/// Entier de contrôle (boutisme).
pub const CHECK_INT: i64 = 0x5678;
/// Flottant de contrôle (format des nombres).
pub const CHECK_NUM: f64 = 370.5;

/// Tailles attendues : int, size_t, Instruction, integer, number.
pub const SIZES: [(u8, &str); 5] = [
    (4, "int size mismatch in precompiled chunk"),
    (8, "size_t size mismatch in precompiled chunk"),
    (4, "Instruction size mismatch in precompiled chunk"),
    (8, "lua_Integer size mismatch in precompiled chunk"),
    (8, "lua_Number size mismatch in precompiled chunk"),
];

/// Tags des constantes dans le flux.
pub mod tag {
    /// `nil`.
    pub const NIL: u8 = 0;
    /// Booléen.
    pub const BOOLEAN: u8 = 1;
    /// Flottant.
    pub const NUMFLT: u8 = 3;
    /// Entier.
    pub const NUMINT: u8 = 3 | (1 << 4);
    /// Chaîne courte.
    pub const SHRSTR: u8 = 4;
    /// Chaîne longue.
    pub const LNGSTR: u8 = 4 | (1 << 4);
}

/// Imbrication maximale acceptée au chargement.
pub const MAX_NESTING: usize = 200;

/* ─────────────────────────── Helpers ─────────────────────────── */

/// Vrai si `bytes` commence par la signature (après une éventuelle ligne `#`).
pub fn is_precompiled(bytes: &[u8]) -> bool { skip_comment(bytes).starts_with(&SIGNATURE[..1]) }

/// Ignore une première ligne commençant par `#` (shebang).
pub fn skip_comment(bytes: &[u8]) -> &[u8] {
    if bytes.first() != Some(&b'#') {
        return bytes;
    }
    bytes.iter().position(|&b| b == b'\n').map_or(&[][..], |nl| &bytes[nl + 1..])
}

/// Nom d'un chunk tel qu'il apparaît dans les messages d'erreur.
///
/// `@fichier` et `=nom` perdent leur marqueur; un nom qui est lui-même un
/// chunk binaire devient `binary string`.
pub fn display_name(chunkname: &str) -> &str {
    match chunkname.as_bytes().first() {
        Some(b'@' | b'=') => &chunkname[1..],
        Some(&b) if b == SIGNATURE[0] => "binary string",
        _ => chunkname,
    }
}

/// Sérialise `proto` dans un buffer neuf.
pub fn dump(proto: &Prototype, strip: bool) -> CoreResult<Vec<u8>> {
    let mut out = Vec::new();
    dump_to(proto, strip, &mut out)?;
    Ok(out)
}

/* ─────────────────────────── Collaborateur ─────────────────────────── */

/// Chargeur/sérialiseur de chunks précompilés.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BinaryChunk;

impl Loader for BinaryChunk {
    fn load(&self, bytes: &[u8], chunkname: &str) -> CoreResult<Prototype> { undump(bytes, chunkname) }
}

impl Dumper for BinaryChunk {
    fn dump(&self, proto: &Prototype, strip: bool, sink: &mut dyn Write) -> CoreResult<()> {
        dump_to(proto, strip, sink)
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
