//! Lecteur/écrivain séquentiels little-endian pour les chunks binaires.
//!
//! Toute lecture au-delà de la fin produit `CoreError::Format` avec le nom du
//! chunk : une entrée hostile ne fait jamais paniquer.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::Write;

use lunar_core::{CoreError, CoreResult};

/// Raison rapportée quand les octets manquent.
pub const TRUNCATED: &str = "truncated precompiled chunk";

/* ─────────────────────────── Byte Reader (LE) ─────────────────────────── */

/// Lecteur séquentiel sur un slice d’octets.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    off: usize,
    chunk: &'a str,
}

impl<'a> ByteReader<'a> {
    /// Construit un lecteur; `chunk` nomme l'entrée dans les erreurs.
    pub fn new(data: &'a [u8], chunk: &'a str) -> Self { Self { data, off: 0, chunk } }
    /// Offset courant.
    pub fn offset(&self) -> usize { self.off }
    /// Taille restante.
    pub fn remaining(&self) -> usize { self.data.len().saturating_sub(self.off) }

    /// Erreur de format attribuée à ce chunk.
    pub fn error(&self, reason: &'static str) -> CoreError { CoreError::format(self.chunk, reason) }

    /// Lit `n` octets.
    pub fn read_bytes(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(self.error(TRUNCATED));
        }
        let start = self.off;
        self.off += n;
        Ok(&self.data[start..self.off])
    }

    /// Lit un octet.
    pub fn read_u8(&mut self) -> CoreResult<u8> { Ok(self.read_bytes(1)?[0]) }

    /// Lit un i32 LE (`int` C).
    pub fn read_i32(&mut self) -> CoreResult<i32> { Ok(LittleEndian::read_i32(self.read_bytes(4)?)) }

    /// Lit un u32 LE.
    pub fn read_u32(&mut self) -> CoreResult<u32> { Ok(LittleEndian::read_u32(self.read_bytes(4)?)) }

    /// Lit un u64 LE (`size_t`).
    pub fn read_u64(&mut self) -> CoreResult<u64> { Ok(LittleEndian::read_u64(self.read_bytes(8)?)) }

    /// Lit un i64 LE.
    pub fn read_i64(&mut self) -> CoreResult<i64> { Ok(LittleEndian::read_i64(self.read_bytes(8)?)) }

    /// Lit un f64 LE.
    pub fn read_f64(&mut self) -> CoreResult<f64> { Ok(LittleEndian::read_f64(self.read_bytes(8)?)) }

    /// Lit un compteur d'éléments de `elem_size` octets au moins chacun.
    ///
    /// Un compteur négatif, ou qui dépasse ce qui reste à lire, est rejeté
    /// avant toute allocation.
    pub fn read_count(&mut self, elem_size: usize) -> CoreResult<usize> {
        let n = self.read_i32()?;
        let n = usize::try_from(n).map_err(|_| self.error("corrupted precompiled chunk"))?;
        if n.saturating_mul(elem_size) > self.remaining() {
            return Err(self.error(TRUNCATED));
        }
        Ok(n)
    }
}

/* ─────────────────────────── Byte Writer (LE) ─────────────────────────── */

/// Écrivain séquentiel au-dessus d'un `Write`.
#[derive(Debug)]
pub struct ByteWriter<W: Write> {
    inner: W,
}

impl<W: Write> ByteWriter<W> {
    /// Enveloppe `inner`.
    pub fn new(inner: W) -> Self { Self { inner } }
    /// Récupère le flux sous-jacent.
    pub fn into_inner(self) -> W { self.inner }

    /// Ajoute des octets bruts.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> CoreResult<()> { Ok(self.inner.write_all(bytes)?) }
    /// Écrit un octet.
    pub fn write_u8(&mut self, v: u8) -> CoreResult<()> { Ok(self.inner.write_u8(v)?) }
    /// Écrit un i32 LE.
    pub fn write_i32(&mut self, v: i32) -> CoreResult<()> { Ok(self.inner.write_i32::<LittleEndian>(v)?) }
    /// Écrit un u32 LE.
    pub fn write_u32(&mut self, v: u32) -> CoreResult<()> { Ok(self.inner.write_u32::<LittleEndian>(v)?) }
    /// Écrit un u64 LE.
    pub fn write_u64(&mut self, v: u64) -> CoreResult<()> { Ok(self.inner.write_u64::<LittleEndian>(v)?) }
    /// Écrit un i64 LE.
    pub fn write_i64(&mut self, v: i64) -> CoreResult<()> { Ok(self.inner.write_i64::<LittleEndian>(v)?) }
    /// Écrit un f64 LE.
    pub fn write_f64(&mut self, v: f64) -> CoreResult<()> { Ok(self.inner.write_f64::<LittleEndian>(v)?) }

    /// Écrit un compteur (`int` C).
    pub fn write_count(&mut self, n: usize) -> CoreResult<()> {
        let n = i32::try_from(n).map_err(|_| CoreError::format("dump", "vector too large for a precompiled chunk"))?;
        self.write_i32(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_reader_le() -> CoreResult<()> {
        let mut w = ByteWriter::new(Vec::new());
        w.write_u8(7)?;
        w.write_i32(-2)?;
        w.write_u32(0xDEAD_BEEF)?;
        w.write_i64(0x5678)?;
        w.write_f64(370.5)?;
        w.write_u64(u64::MAX)?;
        let bytes = w.into_inner();
        assert_eq!(&bytes[1..5], &(-2i32).to_le_bytes());

        let mut r = ByteReader::new(&bytes, "t");
        assert_eq!(r.read_u8()?, 7);
        assert_eq!(r.read_i32()?, -2);
        assert_eq!(r.read_u32()?, 0xDEAD_BEEF);
        assert_eq!(r.read_i64()?, 0x5678);
        assert_eq!(r.read_f64()?, 370.5);
        assert_eq!(r.read_u64()?, u64::MAX);
        assert_eq!(r.remaining(), 0);
        Ok(())
    }

    #[test]
    fn eof_is_a_format_error() {
        let mut r = ByteReader::new(&[1, 2], "short");
        assert_eq!(r.read_i32().unwrap_err().to_string(), "short: truncated precompiled chunk");
        assert_eq!(r.offset(), 0);
    }

    #[test]
    fn counts_are_bounded_by_input() {
        let mut bytes = 1000i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0; 8]);
        assert!(ByteReader::new(&bytes, "c").read_count(4).is_err());

        let neg = (-1i32).to_le_bytes();
        let err = ByteReader::new(&neg, "c").read_count(1).unwrap_err();
        assert_eq!(err.to_string(), "c: corrupted precompiled chunk");

        let mut ok = 2i32.to_le_bytes().to_vec();
        ok.extend_from_slice(&[0; 8]);
        assert_eq!(ByteReader::new(&ok, "c").read_count(4).unwrap(), 2);
    }
}
