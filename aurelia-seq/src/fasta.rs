//! FASTA input for the distance pipeline.
//!
//! Parsing is delegated to `needletail`; on top of it this module applies
//! the pipeline's normalization rules:
//!
//! - sequence data loses stop codons (`*`), whitespace and CR;
//! - header names are trimmed of `>`, CR, tab, space and newline;
//! - duplicate names collapse, keeping the **last** occurrence;
//! - records are returned in ascending name order, which fixes the
//!   sequence ids used everywhere downstream.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use aurelia_core::{AureliaError, Result};
use needletail::{parse_fastx_file, parse_fastx_reader, FastxReader};

/// One named, normalized FASTA record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FastaRecord {
    pub name: String,
    pub sequence: String,
}

/// Parse FASTA text held in memory.
///
/// # Errors
///
/// `Input` on empty or malformed input.
pub fn parse_fasta_str(data: &str) -> Result<Vec<FastaRecord>> {
    let reader = parse_fastx_reader(Cursor::new(data.as_bytes().to_vec()))
        .map_err(|e| AureliaError::Input(e.to_string()))?;
    collect_records(reader)
}

/// Parse a FASTA file.
///
/// # Errors
///
/// `Input` on unreadable, empty or malformed files.
pub fn parse_fasta_file(path: impl AsRef<Path>) -> Result<Vec<FastaRecord>> {
    let reader = parse_fastx_file(path.as_ref())
        .map_err(|e| AureliaError::Input(e.to_string()))?;
    collect_records(reader)
}

fn collect_records(mut reader: Box<dyn FastxReader>) -> Result<Vec<FastaRecord>> {
    // BTreeMap gives both the last-wins collapse and the name-sorted id
    // assignment in one step.
    let mut by_name: BTreeMap<String, String> = BTreeMap::new();

    while let Some(record) = reader.next() {
        let record = record.map_err(|e| AureliaError::Input(e.to_string()))?;
        let name = clean_name(record.id());
        let sequence = clean_sequence(&record.seq());
        by_name.insert(name, sequence);
    }

    if by_name.is_empty() {
        return Err(AureliaError::Input(
            "no FASTA sequences found in the input".into(),
        ));
    }

    Ok(by_name
        .into_iter()
        .map(|(name, sequence)| FastaRecord { name, sequence })
        .collect())
}

fn clean_name(id: &[u8]) -> String {
    id.iter()
        .map(|&b| b as char)
        .filter(|c| !matches!(c, '>' | '\r' | '\t' | ' ' | '\n'))
        .collect()
}

fn clean_sequence(seq: &[u8]) -> String {
    seq.iter()
        .map(|&b| b as char)
        .filter(|c| !matches!(c, '\r' | '\t' | ' ' | '\n' | '*'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_and_sorts_by_name() {
        let records = parse_fasta_str(">b\nGG\n>a\nACGT\n>c\nTT\n").unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(records[0].sequence, "ACGT");
    }

    #[test]
    fn strips_stop_codons_and_whitespace() {
        let records = parse_fasta_str(">s\nAC*G T\n").unwrap();
        assert_eq!(records[0].sequence, "ACGT");
    }

    #[test]
    fn multiline_sequences_concatenate() {
        let records = parse_fasta_str(">s\nACGT\nACGT\nAC\n").unwrap();
        assert_eq!(records[0].sequence, "ACGTACGTAC");
    }

    #[test]
    fn duplicate_names_keep_last() {
        let records = parse_fasta_str(">a\nAC*GT\n>a\nTT\n>b\nGG").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "a");
        assert_eq!(records[0].sequence, "TT");
        assert_eq!(records[1].sequence, "GG");
    }

    #[test]
    fn names_lose_embedded_whitespace() {
        let records = parse_fasta_str(">seq one\tx\r\nACGT\n").unwrap();
        assert_eq!(records[0].name, "seqonex");
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(parse_fasta_str("").is_err());
    }

    #[test]
    fn gaps_are_preserved_in_raw_records() {
        let records = parse_fasta_str(">s\nAC--GT\n").unwrap();
        assert_eq!(records[0].sequence, "AC--GT");
    }

    #[test]
    fn reads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ">seq1").unwrap();
        writeln!(file, "ATCGATCG").unwrap();
        writeln!(file, ">seq2").unwrap();
        writeln!(file, "GCGCGCGC").unwrap();
        file.flush().unwrap();

        let records = parse_fasta_file(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "seq1");
        assert_eq!(records[1].sequence, "GCGCGCGC");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(parse_fasta_file("/nonexistent/input.fasta").is_err());
    }
}
