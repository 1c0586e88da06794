//! Sequence input and storage for the Aurelia distance estimator.
//!
//! - **Alphabets** — indexed nucleotide/amino-acid dictionaries with
//!   IUPAC ambiguity classes ([`Alphabet`], [`Symbol`])
//! - **FASTA parsing** — [`parse_fasta_str`] / [`parse_fasta_file`] with
//!   the normalization rules of the distance pipeline
//! - **Sequence sets** — [`SequenceSet`] owning translated sequences,
//!   pair enumeration and observed symbol frequencies
//! - **Guide distances** — fast k-mer based [`guide_distances`] used to
//!   seed banding and triplet sampling

pub mod alphabet;
pub mod fasta;
pub mod kmer;
pub mod sequences;

pub use alphabet::{Alphabet, Symbol};
pub use fasta::{parse_fasta_file, parse_fasta_str, FastaRecord};
pub use kmer::guide_distances;
pub use sequences::SequenceSet;
