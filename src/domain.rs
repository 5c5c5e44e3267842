use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::BiokbError;

/// The canonical UniProtKB accession format.
const UNIPROT_ACCESSION_PATTERN: &str =
    r"^([OPQ][0-9][A-Z0-9]{3}[0-9]|[A-NR-Z][0-9]([A-Z][A-Z0-9]{2}[0-9]){1,2})$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    UniprotAccession,
    RefseqLocusTag,
    LocusTag,
    KeggAccession,
    RefseqProteinId,
}

impl Namespace {
    /// Slot order of the mapping table, which is also the TSV column order.
    pub const ALL: [Namespace; 5] = [
        Namespace::UniprotAccession,
        Namespace::RefseqLocusTag,
        Namespace::LocusTag,
        Namespace::KeggAccession,
        Namespace::RefseqProteinId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::UniprotAccession => "uniprot_accession",
            Namespace::RefseqLocusTag => "refseq_locus_tag",
            Namespace::LocusTag => "locus_tag",
            Namespace::KeggAccession => "kegg_accession",
            Namespace::RefseqProteinId => "refseq_protein_id",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniprotAccession(String);

impl UniprotAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniprotAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UniprotAccession {
    type Err = BiokbError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let pattern = Regex::new(UNIPROT_ACCESSION_PATTERN).unwrap();
        if !pattern.is_match(&normalized) {
            return Err(BiokbError::InvalidUniprotAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeggAccession(String);

impl KeggAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The locus tag embedded after the organism prefix (`sml:Smlt1234` -> `Smlt1234`).
    pub fn locus_tag(&self) -> &str {
        self.0.split_once(':').map(|(_, rest)| rest).unwrap_or("")
    }
}

impl fmt::Display for KeggAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for KeggAccession {
    type Err = BiokbError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = match normalized.split_once(':') {
            Some((org, locus)) => {
                !org.is_empty()
                    && org.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit())
                    && !locus.is_empty()
                    && locus.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
            }
            None => false,
        };
        if !is_valid {
            return Err(BiokbError::InvalidKeggAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// One observed tuple of co-occurring identifier values from a single source
/// line. Every present value is an alias of the same biological entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct IdentifierRecord {
    pub uniprot_accession: Option<String>,
    pub refseq_locus_tag: Option<String>,
    pub locus_tag: Option<String>,
    pub kegg_accession: Option<String>,
    pub refseq_protein_id: Option<String>,
}

impl IdentifierRecord {
    pub fn get(&self, namespace: Namespace) -> Option<&str> {
        match namespace {
            Namespace::UniprotAccession => self.uniprot_accession.as_deref(),
            Namespace::RefseqLocusTag => self.refseq_locus_tag.as_deref(),
            Namespace::LocusTag => self.locus_tag.as_deref(),
            Namespace::KeggAccession => self.kegg_accession.as_deref(),
            Namespace::RefseqProteinId => self.refseq_protein_id.as_deref(),
        }
    }

    pub fn set(&mut self, namespace: Namespace, value: Option<String>) {
        match namespace {
            Namespace::UniprotAccession => self.uniprot_accession = value,
            Namespace::RefseqLocusTag => self.refseq_locus_tag = value,
            Namespace::LocusTag => self.locus_tag = value,
            Namespace::KeggAccession => self.kegg_accession = value,
            Namespace::RefseqProteinId => self.refseq_protein_id = value,
        }
    }

    pub fn present(&self) -> Vec<(Namespace, &str)> {
        Namespace::ALL
            .iter()
            .filter_map(|ns| self.get(*ns).map(|value| (*ns, value)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        Namespace::ALL.iter().all(|ns| self.get(*ns).is_none())
    }
}

/// One row of the identifier cross-reference table: at most one value per
/// namespace slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct MappingRow {
    pub uniprot_accession: Option<String>,
    pub refseq_locus_tag: Option<String>,
    pub locus_tag: Option<String>,
    pub kegg_accession: Option<String>,
    pub refseq_protein_id: Option<String>,
}

impl MappingRow {
    pub fn get(&self, namespace: Namespace) -> Option<&str> {
        match namespace {
            Namespace::UniprotAccession => self.uniprot_accession.as_deref(),
            Namespace::RefseqLocusTag => self.refseq_locus_tag.as_deref(),
            Namespace::LocusTag => self.locus_tag.as_deref(),
            Namespace::KeggAccession => self.kegg_accession.as_deref(),
            Namespace::RefseqProteinId => self.refseq_protein_id.as_deref(),
        }
    }

    pub fn set(&mut self, namespace: Namespace, value: Option<String>) {
        match namespace {
            Namespace::UniprotAccession => self.uniprot_accession = value,
            Namespace::RefseqLocusTag => self.refseq_locus_tag = value,
            Namespace::LocusTag => self.locus_tag = value,
            Namespace::KeggAccession => self.kegg_accession = value,
            Namespace::RefseqProteinId => self.refseq_protein_id = value,
        }
    }

    pub fn to_tsv_line(&self) -> String {
        Namespace::ALL
            .iter()
            .map(|ns| self.get(*ns).unwrap_or("NULL"))
            .collect::<Vec<_>>()
            .join("\t")
    }
}

impl fmt::Display for MappingRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_tsv_line())
    }
}

/// RefSeq protein ids carry a trailing version (`WP_012345678.1`) that the
/// annotation extracts omit; comparisons happen on the unversioned form.
pub fn strip_protein_version(value: &str) -> &str {
    value.split('.').next().unwrap_or(value)
}
