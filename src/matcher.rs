use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use tracing::warn;

use crate::domain::{
    IdentifierRecord, KeggAccession, MappingRow, Namespace, UniprotAccession,
    strip_protein_version,
};
use crate::error::BiokbError;
use crate::row::{TableRow, Value, parse_tsv};
use crate::schema::{Column, ColumnKind, TableSchema};

const UNIPROT_EXTRACT: TableSchema = TableSchema {
    name: "uniprot_id_extract",
    input_columns: &[
        Column {
            name: "uniprot_accession",
            kind: ColumnKind::Text,
        },
        Column {
            name: "locus_tag",
            kind: ColumnKind::TextArray,
        },
        Column {
            name: "orf_name",
            kind: ColumnKind::TextArray,
        },
        Column {
            name: "kegg_accession",
            kind: ColumnKind::TextArray,
        },
        Column {
            name: "refseq_protein_id",
            kind: ColumnKind::Text,
        },
    ],
    attached_columns: &[],
    key_columns: &[],
    foreign_keys: &[],
    allow_null_keys: true,
};

const REFSEQ_EXTRACT: TableSchema = TableSchema {
    name: "refseq_id_extract",
    input_columns: &[
        Column {
            name: "refseq_locus_tag",
            kind: ColumnKind::Text,
        },
        Column {
            name: "locus_tag",
            kind: ColumnKind::TextArray,
        },
        Column {
            name: "refseq_protein_id",
            kind: ColumnKind::Text,
        },
    ],
    attached_columns: &[],
    key_columns: &[],
    foreign_keys: &[],
    allow_null_keys: true,
};

const KEGG_EXTRACT: TableSchema = TableSchema {
    name: "kegg_id_extract",
    input_columns: &[Column {
        name: "kegg_accession",
        kind: ColumnKind::Text,
    }],
    attached_columns: &[],
    key_columns: &[],
    foreign_keys: &[],
    allow_null_keys: true,
};

#[derive(Debug, Default)]
pub struct MatchResult {
    pub rows: Vec<MappingRow>,
    pub records_seen: usize,
    pub records_deduplicated: usize,
    pub records_empty: usize,
    pub ambiguous_slots: usize,
}

/// Reconciles the three identifier extracts into mapping rows. Pure with
/// respect to the inputs: the partition state lives and dies inside this
/// call.
pub fn reconcile_extracts(uniprot: &str, refseq: &str, kegg: &str) -> MatchResult {
    let mut records = parse_uniprot_extract(uniprot);
    records.extend(parse_refseq_extract(refseq));
    records.extend(parse_kegg_extract(kegg));
    match_identifiers(records)
}

/// UniProt-derived extract: accession, locus tags, ORF names, KEGG
/// accessions, RefSeq protein id. ORF names count as locus tags, and each
/// locus tag is paired with the KEGG accession that embeds it so the pair
/// forms one co-occurrence record.
pub fn parse_uniprot_extract(body: &str) -> Vec<IdentifierRecord> {
    let parsed = parse_tsv(&UNIPROT_EXTRACT, body);
    let mut seen_accessions = HashSet::new();
    let mut records = Vec::new();

    for row in parsed.rows {
        let Some(raw_accession) = text_value(&row, "uniprot_accession") else {
            continue;
        };
        // Normalize when the accession is canonical; isoform suffixes and
        // other variants pass through as-is.
        let accession = match UniprotAccession::from_str(&raw_accession) {
            Ok(accession) => accession.as_str().to_string(),
            Err(_) => {
                warn!(accession = %raw_accession, "non-canonical UniProt accession");
                raw_accession
            }
        };
        if !seen_accessions.insert(accession.clone()) {
            warn!(accession = %accession, "duplicate UniProt accession, dropping later record");
            continue;
        }

        let mut locus_tags = array_value(&row, "locus_tag");
        for orf_name in array_value(&row, "orf_name") {
            if !locus_tags.contains(&orf_name) {
                locus_tags.push(orf_name);
            }
        }
        let kegg_accessions = array_value(&row, "kegg_accession");
        let protein_id =
            text_value(&row, "refseq_protein_id").map(|id| strip_protein_version(&id).to_string());

        let pairs = pair_locus_kegg(&locus_tags, &kegg_accessions);
        if pairs.is_empty() {
            records.push(IdentifierRecord {
                uniprot_accession: Some(accession),
                refseq_protein_id: protein_id,
                ..IdentifierRecord::default()
            });
            continue;
        }
        for (locus_tag, kegg_accession) in pairs {
            records.push(IdentifierRecord {
                uniprot_accession: Some(accession.clone()),
                locus_tag,
                kegg_accession,
                refseq_protein_id: protein_id.clone(),
                ..IdentifierRecord::default()
            });
        }
    }

    records
}

/// Pairs locus tags with the KEGG accessions embedding them; leftovers on
/// either side become one-sided pairs.
fn pair_locus_kegg(
    locus_tags: &[String],
    kegg_accessions: &[String],
) -> Vec<(Option<String>, Option<String>)> {
    let mut pairs: Vec<(Option<String>, Option<String>)> = Vec::new();

    for locus_tag in locus_tags {
        let matched = kegg_accessions
            .iter()
            .find(|kegg| kegg.contains(locus_tag.as_str()))
            .cloned();
        pairs.push((Some(locus_tag.clone()), matched));
    }

    let paired: HashSet<&String> = pairs
        .iter()
        .filter_map(|(_, kegg)| kegg.as_ref())
        .collect();
    let unpaired: Vec<String> = kegg_accessions
        .iter()
        .filter(|kegg| !paired.contains(kegg))
        .cloned()
        .collect();
    for kegg in unpaired {
        pairs.push((None, Some(kegg)));
    }

    pairs
}

/// RefSeq-derived extract: refseq locus tag, locus tags, refseq protein id.
pub fn parse_refseq_extract(body: &str) -> Vec<IdentifierRecord> {
    let parsed = parse_tsv(&REFSEQ_EXTRACT, body);
    let mut seen_tags = HashSet::new();
    let mut records = Vec::new();

    for row in parsed.rows {
        let Some(refseq_locus_tag) = text_value(&row, "refseq_locus_tag") else {
            continue;
        };
        if !seen_tags.insert(refseq_locus_tag.clone()) {
            warn!(refseq_locus_tag = %refseq_locus_tag, "duplicate RefSeq locus tag, dropping later record");
            continue;
        }

        let locus_tags = array_value(&row, "locus_tag");
        let protein_id =
            text_value(&row, "refseq_protein_id").map(|id| strip_protein_version(&id).to_string());

        if locus_tags.is_empty() {
            records.push(IdentifierRecord {
                refseq_locus_tag: Some(refseq_locus_tag),
                refseq_protein_id: protein_id,
                ..IdentifierRecord::default()
            });
            continue;
        }
        for locus_tag in locus_tags {
            records.push(IdentifierRecord {
                refseq_locus_tag: Some(refseq_locus_tag.clone()),
                locus_tag: Some(locus_tag),
                refseq_protein_id: protein_id.clone(),
                ..IdentifierRecord::default()
            });
        }
    }

    records
}

/// KEGG-derived extract: one `org:locus` accession per line. The embedded
/// locus tag is a direct observation, so the record carries both slots.
pub fn parse_kegg_extract(body: &str) -> Vec<IdentifierRecord> {
    let parsed = parse_tsv(&KEGG_EXTRACT, body);
    let mut records = Vec::new();

    for row in parsed.rows {
        let Some(raw) = text_value(&row, "kegg_accession") else {
            continue;
        };
        let locus_tag = match KeggAccession::from_str(&raw) {
            Ok(accession) => Some(accession.locus_tag().to_string()),
            Err(_) => {
                warn!(kegg_accession = %raw, "KEGG accession has no organism prefix");
                None
            }
        };
        records.push(IdentifierRecord {
            kegg_accession: Some(raw),
            locus_tag,
            ..IdentifierRecord::default()
        });
    }

    records
}

fn text_value(row: &TableRow, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Value::Text(text)) => Some(text.clone()),
        _ => None,
    }
}

fn array_value(row: &TableRow, column: &str) -> Vec<String> {
    match row.get(column) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// Union-find over interned identifier values.
struct Partition {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl Partition {
    fn new() -> Self {
        Self {
            parent: Vec::new(),
            size: Vec::new(),
        }
    }

    fn add(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        self.size.push(1);
        id
    }

    fn find(&mut self, value: usize) -> usize {
        let mut root = value;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = value;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let mut root_a = self.find(a);
        let mut root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        if self.size[root_a] < self.size[root_b] {
            std::mem::swap(&mut root_a, &mut root_b);
        }
        self.parent[root_b] = root_a;
        self.size[root_a] += self.size[root_b];
    }
}

/// Partitions the deduplicated records' values and emits one mapping row
/// per directly-observed combination, in first-seen order.
///
/// A slot the record itself does not cover is only filled from the
/// partition when the candidate shares at least one source record with one
/// of the row's own values; merging through a shared intermediate alone
/// never synthesizes a combination. Several directly-justified candidates
/// are ranked by how many records they share with the row's own values;
/// a tie keeps the first-seen candidate and logs a warning.
pub fn match_identifiers(records: Vec<IdentifierRecord>) -> MatchResult {
    let mut result = MatchResult {
        records_seen: records.len(),
        ..MatchResult::default()
    };

    // Dedup identical records, drop empty ones.
    let mut unique = Vec::new();
    let mut seen = HashSet::new();
    for record in records {
        if record.is_empty() {
            warn!("identifier record with all fields null, dropping");
            result.records_empty += 1;
            continue;
        }
        if !seen.insert(record.clone()) {
            result.records_deduplicated += 1;
            continue;
        }
        unique.push(record);
    }

    // Intern values, tag each with its namespace, union per record.
    let mut partition = Partition::new();
    let mut value_index: HashMap<(Namespace, String), usize> = HashMap::new();
    let mut tagged: Vec<(Namespace, String)> = Vec::new();
    let mut records_of_value: Vec<Vec<usize>> = Vec::new();
    let mut record_values: Vec<Vec<usize>> = Vec::new();

    for (record_id, record) in unique.iter().enumerate() {
        let mut ids = Vec::new();
        for (namespace, value) in record.present() {
            let key = (namespace, value.to_string());
            let id = *value_index.entry(key.clone()).or_insert_with(|| {
                tagged.push(key);
                records_of_value.push(Vec::new());
                partition.add()
            });
            records_of_value[id].push(record_id);
            ids.push(id);
        }
        for window in ids.windows(2) {
            partition.union(window[0], window[1]);
        }
        record_values.push(ids);
    }

    // Partition members in first-seen value order.
    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    for id in 0..tagged.len() {
        let root = partition.find(id);
        members.entry(root).or_default().push(id);
    }

    // One row per directly-observed combination.
    let mut rows = Vec::new();
    let mut emitted = HashSet::new();
    for (record_id, record) in unique.iter().enumerate() {
        let own = &record_values[record_id];
        let own_records: HashSet<usize> = own
            .iter()
            .flat_map(|id| records_of_value[*id].iter().copied())
            .collect();
        let root = partition.find(own[0]);
        let siblings = &members[&root];

        let mut row = MappingRow::default();
        for (namespace, value) in record.present() {
            row.set(namespace, Some(value.to_string()));
        }

        for namespace in Namespace::ALL {
            if row.get(namespace).is_some() {
                continue;
            }
            let candidates: Vec<usize> = siblings
                .iter()
                .copied()
                .filter(|id| tagged[*id].0 == namespace)
                .collect();
            if candidates.is_empty() {
                continue;
            }

            // Direct justification: the candidate must share a record with
            // one of this combination's own values.
            let mut best: Option<(usize, usize)> = None;
            let mut tie = false;
            for id in &candidates {
                let score = records_of_value[*id]
                    .iter()
                    .filter(|record| own_records.contains(record))
                    .count();
                if score == 0 {
                    continue;
                }
                match best {
                    None => best = Some((*id, score)),
                    Some((_, best_score)) if score > best_score => {
                        best = Some((*id, score));
                        tie = false;
                    }
                    Some((_, best_score)) if score == best_score => tie = true,
                    Some(_) => {}
                }
            }

            match best {
                Some((id, _)) => {
                    if tie {
                        let err = BiokbError::AmbiguousMatch {
                            namespace: namespace.as_str().to_string(),
                            message: format!(
                                "multiple equally supported candidates, keeping first seen: {}",
                                tagged[id].1
                            ),
                        };
                        warn!(error = %err, "ambiguous slot");
                        result.ambiguous_slots += 1;
                    }
                    row.set(namespace, Some(tagged[id].1.clone()));
                }
                None => {
                    // Transitively connected values exist but none directly
                    // co-occurred with this combination: the slot stays null.
                    let err = BiokbError::AmbiguousMatch {
                        namespace: namespace.as_str().to_string(),
                        message: "no directly supported candidate, leaving slot null".to_string(),
                    };
                    warn!(error = %err, "ambiguous slot");
                    result.ambiguous_slots += 1;
                }
            }
        }

        if emitted.insert(row.clone()) {
            rows.push(row);
        }
    }

    result.rows = rows;
    result
}
